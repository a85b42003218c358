// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The dedicated bank loading thread.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{debug, info, trace, warn};

use crate::catalog::BankCatalog;
use crate::storage::Storage;

use super::buffer::{BufferLedger, SoundBuffer};
use super::queue::QueueWaiter;
use super::request::{Completion, LoadError, LoadJob, LoadedBank};

/// Phases a job moves through on the loading thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Resolving,
    Allocating,
    Reading,
    Completed,
}

/// Where a job's data lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LoadPlan {
    file: usize,
    offset: u64,
    size: u64,
}

/// Loads queued jobs one at a time and reports each result back to the scheduler.
pub(crate) struct LoadWorker {
    catalog: Arc<BankCatalog>,
    storage: Arc<dyn Storage>,
    ledger: Arc<BufferLedger>,
    jobs: QueueWaiter<LoadJob>,
    completions: Sender<Completion>,
    shutdown: Arc<AtomicBool>,
}

impl LoadWorker {
    pub(crate) fn new(
        catalog: Arc<BankCatalog>,
        storage: Arc<dyn Storage>,
        ledger: Arc<BufferLedger>,
        jobs: QueueWaiter<LoadJob>,
        completions: Sender<Completion>,
        shutdown: Arc<AtomicBool>,
    ) -> LoadWorker {
        LoadWorker {
            catalog,
            storage,
            ledger,
            jobs,
            completions,
            shutdown,
        }
    }

    /// Starts the loading thread.
    pub(crate) fn spawn(self, priority: Option<u8>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("bankloader-worker".into())
            .spawn(move || {
                if let Some(priority) = priority {
                    apply_priority(priority);
                }
                self.run();
            })
    }

    fn run(self) {
        info!("Bank loading thread started");
        let mut loaded = 0u64;

        // The queue only ends once it has been closed and drained.
        while let Some(job) = self.jobs.wait_and_pop() {
            if self.shutdown.load(Ordering::SeqCst) {
                trace!(index = job.index, "Discarding job during shutdown");
                continue;
            }

            let completion = self.load(job);
            loaded += 1;
            if let Err(e) = self.completions.send(completion) {
                debug!(index = e.0.index, "Scheduler is gone, dropping completion");
            }
        }

        info!(loaded, "Bank loading thread stopped");
    }

    /// Runs a single job through resolve, allocate and read.
    fn load(&self, mut job: LoadJob) -> Completion {
        let index = job.index;
        trace!(index, phase = ?Phase::Idle, "Dequeued job");

        trace!(index, phase = ?Phase::Resolving);
        let plan = match self.resolve(&job) {
            Ok(plan) => plan,
            Err(e) => return Completion { index, result: Err(e) },
        };

        trace!(index, phase = ?Phase::Allocating);
        // Release the slot's old data before allocating the replacement.
        drop(job.previous.take());
        // Slot tables hold 32-bit offsets, so a region must fit in one.
        let Some(size) = u32::try_from(plan.size)
            .ok()
            .and_then(|size| usize::try_from(size).ok())
        else {
            return Completion {
                index,
                result: Err(LoadError::RegionTooLarge {
                    bank: job.bank,
                    size: plan.size,
                }),
            };
        };
        let mut buffer = SoundBuffer::allocate(size, &self.ledger);

        if size > 0 {
            trace!(index, phase = ?Phase::Reading);
            if let Err(source) = self.storage.read_at(plan.file, plan.offset, &mut buffer) {
                return Completion {
                    index,
                    result: Err(LoadError::Read {
                        bank: job.bank,
                        sound: job.sound,
                        source,
                    }),
                };
            }
        }

        debug!(
            index,
            bank = job.bank,
            sound = ?job.sound,
            file = plan.file,
            offset = plan.offset,
            size,
            phase = ?Phase::Completed,
            "Loaded bank data"
        );
        Completion {
            index,
            result: Ok(LoadedBank {
                bank: job.bank,
                sound: job.sound,
                buffer,
            }),
        }
    }

    fn resolve(&self, job: &LoadJob) -> Result<LoadPlan, LoadError> {
        let bank = self
            .catalog
            .bank(job.bank)
            .ok_or(LoadError::UnknownBank(job.bank))?;

        let offset = match job.sound {
            Some(sound) => bank.data_region_offset() + bank.sound_offset(sound),
            None => bank.data_region_offset(),
        };
        Ok(LoadPlan {
            file: bank.file_id(),
            offset,
            size: bank.region_size(job.sound),
        })
    }
}

fn apply_priority(priority: u8) {
    match ThreadPriorityValue::try_from(priority) {
        Ok(value) => {
            if let Err(e) = set_current_thread_priority(ThreadPriority::Crossplatform(value)) {
                warn!(priority, error = ?e, "Failed to set bank loading thread priority");
            }
        }
        Err(e) => warn!(priority, error = ?e, "Invalid bank loading thread priority"),
    }
}
