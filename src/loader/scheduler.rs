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

//! Producer-side bookkeeping: request records, slots, and the per-tick pass that
//! moves requests into the queue and publishes finished loads.

use std::mem;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use tracing::{debug, error, warn};

use crate::catalog::BankCatalog;

use super::queue::RequestQueue;
use super::request::{Completion, LoadJob, Request, RequestStatus, SubmitError};
use super::slot::Slot;

pub(crate) struct SlotScheduler {
    catalog: Arc<BankCatalog>,
    requests: Vec<Request>,
    slots: Vec<Slot>,
    queue: RequestQueue<LoadJob>,
    completions: Receiver<Completion>,
    in_flight: usize,
}

impl SlotScheduler {
    /// Creates a scheduler with one request record per queue entry.
    pub(crate) fn new(
        catalog: Arc<BankCatalog>,
        slot_count: usize,
        queue: RequestQueue<LoadJob>,
        completions: Receiver<Completion>,
    ) -> SlotScheduler {
        SlotScheduler {
            catalog,
            requests: (0..queue.capacity()).map(|_| Request::default()).collect(),
            slots: (0..slot_count).map(|_| Slot::new()).collect(),
            queue,
            completions,
            in_flight: 0,
        }
    }

    /// Records a request to load `bank` (or a single `sound` of it) into `slot`.
    /// Returns the index of the request record used.
    pub(crate) fn submit(
        &mut self,
        slot: usize,
        bank: u16,
        sound: Option<u16>,
    ) -> Result<usize, SubmitError> {
        if self.queue.is_closed() {
            return Err(SubmitError::Finalized);
        }
        if slot >= self.slots.len() {
            return Err(SubmitError::InvalidSlot {
                slot,
                slots: self.slots.len(),
            });
        }
        let info = self
            .catalog
            .bank(bank)
            .ok_or(SubmitError::UnknownBank(bank))?;
        if let Some(sound) = sound {
            if sound >= info.sound_count() {
                return Err(SubmitError::InvalidSound {
                    bank,
                    sound,
                    count: info.sound_count(),
                });
            }
        }
        if self
            .requests
            .iter()
            .any(|request| request.status.is_live() && request.slot == slot)
        {
            return Err(SubmitError::SlotBusy(slot));
        }

        let index = self
            .requests
            .iter()
            .position(|request| !request.status.is_live())
            .ok_or(SubmitError::CapacityExceeded {
                capacity: self.requests.len(),
            })?;
        self.requests[index] = Request {
            slot,
            bank,
            sound,
            status: RequestStatus::Submitted,
        };
        self.in_flight += 1;

        debug!(index, slot, bank, sound = ?sound, "Request submitted");
        Ok(index)
    }

    /// Runs one scheduling pass. Never blocks.
    pub(crate) fn service(&mut self) {
        self.collect_completions();

        for index in 0..self.requests.len() {
            if self.in_flight == 0 {
                break;
            }

            let request = &mut self.requests[index];
            let slot = &mut self.slots[request.slot];
            match mem::take(&mut request.status) {
                RequestStatus::Submitted => {
                    // The slot's old buffer travels with the job; the loading thread
                    // releases it before allocating the new one.
                    let job = LoadJob {
                        index,
                        bank: request.bank,
                        sound: request.sound,
                        previous: slot.begin_load(),
                    };
                    request.status = match self.queue.push(job) {
                        Ok(()) => RequestStatus::InProgress,
                        Err(e) => {
                            error!(index, error = %e, "Unable to queue request");
                            RequestStatus::Failed(e.into())
                        }
                    };
                }
                RequestStatus::Done(loaded) => {
                    let (table, count) = match self.catalog.bank(loaded.bank) {
                        Some(info) => (info.sounds(), info.sound_count()),
                        None => (&[][..], 0),
                    };
                    debug!(
                        index,
                        slot = request.slot,
                        bank = loaded.bank,
                        sound = ?loaded.sound,
                        size = loaded.buffer.len(),
                        "Publishing loaded bank"
                    );
                    slot.publish(loaded, table, count);
                    *request = Request::default();
                    self.in_flight -= 1;
                }
                RequestStatus::Failed(e) => {
                    error!(
                        index,
                        slot = request.slot,
                        bank = request.bank,
                        sound = ?request.sound,
                        error = %e,
                        "Bank load failed"
                    );
                    slot.fail(e);
                    *request = Request::default();
                    self.in_flight -= 1;
                }
                other => request.status = other,
            }
        }
    }

    /// Moves every report from the loading thread into its request record.
    fn collect_completions(&mut self) {
        while let Ok(completion) = self.completions.try_recv() {
            let Some(request) = self.requests.get_mut(completion.index) else {
                warn!(index = completion.index, "Completion for unknown request");
                continue;
            };
            if !matches!(request.status, RequestStatus::InProgress) {
                warn!(
                    index = completion.index,
                    status = ?request.status,
                    "Completion for request that isn't in progress"
                );
                continue;
            }
            request.status = match completion.result {
                Ok(loaded) => RequestStatus::Done(loaded),
                Err(e) => RequestStatus::Failed(e),
            };
        }
    }

    /// Stops accepting submissions and closes the queue.
    pub(crate) fn close(&mut self) {
        self.queue.close();
    }

    /// Drops every buffer the scheduler still owns: unread completions, finished
    /// requests and slot buffers. Returns how many buffers were released.
    pub(crate) fn release_all(&mut self) -> usize {
        let mut released = 0;
        while let Ok(completion) = self.completions.try_recv() {
            released += usize::from(completion.result.is_ok());
        }
        for request in self.requests.iter_mut() {
            released += usize::from(matches!(request.status, RequestStatus::Done(_)));
            *request = Request::default();
        }
        for slot in self.slots.iter_mut() {
            released += usize::from(slot.release().is_some());
        }
        self.in_flight = 0;
        released
    }

    pub(crate) fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub(crate) fn pending_jobs(&self) -> usize {
        self.queue.pending()
    }

    #[cfg(test)]
    pub(crate) fn request_status(&self, index: usize) -> Option<&RequestStatus> {
        self.requests.get(index).map(|request| &request.status)
    }
}
