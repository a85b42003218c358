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

//! Asynchronous bank loading.
//!
//! This module provides:
//! - A dedicated loading thread fed through a bounded request queue
//! - Request records that move from submitted to in progress to done
//! - Slots that only ever expose fully loaded buffers
//! - Exactly-sized buffers allocated per load and released exactly once

mod buffer;
mod queue;
mod request;
mod scheduler;
mod slot;
mod worker;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{error, info, span, Level};

use crate::catalog::{BankCatalog, CatalogError};
use crate::config::{ConfigError, LoaderConfig};
use crate::format::{self, FormatError, LookupEntry};
use crate::storage::{PakFiles, Storage};

pub use buffer::{BufferLedger, SoundBuffer};
pub use queue::QueueError;
pub use request::{LoadError, SubmitError};
pub use slot::{Slot, SlotState, SINGLE_SOUND};

use scheduler::SlotScheduler;
use worker::LoadWorker;

/// Default number of slots.
pub const DEFAULT_SLOTS: usize = 45;

/// Default number of request records, which is also the queue capacity.
pub const DEFAULT_REQUEST_POOL: usize = 50;

/// Error types for bringing the loader up.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unable to read {}: {source}", path.display())]
    Table {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid table {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("unable to build bank catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("unable to start bank loading thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Sizing of the loader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Number of slots.
    pub slots: usize,
    /// Number of request records and queue entries.
    pub request_pool: usize,
    /// Priority (0-99) of the loading thread, or None to inherit.
    pub worker_priority: Option<u8>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        LoaderOptions {
            slots: DEFAULT_SLOTS,
            request_pool: DEFAULT_REQUEST_POOL,
            worker_priority: None,
        }
    }
}

/// The host's bank tables: the lookup table and the pak file names.
#[derive(Clone, Debug)]
pub struct HostTables {
    pub lookup: Vec<LookupEntry>,
    pub pak_names: Vec<String>,
}

impl HostTables {
    /// Reads the lookup table and the pak name list from disk.
    pub fn read(lookup_file: &Path, pak_list_file: &Path) -> Result<HostTables, InitError> {
        let read = |path: &Path| {
            fs::read(path).map_err(|source| InitError::Table {
                path: path.to_path_buf(),
                source,
            })
        };
        let lookup = LookupEntry::parse_table(&read(lookup_file)?).map_err(|source| {
            InitError::Format {
                path: lookup_file.to_path_buf(),
                source,
            }
        })?;
        let pak_names =
            format::parse_pak_names(&read(pak_list_file)?).map_err(|source| InitError::Format {
                path: pak_list_file.to_path_buf(),
                source,
            })?;
        Ok(HostTables { lookup, pak_names })
    }

    /// Gets the path of every pak inside `sfx_dir`, in pak index order.
    pub fn pak_paths(&self, sfx_dir: &Path) -> Vec<PathBuf> {
        self.pak_names.iter().map(|name| sfx_dir.join(name)).collect()
    }
}

/// The bank loading subsystem.
///
/// The owner of the loader is the producer: it submits requests and calls
/// `service` once per tick. Loads run on a dedicated thread and are published
/// into their slots during `service`.
pub struct BankLoader {
    catalog: Arc<BankCatalog>,
    ledger: Arc<BufferLedger>,
    scheduler: SlotScheduler,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl BankLoader {
    /// Builds the bank catalog and starts the loading thread. Fails if any bank
    /// header can't be read.
    pub fn post_initialize(
        lookup: &[LookupEntry],
        storage: Arc<dyn Storage>,
        options: LoaderOptions,
    ) -> Result<BankLoader, InitError> {
        let span = span!(Level::INFO, "bank loader init");
        let _enter = span.enter();

        let catalog = Arc::new(BankCatalog::build(lookup, storage.as_ref())?);
        let ledger = BufferLedger::new();
        let shutdown = Arc::new(AtomicBool::new(false));

        let request_pool = options.request_pool.max(1);
        let (queue, jobs) = queue::request_queue(request_pool);
        let (completions_tx, completions_rx) = crossbeam_channel::bounded(request_pool);

        let worker = LoadWorker::new(
            catalog.clone(),
            storage,
            ledger.clone(),
            jobs,
            completions_tx,
            shutdown.clone(),
        )
        .spawn(options.worker_priority)
        .map_err(InitError::Spawn)?;

        info!(
            banks = catalog.len(),
            slots = options.slots,
            request_pool,
            "Bank loader initialized"
        );
        Ok(BankLoader {
            scheduler: SlotScheduler::new(catalog.clone(), options.slots, queue, completions_rx),
            catalog,
            ledger,
            shutdown,
            worker: Some(worker),
        })
    }

    /// Reads the host tables named by the config, opens the pak files and starts
    /// the loader.
    pub fn from_config(config: &LoaderConfig) -> Result<BankLoader, InitError> {
        let tables = HostTables::read(&config.lookup_file(), &config.pak_list_file())?;
        let paks = PakFiles::open(&tables.pak_paths(&config.sfx_dir()));
        BankLoader::post_initialize(&tables.lookup, Arc::new(paks), config.options())
    }

    /// Requests that `bank`, or only `sound` of it, be loaded into `slot`.
    ///
    /// At most one request per slot may be live, and no more than the request
    /// pool size in total; both are caller errors.
    pub fn submit(
        &mut self,
        slot: usize,
        bank: u16,
        sound: Option<u16>,
    ) -> Result<usize, SubmitError> {
        self.scheduler.submit(slot, bank, sound)
    }

    /// Moves submitted requests to the loading thread and publishes finished ones.
    pub fn service(&mut self) {
        self.scheduler.service();
    }

    /// Gets a slot.
    pub fn slot(&self, slot: usize) -> Option<&Slot> {
        self.scheduler.slots().get(slot)
    }

    /// Gets all slots.
    pub fn slots(&self) -> &[Slot] {
        self.scheduler.slots()
    }

    /// The number of requests submitted but not yet published.
    pub fn in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }

    /// The number of jobs waiting for the loading thread.
    pub fn pending_jobs(&self) -> usize {
        self.scheduler.pending_jobs()
    }

    /// Gets the bank catalog.
    pub fn catalog(&self) -> &BankCatalog {
        &self.catalog
    }

    /// Gets the buffer ledger.
    pub fn ledger(&self) -> &Arc<BufferLedger> {
        &self.ledger
    }

    /// Returns true once the loader has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.worker.is_none()
    }

    /// Stops the loading thread and releases every buffer the loader owns.
    /// Further submissions fail. Calling this twice is harmless.
    pub fn finalize(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        self.shutdown.store(true, Ordering::SeqCst);
        self.scheduler.close();
        if worker.join().is_err() {
            error!("Bank loading thread panicked");
        }

        let released = self.scheduler.release_all();
        info!(
            released,
            allocations = self.ledger.allocations(),
            releases = self.ledger.releases(),
            live = self.ledger.live(),
            "Bank loader finalized"
        );
    }
}

impl Drop for BankLoader {
    fn drop(&mut self) {
        self.finalize();
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use crate::format::{pak_name_record, BankSize, BANK_HEADER_SIZE};
    use crate::storage::{MemoryStorage, ReadRecord};
    use crate::testutil::{bank_image, data_byte, eventually, PakBuilder};

    use super::*;

    fn options(slots: usize, request_pool: usize) -> LoaderOptions {
        LoaderOptions {
            slots,
            request_pool,
            worker_priority: None,
        }
    }

    /// Storage with bank 0 (sounds at 0 and 100, 250 bytes) and bank 1 (three
    /// sounds, 64 bytes) in pak 0.
    fn two_banks() -> (Vec<LookupEntry>, Arc<MemoryStorage>) {
        let mut pak = PakBuilder::new();
        let lookup = vec![pak.add_bank(&[0, 100], 250), pak.add_bank(&[0, 16, 40], 64)];
        (lookup, Arc::new(MemoryStorage::new(vec![pak.finish()])))
    }

    fn wait_for_publish(loader: &mut BankLoader) {
        eventually(
            || {
                loader.service();
                loader.in_flight() == 0
            },
            "Requests were never published",
        );
    }

    #[test]
    fn test_scenario_reads() {
        let (lookup, storage) = two_banks();
        let mut loader = BankLoader::post_initialize(&lookup, storage.clone(), options(3, 4)).unwrap();
        storage.clear_reads();

        loader.submit(0, 0, None).unwrap();
        loader.submit(1, 0, Some(0)).unwrap();
        loader.submit(2, 0, Some(1)).unwrap();
        wait_for_publish(&mut loader);

        let data = BANK_HEADER_SIZE as u64;
        assert_eq!(
            vec![
                ReadRecord {
                    file: 0,
                    offset: data,
                    len: 250
                },
                ReadRecord {
                    file: 0,
                    offset: data,
                    len: 100
                },
                ReadRecord {
                    file: 0,
                    offset: data + 100,
                    len: 150
                },
            ],
            storage.reads()
        );

        let whole = loader.slot(0).unwrap();
        assert!(whole.is_ready());
        assert_eq!(2, whole.sound_count());
        assert_eq!(250, whole.buffer().unwrap().len());

        let second = loader.slot(2).unwrap();
        assert_eq!(SINGLE_SOUND, second.sound_count());
        assert_eq!(0, second.sounds()[1].offset);
        assert_eq!(150, second.sounds()[2].offset);
        assert_eq!(data_byte(0, 100), second.buffer().unwrap()[0]);
    }

    #[test]
    fn test_fifo_service_order() {
        let mut pak = PakBuilder::new();
        let lookup: Vec<LookupEntry> = (0..8u32).map(|i| pak.add_bank(&[0], 16 + i)).collect();
        let storage = Arc::new(MemoryStorage::new(vec![pak.finish()]));
        let mut loader = BankLoader::post_initialize(&lookup, storage.clone(), options(8, 8)).unwrap();
        storage.clear_reads();

        let order = [5u16, 2, 7, 0, 3];
        for (slot, bank) in order.iter().enumerate() {
            loader.submit(slot, *bank, None).unwrap();
        }
        wait_for_publish(&mut loader);

        let read_banks: Vec<usize> = storage
            .reads()
            .iter()
            .map(|read| read.len - 16)
            .collect();
        assert_eq!(
            order.iter().map(|bank| *bank as usize).collect::<Vec<usize>>(),
            read_banks
        );
    }

    #[test]
    fn test_buffer_lifecycle_per_slot() {
        let (lookup, storage) = two_banks();
        let mut loader = BankLoader::post_initialize(&lookup, storage, options(1, 2)).unwrap();
        let ledger = loader.ledger().clone();

        let cycles = 5u64;
        for cycle in 0..cycles {
            let sound = if cycle % 2 == 0 { None } else { Some(1) };
            loader.submit(0, (cycle % 2) as u16, sound).unwrap();
            wait_for_publish(&mut loader);
            assert!(loader.slot(0).unwrap().is_ready());
            assert_eq!(1, ledger.live());
            assert_eq!(cycle + 1, ledger.allocations());
            assert_eq!(cycle, ledger.releases());
        }

        loader.finalize();
        assert_eq!(cycles, ledger.allocations());
        assert_eq!(cycles, ledger.releases());
        assert_eq!(0, ledger.live_bytes());
    }

    #[test]
    fn test_zero_length_sound() {
        let mut pak = PakBuilder::new();
        let lookup = vec![pak.add_bank(&[0, 0, 10], 20)];
        let storage = Arc::new(MemoryStorage::new(vec![pak.finish()]));
        let mut loader = BankLoader::post_initialize(&lookup, storage.clone(), options(1, 1)).unwrap();
        storage.clear_reads();

        loader.submit(0, 0, Some(0)).unwrap();
        wait_for_publish(&mut loader);

        let slot = loader.slot(0).unwrap();
        assert!(slot.is_ready());
        assert_eq!(0, slot.buffer_size());
        assert!(storage.reads().is_empty());
    }

    #[test]
    fn test_read_failure_is_reported() {
        // Bank 1 claims more data than its pak holds.
        let mut pak = PakBuilder::new();
        let good = pak.add_bank(&[0], 32);
        let mut bad = pak.add_bank(&[0], 32);
        bad.raw_size = 4096;
        let storage = Arc::new(MemoryStorage::new(vec![pak.finish()]));
        let mut loader = BankLoader::post_initialize(&[good, bad], storage, options(2, 2)).unwrap();

        loader.submit(0, 0, None).unwrap();
        loader.submit(1, 1, None).unwrap();
        wait_for_publish(&mut loader);

        assert!(loader.slot(0).unwrap().is_ready());
        let failed = loader.slot(1).unwrap();
        assert_eq!(SlotState::Failed, failed.state());
        assert!(failed.buffer().is_none());
        assert!(matches!(
            failed.failure(),
            Some(LoadError::Read { bank: 1, .. })
        ));
        assert_eq!(1, loader.ledger().live());
    }

    #[test]
    fn test_finalize_with_requests_in_flight() {
        let (lookup, storage) = two_banks();
        let mut loader = BankLoader::post_initialize(&lookup, storage, options(4, 4)).unwrap();
        let ledger = loader.ledger().clone();

        // Fill two slots, then reload them along with two more without publishing.
        loader.submit(0, 0, None).unwrap();
        loader.submit(1, 1, None).unwrap();
        wait_for_publish(&mut loader);
        for slot in 0..4 {
            loader.submit(slot, 1, Some(2)).unwrap();
        }
        loader.service();
        assert_eq!(4, loader.in_flight());

        loader.finalize();
        assert!(loader.is_finalized());
        assert_eq!(0, ledger.live());
        assert_eq!(0, loader.pending_jobs());
        assert_eq!(0, loader.in_flight());
        assert_eq!(
            Err(SubmitError::Finalized),
            loader.submit(0, 0, None)
        );

        // Finalizing again is a no-op.
        loader.finalize();
        assert_eq!(ledger.allocations(), ledger.releases());
    }

    #[test]
    fn test_banks_across_paks() {
        let mut feet = PakBuilder::new();
        let mut genrl = PakBuilder::with_pak(1);
        let lookup = vec![
            feet.add_bank(&[0], 12),
            genrl.add_bank_with_data(&[0, 2], &[5, 5, 6, 6, 6]),
        ];
        let storage = Arc::new(MemoryStorage::new(vec![feet.finish(), genrl.finish()]));
        let mut loader = BankLoader::post_initialize(&lookup, storage.clone(), options(2, 2)).unwrap();
        storage.clear_reads();

        loader.submit(0, 1, Some(1)).unwrap();
        loader.submit(1, 0, None).unwrap();
        wait_for_publish(&mut loader);

        assert_eq!(1, storage.reads()[0].file);
        assert_eq!(0, storage.reads()[1].file);
        assert_eq!(Some(&[6u8, 6, 6][..]), loader.slot(0).unwrap().buffer());
        assert_eq!(12, loader.slot(1).unwrap().buffer_size());
    }

    #[test]
    fn test_catalog_failure_is_fatal() {
        let (mut lookup, storage) = two_banks();
        lookup.push(LookupEntry::new(1, 0, BankSize::Bytes(8)));
        assert!(matches!(
            BankLoader::post_initialize(&lookup, storage, options(1, 1)),
            Err(InitError::Catalog(CatalogError::HeaderRead { bank: 2, .. }))
        ));
    }

    #[test]
    fn test_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let sfx = dir.path().join("SFX");
        fs::create_dir(&sfx).unwrap();

        let mut pak = PakBuilder::new();
        let mut lookup = vec![pak.add_bank(&[0, 100], 250)];
        fs::write(sfx.join("GENRL"), pak.finish()).unwrap();
        fs::write(sfx.join("CUSTOM"), bank_image(&[0, 6], &[9u8; 10])).unwrap();
        lookup.push(LookupEntry::new(1, 0, BankSize::WholeFile));

        let lookup_bytes: Vec<u8> = lookup.iter().flat_map(|entry| entry.to_bytes()).collect();
        fs::write(dir.path().join("BankLkup.dat"), lookup_bytes).unwrap();
        let mut paks = pak_name_record("GENRL").to_vec();
        paks.extend_from_slice(&pak_name_record("CUSTOM"));
        fs::write(dir.path().join("PakFiles.dat"), paks).unwrap();

        let config_path = dir.path().join("bankloader.yaml");
        fs::write(
            &config_path,
            "sfx_dir: SFX\nlookup_file: BankLkup.dat\npak_list_file: PakFiles.dat\nslots: 2\nrequest_pool: 2\n",
        )
        .unwrap();

        let config = LoaderConfig::deserialize(&config_path).unwrap();
        let mut loader = BankLoader::from_config(&config).unwrap();
        assert_eq!(2, loader.catalog().len());
        assert_eq!(2, loader.slots().len());

        loader.submit(0, 1, None).unwrap();
        loader.submit(1, 1, Some(1)).unwrap();
        wait_for_publish(&mut loader);
        assert_eq!(10, loader.slot(0).unwrap().buffer_size());
        assert_eq!(4, loader.slot(1).unwrap().buffer_size());
        assert_eq!(Some(&[9u8; 4][..]), loader.slot(1).unwrap().buffer());
    }
}
