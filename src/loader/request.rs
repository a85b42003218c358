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
use crate::storage::StorageError;

use super::buffer::SoundBuffer;
use super::queue::QueueError;

/// Error types for a single load. These fail the request, never the loader.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("bank {0} is not in the catalog")]
    UnknownBank(u16),

    #[error("bank {bank} region of {size} bytes can't be allocated")]
    RegionTooLarge { bank: u16, size: u64 },

    #[error("failed to read bank {bank}: {source}")]
    Read {
        bank: u16,
        sound: Option<u16>,
        #[source]
        source: StorageError,
    },

    #[error("unable to queue request: {0}")]
    Queue(#[from] QueueError),
}

/// Error types for submissions. These are caller contract violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("slot {slot} does not exist ({slots} slots)")]
    InvalidSlot { slot: usize, slots: usize },

    #[error("bank {0} is not in the catalog")]
    UnknownBank(u16),

    #[error("sound {sound} is out of range for bank {bank} ({count} sounds)")]
    InvalidSound { bank: u16, sound: u16, count: u16 },

    #[error("slot {0} already has a request in flight")]
    SlotBusy(usize),

    #[error("all {capacity} request records are in use")]
    CapacityExceeded { capacity: usize },

    #[error("the bank loader has been finalized")]
    Finalized,
}

/// Freshly loaded data on its way from the loading thread to a slot.
#[derive(Debug)]
pub struct LoadedBank {
    pub bank: u16,
    pub sound: Option<u16>,
    pub buffer: SoundBuffer,
}

/// Where a request is in its cycle. Only `Done` holds a buffer, so nothing can
/// read one before the load has finished.
#[derive(Debug, Default)]
pub enum RequestStatus {
    #[default]
    Idle,
    Submitted,
    InProgress,
    Done(LoadedBank),
    Failed(LoadError),
}

impl RequestStatus {
    /// Returns true for every status except `Idle`.
    pub fn is_live(&self) -> bool {
        !matches!(self, RequestStatus::Idle)
    }
}

/// A reusable request record: load `bank` (or one `sound` of it) into `slot`.
#[derive(Debug, Default)]
pub struct Request {
    pub slot: usize,
    pub bank: u16,
    pub sound: Option<u16>,
    pub status: RequestStatus,
}

/// A unit of work for the loading thread. It carries the slot's previous
/// buffer, which the loading thread releases before allocating the new one.
#[derive(Debug)]
pub struct LoadJob {
    pub index: usize,
    pub bank: u16,
    pub sound: Option<u16>,
    pub previous: Option<SoundBuffer>,
}

/// The loading thread's report for a request.
#[derive(Debug)]
pub struct Completion {
    pub index: usize,
    pub result: Result<LoadedBank, LoadError>,
}
