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
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counts every sound buffer allocation and release.
#[derive(Default)]
pub struct BufferLedger {
    allocations: AtomicU64,
    releases: AtomicU64,
    live: AtomicU64,
    live_bytes: AtomicU64,
}

impl BufferLedger {
    /// Creates an empty ledger.
    pub fn new() -> Arc<BufferLedger> {
        Arc::new(BufferLedger::default())
    }

    /// Total buffers allocated.
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::SeqCst)
    }

    /// Total buffers released.
    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }

    /// Buffers currently alive.
    pub fn live(&self) -> u64 {
        self.live.load(Ordering::SeqCst)
    }

    /// Bytes held by live buffers.
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for BufferLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferLedger")
            .field("allocations", &self.allocations())
            .field("releases", &self.releases())
            .field("live_kb", &(self.live_bytes() / 1024))
            .finish()
    }
}

/// An exactly-sized buffer holding loaded sound data.
///
/// A buffer has a single owner at any time: a slot, an in-flight load, or a
/// finished request waiting to be published. It is released when dropped.
pub struct SoundBuffer {
    data: Box<[u8]>,
    ledger: Arc<BufferLedger>,
}

impl SoundBuffer {
    /// Allocates a zeroed buffer of `size` bytes.
    pub fn allocate(size: usize, ledger: &Arc<BufferLedger>) -> SoundBuffer {
        ledger.allocations.fetch_add(1, Ordering::SeqCst);
        ledger.live.fetch_add(1, Ordering::SeqCst);
        ledger.live_bytes.fetch_add(size as u64, Ordering::SeqCst);
        SoundBuffer {
            data: vec![0u8; size].into_boxed_slice(),
            ledger: ledger.clone(),
        }
    }
}

impl Deref for SoundBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for SoundBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for SoundBuffer {
    fn drop(&mut self) {
        // Decrement before counting the release so `live` never exceeds
        // `allocations - releases`.
        self.ledger.live.fetch_sub(1, Ordering::SeqCst);
        self.ledger.releases.fetch_add(1, Ordering::SeqCst);
        self.ledger
            .live_bytes
            .fetch_sub(self.data.len() as u64, Ordering::SeqCst);
    }
}

impl fmt::Debug for SoundBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundBuffer")
            .field("len", &self.data.len())
            .finish()
    }
}
