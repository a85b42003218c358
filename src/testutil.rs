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

use std::{
    thread,
    time::{Duration, SystemTime},
};

use crate::format::{BankHeader, BankSize, LookupEntry, SoundEntry};

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> bool,
{
    let start = SystemTime::now();
    let mut tick = Duration::from_millis(5);
    let timeout = Duration::from_secs(10);
    let max_tick = Duration::from_millis(100);

    loop {
        let elapsed = start.elapsed();
        if elapsed.is_err() {
            panic!("System time error");
        }
        let elapsed = elapsed.unwrap();

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }

        thread::sleep(tick);
        tick = std::cmp::min(tick * 2, max_tick);
    }
}

/// The byte stored at `position` of a bank's data region by the builders below,
/// so tests can check that the right bytes were loaded.
pub fn data_byte(bank_seed: u8, position: usize) -> u8 {
    (position % 251) as u8 ^ bank_seed
}

/// Builds a bank header followed by its data region.
pub fn bank_image(offsets: &[u32], data: &[u8]) -> Vec<u8> {
    let entries: Vec<SoundEntry> = offsets
        .iter()
        .map(|offset| SoundEntry {
            offset: *offset,
            loop_offset: -1,
            sample_rate: 22050,
            headroom: 0,
        })
        .collect();
    let mut image = BankHeader::new(&entries)
        .expect("too many sounds")
        .to_bytes();
    image.extend_from_slice(data);
    image
}

/// Assembles a pak image out of several banks and hands out their lookup entries.
pub struct PakBuilder {
    pak: u8,
    bytes: Vec<u8>,
    banks: u8,
}

impl PakBuilder {
    /// Creates a builder for pak 0.
    pub fn new() -> PakBuilder {
        PakBuilder::with_pak(0)
    }

    /// Creates a builder for the given pak index.
    pub fn with_pak(pak: u8) -> PakBuilder {
        PakBuilder {
            pak,
            bytes: Vec::new(),
            banks: 0,
        }
    }

    /// Appends a bank with the given sound offsets and data region size. The data
    /// is filled with `data_byte`, seeded by the bank's position in this pak.
    pub fn add_bank(&mut self, offsets: &[u32], size: u32) -> LookupEntry {
        let seed = self.banks;
        let data: Vec<u8> = (0..size as usize).map(|i| data_byte(seed, i)).collect();
        self.add_bank_with_data(offsets, &data)
    }

    /// Appends a bank with explicit data.
    pub fn add_bank_with_data(&mut self, offsets: &[u32], data: &[u8]) -> LookupEntry {
        let entry = LookupEntry::new(
            self.pak,
            self.bytes.len() as u32,
            BankSize::Bytes(data.len() as u32),
        );
        self.bytes.extend_from_slice(&bank_image(offsets, data));
        self.banks += 1;
        entry
    }

    /// Returns the finished pak image.
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}
