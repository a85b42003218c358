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

use crate::format::{SoundEntry, MAX_SOUNDS_PER_BANK};

use super::buffer::SoundBuffer;
use super::request::{LoadError, LoadedBank};

/// Sound count reported by a slot that holds a single sound.
pub const SINGLE_SOUND: u16 = 0xFFFF;

/// The state of a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing has been loaded.
    Empty,
    /// A load is in flight; the slot has no buffer and no metadata.
    Loading,
    /// The slot holds a fully loaded bank or sound.
    Ready,
    /// The last load failed; the slot has no buffer.
    Failed,
}

/// A consumer-visible unit of loaded audio.
pub struct Slot {
    state: SlotState,
    buffer: Option<SoundBuffer>,
    buffer_size: u64,
    sound_count: u16,
    sounds: Box<[SoundEntry]>,
    bank: Option<u16>,
    sound: Option<u16>,
    failure: Option<LoadError>,
}

impl Slot {
    pub(crate) fn new() -> Slot {
        Slot {
            state: SlotState::Empty,
            buffer: None,
            buffer_size: 0,
            sound_count: 0,
            sounds: vec![SoundEntry::default(); MAX_SOUNDS_PER_BANK].into_boxed_slice(),
            bank: None,
            sound: None,
            failure: None,
        }
    }

    /// Gets the slot state.
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Returns true if the slot holds loaded data.
    pub fn is_ready(&self) -> bool {
        self.state == SlotState::Ready
    }

    /// Gets the loaded data, if the slot is ready.
    pub fn buffer(&self) -> Option<&[u8]> {
        match self.state {
            SlotState::Ready => self.buffer.as_deref(),
            _ => None,
        }
    }

    /// Gets the size of the loaded data.
    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    /// Gets the number of resident sounds, or `SINGLE_SOUND` for a single-sound load.
    pub fn sound_count(&self) -> u16 {
        self.sound_count
    }

    /// Gets the per-sound table. Offsets are relative to the slot's buffer.
    pub fn sounds(&self) -> &[SoundEntry] {
        &self.sounds
    }

    /// Gets the resident bank.
    pub fn bank(&self) -> Option<u16> {
        self.bank
    }

    /// Gets the resident sound, None for a whole bank.
    pub fn sound(&self) -> Option<u16> {
        self.sound
    }

    /// Gets the error of the last load if it failed.
    pub fn failure(&self) -> Option<&LoadError> {
        self.failure.as_ref()
    }

    /// Marks the slot as about to be overwritten and hands back its buffer.
    pub(crate) fn begin_load(&mut self) -> Option<SoundBuffer> {
        self.state = SlotState::Loading;
        self.sounds.fill(SoundEntry::default());
        self.buffer_size = 0;
        self.sound_count = 0;
        self.bank = None;
        self.sound = None;
        self.failure = None;
        self.buffer.take()
    }

    /// Adopts a finished load. `table` is the bank's sound table.
    pub(crate) fn publish(&mut self, loaded: LoadedBank, table: &[SoundEntry], sound_count: u16) {
        let len = table.len().min(self.sounds.len());
        self.sounds[..len].copy_from_slice(&table[..len]);
        self.sounds[len..].fill(SoundEntry::default());
        self.buffer_size = loaded.buffer.len() as u64;

        match loaded.sound {
            Some(sound) => {
                // The buffer starts at this sound and ends where the next one
                // would begin.
                let sound = sound as usize;
                self.sounds[sound].offset = 0;
                // Wraps at the table size, not the bank's sound count: with a
                // one-sound bank the end marker would land on the start marker.
                // Regions over u32::MAX never get here; the loading thread fails them.
                self.sounds[(sound + 1) % MAX_SOUNDS_PER_BANK].offset =
                    u32::try_from(self.buffer_size).unwrap_or(u32::MAX);
                self.sound_count = SINGLE_SOUND;
            }
            None => self.sound_count = sound_count,
        }

        self.bank = Some(loaded.bank);
        self.sound = loaded.sound;
        self.buffer = Some(loaded.buffer);
        self.state = SlotState::Ready;
    }

    /// Records a failed load. The slot stays without data.
    pub(crate) fn fail(&mut self, error: LoadError) {
        self.state = SlotState::Failed;
        self.failure = Some(error);
    }

    /// Takes the buffer out for teardown.
    pub(crate) fn release(&mut self) -> Option<SoundBuffer> {
        self.state = SlotState::Empty;
        self.buffer_size = 0;
        self.buffer.take()
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("state", &self.state)
            .field("bank", &self.bank)
            .field("sound", &self.sound)
            .field("buffer_size", &self.buffer_size)
            .field("sound_count", &self.sound_count)
            .finish()
    }
}
