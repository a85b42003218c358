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

//! On-disk layouts shared with the host: bank headers, the bank lookup table and
//! the pak name list. All values are little endian.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

/// Maximum number of sounds a bank header can describe.
pub const MAX_SOUNDS_PER_BANK: usize = 400;

/// Size in bytes of a single sound entry in a bank header.
pub const SOUND_ENTRY_SIZE: usize = 12;

/// Size in bytes of a bank header. Sound data starts right after it.
pub const BANK_HEADER_SIZE: usize = 4 + MAX_SOUNDS_PER_BANK * SOUND_ENTRY_SIZE;

/// Size in bytes of a lookup table entry.
pub const LOOKUP_ENTRY_SIZE: usize = 12;

/// Size in bytes of a pak name record.
pub const PAK_NAME_SIZE: usize = 52;

/// Lookup size meaning "everything after the header", used by single-file banks.
pub const WHOLE_FILE_SENTINEL: u32 = u32::MAX;

/// Error types for decoding host structures.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("{what} is truncated: expected {expected} bytes, found {found}")]
    Truncated {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("bank header declares {0} sounds, more than the maximum of {MAX_SOUNDS_PER_BANK}")]
    TooManySounds(u16),

    #[error("pak name at record {0} is not valid UTF-8")]
    InvalidPakName(usize),
}

/// A single sound entry from a bank header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SoundEntry {
    /// Offset of the sound relative to the bank's data region.
    pub offset: u32,
    /// Loop start offset, or negative when the sound doesn't loop.
    pub loop_offset: i32,
    /// Sample rate of the sound.
    pub sample_rate: u16,
    /// Headroom value used by the host mixer.
    pub headroom: i16,
}

/// The fixed-size header at the start of every bank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BankHeader {
    sound_count: u16,
    sounds: Box<[SoundEntry]>,
}

impl BankHeader {
    /// Creates a header from a sound table. The table is padded to the full
    /// header capacity.
    pub fn new(entries: &[SoundEntry]) -> Result<BankHeader, FormatError> {
        if entries.len() > MAX_SOUNDS_PER_BANK {
            return Err(FormatError::TooManySounds(
                u16::try_from(entries.len()).unwrap_or(u16::MAX),
            ));
        }
        let mut sounds = vec![SoundEntry::default(); MAX_SOUNDS_PER_BANK];
        sounds[..entries.len()].copy_from_slice(entries);
        Ok(BankHeader {
            sound_count: entries.len() as u16,
            sounds: sounds.into_boxed_slice(),
        })
    }

    /// Decodes a header from exactly `BANK_HEADER_SIZE` bytes (extra bytes are ignored).
    pub fn parse(bytes: &[u8]) -> Result<BankHeader, FormatError> {
        if bytes.len() < BANK_HEADER_SIZE {
            return Err(FormatError::Truncated {
                what: "bank header",
                expected: BANK_HEADER_SIZE,
                found: bytes.len(),
            });
        }

        let mut cursor = Cursor::new(bytes);
        let sound_count = cursor.read_u16::<LittleEndian>().map_err(|_| truncated(bytes))?;
        let _padding = cursor.read_u16::<LittleEndian>().map_err(|_| truncated(bytes))?;
        if sound_count as usize > MAX_SOUNDS_PER_BANK {
            return Err(FormatError::TooManySounds(sound_count));
        }

        let mut sounds = Vec::with_capacity(MAX_SOUNDS_PER_BANK);
        for _ in 0..MAX_SOUNDS_PER_BANK {
            sounds.push(read_sound_entry(&mut cursor).map_err(|_| truncated(bytes))?);
        }

        Ok(BankHeader {
            sound_count,
            sounds: sounds.into_boxed_slice(),
        })
    }

    /// Encodes the header back into its on-disk form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(BANK_HEADER_SIZE);
        bytes.extend_from_slice(&self.sound_count.to_le_bytes());
        bytes.extend_from_slice(&[0, 0]);
        for sound in self.sounds.iter() {
            bytes.extend_from_slice(&sound.offset.to_le_bytes());
            bytes.extend_from_slice(&sound.loop_offset.to_le_bytes());
            bytes.extend_from_slice(&sound.sample_rate.to_le_bytes());
            bytes.extend_from_slice(&sound.headroom.to_le_bytes());
        }
        bytes
    }

    /// Gets the number of sounds in the bank.
    pub fn sound_count(&self) -> u16 {
        self.sound_count
    }

    /// Gets the full sound table, `MAX_SOUNDS_PER_BANK` entries long.
    pub fn sounds(&self) -> &[SoundEntry] {
        &self.sounds
    }
}

fn truncated(bytes: &[u8]) -> FormatError {
    FormatError::Truncated {
        what: "bank header",
        expected: BANK_HEADER_SIZE,
        found: bytes.len(),
    }
}

fn read_sound_entry<R: Read>(reader: &mut R) -> std::io::Result<SoundEntry> {
    Ok(SoundEntry {
        offset: reader.read_u32::<LittleEndian>()?,
        loop_offset: reader.read_i32::<LittleEndian>()?,
        sample_rate: reader.read_u16::<LittleEndian>()?,
        headroom: reader.read_i16::<LittleEndian>()?,
    })
}

/// The size of a bank's data region as recorded in the lookup table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BankSize {
    /// The region is exactly this many bytes.
    Bytes(u32),
    /// The region extends to the end of the pak file.
    WholeFile,
}

/// Where a bank lives: which pak, at which offset, and how large it is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LookupEntry {
    /// Index of the pak file holding the bank.
    pub pak: u8,
    /// Offset of the bank header within the pak.
    pub offset: u32,
    /// Raw size field; `WHOLE_FILE_SENTINEL` for single-file banks.
    pub raw_size: u32,
}

impl LookupEntry {
    /// Creates a lookup entry.
    pub fn new(pak: u8, offset: u32, size: BankSize) -> LookupEntry {
        LookupEntry {
            pak,
            offset,
            raw_size: match size {
                BankSize::Bytes(size) => size,
                BankSize::WholeFile => WHOLE_FILE_SENTINEL,
            },
        }
    }

    /// Gets the interpreted size of the bank.
    pub fn size(&self) -> BankSize {
        if self.raw_size == WHOLE_FILE_SENTINEL {
            BankSize::WholeFile
        } else {
            BankSize::Bytes(self.raw_size)
        }
    }

    /// Decodes a whole lookup table. The bank id of each entry is its index.
    pub fn parse_table(bytes: &[u8]) -> Result<Vec<LookupEntry>, FormatError> {
        if bytes.len() % LOOKUP_ENTRY_SIZE != 0 {
            return Err(FormatError::Truncated {
                what: "bank lookup table",
                expected: (bytes.len() / LOOKUP_ENTRY_SIZE + 1) * LOOKUP_ENTRY_SIZE,
                found: bytes.len(),
            });
        }

        bytes
            .chunks_exact(LOOKUP_ENTRY_SIZE)
            .map(|chunk| {
                let mut cursor = Cursor::new(chunk);
                let read = |cursor: &mut Cursor<&[u8]>| -> std::io::Result<LookupEntry> {
                    let pak = cursor.read_u8()?;
                    let mut padding = [0u8; 3];
                    cursor.read_exact(&mut padding)?;
                    Ok(LookupEntry {
                        pak,
                        offset: cursor.read_u32::<LittleEndian>()?,
                        raw_size: cursor.read_u32::<LittleEndian>()?,
                    })
                };
                read(&mut cursor).map_err(|_| FormatError::Truncated {
                    what: "bank lookup entry",
                    expected: LOOKUP_ENTRY_SIZE,
                    found: chunk.len(),
                })
            })
            .collect()
    }

    /// Encodes the entry into its on-disk form.
    pub fn to_bytes(&self) -> [u8; LOOKUP_ENTRY_SIZE] {
        let mut bytes = [0u8; LOOKUP_ENTRY_SIZE];
        bytes[0] = self.pak;
        bytes[4..8].copy_from_slice(&self.offset.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.raw_size.to_le_bytes());
        bytes
    }
}

/// Decodes the pak name list. Trailing empty records are ignored.
pub fn parse_pak_names(bytes: &[u8]) -> Result<Vec<String>, FormatError> {
    if bytes.len() % PAK_NAME_SIZE != 0 {
        return Err(FormatError::Truncated {
            what: "pak name list",
            expected: (bytes.len() / PAK_NAME_SIZE + 1) * PAK_NAME_SIZE,
            found: bytes.len(),
        });
    }

    let mut names = bytes
        .chunks_exact(PAK_NAME_SIZE)
        .enumerate()
        .map(|(i, record)| {
            let end = record.iter().position(|b| *b == 0).unwrap_or(record.len());
            std::str::from_utf8(&record[..end])
                .map(str::to_string)
                .map_err(|_| FormatError::InvalidPakName(i))
        })
        .collect::<Result<Vec<String>, FormatError>>()?;

    while names.last().is_some_and(|name| name.is_empty()) {
        names.pop();
    }
    Ok(names)
}

/// Encodes a pak name into its fixed-size record, truncating long names.
pub fn pak_name_record(name: &str) -> [u8; PAK_NAME_SIZE] {
    let mut record = [0u8; PAK_NAME_SIZE];
    let len = name.len().min(PAK_NAME_SIZE - 1);
    record[..len].copy_from_slice(&name.as_bytes()[..len]);
    record
}
