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

//! Bank catalog built from the host's lookup table.
//!
//! Every bank header is read once at startup so that later loads never have to
//! peek into a pak file to find where a sound lives.

use std::fmt;

use tracing::{debug, info};

use crate::format::{BankHeader, BankSize, FormatError, LookupEntry, SoundEntry, BANK_HEADER_SIZE};
use crate::storage::{Storage, StorageError};

/// Error types for catalog construction. Any of these makes the catalog unusable.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unable to read header of bank {bank}: {source}")]
    HeaderRead {
        bank: u16,
        #[source]
        source: StorageError,
    },

    #[error("invalid header for bank {bank}: {source}")]
    HeaderFormat {
        bank: u16,
        #[source]
        source: FormatError,
    },

    #[error("bank {bank} lies beyond the end of pak file {file}")]
    BankOutOfRange { bank: u16, file: usize },

    #[error("sound {sound} of bank {bank} starts at {offset}, before the previous sound")]
    DecreasingOffset { bank: u16, sound: u16, offset: u32 },

    #[error("sound {sound} of bank {bank} starts at {offset}, past the {size} byte region")]
    OffsetOutOfRange {
        bank: u16,
        sound: u16,
        offset: u32,
        size: u64,
    },

    #[error("lookup table has {0} entries, more than a bank id can address")]
    TooManyBanks(usize),
}

/// Cached information about a single bank.
#[derive(Clone)]
pub struct BankInfo {
    id: u16,
    file_id: usize,
    header_offset: u64,
    size: u64,
    header: BankHeader,
}

impl BankInfo {
    /// Gets the bank id.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Gets the pak file holding the bank.
    pub fn file_id(&self) -> usize {
        self.file_id
    }

    /// Gets the offset of the bank header within its pak.
    pub fn header_offset(&self) -> u64 {
        self.header_offset
    }

    /// Gets the number of sounds in the bank.
    pub fn sound_count(&self) -> u16 {
        self.header.sound_count()
    }

    /// Gets the absolute offset of the bank's sound data within its pak.
    pub fn data_region_offset(&self) -> u64 {
        self.header_offset + BANK_HEADER_SIZE as u64
    }

    /// Gets the offset of a sound relative to the data region.
    ///
    /// The sound index must be within the header's table; callers validate it
    /// against `sound_count` before loading.
    pub fn sound_offset(&self, sound: u16) -> u64 {
        self.header.sounds()[sound as usize].offset as u64
    }

    /// Gets the number of bytes to load: the whole data region when no sound is
    /// given, otherwise the distance to the next sound, or to the end of the region
    /// for the last sound.
    pub fn region_size(&self, sound: Option<u16>) -> u64 {
        let Some(sound) = sound else {
            return self.size;
        };

        let offset = self.sound_offset(sound);
        if sound as u32 + 1 >= self.sound_count() as u32 {
            self.size.saturating_sub(offset)
        } else {
            self.sound_offset(sound + 1).saturating_sub(offset)
        }
    }

    /// Gets the bank's full sound table.
    pub fn sounds(&self) -> &[SoundEntry] {
        self.header.sounds()
    }
}

impl fmt::Debug for BankInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BankInfo")
            .field("id", &self.id)
            .field("file_id", &self.file_id)
            .field("header_offset", &self.header_offset)
            .field("size", &self.size)
            .field("sound_count", &self.sound_count())
            .finish()
    }
}

/// Read-only table of every bank, indexed by bank id.
#[derive(Debug)]
pub struct BankCatalog {
    banks: Vec<BankInfo>,
}

impl BankCatalog {
    /// Reads the header of every bank named in the lookup table.
    pub fn build(lookup: &[LookupEntry], storage: &dyn Storage) -> Result<BankCatalog, CatalogError> {
        if lookup.len() > u16::MAX as usize {
            return Err(CatalogError::TooManyBanks(lookup.len()));
        }

        let mut banks = Vec::with_capacity(lookup.len());
        let mut header_bytes = vec![0u8; BANK_HEADER_SIZE];
        for (id, entry) in lookup.iter().enumerate() {
            let id = id as u16;
            let file_id = entry.pak as usize;
            let header_offset = entry.offset as u64;

            storage
                .read_at(file_id, header_offset, &mut header_bytes)
                .map_err(|source| CatalogError::HeaderRead { bank: id, source })?;
            let header = BankHeader::parse(&header_bytes)
                .map_err(|source| CatalogError::HeaderFormat { bank: id, source })?;

            let size = match entry.size() {
                BankSize::Bytes(size) => size as u64,
                BankSize::WholeFile => {
                    let len = storage
                        .file_len(file_id)
                        .map_err(|source| CatalogError::HeaderRead { bank: id, source })?;
                    len.checked_sub(header_offset + BANK_HEADER_SIZE as u64)
                        .ok_or(CatalogError::BankOutOfRange {
                            bank: id,
                            file: file_id,
                        })?
                }
            };

            check_sound_table(id, &header, size)?;

            debug!(
                bank = id,
                file = file_id,
                offset = header_offset,
                size,
                sounds = header.sound_count(),
                "Cached bank header"
            );
            banks.push(BankInfo {
                id,
                file_id,
                header_offset,
                size,
                header,
            });
        }

        info!(
            banks = banks.len(),
            total_kb = banks.iter().map(|bank| bank.size).sum::<u64>() / 1024,
            "Bank catalog built"
        );
        Ok(BankCatalog { banks })
    }

    /// Gets the bank with the given id.
    pub fn bank(&self, id: u16) -> Option<&BankInfo> {
        self.banks.get(id as usize)
    }

    /// Gets all banks in id order.
    pub fn banks(&self) -> &[BankInfo] {
        &self.banks
    }

    /// Gets the number of banks.
    pub fn len(&self) -> usize {
        self.banks.len()
    }

    /// Returns true if the catalog holds no banks.
    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }
}

/// Checks that sound offsets never decrease and stay within the data region, so
/// every sound resolves to a region inside the bank.
fn check_sound_table(bank: u16, header: &BankHeader, size: u64) -> Result<(), CatalogError> {
    let count = header.sound_count() as usize;
    let mut previous = 0u32;
    for (sound, entry) in header.sounds()[..count].iter().enumerate() {
        let sound = sound as u16;
        if entry.offset < previous {
            return Err(CatalogError::DecreasingOffset {
                bank,
                sound,
                offset: entry.offset,
            });
        }
        if entry.offset as u64 > size {
            return Err(CatalogError::OffsetOutOfRange {
                bank,
                sound,
                offset: entry.offset,
                size,
            });
        }
        previous = entry.offset;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use crate::format::WHOLE_FILE_SENTINEL;
    use crate::storage::MemoryStorage;
    use crate::testutil::{bank_image, PakBuilder};

    use super::*;

    #[test]
    fn test_two_sound_bank() {
        let mut pak = PakBuilder::new();
        let entry = pak.add_bank(&[0, 100], 250);
        let storage = MemoryStorage::new(vec![pak.finish()]);

        let catalog = BankCatalog::build(&[entry], &storage).unwrap();
        let bank = catalog.bank(0).unwrap();

        assert_eq!(2, bank.sound_count());
        assert_eq!(BANK_HEADER_SIZE as u64, bank.data_region_offset());
        assert_eq!(250, bank.region_size(None));
        assert_eq!(0, bank.sound_offset(0));
        assert_eq!(100, bank.region_size(Some(0)));
        assert_eq!(100, bank.sound_offset(1));
        assert_eq!(150, bank.region_size(Some(1)));
    }

    #[test]
    fn test_region_sizes_cover_bank() {
        let offsets = [0u32, 17, 17, 400, 1024, 1500];
        let whole = 2000;
        let mut pak = PakBuilder::new();
        let first = pak.add_bank(&[0], 10);
        let entry = pak.add_bank(&offsets, whole);
        let storage = MemoryStorage::new(vec![pak.finish()]);

        let catalog = BankCatalog::build(&[first, entry], &storage).unwrap();
        let bank = catalog.bank(1).unwrap();
        let count = bank.sound_count();
        assert_eq!(offsets.len() as u16, count);

        for sound in 0..count - 1 {
            assert_eq!(
                bank.sound_offset(sound + 1) - bank.sound_offset(sound),
                bank.region_size(Some(sound)),
                "sound {sound}"
            );
        }
        assert_eq!(
            whole as u64 - bank.sound_offset(count - 1),
            bank.region_size(Some(count - 1))
        );
        assert_eq!(
            whole as u64,
            (0..count).map(|s| bank.region_size(Some(s))).sum::<u64>()
        );
        assert_eq!(whole as u64, bank.region_size(None));
    }

    #[test]
    fn test_whole_file_bank() {
        let image = bank_image(&[0, 8], &[7u8; 20]);
        let storage = MemoryStorage::new(vec![image]);
        let entry = LookupEntry {
            pak: 0,
            offset: 0,
            raw_size: WHOLE_FILE_SENTINEL,
        };

        let catalog = BankCatalog::build(&[entry], &storage).unwrap();
        let bank = catalog.bank(0).unwrap();
        assert_eq!(20, bank.region_size(None));
        assert_eq!(12, bank.region_size(Some(1)));
    }

    #[test]
    fn test_unreadable_header_fails_build() {
        let mut pak = PakBuilder::new();
        let good = pak.add_bank(&[0], 16);
        let storage = MemoryStorage::with_unavailable(vec![Some(pak.finish()), None]);
        let bad = LookupEntry::new(1, 0, BankSize::Bytes(16));

        assert!(matches!(
            BankCatalog::build(&[good, bad], &storage),
            Err(CatalogError::HeaderRead { bank: 1, .. })
        ));
    }

    #[test]
    fn test_truncated_header_fails_build() {
        let storage = MemoryStorage::new(vec![vec![0u8; 100]]);
        let entry = LookupEntry::new(0, 0, BankSize::Bytes(16));
        assert!(BankCatalog::build(&[entry], &storage).is_err());
    }

    #[test]
    fn test_decreasing_offsets_fail_build() {
        let mut pak = PakBuilder::new();
        let entry = pak.add_bank(&[0, 300, 100], 250);
        let storage = MemoryStorage::new(vec![pak.finish()]);
        assert!(matches!(
            BankCatalog::build(&[entry], &storage),
            Err(CatalogError::OffsetOutOfRange {
                bank: 0,
                sound: 1,
                offset: 300,
                size: 250
            })
        ));

        let mut pak = PakBuilder::new();
        let entry = pak.add_bank(&[0, 120, 100], 250);
        let storage = MemoryStorage::new(vec![pak.finish()]);
        assert!(matches!(
            BankCatalog::build(&[entry], &storage),
            Err(CatalogError::DecreasingOffset {
                bank: 0,
                sound: 2,
                offset: 100
            })
        ));
    }

    #[test]
    fn test_last_offset_past_region_fails_build() {
        let mut pak = PakBuilder::new();
        let good = pak.add_bank(&[0, 250], 250);
        let bad = pak.add_bank(&[0, 10, 251], 250);
        let storage = MemoryStorage::new(vec![pak.finish()]);
        assert!(matches!(
            BankCatalog::build(&[good, bad], &storage),
            Err(CatalogError::OffsetOutOfRange {
                bank: 1,
                sound: 2,
                ..
            })
        ));
    }
}
