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
use parking_lot::Mutex;

use super::{Storage, StorageError};

/// A read served by a MemoryStorage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadRecord {
    pub file: usize,
    pub offset: u64,
    pub len: usize,
}

/// In-memory pak images. Every read is recorded so callers can inspect what was
/// requested and in which order.
pub struct MemoryStorage {
    files: Vec<Option<Vec<u8>>>,
    reads: Mutex<Vec<ReadRecord>>,
}

impl MemoryStorage {
    /// Creates storage over the given file images.
    pub fn new(files: Vec<Vec<u8>>) -> MemoryStorage {
        MemoryStorage {
            files: files.into_iter().map(Some).collect(),
            reads: Mutex::new(Vec::new()),
        }
    }

    /// Creates storage where some files are unavailable, as if they failed to open.
    pub fn with_unavailable(files: Vec<Option<Vec<u8>>>) -> MemoryStorage {
        MemoryStorage {
            files,
            reads: Mutex::new(Vec::new()),
        }
    }

    /// Returns all reads served so far.
    pub fn reads(&self) -> Vec<ReadRecord> {
        self.reads.lock().clone()
    }

    /// Forgets the recorded reads.
    pub fn clear_reads(&self) {
        self.reads.lock().clear();
    }

    fn image(&self, file: usize) -> Result<&[u8], StorageError> {
        self.files
            .get(file)
            .ok_or(StorageError::UnknownFile(file))?
            .as_deref()
            .ok_or(StorageError::Unavailable { file })
    }
}

impl Storage for MemoryStorage {
    fn file_count(&self) -> usize {
        self.files.len()
    }

    fn file_len(&self, file: usize) -> Result<u64, StorageError> {
        Ok(self.image(file)?.len() as u64)
    }

    fn read_at(&self, file: usize, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        let image = self.image(file)?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let data = start
            .checked_add(buf.len())
            .and_then(|end| image.get(start..end))
            .ok_or_else(|| StorageError::Io {
                file,
                offset,
                len: buf.len(),
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ),
            })?;
        buf.copy_from_slice(data);

        self.reads.lock().push(ReadRecord {
            file,
            offset,
            len: buf.len(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_memory_reads_are_recorded() {
        let storage = MemoryStorage::new(vec![vec![1, 2, 3, 4, 5]]);
        let mut buf = [0u8; 2];
        storage.read_at(0, 3, &mut buf).unwrap();
        assert_eq!([4, 5], buf);
        assert!(storage.read_at(0, 4, &mut buf).is_err());
        assert_eq!(
            vec![ReadRecord {
                file: 0,
                offset: 3,
                len: 2
            }],
            storage.reads()
        );
    }

    #[test]
    fn test_memory_unavailable() {
        let storage = MemoryStorage::with_unavailable(vec![None]);
        assert!(matches!(
            storage.file_len(0),
            Err(StorageError::Unavailable { file: 0 })
        ));
    }
}
