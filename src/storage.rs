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

//! Random-access backing stores for bank data.

mod memory;
mod pak;

pub use memory::{MemoryStorage, ReadRecord};
pub use pak::PakFiles;

/// Error types for storage reads.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("pak file {file} is unavailable")]
    Unavailable { file: usize },

    #[error("pak file {0} does not exist")]
    UnknownFile(usize),

    #[error("failed to read {len} bytes at offset {offset} of pak file {file}: {source}")]
    Io {
        file: usize,
        offset: u64,
        len: usize,
        #[source]
        source: std::io::Error,
    },
}

/// A fixed set of files that can be read at arbitrary offsets.
///
/// Reads carry their own offset, so implementations must not depend on a shared
/// cursor and must allow concurrent reads of the same file.
pub trait Storage: Send + Sync {
    /// The number of backing files.
    fn file_count(&self) -> usize;

    /// The length of the given file in bytes.
    fn file_len(&self, file: usize) -> Result<u64, StorageError>;

    /// Fills `buf` with the bytes at `offset` in the given file. A short read is an error.
    fn read_at(&self, file: usize, offset: u64, buf: &mut [u8]) -> Result<(), StorageError>;
}
