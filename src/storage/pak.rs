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
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::{Storage, StorageError};

/// A pak file on disk. Files that failed to open stay in the list so file ids
/// keep matching the host's pak indices.
struct Pak {
    path: PathBuf,
    file: Option<File>,
}

/// Pak files opened for positional reads.
pub struct PakFiles {
    paks: Vec<Pak>,
}

impl PakFiles {
    /// Opens every path for reading. A file that can't be opened is logged and
    /// left unavailable; only banks stored in it are affected.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> PakFiles {
        let paks: Vec<Pak> = paths
            .iter()
            .map(|path| {
                let path = path.as_ref().to_path_buf();
                let file = match File::open(&path) {
                    Ok(file) => Some(file),
                    Err(e) => {
                        warn!(path = ?path, error = %e, "Unable to open pak file");
                        None
                    }
                };
                Pak { path, file }
            })
            .collect();

        info!(
            paks = paks.len(),
            unavailable = paks.iter().filter(|pak| pak.file.is_none()).count(),
            "Opened pak files"
        );
        PakFiles { paks }
    }

    /// Gets the paths of pak files that failed to open.
    pub fn missing(&self) -> Vec<&Path> {
        self.paks
            .iter()
            .filter(|pak| pak.file.is_none())
            .map(|pak| pak.path.as_path())
            .collect()
    }

    /// Gets the path of the given pak file.
    pub fn path(&self, file: usize) -> Option<&Path> {
        self.paks.get(file).map(|pak| pak.path.as_path())
    }

    fn file(&self, file: usize) -> Result<&File, StorageError> {
        self.paks
            .get(file)
            .ok_or(StorageError::UnknownFile(file))?
            .file
            .as_ref()
            .ok_or(StorageError::Unavailable { file })
    }
}

impl Storage for PakFiles {
    fn file_count(&self) -> usize {
        self.paks.len()
    }

    fn file_len(&self, file: usize) -> Result<u64, StorageError> {
        self.file(file)?
            .metadata()
            .map(|metadata| metadata.len())
            .map_err(|source| StorageError::Io {
                file,
                offset: 0,
                len: 0,
                source,
            })
    }

    fn read_at(&self, file: usize, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        read_exact_at(self.file(file)?, buf, offset).map_err(|source| StorageError::Io {
            file,
            offset,
            len: buf.len(),
            source,
        })
    }
}

impl fmt::Debug for PakFiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PakFiles")
            .field("paks", &self.paks.len())
            .field("missing", &self.missing())
            .finish()
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
