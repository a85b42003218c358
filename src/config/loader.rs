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
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::loader::{LoaderOptions, DEFAULT_REQUEST_POOL, DEFAULT_SLOTS};

use super::error::ConfigError;

/// The highest crossplatform thread priority.
const MAX_PRIORITY: u8 = 99;

/// The configuration for the bank loader.
#[derive(Debug, Deserialize)]
pub struct LoaderConfig {
    /// The directory holding the pak files.
    sfx_dir: PathBuf,
    /// The bank lookup table.
    lookup_file: PathBuf,
    /// The list of pak file names.
    pak_list_file: PathBuf,
    /// The number of slots.
    #[serde(default = "default_slots")]
    slots: usize,
    /// The number of request records.
    #[serde(default = "default_request_pool")]
    request_pool: usize,
    /// The priority of the loading thread.
    #[serde(default)]
    worker_priority: Option<u8>,

    /// Relative paths are resolved against this directory.
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_slots() -> usize {
    DEFAULT_SLOTS
}

fn default_request_pool() -> usize {
    DEFAULT_REQUEST_POOL
}

impl LoaderConfig {
    /// Parse a loader configuration from a file. Values may be overridden with
    /// BANKLOADER_* environment variables.
    pub fn deserialize(path: &Path) -> Result<LoaderConfig, ConfigError> {
        let mut config = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("BANKLOADER").try_parsing(true))
            .build()?
            .try_deserialize::<LoaderConfig>()?;

        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.slots == 0 {
            return Err(ConfigError::Invalid("slots must be at least 1".into()));
        }
        if self.request_pool == 0 {
            return Err(ConfigError::Invalid(
                "request_pool must be at least 1".into(),
            ));
        }
        if let Some(priority) = self.worker_priority {
            if priority > MAX_PRIORITY {
                return Err(ConfigError::Invalid(format!(
                    "worker_priority {} is above {}",
                    priority, MAX_PRIORITY
                )));
            }
        }
        Ok(())
    }

    /// Gets the pak directory.
    pub fn sfx_dir(&self) -> PathBuf {
        self.base_dir.join(&self.sfx_dir)
    }

    /// Gets the bank lookup table path.
    pub fn lookup_file(&self) -> PathBuf {
        self.base_dir.join(&self.lookup_file)
    }

    /// Gets the pak name list path.
    pub fn pak_list_file(&self) -> PathBuf {
        self.base_dir.join(&self.pak_list_file)
    }

    /// Gets the sizing for the loader.
    pub fn options(&self) -> LoaderOptions {
        LoaderOptions {
            slots: self.slots,
            request_pool: self.request_pool,
            worker_priority: self.worker_priority,
        }
    }
}
