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

//! Streaming loader for custom sound banks.
//!
//! Banks live inside pak files and are described by a lookup table. The
//! [`loader::BankLoader`] loads whole banks or single sounds into slots on a
//! dedicated thread and publishes them to the owner once per service tick.

pub mod catalog;
pub mod config;
pub mod format;
pub mod loader;
pub mod storage;
#[cfg(test)]
mod testutil;

pub use catalog::{BankCatalog, BankInfo};
pub use loader::{BankLoader, LoaderOptions};
