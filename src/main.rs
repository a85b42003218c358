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
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bankloader::catalog::BankCatalog;
use bankloader::config::LoaderConfig;
use bankloader::loader::{BankLoader, HostTables, SlotState};
use bankloader::storage::{PakFiles, Storage};
use clap::{crate_version, Parser, Subcommand};

/// How often the load command services the loader.
const SERVICE_INTERVAL: Duration = Duration::from_millis(5);

/// How long the load command waits for a load to publish.
const LOAD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A streaming sound bank loader."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists every bank in the lookup table.
    Banks {
        /// The path to the loader config.
        config_path: String,
    },
    /// Lists the pak files and whether each could be opened.
    Paks {
        /// The path to the loader config.
        config_path: String,
    },
    /// Loads a bank, or a single sound of it, into a slot.
    Load {
        /// The path to the loader config.
        config_path: String,
        /// The bank to load.
        bank: u16,
        /// Load only this sound of the bank.
        #[arg[short, long]]
        sound: Option<u16>,
        /// The slot to load into.
        #[arg[short = 'k', long, default_value_t = 0]]
        slot: usize,
        /// Write the loaded data to this file.
        #[arg[short, long]]
        output: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Banks { config_path } => {
            let config = LoaderConfig::deserialize(&PathBuf::from(&config_path))?;
            let tables = HostTables::read(&config.lookup_file(), &config.pak_list_file())?;
            let paks = PakFiles::open(&tables.pak_paths(&config.sfx_dir()));
            let catalog = BankCatalog::build(&tables.lookup, &paks)?;

            if catalog.is_empty() {
                println!("No banks found.");
                return Ok(());
            }

            println!("Banks (count: {}):", catalog.len());
            for bank in catalog.banks() {
                println!(
                    "- {}: pak {}, header at {}, {} bytes, {} sounds",
                    bank.id(),
                    bank.file_id(),
                    bank.header_offset(),
                    bank.region_size(None),
                    bank.sound_count()
                );
            }
        }
        Commands::Paks { config_path } => {
            let config = LoaderConfig::deserialize(&PathBuf::from(&config_path))?;
            let tables = HostTables::read(&config.lookup_file(), &config.pak_list_file())?;
            let paks = PakFiles::open(&tables.pak_paths(&config.sfx_dir()));
            let missing = paks.missing();

            if paks.file_count() == 0 {
                println!("No paks found.");
                return Ok(());
            }

            println!("Paks (count: {}):", paks.file_count());
            for (i, path) in (0..paks.file_count()).filter_map(|i| Some((i, paks.path(i)?))) {
                let state = if missing.contains(&path) { "missing" } else { "ok" };
                println!("- {}: {} ({})", i, path.display(), state);
            }
        }
        Commands::Load {
            config_path,
            bank,
            sound,
            slot,
            output,
        } => {
            let config = LoaderConfig::deserialize(&PathBuf::from(&config_path))?;
            let mut loader = BankLoader::from_config(&config)?;
            loader.submit(slot, bank, sound)?;

            let started = Instant::now();
            loop {
                loader.service();
                if loader.in_flight() == 0 {
                    break;
                }
                if started.elapsed() > LOAD_TIMEOUT {
                    return Err(
                        format!("bank {} did not load within {:?}", bank, LOAD_TIMEOUT).into(),
                    );
                }
                thread::sleep(SERVICE_INTERVAL);
            }

            let loaded = loader.slot(slot).ok_or("slot disappeared")?;
            match loaded.state() {
                SlotState::Ready => {
                    println!(
                        "Slot {}: bank {}, sound {}, {} bytes, sound count {}",
                        slot,
                        bank,
                        sound.map_or("all".to_string(), |s| s.to_string()),
                        loaded.buffer_size(),
                        loaded.sound_count()
                    );
                    if let (Some(output), Some(buffer)) = (output, loaded.buffer()) {
                        fs::write(&output, buffer)?;
                        println!("Wrote {} bytes to {}", buffer.len(), output);
                    }
                }
                SlotState::Failed => {
                    let reason = loaded
                        .failure()
                        .map_or("unknown error".to_string(), |e| e.to_string());
                    return Err(format!("bank {} failed to load: {}", bank, reason).into());
                }
                state => return Err(format!("slot {} ended up {:?}", slot, state).into()),
            }

            let ledger = Arc::clone(loader.ledger());
            loader.finalize();
            println!(
                "Buffers allocated: {}, released: {}",
                ledger.allocations(),
                ledger.releases()
            );
        }
    }

    Ok(())
}
