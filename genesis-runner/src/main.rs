//! # Genesis Runner
//!
//! Loads a Mega Drive ROM, runs a number of frames through `genesis-core`
//! and prints a JSON summary of the work done.
//!
//! ## Usage
//! ```bash
//! genesis [--config genesis.json] [--frames 120] game.bin
//!
//! # With debug logging
//! RUST_LOG=genesis_core=debug genesis game.bin
//! ```

use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use genesis_core::cpu::Cpu;
use genesis_core::system::FrameStats;
use genesis_core::{Emulator, EmulatorConfig};
use serde::Serialize;
use tracing::{error, info};

const DEFAULT_FRAMES: u64 = 60;

#[derive(Debug)]
struct RunOptions {
    rom: PathBuf,
    config: Option<PathBuf>,
    frames: u64,
}

impl RunOptions {
    fn from_args(args: &[String]) -> Result<Self> {
        let mut rom = None;
        let mut config = None;
        let mut frames = DEFAULT_FRAMES;

        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" => {
                    let path = iter.next().context("--config needs a path")?;
                    config = Some(PathBuf::from(path));
                }
                "--frames" => {
                    let count = iter.next().context("--frames needs a count")?;
                    frames = count
                        .parse()
                        .with_context(|| format!("invalid frame count {count:?}"))?;
                }
                flag if flag.starts_with("--") => bail!("unknown option {flag}"),
                path => rom = Some(PathBuf::from(path)),
            }
        }

        let rom = rom.context("usage: genesis [--config <path>] [--frames <n>] <rom>")?;
        Ok(Self { rom, config, frames })
    }
}

/// Printed to stdout when the run ends
#[derive(Debug, Default, Serialize)]
struct RunSummary {
    rom: String,
    title: String,
    checksum_valid: bool,
    frames_requested: u64,
    frames_completed: u64,
    m68k_cycles: u64,
    z80_cycles: u64,
    m68k_pc: u32,
    z80_pc: u32,
    error: Option<String>,
}

impl RunSummary {
    fn add_frame(&mut self, stats: FrameStats) {
        self.frames_completed += 1;
        self.m68k_cycles += stats.m68k_cycles;
        self.z80_cycles += stats.z80_cycles;
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("genesis=info".parse()?)
                .add_directive("genesis_core=info".parse()?),
        )
        .with_writer(io::stderr)
        .init();

    info!("Genesis Runner v{} starting...", env!("CARGO_PKG_VERSION"));

    let args: Vec<String> = std::env::args().collect();
    let options = RunOptions::from_args(&args)?;

    let config = match &options.config {
        Some(path) => EmulatorConfig::load(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => EmulatorConfig::default(),
    };
    info!("Config: {:?}", config);

    let mut emulator = Emulator::new(config);
    emulator
        .load_rom(&options.rom)
        .with_context(|| format!("failed to load {}", options.rom.display()))?;
    emulator.reset().context("reset failed")?;

    let mut summary = RunSummary {
        rom: options.rom.display().to_string(),
        frames_requested: options.frames,
        ..Default::default()
    };
    if let Some(cartridge) = emulator.bus().lock().cartridge() {
        summary.title = cartridge.header.title().to_string();
        summary.checksum_valid = cartridge.checksum_valid();
    }

    for _ in 0..options.frames {
        match emulator.run_frame() {
            Ok(stats) => summary.add_frame(stats),
            Err(e) => {
                error!(
                    frame = emulator.frame_count(),
                    m68k_pc = emulator.m68k().pc(),
                    z80_pc = emulator.z80().pc(),
                    "Emulation halted: {}",
                    e
                );
                summary.error = Some(e.to_string());
                break;
            }
        }
    }

    summary.m68k_pc = emulator.m68k().pc();
    summary.z80_pc = emulator.z80().pc();
    info!("Ran {} of {} frames", summary.frames_completed, summary.frames_requested);

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
