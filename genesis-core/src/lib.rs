//! # Genesis Core
//!
//! Instruction-level emulation of the two processors inside a Sega Mega Drive:
//!
//! - Zilog Z80 (8-bit sound co-processor)
//! - Motorola 68000 (16/32-bit main processor)
//!
//! Both CPUs share one address-decoded [`bus::MemoryBus`]. Each CPU owns its
//! register file and an opcode dispatch table built once from bit masks, and
//! exposes `reset()` plus `step()`, which executes exactly one instruction
//! and reports the cycles it took.

pub mod bus;
pub mod cartridge;
pub mod cpu;
pub mod memory;
pub mod system;

use std::fmt;
use thiserror::Error;

pub use bus::{MemoryBus, SharedBus};
pub use cartridge::Cartridge;
pub use system::{Emulator, EmulatorConfig, VideoStandard};

/// Which processor raised a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuKind {
    Z80,
    M68k,
}

impl fmt::Display for CpuKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuKind::Z80 => write!(f, "Z80"),
            CpuKind::M68k => write!(f, "68000"),
        }
    }
}

/// Emulation errors
#[derive(Debug, Error)]
pub enum EmulationError {
    /// The fetched opcode has no installed handler. Prefixed Z80 opcodes
    /// carry their prefix bytes, e.g. `0xED77`.
    #[error("Unknown {cpu} opcode: {opcode:#06x}")]
    UnknownOpcode { cpu: CpuKind, opcode: u32 },

    #[error("Invalid {what}: {value}")]
    InvalidParameter { what: &'static str, value: u32 },

    #[error("No cartridge image loaded")]
    NoCartridge,

    #[error("Failed to load ROM: {0}")]
    RomLoadError(String),

    #[error("Invalid ROM format: {0}")]
    InvalidRomFormat(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type EmulationResult<T> = Result<T, EmulationError>;
