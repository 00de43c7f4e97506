//! Exception vector table
//!
//! The first kilobyte of the 68000 address space holds 32-bit big-endian
//! jump targets. Each entry is read from memory when needed, never cached.

use super::{Bus68k, M68k};
use crate::{EmulationError, EmulationResult};

/// A slot in the vector table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vector {
    ResetSsp,
    ResetPc,
    BusError,
    AddressError,
    IllegalInstruction,
    ZeroDivide,
    Chk,
    Trapv,
    PrivilegeViolation,
    Trace,
    LineA,
    LineF,
    UninitializedInterrupt,
    SpuriousInterrupt,
    /// Interrupt autovector, level 1-7
    Autovector(u8),
    /// `TRAP` vector, id 1-15
    Trap(u8),
    /// Target of the `TRAP #n` instruction, n 0-15
    TrapInstruction(u8),
}

impl Vector {
    pub fn autovector(level: u8) -> EmulationResult<Self> {
        Self::Autovector(level).validate()
    }

    pub fn trap(id: u8) -> EmulationResult<Self> {
        Self::Trap(id).validate()
    }

    pub fn trap_instruction(n: u8) -> EmulationResult<Self> {
        Self::TrapInstruction(n).validate()
    }

    fn validate(self) -> EmulationResult<Self> {
        match self {
            Vector::Autovector(level) if !(1..=7).contains(&level) => Err(EmulationError::InvalidParameter {
                what: "interrupt autovector level",
                value: level as u32,
            }),
            Vector::Trap(id) if !(1..=15).contains(&id) => Err(EmulationError::InvalidParameter {
                what: "trap vector id",
                value: id as u32,
            }),
            Vector::TrapInstruction(n) if n > 15 => Err(EmulationError::InvalidParameter {
                what: "trap instruction number",
                value: n as u32,
            }),
            _ => Ok(self),
        }
    }

    /// Byte offset of the entry
    pub fn offset(self) -> EmulationResult<u32> {
        Ok(match self.validate()? {
            Vector::ResetSsp => 0x00,
            Vector::ResetPc => 0x04,
            Vector::BusError => 0x08,
            Vector::AddressError => 0x0C,
            Vector::IllegalInstruction => 0x10,
            Vector::ZeroDivide => 0x14,
            Vector::Chk => 0x18,
            Vector::Trapv => 0x1C,
            Vector::PrivilegeViolation => 0x20,
            Vector::Trace => 0x24,
            Vector::LineA => 0x28,
            Vector::LineF => 0x2C,
            Vector::UninitializedInterrupt => 0x3C,
            Vector::SpuriousInterrupt => 0x60,
            Vector::Autovector(level) => 0x64 + 4 * (level as u32 - 1),
            Vector::Trap(id) => 0x80 + 4 * (id as u32 - 1),
            Vector::TrapInstruction(n) => 0x80 + 4 * n as u32,
        })
    }

    /// Cycles spent processing the exception
    pub fn cycles(self) -> u32 {
        match self {
            Vector::BusError | Vector::AddressError => 50,
            Vector::ZeroDivide => 38,
            Vector::Chk => 40,
            Vector::Autovector(_) | Vector::SpuriousInterrupt | Vector::UninitializedInterrupt => 44,
            _ => 34,
        }
    }
}

impl<B: Bus68k> M68k<B> {
    /// Read the 32-bit target stored for `vector`
    pub fn read_vector(&mut self, vector: Vector) -> EmulationResult<u32> {
        let offset = vector.offset()?;
        Ok(self.bus.read32(offset))
    }

    pub fn reset_ssp(&mut self) -> EmulationResult<u32> {
        self.read_vector(Vector::ResetSsp)
    }

    pub fn reset_pc(&mut self) -> EmulationResult<u32> {
        self.read_vector(Vector::ResetPc)
    }

    pub fn interrupt_autovector(&mut self, level: u8) -> EmulationResult<u32> {
        self.read_vector(Vector::autovector(level)?)
    }

    pub fn trap_vector(&mut self, id: u8) -> EmulationResult<u32> {
        self.read_vector(Vector::trap(id)?)
    }
}
