//! CPU emulation cores
//!
//! Both processors share the same shape: a register file, a dispatch table
//! built from opcode masks, and a set of handlers that take the CPU as an
//! explicit receiver.

pub mod dispatch;
pub mod m68k;
pub mod z80;

use crate::EmulationResult;

/// Common CPU trait
pub trait Cpu {
    /// Execute one instruction and return cycles consumed
    fn step(&mut self) -> EmulationResult<u32>;

    /// Reset the CPU to its power-on state
    fn reset(&mut self) -> EmulationResult<()>;

    /// Get the program counter
    fn pc(&self) -> u32;

    /// Get total cycles executed
    fn cycles(&self) -> u64;
}

/// Even parity of a byte, as reported by the Z80 P/V flag
#[inline]
pub fn parity(val: u8) -> bool {
    val.count_ones() % 2 == 0
}
