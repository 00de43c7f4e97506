//! Motorola 68000 CPU Emulator
//!
//! The 68000 is the Mega Drive's main processor.
//! - 8 data registers (D0-D7) and 8 address registers (A0-A7)
//! - A7 is the active stack pointer; the other mode's stack pointer is banked
//! - 24-bit external address bus, big-endian
//! - Supervisor/user privilege levels and a 3-bit interrupt mask
//!
//! Opcodes are 16 bits wide and dispatched through one dense 65536-slot
//! table. Only the instruction subset installed in [`ops`] executes; every
//! other opcode reports `UnknownOpcode`.

mod ops;
pub mod vectors;


pub use vectors::Vector;

use tracing::{debug, info};

use super::dispatch::OpcodeTable;
use super::Cpu;
use crate::EmulationResult;

/// Memory bus trait for the 68000. Wider accesses default to big-endian
/// sequences of byte accesses.
pub trait Bus68k {
    fn read8(&mut self, addr: u32) -> u8;
    fn write8(&mut self, addr: u32, val: u8);

    fn read16(&mut self, addr: u32) -> u16 {
        let hi = self.read8(addr) as u16;
        let lo = self.read8(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn write16(&mut self, addr: u32, val: u16) {
        self.write8(addr, (val >> 8) as u8);
        self.write8(addr.wrapping_add(1), val as u8);
    }

    fn read32(&mut self, addr: u32) -> u32 {
        let hi = self.read16(addr) as u32;
        let lo = self.read16(addr.wrapping_add(2)) as u32;
        (hi << 16) | lo
    }

    fn write32(&mut self, addr: u32, val: u32) {
        self.write16(addr, (val >> 16) as u16);
        self.write16(addr.wrapping_add(2), val as u16);
    }
}

/// Instruction handler. Receives the opcode word that selected it and
/// returns the cycles it took.
pub type Handler<B> = fn(&mut M68k<B>, u16) -> EmulationResult<u32>;

/// 68000 Status Register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusRegister {
    /// Carry
    pub c: bool,
    /// Overflow
    pub v: bool,
    /// Zero
    pub z: bool,
    /// Negative
    pub n: bool,
    /// Extend
    pub x: bool,
    /// Interrupt mask (3 bits)
    pub mask: u8,
    /// Supervisor mode
    pub s: bool,
    /// Trace mode
    pub t: bool,
}

impl StatusRegister {
    pub const C: u16 = 1 << 0;
    pub const V: u16 = 1 << 1;
    pub const Z: u16 = 1 << 2;
    pub const N: u16 = 1 << 3;
    pub const X: u16 = 1 << 4;
    pub const S: u16 = 1 << 13;
    pub const T: u16 = 1 << 15;

    pub fn to_u16(&self) -> u16 {
        let mut val = self.ccr() as u16;
        val |= (self.mask as u16 & 7) << 8;
        if self.s { val |= Self::S; }
        if self.t { val |= Self::T; }
        val
    }

    pub fn from_u16(val: u16) -> Self {
        Self {
            c: val & Self::C != 0,
            v: val & Self::V != 0,
            z: val & Self::Z != 0,
            n: val & Self::N != 0,
            x: val & Self::X != 0,
            mask: ((val >> 8) & 7) as u8,
            s: val & Self::S != 0,
            t: val & Self::T != 0,
        }
    }

    /// Condition code register: the low byte
    pub fn ccr(&self) -> u8 {
        let mut val = 0u8;
        if self.c { val |= Self::C as u8; }
        if self.v { val |= Self::V as u8; }
        if self.z { val |= Self::Z as u8; }
        if self.n { val |= Self::N as u8; }
        if self.x { val |= Self::X as u8; }
        val
    }

    /// Replace the condition codes, leaving the system byte alone
    pub fn set_ccr(&mut self, val: u8) {
        let ccr = Self::from_u16(val as u16);
        self.c = ccr.c;
        self.v = ccr.v;
        self.z = ccr.z;
        self.n = ccr.n;
        self.x = ccr.x;
    }
}

/// Operand size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Byte,
    Word,
    Long,
}

impl Size {
    /// Decode the common `ss` field in bits 7-6; `11` is not a size
    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits & 3 {
            0 => Some(Size::Byte),
            1 => Some(Size::Word),
            2 => Some(Size::Long),
            _ => None,
        }
    }

    pub fn mask(self) -> u32 {
        match self {
            Size::Byte => 0xFF,
            Size::Word => 0xFFFF,
            Size::Long => 0xFFFF_FFFF,
        }
    }

    pub fn msb(self) -> u32 {
        match self {
            Size::Byte => 0x80,
            Size::Word => 0x8000,
            Size::Long => 0x8000_0000,
        }
    }
}

/// 68000 CPU State
pub struct M68k<B: Bus68k> {
    /// Data registers (D0-D7)
    pub d: [u32; 8],
    /// Address registers (A0-A7); A7 is the active stack pointer
    pub a: [u32; 8],
    /// Supervisor stack pointer, banked while in user mode
    pub ssp: u32,
    /// User stack pointer, banked while in supervisor mode
    pub usp: u32,
    /// Program counter
    pub pc: u32,
    /// Status register
    pub sr: StatusRegister,
    /// Halted by STOP until an interrupt arrives
    pub stopped: bool,
    /// Memory bus
    pub bus: B,
    /// Total cycles
    pub cycles: u64,
    /// Address of the instruction being executed
    instr_pc: u32,
    table: OpcodeTable<Handler<B>>,
}

impl<B: Bus68k> M68k<B> {
    pub fn new(bus: B) -> Self {
        Self {
            d: [0; 8],
            a: [0; 8],
            ssp: 0,
            usp: 0,
            pc: 0,
            sr: StatusRegister { s: true, mask: 7, ..Default::default() },
            stopped: false,
            bus,
            cycles: 0,
            instr_pc: 0,
            table: ops::build_table(),
        }
    }

    /// Name of the handler installed for an opcode
    pub fn opcode_name(&self, opcode: u16) -> &'static str {
        self.table.name(opcode as u32)
    }

    // ========================================================================
    // Privilege
    // ========================================================================

    pub fn is_supervisor(&self) -> bool {
        self.sr.s
    }

    /// Switch to supervisor mode, banking A7 as the user stack pointer.
    /// Does nothing if already in supervisor mode.
    pub fn enter_supervisor(&mut self) {
        if self.sr.s {
            return;
        }
        self.sr.s = true;
        self.usp = self.a[7];
        self.a[7] = self.ssp;
    }

    /// Switch to user mode, banking A7 as the supervisor stack pointer.
    /// Does nothing if already in user mode.
    pub fn enter_user(&mut self) {
        if !self.sr.s {
            return;
        }
        self.sr.s = false;
        self.ssp = self.a[7];
        self.a[7] = self.usp;
    }

    /// Current user stack pointer, wherever it lives
    pub fn user_sp(&self) -> u32 {
        if self.sr.s { self.usp } else { self.a[7] }
    }

    pub fn set_user_sp(&mut self, val: u32) {
        if self.sr.s {
            self.usp = val;
        } else {
            self.a[7] = val;
        }
    }

    /// Load the whole status register, switching stacks if S changes
    pub fn set_sr(&mut self, val: u16) {
        if val & StatusRegister::S != 0 {
            self.enter_supervisor();
        } else {
            self.enter_user();
        }
        self.sr = StatusRegister::from_u16(val);
    }

    // ========================================================================
    // Memory access
    // ========================================================================

    fn fetch16(&mut self) -> u16 {
        let val = self.bus.read16(self.pc);
        self.pc = self.pc.wrapping_add(2);
        val
    }

    fn fetch32(&mut self) -> u32 {
        let val = self.bus.read32(self.pc);
        self.pc = self.pc.wrapping_add(4);
        val
    }

    fn push16(&mut self, val: u16) {
        self.a[7] = self.a[7].wrapping_sub(2);
        self.bus.write16(self.a[7], val);
    }

    fn push32(&mut self, val: u32) {
        self.a[7] = self.a[7].wrapping_sub(4);
        self.bus.write32(self.a[7], val);
    }

    fn pop16(&mut self) -> u16 {
        let val = self.bus.read16(self.a[7]);
        self.a[7] = self.a[7].wrapping_add(2);
        val
    }

    fn pop32(&mut self) -> u32 {
        let val = self.bus.read32(self.a[7]);
        self.a[7] = self.a[7].wrapping_add(4);
        val
    }

    /// Write the low `size` bits of a data register, keeping the rest
    fn set_d(&mut self, reg: usize, val: u32, size: Size) {
        let mask = size.mask();
        self.d[reg & 7] = (self.d[reg & 7] & !mask) | (val & mask);
    }

    /// N and Z from a result, V and C cleared
    fn set_logic_flags(&mut self, val: u32, size: Size) {
        let val = val & size.mask();
        self.sr.n = val & size.msb() != 0;
        self.sr.z = val == 0;
        self.sr.v = false;
        self.sr.c = false;
    }

    fn condition(&self, cc: u16) -> bool {
        let sr = &self.sr;
        match cc & 0xF {
            0x0 => true,
            0x1 => false,
            0x2 => !sr.c && !sr.z,
            0x3 => sr.c || sr.z,
            0x4 => !sr.c,
            0x5 => sr.c,
            0x6 => !sr.z,
            0x7 => sr.z,
            0x8 => !sr.v,
            0x9 => sr.v,
            0xA => !sr.n,
            0xB => sr.n,
            0xC => sr.n == sr.v,
            0xD => sr.n != sr.v,
            0xE => !sr.z && sr.n == sr.v,
            _ => sr.z || sr.n != sr.v,
        }
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    /// Enter supervisor mode, stack PC and the old SR, clear trace and jump
    /// through `vector`
    pub fn exception(&mut self, vector: Vector) -> EmulationResult<u32> {
        let target = self.read_vector(vector)?;
        let sr = self.sr.to_u16();
        self.enter_supervisor();
        self.sr.t = false;

        let pc = self.pc;
        self.push32(pc);
        self.push16(sr);
        self.pc = target;
        debug!(?vector, return_to = pc, target, "68000 exception");
        Ok(vector.cycles())
    }

    /// Exception whose stacked PC is the faulting instruction itself
    fn fault(&mut self, vector: Vector) -> EmulationResult<u32> {
        self.pc = self.instr_pc;
        self.exception(vector)
    }

    fn privilege_violation(&mut self) -> EmulationResult<u32> {
        self.fault(Vector::PrivilegeViolation)
    }

    /// Request an autovectored interrupt at `level` (1-7). Level 7 cannot be
    /// masked; lower levels must exceed the current mask. Returns the cycles
    /// spent when the interrupt is taken.
    pub fn interrupt(&mut self, level: u8) -> EmulationResult<Option<u32>> {
        let vector = Vector::autovector(level)?;
        if level < 7 && level <= self.sr.mask {
            return Ok(None);
        }

        self.stopped = false;
        let cycles = self.exception(vector)?;
        self.sr.mask = level;
        self.cycles += cycles as u64;
        Ok(Some(cycles))
    }

    fn execute(&mut self) -> EmulationResult<u32> {
        if self.stopped {
            return Ok(4);
        }

        let trace = self.sr.t;
        self.instr_pc = self.pc;
        let opcode = self.fetch16();
        let handler = self.table.handler(opcode as u32);
        let mut cycles = handler(self, opcode)?;

        // An instruction that raised its own exception has already cleared T
        if trace && self.sr.t {
            cycles += self.exception(Vector::Trace)?;
        }
        Ok(cycles)
    }
}

impl<B: Bus68k> Cpu for M68k<B> {
    fn step(&mut self) -> EmulationResult<u32> {
        let cycles = self.execute()?;
        self.cycles += cycles as u64;
        Ok(cycles)
    }

    fn reset(&mut self) -> EmulationResult<()> {
        self.d = [0; 8];
        self.a = [0; 8];
        self.usp = 0;
        self.sr = StatusRegister { s: true, mask: 7, ..Default::default() };
        self.stopped = false;
        self.cycles = 0;

        self.ssp = self.reset_ssp()?;
        self.pc = self.reset_pc()?;
        self.a[7] = self.ssp;
        self.instr_pc = self.pc;
        info!(ssp = self.ssp, pc = self.pc, "68000 reset");
        Ok(())
    }

    fn pc(&self) -> u32 {
        self.pc
    }

    fn cycles(&self) -> u64 {
        self.cycles
    }
}
