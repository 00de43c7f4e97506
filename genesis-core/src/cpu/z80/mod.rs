//! Zilog Z80 CPU Emulator
//!
//! The Z80 is the Mega Drive's 8-bit sound co-processor. Instructions are
//! decoded through four tables (primary, `CB`, `ED` and a shared `DD`/`FD`
//! indexed table) built once from opcode masks.
//!
//! Undocumented behaviour carried here: the X/Y flag bits, the internal
//! WZ (MEMPTR) latch, `SLL`, index register halves and the `DDCB` register
//! copy.

mod alu;
mod block;
mod ops;

#[cfg(test)]
mod tests;

pub use alu::{AluOp, Direction, Fill, ShiftMode};
pub use block::{BlockKind, BlockOp};

use tracing::{debug, info};

use super::dispatch::OpcodeTable;
use super::Cpu;
use crate::EmulationResult;

/// Memory access trait for the Z80
pub trait BusZ80 {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, data: u8);
    fn io_read(&mut self, port: u16) -> u8;
    fn io_write(&mut self, port: u16, data: u8);
}

/// Instruction handler. Receives the opcode byte that selected it and
/// returns the cycles it took.
pub type Handler<B> = fn(&mut Z80<B>, u8) -> EmulationResult<u32>;

/// Z80 CPU flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Z80Flags {
    pub s: bool,  // Sign
    pub z: bool,  // Zero
    pub y: bool,  // Copy of result bit 5
    pub h: bool,  // Half carry
    pub x: bool,  // Copy of result bit 3
    pub pv: bool, // Parity/Overflow
    pub n: bool,  // Add/Subtract
    pub c: bool,  // Carry
}

impl Z80Flags {
    pub const S: u8 = 0x80;
    pub const Z: u8 = 0x40;
    pub const Y: u8 = 0x20;
    pub const H: u8 = 0x10;
    pub const X: u8 = 0x08;
    pub const PV: u8 = 0x04;
    pub const N: u8 = 0x02;
    pub const C: u8 = 0x01;

    pub fn to_byte(&self) -> u8 {
        let mut f = 0u8;
        if self.s { f |= Self::S; }
        if self.z { f |= Self::Z; }
        if self.y { f |= Self::Y; }
        if self.h { f |= Self::H; }
        if self.x { f |= Self::X; }
        if self.pv { f |= Self::PV; }
        if self.n { f |= Self::N; }
        if self.c { f |= Self::C; }
        f
    }

    pub fn from_byte(b: u8) -> Self {
        Self {
            s: b & Self::S != 0,
            z: b & Self::Z != 0,
            y: b & Self::Y != 0,
            h: b & Self::H != 0,
            x: b & Self::X != 0,
            pv: b & Self::PV != 0,
            n: b & Self::N != 0,
            c: b & Self::C != 0,
        }
    }

    /// Test one flag by its bit mask
    pub fn get(&self, mask: u8) -> bool {
        self.to_byte() & mask != 0
    }

    /// Set one flag by its bit mask
    pub fn set(&mut self, mask: u8, on: bool) {
        let f = self.to_byte();
        *self = Self::from_byte(if on { f | mask } else { f & !mask });
    }
}

/// Register standing in for HL in the current instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Hl,
    Ix,
    Iy,
}

/// Z80 CPU state
pub struct Z80<B: BusZ80> {
    // Main registers
    pub a: u8,
    pub f: Z80Flags,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    // Alternate registers
    pub a_alt: u8,
    pub f_alt: Z80Flags,
    pub b_alt: u8,
    pub c_alt: u8,
    pub d_alt: u8,
    pub e_alt: u8,
    pub h_alt: u8,
    pub l_alt: u8,

    // Index registers
    pub ix: u16,
    pub iy: u16,

    // Stack pointer and program counter
    pub sp: u16,
    pub pc: u16,

    // Interrupt vector base and memory refresh
    pub i: u8,
    pub r: u8,

    /// Internal address latch (MEMPTR)
    pub wz: u16,

    // Interrupt flip-flops
    pub iff1: bool,
    pub iff2: bool,

    // Interrupt mode (0, 1, or 2)
    pub im: u8,

    // Halted state
    pub halted: bool,

    // Bus
    pub bus: B,

    // Cycle counter
    pub cycles: u64,

    index: IndexMode,

    // Pending interrupt
    irq_pending: bool,
    nmi_pending: bool,
    /// EI holds off interrupts for one instruction
    ei_delay: bool,
    /// A spent prefix holds off every interrupt, NMI included
    prefix_delay: bool,

    main: OpcodeTable<Handler<B>>,
    cb: OpcodeTable<Handler<B>>,
    ed: OpcodeTable<Handler<B>>,
    indexed: OpcodeTable<Handler<B>>,
}

impl<B: BusZ80> Z80<B> {
    pub fn new(bus: B) -> Self {
        Self {
            a: 0,
            f: Z80Flags::default(),
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            a_alt: 0,
            f_alt: Z80Flags::default(),
            b_alt: 0,
            c_alt: 0,
            d_alt: 0,
            e_alt: 0,
            h_alt: 0,
            l_alt: 0,
            ix: 0,
            iy: 0,
            sp: 0xFFFF,
            pc: 0,
            i: 0,
            r: 0,
            wz: 0,
            iff1: false,
            iff2: false,
            im: 0,
            halted: false,
            bus,
            cycles: 0,
            index: IndexMode::Hl,
            irq_pending: false,
            nmi_pending: false,
            ei_delay: false,
            prefix_delay: false,
            main: ops::main_table(),
            cb: ops::cb_table(),
            ed: ops::ed_table(),
            indexed: ops::indexed_table(),
        }
    }

    // Register pair helpers
    pub fn af(&self) -> u16 { ((self.a as u16) << 8) | (self.f.to_byte() as u16) }
    pub fn bc(&self) -> u16 { ((self.b as u16) << 8) | (self.c as u16) }
    pub fn de(&self) -> u16 { ((self.d as u16) << 8) | (self.e as u16) }
    pub fn hl(&self) -> u16 { ((self.h as u16) << 8) | (self.l as u16) }

    pub fn set_af(&mut self, val: u16) { self.a = (val >> 8) as u8; self.f = Z80Flags::from_byte(val as u8); }
    pub fn set_bc(&mut self, val: u16) { self.b = (val >> 8) as u8; self.c = val as u8; }
    pub fn set_de(&mut self, val: u16) { self.d = (val >> 8) as u8; self.e = val as u8; }
    pub fn set_hl(&mut self, val: u16) { self.h = (val >> 8) as u8; self.l = val as u8; }

    /// Name of the handler installed for a primary opcode
    pub fn opcode_name(&self, opcode: u8) -> &'static str {
        self.main.name(opcode as u32)
    }

    pub fn irq(&mut self) {
        self.irq_pending = true;
    }

    pub fn nmi(&mut self) {
        self.nmi_pending = true;
    }

    // ========================================================================
    // Register file access
    // ========================================================================

    /// HL, IX or IY depending on the active prefix
    fn index_reg(&self) -> u16 {
        match self.index {
            IndexMode::Hl => self.hl(),
            IndexMode::Ix => self.ix,
            IndexMode::Iy => self.iy,
        }
    }

    fn set_index_reg(&mut self, val: u16) {
        match self.index {
            IndexMode::Hl => self.set_hl(val),
            IndexMode::Ix => self.ix = val,
            IndexMode::Iy => self.iy = val,
        }
    }

    /// 8-bit register by its 3-bit code. Code 6 is `(HL)` and is resolved by
    /// callers; codes 4/5 map to the index register halves under `mode`.
    fn reg8_in(&self, r: u8, mode: IndexMode) -> u8 {
        match r & 7 {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => match mode {
                IndexMode::Hl => self.h,
                IndexMode::Ix => (self.ix >> 8) as u8,
                IndexMode::Iy => (self.iy >> 8) as u8,
            },
            5 => match mode {
                IndexMode::Hl => self.l,
                IndexMode::Ix => self.ix as u8,
                IndexMode::Iy => self.iy as u8,
            },
            _ => self.a,
        }
    }

    fn set_reg8_in(&mut self, r: u8, mode: IndexMode, val: u8) {
        match r & 7 {
            0 => self.b = val,
            1 => self.c = val,
            2 => self.d = val,
            3 => self.e = val,
            4 => match mode {
                IndexMode::Hl => self.h = val,
                IndexMode::Ix => self.ix = (self.ix & 0x00FF) | ((val as u16) << 8),
                IndexMode::Iy => self.iy = (self.iy & 0x00FF) | ((val as u16) << 8),
            },
            5 => match mode {
                IndexMode::Hl => self.l = val,
                IndexMode::Ix => self.ix = (self.ix & 0xFF00) | val as u16,
                IndexMode::Iy => self.iy = (self.iy & 0xFF00) | val as u16,
            },
            _ => self.a = val,
        }
    }

    fn reg8(&self, r: u8) -> u8 {
        self.reg8_in(r, self.index)
    }

    fn set_reg8(&mut self, r: u8, val: u8) {
        self.set_reg8_in(r, self.index, val)
    }

    /// Register pair by its 2-bit code: BC, DE, HL/IX/IY, SP
    fn rp(&self, p: u8) -> u16 {
        match p & 3 {
            0 => self.bc(),
            1 => self.de(),
            2 => self.index_reg(),
            _ => self.sp,
        }
    }

    fn set_rp(&mut self, p: u8, val: u16) {
        match p & 3 {
            0 => self.set_bc(val),
            1 => self.set_de(val),
            2 => self.set_index_reg(val),
            _ => self.sp = val,
        }
    }

    /// PUSH/POP pair code: BC, DE, HL/IX/IY, AF
    fn rp2(&self, p: u8) -> u16 {
        if p & 3 == 3 { self.af() } else { self.rp(p) }
    }

    fn set_rp2(&mut self, p: u8, val: u16) {
        if p & 3 == 3 { self.set_af(val) } else { self.set_rp(p, val) }
    }

    fn condition(&self, cc: u8) -> bool {
        match cc & 7 {
            0 => !self.f.z,
            1 => self.f.z,
            2 => !self.f.c,
            3 => self.f.c,
            4 => !self.f.pv,
            5 => self.f.pv,
            6 => !self.f.s,
            _ => self.f.s,
        }
    }

    // ========================================================================
    // Memory access
    // ========================================================================

    fn read8(&mut self, addr: u16) -> u8 {
        self.bus.read(addr)
    }

    fn write8(&mut self, addr: u16, val: u8) {
        self.bus.write(addr, val);
    }

    fn read16(&mut self, addr: u16) -> u16 {
        let lo = self.bus.read(addr) as u16;
        let hi = self.bus.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn write16(&mut self, addr: u16, val: u16) {
        self.bus.write(addr, val as u8);
        self.bus.write(addr.wrapping_add(1), (val >> 8) as u8);
    }

    fn push(&mut self, val: u16) {
        self.sp = self.sp.wrapping_sub(2);
        self.write16(self.sp, val);
    }

    fn pop(&mut self) -> u16 {
        let val = self.read16(self.sp);
        self.sp = self.sp.wrapping_add(2);
        val
    }

    /// Bump the low 7 bits of R
    fn refresh(&mut self) {
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
    }

    /// M1 fetch: opcode and prefix bytes refresh memory
    fn fetch_opcode(&mut self) -> u8 {
        self.refresh();
        self.fetch()
    }

    fn fetch(&mut self) -> u8 {
        let val = self.bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        val
    }

    fn fetch16(&mut self) -> u16 {
        let lo = self.fetch() as u16;
        let hi = self.fetch() as u16;
        (hi << 8) | lo
    }

    /// Address of the `(HL)` operand, or `(IX+d)`/`(IY+d)` under a prefix.
    /// The indexed form fetches the displacement and latches WZ.
    fn operand_addr(&mut self) -> u16 {
        match self.index {
            IndexMode::Hl => self.hl(),
            _ => {
                let d = self.fetch() as i8;
                let addr = self.index_reg().wrapping_add(d as u16);
                self.wz = addr;
                addr
            }
        }
    }

    /// Extra cycles for computing `(IX+d)`
    fn index_penalty(&self) -> u32 {
        if self.index == IndexMode::Hl { 0 } else { 8 }
    }

    // ========================================================================
    // Execution
    // ========================================================================

    fn accept_nmi(&mut self) -> u32 {
        self.halted = false;
        self.iff1 = false;
        self.refresh();
        let pc = self.pc;
        self.push(pc);
        self.pc = 0x0066;
        self.wz = self.pc;
        debug!(return_to = pc, "Z80 NMI");
        11
    }

    fn accept_irq(&mut self) -> u32 {
        self.halted = false;
        self.iff1 = false;
        self.iff2 = false;
        self.refresh();
        let pc = self.pc;
        self.push(pc);

        let cycles = if self.im == 2 {
            // Data bus floats at 0xFF
            let vector = ((self.i as u16) << 8) | 0xFF;
            self.pc = self.read16(vector);
            19
        } else {
            // IM 0 executes RST 38h from the floating bus, IM 1 always does
            self.pc = 0x0038;
            13
        };
        self.wz = self.pc;
        debug!(mode = self.im, target = self.pc, "Z80 IRQ");
        cycles
    }

    fn execute(&mut self) -> EmulationResult<u32> {
        let after_prefix = std::mem::take(&mut self.prefix_delay);

        if self.nmi_pending && !after_prefix {
            self.nmi_pending = false;
            return Ok(self.accept_nmi());
        }

        if self.irq_pending && self.iff1 && !self.ei_delay && !after_prefix {
            self.irq_pending = false;
            return Ok(self.accept_irq());
        }
        self.ei_delay = false;

        if self.halted {
            self.refresh();
            return Ok(4);
        }

        let opcode = self.fetch_opcode();
        let handler = self.main.handler(opcode as u32);
        handler(self, opcode)
    }
}

impl<B: BusZ80> Cpu for Z80<B> {
    fn step(&mut self) -> EmulationResult<u32> {
        let cycles = self.execute()?;
        self.cycles += cycles as u64;
        Ok(cycles)
    }

    fn reset(&mut self) -> EmulationResult<()> {
        self.a = 0;
        self.f = Z80Flags::default();
        self.b = 0;
        self.c = 0;
        self.d = 0;
        self.e = 0;
        self.h = 0;
        self.l = 0;
        self.a_alt = 0;
        self.f_alt = Z80Flags::default();
        self.b_alt = 0;
        self.c_alt = 0;
        self.d_alt = 0;
        self.e_alt = 0;
        self.h_alt = 0;
        self.l_alt = 0;
        self.ix = 0;
        self.iy = 0;
        self.sp = 0xFFFF;
        self.pc = 0;
        self.i = 0;
        self.r = 0;
        self.wz = 0;
        self.iff1 = false;
        self.iff2 = false;
        self.im = 0;
        self.halted = false;
        self.cycles = 0;
        self.index = IndexMode::Hl;
        self.irq_pending = false;
        self.nmi_pending = false;
        self.ei_delay = false;
        self.prefix_delay = false;
        info!("Z80 reset");
        Ok(())
    }

    fn pc(&self) -> u32 {
        self.pc as u32
    }

    fn cycles(&self) -> u64 {
        self.cycles
    }
}
