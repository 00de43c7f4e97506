//! Block transfer, compare and I/O instructions
//!
//! `LDI/LDD/LDIR/LDDR`, `CPI/CPD/CPIR/CPDR`, `INI/IND/INIR/INDR` and
//! `OUTI/OUTD/OTIR/OTDR` share one step primitive. A repeating instruction
//! that still has work left rewinds PC onto itself so the next `step()`
//! runs it again.

use super::{BusZ80, Z80};
use crate::cpu::parity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Load,
    Compare,
    In,
    Out,
}

/// Decoded `ED 101d r0kk` opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOp {
    pub kind: BlockKind,
    pub decrement: bool,
    pub repeat: bool,
}

impl BlockOp {
    pub fn from_opcode(op: u8) -> Self {
        Self {
            kind: match op & 3 {
                0 => BlockKind::Load,
                1 => BlockKind::Compare,
                2 => BlockKind::In,
                _ => BlockKind::Out,
            },
            decrement: op & 0x08 != 0,
            repeat: op & 0x10 != 0,
        }
    }
}

fn delta(decrement: bool) -> u16 {
    if decrement { 0xFFFF } else { 0x0001 }
}

impl<B: BusZ80> Z80<B> {
    /// Copy (HL) to (DE)
    fn block_load(&mut self, decrement: bool) {
        let step = delta(decrement);
        let val = self.read8(self.hl());
        self.write8(self.de(), val);
        self.set_hl(self.hl().wrapping_add(step));
        self.set_de(self.de().wrapping_add(step));
        self.set_bc(self.bc().wrapping_sub(1));

        let n = val.wrapping_add(self.a);
        self.f.h = false;
        self.f.n = false;
        self.f.pv = self.bc() != 0;
        self.f.y = n & 0x02 != 0;
        self.f.x = n & 0x08 != 0;
    }

    /// Compare A with (HL); carry is untouched
    fn block_compare(&mut self, decrement: bool) {
        let step = delta(decrement);
        let val = self.read8(self.hl());
        let result = self.a.wrapping_sub(val);

        self.f.s = result & 0x80 != 0;
        self.f.z = result == 0;
        self.f.h = (self.a ^ val ^ result) & 0x10 != 0;
        let n = if self.f.h { result.wrapping_sub(1) } else { result };
        self.f.y = n & 0x02 != 0;
        self.f.x = n & 0x08 != 0;
        self.f.n = true;

        self.set_hl(self.hl().wrapping_add(step));
        self.set_bc(self.bc().wrapping_sub(1));
        self.f.pv = self.bc() != 0;
        self.wz = self.wz.wrapping_add(step);
    }

    /// Flags shared by the I/O block group; `k` is the transferred byte plus
    /// the low byte of the adjusted C or L.
    fn block_io_flags(&mut self, val: u8, k: u16) {
        let b = self.b;
        self.set_szxy(b);
        self.f.n = val & 0x80 != 0;
        self.f.h = k > 0xFF;
        self.f.c = k > 0xFF;
        self.f.pv = parity((k & 0x07) as u8 ^ b);
    }

    /// Port (BC) to (HL)
    fn block_in(&mut self, decrement: bool) {
        let step = delta(decrement);
        let port = self.bc();
        let val = self.bus.io_read(port);
        self.write8(self.hl(), val);
        self.wz = port.wrapping_add(step);
        self.b = self.b.wrapping_sub(1);
        self.set_hl(self.hl().wrapping_add(step));

        let k = val as u16 + self.c.wrapping_add(step as u8) as u16;
        self.block_io_flags(val, k);
    }

    /// (HL) to port (BC), B decremented first
    fn block_out(&mut self, decrement: bool) {
        let step = delta(decrement);
        let val = self.read8(self.hl());
        self.b = self.b.wrapping_sub(1);
        let port = self.bc();
        self.bus.io_write(port, val);
        self.set_hl(self.hl().wrapping_add(step));
        self.wz = port.wrapping_add(step);

        let k = val as u16 + self.l as u16;
        self.block_io_flags(val, k);
    }

    /// Run one step of `op`. Returns 21 cycles while a repeat is pending,
    /// 16 otherwise.
    pub(super) fn block(&mut self, op: BlockOp) -> u32 {
        let more = match op.kind {
            BlockKind::Load => {
                self.block_load(op.decrement);
                self.bc() != 0
            }
            BlockKind::Compare => {
                self.block_compare(op.decrement);
                self.bc() != 0 && !self.f.z
            }
            BlockKind::In => {
                self.block_in(op.decrement);
                self.b != 0
            }
            BlockKind::Out => {
                self.block_out(op.decrement);
                self.b != 0
            }
        };

        if !(op.repeat && more) {
            return 16;
        }

        self.pc = self.pc.wrapping_sub(2);
        if matches!(op.kind, BlockKind::Load | BlockKind::Compare) {
            self.wz = self.pc.wrapping_add(1);
        }
        21
    }
}
