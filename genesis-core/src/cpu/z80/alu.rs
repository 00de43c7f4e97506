//! Z80 arithmetic, logic and shift primitives
//!
//! Every 8-bit ALU instruction funnels through `add8`, `sub8`, `alu` or
//! `shift`. Half-carry and overflow come from XORing
//! operand and result bits; X/Y mirror bits 3 and 5 of the result.

use super::{BusZ80, Z80};
use crate::cpu::parity;

/// Accumulator operation, in `ADD/ADC/SUB/SBC/AND/XOR/OR/CP` encoding order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

impl AluOp {
    pub fn from_code(code: u8) -> Self {
        match code & 7 {
            0 => AluOp::Add,
            1 => AluOp::Adc,
            2 => AluOp::Sub,
            3 => AluOp::Sbc,
            4 => AluOp::And,
            5 => AluOp::Xor,
            6 => AluOp::Or,
            _ => AluOp::Cp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

/// Bit shifted into the vacated position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Previous carry flag
    Carry,
    /// The bit that was shifted out
    Outgoing,
    Zero,
    One,
    /// Keep the vacated bit's old value
    Preserve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftMode {
    pub direction: Direction,
    pub fill: Fill,
}

impl ShiftMode {
    pub const RLC: Self = Self { direction: Direction::Left, fill: Fill::Outgoing };
    pub const RRC: Self = Self { direction: Direction::Right, fill: Fill::Outgoing };
    pub const RL: Self = Self { direction: Direction::Left, fill: Fill::Carry };
    pub const RR: Self = Self { direction: Direction::Right, fill: Fill::Carry };
    pub const SLA: Self = Self { direction: Direction::Left, fill: Fill::Zero };
    pub const SRA: Self = Self { direction: Direction::Right, fill: Fill::Preserve };
    pub const SLL: Self = Self { direction: Direction::Left, fill: Fill::One };
    pub const SRL: Self = Self { direction: Direction::Right, fill: Fill::Zero };

    /// Decode bits 5-3 of a `CB` opcode
    pub fn from_code(code: u8) -> Self {
        const MODES: [ShiftMode; 8] = [
            ShiftMode::RLC,
            ShiftMode::RRC,
            ShiftMode::RL,
            ShiftMode::RR,
            ShiftMode::SLA,
            ShiftMode::SRA,
            ShiftMode::SLL,
            ShiftMode::SRL,
        ];
        MODES[(code & 7) as usize]
    }
}

impl<B: BusZ80> Z80<B> {
    pub(super) fn set_xy(&mut self, val: u8) {
        self.f.y = val & 0x20 != 0;
        self.f.x = val & 0x08 != 0;
    }

    pub(super) fn set_szxy(&mut self, val: u8) {
        self.f.s = val & 0x80 != 0;
        self.f.z = val == 0;
        self.set_xy(val);
    }

    pub(super) fn add8(&mut self, a: u8, b: u8, carry: bool) -> u8 {
        let sum = a as u16 + b as u16 + carry as u16;
        let result = sum as u8;

        self.f.h = (a ^ b ^ result) & 0x10 != 0;
        self.f.pv = (a ^ result) & (b ^ result) & 0x80 != 0;
        self.f.n = false;
        self.f.c = sum > 0xFF;
        self.set_szxy(result);
        result
    }

    pub(super) fn sub8(&mut self, a: u8, b: u8, carry: bool) -> u8 {
        let diff = (a as u16).wrapping_sub(b as u16).wrapping_sub(carry as u16);
        let result = diff as u8;

        self.f.h = (a ^ b ^ result) & 0x10 != 0;
        self.f.pv = (a ^ b) & (a ^ result) & 0x80 != 0;
        self.f.n = true;
        self.f.c = diff > 0xFF;
        self.set_szxy(result);
        result
    }

    fn logic_flags(&mut self, result: u8, half: bool) {
        self.set_szxy(result);
        self.f.h = half;
        self.f.pv = parity(result);
        self.f.n = false;
        self.f.c = false;
    }

    /// Apply `op` to the accumulator
    pub(super) fn alu(&mut self, op: AluOp, val: u8) {
        let a = self.a;
        match op {
            AluOp::Add => self.a = self.add8(a, val, false),
            AluOp::Adc => self.a = self.add8(a, val, self.f.c),
            AluOp::Sub => self.a = self.sub8(a, val, false),
            AluOp::Sbc => self.a = self.sub8(a, val, self.f.c),
            AluOp::And => {
                self.a = a & val;
                self.logic_flags(self.a, true);
            }
            AluOp::Xor => {
                self.a = a ^ val;
                self.logic_flags(self.a, false);
            }
            AluOp::Or => {
                self.a = a | val;
                self.logic_flags(self.a, false);
            }
            AluOp::Cp => {
                self.sub8(a, val, false);
                // X/Y come from the operand, not the discarded result
                self.set_xy(val);
            }
        }
    }

    /// Carry is left alone
    pub(super) fn inc8(&mut self, val: u8) -> u8 {
        let result = val.wrapping_add(1);
        self.set_szxy(result);
        self.f.h = val & 0x0F == 0x0F;
        self.f.pv = val == 0x7F;
        self.f.n = false;
        result
    }

    /// Carry is left alone
    pub(super) fn dec8(&mut self, val: u8) -> u8 {
        let result = val.wrapping_sub(1);
        self.set_szxy(result);
        self.f.h = val & 0x0F == 0x00;
        self.f.pv = val == 0x80;
        self.f.n = true;
        result
    }

    /// `ADD HL,rr`: S, Z and P/V are untouched
    pub(super) fn add16(&mut self, a: u16, b: u16) -> u16 {
        let sum = a as u32 + b as u32;
        let result = sum as u16;

        self.f.h = (a ^ b ^ result) & 0x1000 != 0;
        self.f.n = false;
        self.f.c = sum > 0xFFFF;
        self.set_xy((result >> 8) as u8);
        result
    }

    pub(super) fn adc16(&mut self, a: u16, b: u16) -> u16 {
        let sum = a as u32 + b as u32 + self.f.c as u32;
        let result = sum as u16;

        self.f.s = result & 0x8000 != 0;
        self.f.z = result == 0;
        self.f.h = (a ^ b ^ result) & 0x1000 != 0;
        self.f.pv = (a ^ result) & (b ^ result) & 0x8000 != 0;
        self.f.n = false;
        self.f.c = sum > 0xFFFF;
        self.set_xy((result >> 8) as u8);
        result
    }

    pub(super) fn sbc16(&mut self, a: u16, b: u16) -> u16 {
        let diff = (a as u32).wrapping_sub(b as u32).wrapping_sub(self.f.c as u32);
        let result = diff as u16;

        self.f.s = result & 0x8000 != 0;
        self.f.z = result == 0;
        self.f.h = (a ^ b ^ result) & 0x1000 != 0;
        self.f.pv = (a ^ b) & (a ^ result) & 0x8000 != 0;
        self.f.n = true;
        self.f.c = diff > 0xFFFF;
        self.set_xy((result >> 8) as u8);
        result
    }

    fn shift_value(&mut self, val: u8, mode: ShiftMode) -> u8 {
        let (outgoing, shifted, entry_mask, kept) = match mode.direction {
            Direction::Left => (val & 0x80 != 0, val << 1, 0x01, val & 0x01 != 0),
            Direction::Right => (val & 0x01 != 0, val >> 1, 0x80, val & 0x80 != 0),
        };
        let fill = match mode.fill {
            Fill::Carry => self.f.c,
            Fill::Outgoing => outgoing,
            Fill::Zero => false,
            Fill::One => true,
            Fill::Preserve => kept,
        };

        self.f.c = outgoing;
        self.f.h = false;
        self.f.n = false;
        if fill { shifted | entry_mask } else { shifted }
    }

    /// Shift or rotate with the full flag update used by the `CB` group
    pub(super) fn shift(&mut self, val: u8, mode: ShiftMode) -> u8 {
        let result = self.shift_value(val, mode);
        self.set_szxy(result);
        self.f.pv = parity(result);
        result
    }

    /// `RLCA`/`RRCA`/`RLA`/`RRA`: S, Z and P/V are untouched
    pub(super) fn shift_a(&mut self, mode: ShiftMode) {
        let a = self.a;
        self.a = self.shift_value(a, mode);
        self.set_xy(self.a);
    }

    /// `BIT n,v` minus the X/Y bits, which depend on the addressing mode
    pub(super) fn bit_test(&mut self, bit: u8, val: u8) {
        let set = val & (1 << (bit & 7)) != 0;
        self.f.s = bit == 7 && set;
        self.f.z = !set;
        self.f.pv = !set;
        self.f.h = true;
        self.f.n = false;
    }

    pub(super) fn daa(&mut self) {
        let a = self.a;
        let mut correction = 0u8;
        let mut carry = self.f.c;

        if self.f.h || a & 0x0F > 0x09 {
            correction |= 0x06;
        }
        if carry || a > 0x99 {
            correction |= 0x60;
            carry = true;
        }

        let result = if self.f.n {
            self.f.h = self.f.h && a & 0x0F < 0x06;
            a.wrapping_sub(correction)
        } else {
            self.f.h = a & 0x0F > 0x09;
            a.wrapping_add(correction)
        };

        self.a = result;
        self.f.c = carry;
        self.f.pv = parity(result);
        self.set_szxy(result);
    }

    pub(super) fn cpl(&mut self) {
        self.a = !self.a;
        self.f.h = true;
        self.f.n = true;
        self.set_xy(self.a);
    }

    pub(super) fn scf(&mut self) {
        self.f.c = true;
        self.f.h = false;
        self.f.n = false;
        self.set_xy(self.a);
    }

    pub(super) fn ccf(&mut self) {
        self.f.h = self.f.c;
        self.f.c = !self.f.c;
        self.f.n = false;
        self.set_xy(self.a);
    }

    pub(super) fn neg(&mut self) {
        let a = self.a;
        self.a = self.sub8(0, a, false);
    }

    pub(super) fn ex_af(&mut self) {
        std::mem::swap(&mut self.a, &mut self.a_alt);
        std::mem::swap(&mut self.f, &mut self.f_alt);
    }

    pub(super) fn exx(&mut self) {
        std::mem::swap(&mut self.b, &mut self.b_alt);
        std::mem::swap(&mut self.c, &mut self.c_alt);
        std::mem::swap(&mut self.d, &mut self.d_alt);
        std::mem::swap(&mut self.e, &mut self.e_alt);
        std::mem::swap(&mut self.h, &mut self.h_alt);
        std::mem::swap(&mut self.l, &mut self.l_alt);
    }
}
