//! 68000 instruction handlers and dispatch table construction

use tracing::debug;

use super::{Bus68k, Handler, M68k, Size, Vector};
use crate::cpu::dispatch::OpcodeTable;
use crate::{CpuKind, EmulationError, EmulationResult};

type Op = EmulationResult<u32>;

pub(super) fn build_table<B: Bus68k>() -> OpcodeTable<Handler<B>> {
    let mut t = OpcodeTable::new(16, invalid as Handler<B>);

    // Immediate to CCR/SR
    t.install("0000 0000 0011 1100", "ori to ccr", ori_ccr);
    t.install("0000 0000 0111 1100", "ori to sr", ori_sr);
    t.install("0000 0010 0011 1100", "andi to ccr", andi_ccr);
    t.install("0000 0010 0111 1100", "andi to sr", andi_sr);
    t.install("0000 1010 0011 1100", "eori to ccr", eori_ccr);
    t.install("0000 1010 0111 1100", "eori to sr", eori_sr);

    // Miscellaneous
    t.install("0100 0000 1100 0---", "move from sr", move_from_sr);
    t.install("0100 0100 1100 0---", "move to ccr", move_to_ccr);
    t.install("0100 0110 1100 0---", "move to sr", move_to_sr);
    t.install("0100 0010 0-00 0---", "clr", clr);
    t.install("0100 0010 1000 0---", "clr", clr);
    t.install("0100 1010 0-00 0---", "tst", tst);
    t.install("0100 1010 1000 0---", "tst", tst);
    t.install("0100 1000 0100 0---", "swap", swap);
    t.install("0100 1000 1-00 0---", "ext", ext);
    t.install("0100 1010 1111 1100", "illegal", illegal);
    t.install("0100 1110 0100 ----", "trap", trap);
    t.install("0100 1110 0110 ----", "move usp", move_usp);
    t.install("0100 1110 0111 0000", "reset", reset);
    t.install("0100 1110 0111 0001", "nop", nop);
    t.install("0100 1110 0111 0010", "stop", stop);
    t.install("0100 1110 0111 0011", "rte", rte);
    t.install("0100 1110 0111 0101", "rts", rts);
    t.install("0100 1110 0111 0110", "trapv", trapv);
    t.install("0100 1110 0111 0111", "rtr", rtr);
    t.install("0100 1110 1011 1001", "jsr", jsr_abs);
    t.install("0100 1110 1111 1001", "jmp", jmp_abs);
    t.install("0100 ---1 1111 1001", "lea", lea_abs);

    // Quick arithmetic and loops
    t.install("0101 ---- 0-00 0---", "addq/subq", addq_subq);
    t.install("0101 ---- 1000 0---", "addq/subq", addq_subq);
    t.install("0101 ---- 1100 1---", "dbcc", dbcc);

    // Branches
    t.install("0110 ---- ---- ----", "bcc", bcc);
    t.install("0111 ---0 ---- ----", "moveq", moveq);

    // Unimplemented instruction lines
    t.install("1010 ---- ---- ----", "line a", line_a);
    t.install("1111 ---- ---- ----", "line f", line_f);

    t
}

fn invalid<B: Bus68k>(_cpu: &mut M68k<B>, op: u16) -> Op {
    Err(EmulationError::UnknownOpcode { cpu: CpuKind::M68k, opcode: op as u32 })
}

fn data_reg(op: u16) -> usize {
    (op & 7) as usize
}

/// Register number in bits 11-9
fn upper_reg(op: u16) -> usize {
    ((op >> 9) & 7) as usize
}

// ============================================================================
// Status register
// ============================================================================

fn ori_ccr<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    let imm = cpu.fetch16() as u8;
    let ccr = cpu.sr.ccr() | imm;
    cpu.sr.set_ccr(ccr);
    Ok(20)
}

fn andi_ccr<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    let imm = cpu.fetch16() as u8;
    let ccr = cpu.sr.ccr() & imm;
    cpu.sr.set_ccr(ccr);
    Ok(20)
}

fn eori_ccr<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    let imm = cpu.fetch16() as u8;
    let ccr = cpu.sr.ccr() ^ imm;
    cpu.sr.set_ccr(ccr);
    Ok(20)
}

fn ori_sr<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    if !cpu.sr.s {
        return cpu.privilege_violation();
    }
    let imm = cpu.fetch16();
    cpu.set_sr(cpu.sr.to_u16() | imm);
    Ok(20)
}

fn andi_sr<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    if !cpu.sr.s {
        return cpu.privilege_violation();
    }
    let imm = cpu.fetch16();
    cpu.set_sr(cpu.sr.to_u16() & imm);
    Ok(20)
}

fn eori_sr<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    if !cpu.sr.s {
        return cpu.privilege_violation();
    }
    let imm = cpu.fetch16();
    cpu.set_sr(cpu.sr.to_u16() ^ imm);
    Ok(20)
}

/// Not privileged on the 68000
fn move_from_sr<B: Bus68k>(cpu: &mut M68k<B>, op: u16) -> Op {
    let sr = cpu.sr.to_u16() as u32;
    cpu.set_d(data_reg(op), sr, Size::Word);
    Ok(6)
}

fn move_to_ccr<B: Bus68k>(cpu: &mut M68k<B>, op: u16) -> Op {
    let val = cpu.d[data_reg(op)] as u8;
    cpu.sr.set_ccr(val);
    Ok(12)
}

fn move_to_sr<B: Bus68k>(cpu: &mut M68k<B>, op: u16) -> Op {
    if !cpu.sr.s {
        return cpu.privilege_violation();
    }
    let val = cpu.d[data_reg(op)] as u16;
    cpu.set_sr(val);
    Ok(12)
}

/// `MOVE An,USP` when bit 3 is clear, `MOVE USP,An` when set
fn move_usp<B: Bus68k>(cpu: &mut M68k<B>, op: u16) -> Op {
    if !cpu.sr.s {
        return cpu.privilege_violation();
    }
    let reg = data_reg(op);
    if op & 0x08 != 0 {
        cpu.a[reg] = cpu.user_sp();
    } else {
        let val = cpu.a[reg];
        cpu.set_user_sp(val);
    }
    Ok(4)
}

// ============================================================================
// Data register operations
// ============================================================================

fn size_of(op: u16) -> Size {
    // Masks only install the three valid size encodings
    Size::from_bits(op >> 6).unwrap_or(Size::Long)
}

fn clr<B: Bus68k>(cpu: &mut M68k<B>, op: u16) -> Op {
    let size = size_of(op);
    cpu.set_d(data_reg(op), 0, size);
    cpu.set_logic_flags(0, size);
    Ok(if size == Size::Long { 6 } else { 4 })
}

fn tst<B: Bus68k>(cpu: &mut M68k<B>, op: u16) -> Op {
    let val = cpu.d[data_reg(op)];
    cpu.set_logic_flags(val, size_of(op));
    Ok(4)
}

fn swap<B: Bus68k>(cpu: &mut M68k<B>, op: u16) -> Op {
    let reg = data_reg(op);
    let val = cpu.d[reg].rotate_left(16);
    cpu.d[reg] = val;
    cpu.set_logic_flags(val, Size::Long);
    Ok(4)
}

/// `EXT.W` sign-extends byte to word, `EXT.L` word to long
fn ext<B: Bus68k>(cpu: &mut M68k<B>, op: u16) -> Op {
    let reg = data_reg(op);
    if op & 0x0040 != 0 {
        let val = cpu.d[reg] as u16 as i16 as i32 as u32;
        cpu.d[reg] = val;
        cpu.set_logic_flags(val, Size::Long);
    } else {
        let val = cpu.d[reg] as u8 as i8 as i16 as u16 as u32;
        cpu.set_d(reg, val, Size::Word);
        cpu.set_logic_flags(val, Size::Word);
    }
    Ok(4)
}

fn moveq<B: Bus68k>(cpu: &mut M68k<B>, op: u16) -> Op {
    let val = op as u8 as i8 as i32 as u32;
    cpu.d[upper_reg(op)] = val;
    cpu.set_logic_flags(val, Size::Long);
    Ok(4)
}

/// `ADDQ`/`SUBQ #1-8,Dn`; bit 8 selects subtraction and a data field of 0
/// means 8
fn addq_subq<B: Bus68k>(cpu: &mut M68k<B>, op: u16) -> Op {
    let size = size_of(op);
    let reg = data_reg(op);
    let src = match (op >> 9) & 7 {
        0 => 8,
        n => n as u32,
    };
    let mask = size.mask();
    let dst = cpu.d[reg] & mask;

    let result = if op & 0x0100 != 0 {
        let result = dst.wrapping_sub(src) & mask;
        cpu.sr.c = src > dst;
        cpu.sr.v = (src ^ dst) & (result ^ dst) & size.msb() != 0;
        result
    } else {
        let result = dst.wrapping_add(src) & mask;
        cpu.sr.c = dst as u64 + src as u64 > mask as u64;
        cpu.sr.v = (src ^ result) & (dst ^ result) & size.msb() != 0;
        result
    };
    cpu.sr.x = cpu.sr.c;
    cpu.sr.n = result & size.msb() != 0;
    cpu.sr.z = result == 0;
    cpu.set_d(reg, result, size);
    Ok(if size == Size::Long { 8 } else { 4 })
}

// ============================================================================
// Program control
// ============================================================================

fn nop<B: Bus68k>(_cpu: &mut M68k<B>, _op: u16) -> Op {
    Ok(4)
}

/// Asserts the external reset line; no attached device listens to it
fn reset<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    if !cpu.sr.s {
        return cpu.privilege_violation();
    }
    debug!(pc = cpu.instr_pc, "68000 RESET instruction");
    Ok(132)
}

fn stop<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    if !cpu.sr.s {
        return cpu.privilege_violation();
    }
    let imm = cpu.fetch16();
    cpu.set_sr(imm);
    cpu.stopped = true;
    Ok(4)
}

fn rte<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    if !cpu.sr.s {
        return cpu.privilege_violation();
    }
    let sr = cpu.pop16();
    cpu.pc = cpu.pop32();
    cpu.set_sr(sr);
    Ok(20)
}

fn rts<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    cpu.pc = cpu.pop32();
    Ok(16)
}

fn rtr<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    let ccr = cpu.pop16() as u8;
    cpu.sr.set_ccr(ccr);
    cpu.pc = cpu.pop32();
    Ok(20)
}

fn trapv<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    if cpu.sr.v {
        cpu.exception(Vector::Trapv)
    } else {
        Ok(4)
    }
}

/// `TRAP #n` jumps through vector 32 + n
fn trap<B: Bus68k>(cpu: &mut M68k<B>, op: u16) -> Op {
    let vector = Vector::trap_instruction((op & 0xF) as u8)?;
    cpu.exception(vector)
}

fn illegal<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    cpu.fault(Vector::IllegalInstruction)
}

fn line_a<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    cpu.fault(Vector::LineA)
}

fn line_f<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    cpu.fault(Vector::LineF)
}

fn jmp_abs<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    cpu.pc = cpu.fetch32();
    Ok(12)
}

fn jsr_abs<B: Bus68k>(cpu: &mut M68k<B>, _op: u16) -> Op {
    let target = cpu.fetch32();
    let ret = cpu.pc;
    cpu.push32(ret);
    cpu.pc = target;
    Ok(20)
}

fn lea_abs<B: Bus68k>(cpu: &mut M68k<B>, op: u16) -> Op {
    let addr = cpu.fetch32();
    cpu.a[upper_reg(op)] = addr;
    Ok(12)
}

/// `Bcc`, `BRA` (condition true) and `BSR` (condition false). A zero 8-bit
/// displacement means a 16-bit displacement word follows.
fn bcc<B: Bus68k>(cpu: &mut M68k<B>, op: u16) -> Op {
    let cond = (op >> 8) & 0xF;
    let base = cpu.pc;
    let short = op as u8;
    let disp = if short == 0 {
        cpu.fetch16() as i16 as i32
    } else {
        short as i8 as i32
    };
    let target = base.wrapping_add(disp as u32);

    if cond == 1 {
        let ret = cpu.pc;
        cpu.push32(ret);
        cpu.pc = target;
        return Ok(18);
    }

    if cpu.condition(cond) {
        cpu.pc = target;
        Ok(10)
    } else if short == 0 {
        Ok(12)
    } else {
        Ok(8)
    }
}

/// Decrement and branch until the condition holds or the low word of Dn
/// reaches -1
fn dbcc<B: Bus68k>(cpu: &mut M68k<B>, op: u16) -> Op {
    let base = cpu.pc;
    let disp = cpu.fetch16() as i16 as i32;

    if cpu.condition((op >> 8) & 0xF) {
        return Ok(12);
    }

    let reg = data_reg(op);
    let count = (cpu.d[reg] as u16).wrapping_sub(1);
    cpu.set_d(reg, count as u32, Size::Word);
    if count == 0xFFFF {
        Ok(14)
    } else {
        cpu.pc = base.wrapping_add(disp as u32);
        Ok(10)
    }
}
