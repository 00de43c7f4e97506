//! Z80 instruction handlers and dispatch table construction
//!
//! Handlers take the CPU as an explicit receiver plus the opcode byte that
//! selected them, decode their operand fields from that byte, and return the
//! full cycle count. Handlers that touch HL consult the active index mode so
//! the same routine serves the `DD`/`FD` table; the prefix itself adds 4.

use super::{AluOp, BlockOp, BusZ80, Handler, IndexMode, ShiftMode, Z80};
use crate::cpu::dispatch::OpcodeTable;
use crate::cpu::parity;
use crate::{CpuKind, EmulationError, EmulationResult};

type Op = EmulationResult<u32>;

// ============================================================================
// Table construction
// ============================================================================

pub(super) fn main_table<B: BusZ80>() -> OpcodeTable<Handler<B>> {
    let mut t = OpcodeTable::new(8, invalid as Handler<B>);

    t.install("00 000 000", "nop", nop);
    t.install("00 001 000", "ex af,af'", ex_af);
    t.install("00 010 000", "djnz", djnz);
    t.install("00 011 000", "jr", jr);
    t.install("001 -- 000", "jr cc", jr_cc);

    t.install("00 --0 001", "ld rr,nn", ld_rr_nn);
    t.install("00 --1 001", "add hl,rr", add_hl_rr);

    t.install("00 0-0 010", "ld (rr),a", ld_ind_a);
    t.install("00 0-1 010", "ld a,(rr)", ld_a_ind);
    t.install("00 100 010", "ld (nn),hl", ld_nn_hl);
    t.install("00 101 010", "ld hl,(nn)", ld_hl_nn);
    t.install("00 110 010", "ld (nn),a", ld_nn_a);
    t.install("00 111 010", "ld a,(nn)", ld_a_nn);

    t.install("00 --0 011", "inc rr", inc_rr);
    t.install("00 --1 011", "dec rr", dec_rr);
    t.install("00 --- 100", "inc r", inc_r);
    t.install("00 --- 101", "dec r", dec_r);
    t.install("00 --- 110", "ld r,n", ld_r_n);

    t.install("000 -- 111", "rotate a", rotate_a);
    t.install("00 100 111", "daa", daa);
    t.install("00 101 111", "cpl", cpl);
    t.install("00 110 111", "scf", scf);
    t.install("00 111 111", "ccf", ccf);

    t.install("01 --- ---", "ld r,r'", ld_r_r);
    t.install("01 110 110", "halt", halt);
    t.install("10 --- ---", "alu a,r", alu_r);

    t.install("11 --- 000", "ret cc", ret_cc);
    t.install("11 --0 001", "pop", pop);
    t.install("11 001 001", "ret", ret);
    t.install("11 011 001", "exx", exx);
    t.install("11 101 001", "jp (hl)", jp_hl);
    t.install("11 111 001", "ld sp,hl", ld_sp_hl);
    t.install("11 --- 010", "jp cc", jp_cc);
    t.install("11 000 011", "jp", jp);
    t.install("11 001 011", "prefix cb", prefix_cb);
    t.install("11 010 011", "out (n),a", out_n_a);
    t.install("11 011 011", "in a,(n)", in_a_n);
    t.install("11 100 011", "ex (sp),hl", ex_sp_hl);
    t.install("11 101 011", "ex de,hl", ex_de_hl);
    t.install("11 110 011", "di", di);
    t.install("11 111 011", "ei", ei);
    t.install("11 --- 100", "call cc", call_cc);
    t.install("11 --0 101", "push", push);
    t.install("11 001 101", "call", call);
    t.install("11 011 101", "prefix dd", prefix_index);
    t.install("11 101 101", "prefix ed", prefix_ed);
    t.install("11 111 101", "prefix fd", prefix_index);
    t.install("11 --- 110", "alu a,n", alu_n);
    t.install("11 --- 111", "rst", rst);

    t
}

pub(super) fn cb_table<B: BusZ80>() -> OpcodeTable<Handler<B>> {
    let mut t = OpcodeTable::new(8, invalid as Handler<B>);

    t.install("00 --- ---", "shift", cb_shift);
    t.install("01 --- ---", "bit", cb_bit);
    t.install("10 --- ---", "res", cb_res);
    t.install("11 --- ---", "set", cb_set);

    t
}

pub(super) fn ed_table<B: BusZ80>() -> OpcodeTable<Handler<B>> {
    let mut t = OpcodeTable::new(8, invalid_ed as Handler<B>);

    t.install("01 --- 000", "in r,(c)", in_r_c);
    t.install("01 --- 001", "out (c),r", out_c_r);
    t.install("01 --0 010", "sbc hl,rr", sbc_hl);
    t.install("01 --1 010", "adc hl,rr", adc_hl);
    t.install("01 --0 011", "ld (nn),rr", ld_nn_rr);
    t.install("01 --1 011", "ld rr,(nn)", ld_rr_nn_ind);
    t.install("01 --- 100", "neg", neg);
    t.install("01 --- 101", "retn", retn);
    t.install("01 --- 110", "im", im);
    t.install("01 000 111", "ld i,a", ld_i_a);
    t.install("01 001 111", "ld r,a", ld_r_a);
    t.install("01 010 111", "ld a,i", ld_a_i);
    t.install("01 011 111", "ld a,r", ld_a_r);
    t.install("01 100 111", "rrd", rrd);
    t.install("01 101 111", "rld", rld);
    t.install("101 - - 0 --", "block", block);

    t
}

/// Opcodes that behave differently after `DD`/`FD`. Anything else runs as
/// the unprefixed instruction.
pub(super) fn indexed_table<B: BusZ80>() -> OpcodeTable<Handler<B>> {
    let mut t = OpcodeTable::new(8, unprefixed as Handler<B>);

    t.install("00 --1 001", "add ix,rr", add_hl_rr);
    t.install("00 100 001", "ld ix,nn", ld_rr_nn);
    t.install("00 100 010", "ld (nn),ix", ld_nn_hl);
    t.install("00 101 010", "ld ix,(nn)", ld_hl_nn);
    t.install("00 100 011", "inc ix", inc_rr);
    t.install("00 101 011", "dec ix", dec_rr);

    t.install("00 10- 100", "inc ixh/ixl", inc_r);
    t.install("00 110 100", "inc (ix+d)", inc_r);
    t.install("00 10- 101", "dec ixh/ixl", dec_r);
    t.install("00 110 101", "dec (ix+d)", dec_r);
    t.install("00 10- 110", "ld ixh/ixl,n", ld_r_n);
    t.install("00 110 110", "ld (ix+d),n", ld_r_n);

    t.install("01 10- ---", "ld ixh/ixl,r", ld_r_r);
    t.install("01 110 ---", "ld (ix+d),r", ld_r_r);
    t.install("01 --- 10-", "ld r,ixh/ixl", ld_r_r);
    t.install("01 --- 110", "ld r,(ix+d)", ld_r_r);
    t.install("01 110 110", "halt", halt);

    t.install("10 --- 10-", "alu a,ixh/ixl", alu_r);
    t.install("10 --- 110", "alu a,(ix+d)", alu_r);

    t.install("11 001 011", "prefix ddcb", prefix_cb);
    t.install("11 100 001", "pop ix", pop);
    t.install("11 100 101", "push ix", push);
    t.install("11 100 011", "ex (sp),ix", ex_sp_hl);
    t.install("11 101 001", "jp (ix)", jp_hl);
    t.install("11 111 001", "ld sp,ix", ld_sp_hl);
    t.install("11 -11 101", "prefix chain", chained_prefix);

    t
}

// ============================================================================
// Prefixes and fallbacks
// ============================================================================

fn invalid<B: BusZ80>(_cpu: &mut Z80<B>, op: u8) -> Op {
    Err(EmulationError::UnknownOpcode { cpu: CpuKind::Z80, opcode: op as u32 })
}

fn invalid_ed<B: BusZ80>(_cpu: &mut Z80<B>, op: u8) -> Op {
    Err(EmulationError::UnknownOpcode { cpu: CpuKind::Z80, opcode: 0xED00 | op as u32 })
}

fn prefix_index<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    cpu.index = if op == 0xDD { IndexMode::Ix } else { IndexMode::Iy };
    let next = cpu.fetch_opcode();
    let handler = cpu.indexed.handler(next as u32);
    let result = handler(cpu, next);
    cpu.index = IndexMode::Hl;
    result.map(|cycles| cycles + 4)
}

/// The prefix had no effect: run the plain instruction
fn unprefixed<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    cpu.index = IndexMode::Hl;
    let handler = cpu.main.handler(op as u32);
    handler(cpu, op)
}

/// `DD DD`, `DD FD` and friends: the first prefix is spent, the second is
/// fetched again by the next step with interrupts still held off.
fn chained_prefix<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.pc = cpu.pc.wrapping_sub(1);
    cpu.r = (cpu.r & 0x80) | (cpu.r.wrapping_sub(1) & 0x7F);
    cpu.prefix_delay = true;
    Ok(0)
}

fn prefix_ed<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    let op = cpu.fetch_opcode();
    let handler = cpu.ed.handler(op as u32);
    handler(cpu, op)
}

/// `CB op`, or `DD CB d op` where the displacement precedes the opcode
fn prefix_cb<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    let op = if cpu.index == IndexMode::Hl {
        cpu.fetch_opcode()
    } else {
        cpu.operand_addr();
        cpu.fetch()
    };
    let handler = cpu.cb.handler(op as u32);
    handler(cpu, op)
}

// ============================================================================
// Loads
// ============================================================================

fn nop<B: BusZ80>(_cpu: &mut Z80<B>, _op: u8) -> Op {
    Ok(4)
}

fn ld_r_r<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let dst = (op >> 3) & 7;
    let src = op & 7;

    if src == 6 {
        let addr = cpu.operand_addr();
        let val = cpu.read8(addr);
        // H/L stay H/L when the other operand is (IX+d)
        cpu.set_reg8_in(dst, IndexMode::Hl, val);
        Ok(7 + cpu.index_penalty())
    } else if dst == 6 {
        let addr = cpu.operand_addr();
        let val = cpu.reg8_in(src, IndexMode::Hl);
        cpu.write8(addr, val);
        Ok(7 + cpu.index_penalty())
    } else {
        let val = cpu.reg8(src);
        cpu.set_reg8(dst, val);
        Ok(4)
    }
}

fn ld_r_n<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let r = (op >> 3) & 7;
    if r == 6 {
        let addr = cpu.operand_addr();
        let n = cpu.fetch();
        cpu.write8(addr, n);
        // Displacement add overlaps the immediate fetch
        Ok(if cpu.index == IndexMode::Hl { 10 } else { 15 })
    } else {
        let n = cpu.fetch();
        cpu.set_reg8(r, n);
        Ok(7)
    }
}

fn ld_rr_nn<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let nn = cpu.fetch16();
    cpu.set_rp(op >> 4, nn);
    Ok(10)
}

/// `LD (BC),A` / `LD (DE),A`
fn ld_ind_a<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let addr = if op & 0x10 != 0 { cpu.de() } else { cpu.bc() };
    cpu.write8(addr, cpu.a);
    cpu.wz = ((cpu.a as u16) << 8) | (addr.wrapping_add(1) & 0xFF);
    Ok(7)
}

/// `LD A,(BC)` / `LD A,(DE)`
fn ld_a_ind<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let addr = if op & 0x10 != 0 { cpu.de() } else { cpu.bc() };
    cpu.a = cpu.read8(addr);
    cpu.wz = addr.wrapping_add(1);
    Ok(7)
}

fn ld_nn_hl<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    let nn = cpu.fetch16();
    cpu.write16(nn, cpu.index_reg());
    cpu.wz = nn.wrapping_add(1);
    Ok(16)
}

fn ld_hl_nn<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    let nn = cpu.fetch16();
    let val = cpu.read16(nn);
    cpu.set_index_reg(val);
    cpu.wz = nn.wrapping_add(1);
    Ok(16)
}

fn ld_nn_a<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    let nn = cpu.fetch16();
    cpu.write8(nn, cpu.a);
    cpu.wz = ((cpu.a as u16) << 8) | (nn.wrapping_add(1) & 0xFF);
    Ok(13)
}

fn ld_a_nn<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    let nn = cpu.fetch16();
    cpu.a = cpu.read8(nn);
    cpu.wz = nn.wrapping_add(1);
    Ok(13)
}

fn ld_sp_hl<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.sp = cpu.index_reg();
    Ok(6)
}

fn push<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let val = cpu.rp2(op >> 4);
    cpu.push(val);
    Ok(11)
}

fn pop<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let val = cpu.pop();
    cpu.set_rp2(op >> 4, val);
    Ok(10)
}

fn ex_af<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.ex_af();
    Ok(4)
}

fn exx<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.exx();
    Ok(4)
}

/// Always DE and HL, even under a prefix
fn ex_de_hl<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    std::mem::swap(&mut cpu.d, &mut cpu.h);
    std::mem::swap(&mut cpu.e, &mut cpu.l);
    Ok(4)
}

fn ex_sp_hl<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    let sp = cpu.sp;
    let val = cpu.read16(sp);
    cpu.write16(sp, cpu.index_reg());
    cpu.set_index_reg(val);
    cpu.wz = val;
    Ok(19)
}

// ============================================================================
// Arithmetic and logic
// ============================================================================

fn alu_r<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let kind = AluOp::from_code(op >> 3);
    let r = op & 7;
    if r == 6 {
        let addr = cpu.operand_addr();
        let val = cpu.read8(addr);
        cpu.alu(kind, val);
        Ok(7 + cpu.index_penalty())
    } else {
        let val = cpu.reg8(r);
        cpu.alu(kind, val);
        Ok(4)
    }
}

fn alu_n<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let n = cpu.fetch();
    cpu.alu(AluOp::from_code(op >> 3), n);
    Ok(7)
}

fn inc_r<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let r = (op >> 3) & 7;
    if r == 6 {
        let addr = cpu.operand_addr();
        let val = cpu.read8(addr);
        let result = cpu.inc8(val);
        cpu.write8(addr, result);
        Ok(11 + cpu.index_penalty())
    } else {
        let result = cpu.inc8(cpu.reg8(r));
        cpu.set_reg8(r, result);
        Ok(4)
    }
}

fn dec_r<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let r = (op >> 3) & 7;
    if r == 6 {
        let addr = cpu.operand_addr();
        let val = cpu.read8(addr);
        let result = cpu.dec8(val);
        cpu.write8(addr, result);
        Ok(11 + cpu.index_penalty())
    } else {
        let result = cpu.dec8(cpu.reg8(r));
        cpu.set_reg8(r, result);
        Ok(4)
    }
}

/// 16-bit increment; no flags change
fn inc_rr<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let p = op >> 4;
    cpu.set_rp(p, cpu.rp(p).wrapping_add(1));
    Ok(6)
}

/// 16-bit decrement; no flags change
fn dec_rr<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let p = op >> 4;
    cpu.set_rp(p, cpu.rp(p).wrapping_sub(1));
    Ok(6)
}

fn add_hl_rr<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let base = cpu.index_reg();
    let val = cpu.rp(op >> 4);
    cpu.wz = base.wrapping_add(1);
    let result = cpu.add16(base, val);
    cpu.set_index_reg(result);
    Ok(11)
}

fn rotate_a<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let mode = match (op >> 3) & 3 {
        0 => ShiftMode::RLC,
        1 => ShiftMode::RRC,
        2 => ShiftMode::RL,
        _ => ShiftMode::RR,
    };
    cpu.shift_a(mode);
    Ok(4)
}

fn daa<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.daa();
    Ok(4)
}

fn cpl<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.cpl();
    Ok(4)
}

fn scf<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.scf();
    Ok(4)
}

fn ccf<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.ccf();
    Ok(4)
}

// ============================================================================
// Control flow
// ============================================================================

fn jp<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.pc = cpu.fetch16();
    cpu.wz = cpu.pc;
    Ok(10)
}

/// The target is latched into WZ whether or not the jump is taken
fn jp_cc<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let target = cpu.fetch16();
    cpu.wz = target;
    if cpu.condition(op >> 3) {
        cpu.pc = target;
    }
    Ok(10)
}

fn jp_hl<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.pc = cpu.index_reg();
    Ok(4)
}

/// PC-relative target of a signed displacement byte
fn relative_target<B: BusZ80>(cpu: &mut Z80<B>) -> u16 {
    let d = cpu.fetch() as i8;
    cpu.pc.wrapping_add(d as u16)
}

fn jr<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.pc = relative_target(cpu);
    cpu.wz = cpu.pc;
    Ok(12)
}

fn jr_cc<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let target = relative_target(cpu);
    cpu.wz = target;
    if cpu.condition((op >> 3) & 3) {
        cpu.pc = target;
        Ok(12)
    } else {
        Ok(7)
    }
}

fn djnz<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    let target = relative_target(cpu);
    cpu.wz = target;
    cpu.b = cpu.b.wrapping_sub(1);
    if cpu.b != 0 {
        cpu.pc = target;
        Ok(13)
    } else {
        Ok(8)
    }
}

fn call<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    let target = cpu.fetch16();
    cpu.wz = target;
    cpu.push(cpu.pc);
    cpu.pc = target;
    Ok(17)
}

fn call_cc<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let target = cpu.fetch16();
    cpu.wz = target;
    if !cpu.condition(op >> 3) {
        return Ok(10);
    }
    cpu.push(cpu.pc);
    cpu.pc = target;
    Ok(17)
}

fn ret<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.pc = cpu.pop();
    cpu.wz = cpu.pc;
    Ok(10)
}

fn ret_cc<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    if !cpu.condition(op >> 3) {
        return Ok(5);
    }
    cpu.pc = cpu.pop();
    cpu.wz = cpu.pc;
    Ok(11)
}

fn rst<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    cpu.push(cpu.pc);
    cpu.pc = (op & 0x38) as u16;
    cpu.wz = cpu.pc;
    Ok(11)
}

fn halt<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.halted = true;
    Ok(4)
}

fn di<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.iff1 = false;
    cpu.iff2 = false;
    Ok(4)
}

fn ei<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.iff1 = true;
    cpu.iff2 = true;
    cpu.ei_delay = true;
    Ok(4)
}

// ============================================================================
// I/O
// ============================================================================

fn out_n_a<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    let n = cpu.fetch();
    let port = ((cpu.a as u16) << 8) | n as u16;
    cpu.bus.io_write(port, cpu.a);
    cpu.wz = ((cpu.a as u16) << 8) | (n.wrapping_add(1) as u16);
    Ok(11)
}

fn in_a_n<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    let n = cpu.fetch();
    let port = ((cpu.a as u16) << 8) | n as u16;
    cpu.a = cpu.bus.io_read(port);
    cpu.wz = port.wrapping_add(1);
    Ok(11)
}

/// `IN r,(C)`; code 6 only sets flags
fn in_r_c<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let r = (op >> 3) & 7;
    let port = cpu.bc();
    let val = cpu.bus.io_read(port);
    cpu.wz = port.wrapping_add(1);

    cpu.set_szxy(val);
    cpu.f.h = false;
    cpu.f.n = false;
    cpu.f.pv = parity(val);
    if r != 6 {
        cpu.set_reg8_in(r, IndexMode::Hl, val);
    }
    Ok(12)
}

/// `OUT (C),r`; code 6 writes zero
fn out_c_r<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let r = (op >> 3) & 7;
    let val = if r == 6 { 0 } else { cpu.reg8_in(r, IndexMode::Hl) };
    let port = cpu.bc();
    cpu.bus.io_write(port, val);
    cpu.wz = port.wrapping_add(1);
    Ok(12)
}

// ============================================================================
// ED group
// ============================================================================

fn sbc_hl<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let hl = cpu.hl();
    let val = cpu.rp(op >> 4);
    cpu.wz = hl.wrapping_add(1);
    let result = cpu.sbc16(hl, val);
    cpu.set_hl(result);
    Ok(15)
}

fn adc_hl<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let hl = cpu.hl();
    let val = cpu.rp(op >> 4);
    cpu.wz = hl.wrapping_add(1);
    let result = cpu.adc16(hl, val);
    cpu.set_hl(result);
    Ok(15)
}

fn ld_nn_rr<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let nn = cpu.fetch16();
    cpu.write16(nn, cpu.rp(op >> 4));
    cpu.wz = nn.wrapping_add(1);
    Ok(20)
}

fn ld_rr_nn_ind<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let nn = cpu.fetch16();
    let val = cpu.read16(nn);
    cpu.set_rp(op >> 4, val);
    cpu.wz = nn.wrapping_add(1);
    Ok(20)
}

fn neg<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.neg();
    Ok(8)
}

/// `RETN` and `RETI` both copy IFF2 back into IFF1
fn retn<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.pc = cpu.pop();
    cpu.wz = cpu.pc;
    cpu.iff1 = cpu.iff2;
    Ok(14)
}

fn im<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    cpu.im = match (op >> 3) & 3 {
        2 => 1,
        3 => 2,
        _ => 0,
    };
    Ok(8)
}

fn ld_i_a<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.i = cpu.a;
    Ok(9)
}

fn ld_r_a<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    cpu.r = cpu.a;
    Ok(9)
}

/// `LD A,I` / `LD A,R` report IFF2 in P/V
fn load_a_special<B: BusZ80>(cpu: &mut Z80<B>, val: u8) {
    cpu.a = val;
    cpu.set_szxy(val);
    cpu.f.h = false;
    cpu.f.n = false;
    cpu.f.pv = cpu.iff2;
}

fn ld_a_i<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    let i = cpu.i;
    load_a_special(cpu, i);
    Ok(9)
}

fn ld_a_r<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    let r = cpu.r;
    load_a_special(cpu, r);
    Ok(9)
}

fn digit_flags<B: BusZ80>(cpu: &mut Z80<B>) {
    let a = cpu.a;
    cpu.set_szxy(a);
    cpu.f.h = false;
    cpu.f.n = false;
    cpu.f.pv = parity(a);
}

/// Rotate the low nibble of A and (HL) right as one 12-bit value
fn rrd<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    let addr = cpu.hl();
    let mem = cpu.read8(addr);
    cpu.write8(addr, (cpu.a << 4) | (mem >> 4));
    cpu.a = (cpu.a & 0xF0) | (mem & 0x0F);
    digit_flags(cpu);
    cpu.wz = addr.wrapping_add(1);
    Ok(18)
}

fn rld<B: BusZ80>(cpu: &mut Z80<B>, _op: u8) -> Op {
    let addr = cpu.hl();
    let mem = cpu.read8(addr);
    cpu.write8(addr, (mem << 4) | (cpu.a & 0x0F));
    cpu.a = (cpu.a & 0xF0) | (mem >> 4);
    digit_flags(cpu);
    cpu.wz = addr.wrapping_add(1);
    Ok(18)
}

fn block<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    Ok(cpu.block(BlockOp::from_opcode(op)))
}

// ============================================================================
// CB group
// ============================================================================

/// Operand of a `CB` instruction: a register, `(HL)`, or the `(IX+d)`
/// address already latched in WZ by the `DD CB` prefix
fn cb_read<B: BusZ80>(cpu: &mut Z80<B>, r: u8) -> (Option<u16>, u8) {
    if cpu.index != IndexMode::Hl {
        let addr = cpu.wz;
        (Some(addr), cpu.read8(addr))
    } else if r == 6 {
        let addr = cpu.hl();
        (Some(addr), cpu.read8(addr))
    } else {
        (None, cpu.reg8(r))
    }
}

/// Store a `CB` result. The indexed forms also copy it into register `r`.
fn cb_write<B: BusZ80>(cpu: &mut Z80<B>, r: u8, addr: Option<u16>, val: u8) {
    match addr {
        Some(addr) => {
            cpu.write8(addr, val);
            if cpu.index != IndexMode::Hl && r != 6 {
                cpu.set_reg8_in(r, IndexMode::Hl, val);
            }
        }
        None => cpu.set_reg8(r, val),
    }
}

/// Register / `(HL)` / `(IX+d)` cost, excluding the index prefix
fn cb_cycles<B: BusZ80>(cpu: &Z80<B>, r: u8, reg: u32, hl: u32, indexed: u32) -> u32 {
    if cpu.index != IndexMode::Hl {
        indexed
    } else if r == 6 {
        hl
    } else {
        reg
    }
}

fn cb_shift<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let r = op & 7;
    let (addr, val) = cb_read(cpu, r);
    let result = cpu.shift(val, ShiftMode::from_code(op >> 3));
    cb_write(cpu, r, addr, result);
    Ok(cb_cycles(cpu, r, 8, 15, 19))
}

fn cb_bit<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let r = op & 7;
    let (addr, val) = cb_read(cpu, r);
    cpu.bit_test((op >> 3) & 7, val);
    // Memory forms leak the latch's high byte into X/Y
    match addr {
        Some(_) => cpu.set_xy((cpu.wz >> 8) as u8),
        None => cpu.set_xy(val),
    }
    Ok(cb_cycles(cpu, r, 8, 12, 16))
}

fn cb_res<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let r = op & 7;
    let (addr, val) = cb_read(cpu, r);
    cb_write(cpu, r, addr, val & !(1 << ((op >> 3) & 7)));
    Ok(cb_cycles(cpu, r, 8, 15, 19))
}

fn cb_set<B: BusZ80>(cpu: &mut Z80<B>, op: u8) -> Op {
    let r = op & 7;
    let (addr, val) = cb_read(cpu, r);
    cb_write(cpu, r, addr, val | (1 << ((op >> 3) & 7)));
    Ok(cb_cycles(cpu, r, 8, 15, 19))
}
