use super::*;
use crate::{CpuKind, EmulationError};

struct TestBus {
    ram: Vec<u8>,
    port_value: u8,
    port_writes: Vec<(u16, u8)>,
}

impl TestBus {
    fn new() -> Self {
        Self {
            ram: vec![0; 0x10000],
            port_value: 0xFF,
            port_writes: Vec::new(),
        }
    }
}

impl BusZ80 for TestBus {
    fn read(&mut self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    fn write(&mut self, addr: u16, data: u8) {
        self.ram[addr as usize] = data;
    }

    fn io_read(&mut self, _port: u16) -> u8 {
        self.port_value
    }

    fn io_write(&mut self, port: u16, data: u8) {
        self.port_writes.push((port, data));
    }
}

fn cpu_with(program: &[u8]) -> Z80<TestBus> {
    let mut bus = TestBus::new();
    bus.ram[..program.len()].copy_from_slice(program);
    Z80::new(bus)
}

fn step(cpu: &mut Z80<TestBus>) -> u32 {
    cpu.step().unwrap()
}

#[test]
fn test_ld_immediate() {
    let mut cpu = cpu_with(&[0x3E, 0x42]); // LD A,n
    assert_eq!(step(&mut cpu), 7);
    assert_eq!(cpu.a, 0x42);
}

#[test]
fn test_add() {
    let mut cpu = cpu_with(&[
        0x3E, 0x50, // LD A,50
        0xC6, 0x30, // ADD A,30
    ]);
    step(&mut cpu);
    step(&mut cpu);

    assert_eq!(cpu.a, 0x80);
    assert!(cpu.f.s);
    assert!(cpu.f.pv); // Overflow
    assert!(!cpu.f.c);
}

#[test]
fn test_add_sub_exhaustive() {
    let mut cpu = cpu_with(&[]);
    for a in 0..=255u8 {
        for b in 0..=255u8 {
            let sum = cpu.add8(a, b, false);
            assert_eq!(sum, a.wrapping_add(b));
            assert_eq!(cpu.f.c, a as u16 + b as u16 > 0xFF, "add carry {a:#x}+{b:#x}");
            assert_eq!(cpu.f.pv, (a as i8).checked_add(b as i8).is_none(), "add overflow {a:#x}+{b:#x}");
            assert_eq!(cpu.f.h, (a & 0x0F) + (b & 0x0F) > 0x0F);
            assert_eq!(cpu.f.z, sum == 0);
            assert_eq!(cpu.f.s, sum & 0x80 != 0);
            assert!(!cpu.f.n);

            let back = cpu.sub8(sum, b, false);
            assert_eq!(back, a);
            assert_eq!(cpu.f.c, sum < b, "sub borrow {sum:#x}-{b:#x}");
            assert_eq!(cpu.f.pv, (sum as i8).checked_sub(b as i8).is_none(), "sub overflow {sum:#x}-{b:#x}");
            assert_eq!(cpu.f.h, (sum & 0x0F) < (b & 0x0F));
            assert!(cpu.f.n);
        }
    }
}

#[test]
fn test_adc_sbc_use_carry() {
    let mut cpu = cpu_with(&[]);
    assert_eq!(cpu.add8(0xFF, 0x00, true), 0x00);
    assert!(cpu.f.c && cpu.f.z && cpu.f.h);
    assert_eq!(cpu.sub8(0x00, 0x00, true), 0xFF);
    assert!(cpu.f.c && cpu.f.s && cpu.f.h);
}

#[test]
fn test_dispatch_tables_are_complete() {
    let cpu = cpu_with(&[]);
    assert_eq!(cpu.main.unassigned(), 0);
    assert_eq!(cpu.cb.unassigned(), 0);
    // 62 of the 01xxxxxx slots plus 16 block instructions
    assert_eq!(cpu.ed.unassigned(), 256 - 78);
    assert!(!cpu.ed.is_installed(0x77));
    assert!(!cpu.ed.is_installed(0x7F));
    assert_eq!(cpu.opcode_name(0x76), "halt");
    assert_eq!(cpu.opcode_name(0x40), "ld r,r'");
    assert_eq!(cpu.opcode_name(0xDD), "prefix dd");
}

#[test]
fn test_unknown_ed_opcode() {
    let mut cpu = cpu_with(&[0xED, 0x77]);
    match cpu.step() {
        Err(EmulationError::UnknownOpcode { cpu: CpuKind::Z80, opcode }) => assert_eq!(opcode, 0xED77),
        other => panic!("expected unknown opcode, got {other:?}"),
    }
}

#[test]
fn test_only_ed_slots_report_unknown() {
    // DD/FD fall back to the plain instruction, every CB slot is filled
    let mut cpu = cpu_with(&[0xDD, 0x00, 0xFD, 0x00, 0xDD, 0xCB, 0x00, 0x30]);
    assert_eq!(step(&mut cpu), 8);
    assert_eq!(step(&mut cpu), 8);
    assert!(cpu.step().is_ok());
    assert_eq!(cpu.pc, 8);
}

#[test]
fn test_rotate_eight_times_restores_value() {
    let mut cpu = cpu_with(&[]);
    for v in 0..=255u8 {
        let mut x = v;
        for _ in 0..8 {
            x = cpu.shift(x, ShiftMode::RLC);
        }
        assert_eq!(x, v);
        assert_eq!(cpu.f.c, v & 0x01 != 0);

        let mut x = v;
        for _ in 0..8 {
            x = cpu.shift(x, ShiftMode::RRC);
        }
        assert_eq!(x, v);
        assert_eq!(cpu.f.c, v & 0x80 != 0);
    }
}

#[test]
fn test_shift_variants() {
    let mut cpu = cpu_with(&[]);
    assert_eq!(cpu.shift(0x81, ShiftMode::SRA), 0xC0);
    assert!(cpu.f.c);
    assert_eq!(cpu.shift(0x80, ShiftMode::SLL), 0x01);
    assert!(cpu.f.c);
    assert_eq!(cpu.shift(0x01, ShiftMode::SRL), 0x00);
    assert!(cpu.f.c && cpu.f.z && cpu.f.pv);
    cpu.f.c = true;
    assert_eq!(cpu.shift(0x00, ShiftMode::RL), 0x01);
    assert!(!cpu.f.c);
    cpu.f.c = true;
    assert_eq!(cpu.shift(0x00, ShiftMode::RR), 0x80);
    assert!(cpu.f.s);
}

#[test]
fn test_rlca_keeps_zero_flag() {
    let mut cpu = cpu_with(&[0x07]); // RLCA
    cpu.a = 0x80;
    cpu.f.z = true;
    cpu.f.pv = true;
    assert_eq!(step(&mut cpu), 4);
    assert_eq!(cpu.a, 0x01);
    assert!(cpu.f.c);
    assert!(cpu.f.z);
    assert!(cpu.f.pv);
}

#[test]
fn test_inc_dec_leave_carry() {
    let mut cpu = cpu_with(&[0x3C, 0x3D, 0x3D]); // INC A; DEC A; DEC A
    cpu.a = 0x7F;
    cpu.f.c = true;
    step(&mut cpu);
    assert_eq!(cpu.a, 0x80);
    assert!(cpu.f.pv && cpu.f.h && cpu.f.c);
    step(&mut cpu);
    assert_eq!(cpu.a, 0x7F);
    assert!(cpu.f.pv && cpu.f.h && cpu.f.n && cpu.f.c);
    step(&mut cpu);
    assert!(!cpu.f.pv);
}

#[test]
fn test_logic_parity() {
    let mut cpu = cpu_with(&[0xE6, 0x0F, 0xF6, 0x80, 0xEE, 0xFF]); // AND 0F; OR 80; XOR FF
    cpu.a = 0x3C;
    cpu.f.c = true;
    step(&mut cpu);
    assert_eq!(cpu.a, 0x0C);
    assert!(cpu.f.h && cpu.f.pv && !cpu.f.c);
    step(&mut cpu);
    assert_eq!(cpu.a, 0x8C);
    assert!(!cpu.f.h && !cpu.f.pv && cpu.f.s);
    step(&mut cpu);
    assert_eq!(cpu.a, 0x73);
    assert!(!cpu.f.pv);
}

#[test]
fn test_cp_takes_xy_from_operand() {
    let mut cpu = cpu_with(&[0xFE, 0x28]); // CP 28
    cpu.a = 0x00;
    step(&mut cpu);
    assert_eq!(cpu.a, 0x00);
    assert!(cpu.f.c && cpu.f.n);
    assert!(cpu.f.x && cpu.f.y);
}

#[test]
fn test_daa_reference_vectors() {
    let mut cpu = cpu_with(&[
        0x3E, 0x07, // LD A,07
        0xC6, 0x08, // ADD A,08
        0x27, // DAA
    ]);
    step(&mut cpu);
    step(&mut cpu);
    assert_eq!(cpu.a, 0x0F);
    step(&mut cpu);
    assert_eq!(cpu.a, 0x15);
    assert!(!cpu.f.c);

    cpu.a = 0x9A;
    cpu.f = Z80Flags::default();
    cpu.daa();
    assert_eq!(cpu.a, 0x00);
    assert!(cpu.f.c);
    assert!(cpu.f.z);
}

#[test]
fn test_daa_after_subtract() {
    let mut cpu = cpu_with(&[0x3E, 0x15, 0xD6, 0x06, 0x27]); // LD A,15; SUB 06; DAA
    step(&mut cpu);
    step(&mut cpu);
    assert_eq!(cpu.a, 0x0F);
    step(&mut cpu);
    assert_eq!(cpu.a, 0x09);
    assert!(!cpu.f.c);
}

#[test]
fn test_scf_ccf() {
    let mut cpu = cpu_with(&[0x37, 0x3F]);
    cpu.a = 0x28;
    step(&mut cpu);
    assert!(cpu.f.c && !cpu.f.h);
    assert!(cpu.f.x && cpu.f.y);
    step(&mut cpu);
    assert!(!cpu.f.c && cpu.f.h);
}

#[test]
fn test_neg() {
    let mut cpu = cpu_with(&[0xED, 0x44, 0xED, 0x44]);
    cpu.a = 0x80;
    assert_eq!(step(&mut cpu), 8);
    assert_eq!(cpu.a, 0x80);
    assert!(cpu.f.pv && cpu.f.c);
    cpu.a = 0x01;
    step(&mut cpu);
    assert_eq!(cpu.a, 0xFF);
    assert!(cpu.f.s && cpu.f.c && !cpu.f.pv);
}

#[test]
fn test_16bit_arithmetic() {
    let mut cpu = cpu_with(&[0xED, 0x52, 0xED, 0x6A, 0x09]); // SBC HL,DE; ADC HL,HL; ADD HL,BC
    cpu.set_hl(0x1000);
    cpu.set_de(0x0001);
    cpu.f.c = true;
    assert_eq!(step(&mut cpu), 15);
    assert_eq!(cpu.hl(), 0x0FFE);
    assert!(cpu.f.h && cpu.f.n && !cpu.f.c);
    assert_eq!(cpu.wz, 0x1001);

    cpu.set_hl(0x8000);
    cpu.f.c = false;
    step(&mut cpu);
    assert_eq!(cpu.hl(), 0x0000);
    assert!(cpu.f.c && cpu.f.z && cpu.f.pv);

    cpu.set_hl(0x0FFF);
    cpu.set_bc(0x0001);
    cpu.f.z = true;
    assert_eq!(step(&mut cpu), 11);
    assert_eq!(cpu.hl(), 0x1000);
    assert!(cpu.f.h && cpu.f.z);
}

#[test]
fn test_inc_dec_16bit_leave_flags() {
    let mut cpu = cpu_with(&[0x0B, 0x03]); // DEC BC; INC BC
    cpu.f = Z80Flags::from_byte(0xD7);
    assert_eq!(step(&mut cpu), 6);
    assert_eq!(cpu.bc(), 0xFFFF);
    step(&mut cpu);
    assert_eq!(cpu.bc(), 0x0000);
    assert_eq!(cpu.f.to_byte(), 0xD7);
}

#[test]
fn test_ldir_single_byte() {
    let mut cpu = cpu_with(&[0xED, 0xB0]); // LDIR
    cpu.bus.ram[0x1000] = 0xAB;
    cpu.set_hl(0x1000);
    cpu.set_de(0x2000);
    cpu.set_bc(1);

    assert_eq!(step(&mut cpu), 16);
    assert_eq!(cpu.bus.ram[0x2000], 0xAB);
    assert_eq!(cpu.bc(), 0);
    assert_eq!(cpu.hl(), 0x1001);
    assert_eq!(cpu.de(), 0x2001);
    assert_eq!(cpu.pc, 2);
    assert!(!cpu.f.pv);
}

#[test]
fn test_ldir_repeats() {
    let mut cpu = cpu_with(&[0xED, 0xB0]);
    cpu.bus.ram[0x1000..0x1003].copy_from_slice(&[1, 2, 3]);
    cpu.set_hl(0x1000);
    cpu.set_de(0x2000);
    cpu.set_bc(3);

    assert_eq!(step(&mut cpu), 21);
    assert_eq!(cpu.pc, 0);
    assert_eq!(cpu.wz, 1);
    assert_eq!(step(&mut cpu), 21);
    assert_eq!(step(&mut cpu), 16);
    assert_eq!(cpu.pc, 2);
    assert_eq!(&cpu.bus.ram[0x2000..0x2003], &[1, 2, 3]);
}

#[test]
fn test_lddr_moves_down() {
    let mut cpu = cpu_with(&[0xED, 0xB8]); // LDDR
    cpu.bus.ram[0x1000..0x1002].copy_from_slice(&[7, 8]);
    cpu.set_hl(0x1001);
    cpu.set_de(0x2001);
    cpu.set_bc(2);
    step(&mut cpu);
    step(&mut cpu);
    assert_eq!(&cpu.bus.ram[0x2000..0x2002], &[7, 8]);
    assert_eq!(cpu.hl(), 0x0FFF);
}

#[test]
fn test_ldi_undocumented_flags() {
    let mut cpu = cpu_with(&[0xED, 0xA0]); // LDI
    cpu.bus.ram[0x1000] = 0x08;
    cpu.a = 0x02;
    cpu.set_hl(0x1000);
    cpu.set_de(0x2000);
    cpu.set_bc(2);
    step(&mut cpu);
    // 0x08 + 0x02 = 0x0A: bit 3 -> X, bit 1 -> Y
    assert!(cpu.f.x && cpu.f.y);
    assert!(cpu.f.pv);
}

#[test]
fn test_cpir_stops_on_match() {
    let mut cpu = cpu_with(&[0xED, 0xB1]); // CPIR
    cpu.bus.ram[0x1000..0x1004].copy_from_slice(&[0x11, 0x22, 0x33, 0x44]);
    cpu.a = 0x33;
    cpu.set_hl(0x1000);
    cpu.set_bc(4);
    cpu.f.c = true;

    assert_eq!(step(&mut cpu), 21);
    assert_eq!(step(&mut cpu), 21);
    assert_eq!(step(&mut cpu), 16);
    assert!(cpu.f.z);
    assert!(cpu.f.pv);
    assert!(cpu.f.c);
    assert_eq!(cpu.hl(), 0x1003);
    assert_eq!(cpu.bc(), 1);
    assert_eq!(cpu.pc, 2);
}

#[test]
fn test_otir_writes_ports() {
    let mut cpu = cpu_with(&[0xED, 0xB3]); // OTIR
    cpu.bus.ram[0x1000..0x1002].copy_from_slice(&[0xAA, 0xBB]);
    cpu.set_hl(0x1000);
    cpu.set_bc(0x0250);
    assert_eq!(step(&mut cpu), 21);
    assert_eq!(step(&mut cpu), 16);
    assert_eq!(cpu.bus.port_writes, vec![(0x0150, 0xAA), (0x0050, 0xBB)]);
    assert!(cpu.f.z);
}

#[test]
fn test_ini_stores_port_value() {
    let mut cpu = cpu_with(&[0xED, 0xA2]); // INI
    cpu.bus.port_value = 0x5A;
    cpu.set_hl(0x3000);
    cpu.set_bc(0x0110);
    step(&mut cpu);
    assert_eq!(cpu.bus.ram[0x3000], 0x5A);
    assert_eq!(cpu.b, 0);
    assert!(cpu.f.z);
    assert_eq!(cpu.hl(), 0x3001);
}

#[test]
fn test_jr_and_djnz() {
    let mut cpu = cpu_with(&[0x18, 0xFE]); // JR -2
    assert_eq!(step(&mut cpu), 12);
    assert_eq!(cpu.pc, 0);

    let mut cpu = cpu_with(&[0x20, 0x05]); // JR NZ,+5
    cpu.f.z = true;
    assert_eq!(step(&mut cpu), 7);
    assert_eq!(cpu.pc, 2);
    assert_eq!(cpu.wz, 7);

    let mut cpu = cpu_with(&[0x10, 0xFE]); // DJNZ -2
    cpu.b = 2;
    assert_eq!(step(&mut cpu), 13);
    assert_eq!(cpu.pc, 0);
    assert_eq!(step(&mut cpu), 8);
    assert_eq!(cpu.pc, 2);
    assert_eq!(cpu.b, 0);
}

#[test]
fn test_call_and_ret() {
    let mut cpu = cpu_with(&[0xCD, 0x00, 0x10]); // CALL 1000
    cpu.bus.ram[0x1000] = 0xC9; // RET
    assert_eq!(step(&mut cpu), 17);
    assert_eq!(cpu.pc, 0x1000);
    assert_eq!(cpu.sp, 0xFFFD);
    assert_eq!(step(&mut cpu), 10);
    assert_eq!(cpu.pc, 3);
    assert_eq!(cpu.sp, 0xFFFF);
}

#[test]
fn test_untaken_call_latches_target() {
    let mut cpu = cpu_with(&[0xC4, 0x00, 0x20, 0xC0]); // CALL NZ,2000; RET NZ
    cpu.f.z = true;
    assert_eq!(step(&mut cpu), 10);
    assert_eq!(cpu.pc, 3);
    assert_eq!(cpu.wz, 0x2000);
    assert_eq!(cpu.sp, 0xFFFF);
    assert_eq!(step(&mut cpu), 5);
}

#[test]
fn test_jp_cc_latches_target() {
    let mut cpu = cpu_with(&[0xDA, 0x34, 0x12]); // JP C,1234
    assert_eq!(step(&mut cpu), 10);
    assert_eq!(cpu.pc, 3);
    assert_eq!(cpu.wz, 0x1234);
}

#[test]
fn test_rst() {
    let mut cpu = cpu_with(&[0x00, 0xEF]); // NOP; RST 28
    step(&mut cpu);
    assert_eq!(step(&mut cpu), 11);
    assert_eq!(cpu.pc, 0x28);
    assert_eq!(cpu.bus.ram[0xFFFD], 0x02);
}

#[test]
fn test_push_pop() {
    let mut cpu = cpu_with(&[0xF5, 0xC1]); // PUSH AF; POP BC
    cpu.set_af(0x12D7);
    assert_eq!(step(&mut cpu), 11);
    assert_eq!(step(&mut cpu), 10);
    assert_eq!(cpu.bc(), 0x12D7);
}

#[test]
fn test_exchanges() {
    let mut cpu = cpu_with(&[0x08, 0xD9, 0xEB]); // EX AF,AF'; EXX; EX DE,HL
    cpu.a = 1;
    cpu.a_alt = 2;
    cpu.set_bc(0x1111);
    cpu.b_alt = 0x22;
    cpu.set_de(0x3333);
    cpu.set_hl(0x4444);
    step(&mut cpu);
    assert_eq!(cpu.a, 2);
    step(&mut cpu);
    assert_eq!(cpu.b, 0x22);
    assert_eq!(cpu.b_alt, 0x11);
    cpu.set_de(0x3333);
    cpu.set_hl(0x4444);
    step(&mut cpu);
    assert_eq!(cpu.de(), 0x4444);
    assert_eq!(cpu.hl(), 0x3333);
}

#[test]
fn test_ex_sp_hl() {
    let mut cpu = cpu_with(&[0xE3]);
    cpu.sp = 0x8000;
    cpu.bus.ram[0x8000] = 0x34;
    cpu.bus.ram[0x8001] = 0x12;
    cpu.set_hl(0xBEEF);
    assert_eq!(step(&mut cpu), 19);
    assert_eq!(cpu.hl(), 0x1234);
    assert_eq!(cpu.bus.ram[0x8000], 0xEF);
    assert_eq!(cpu.wz, 0x1234);
}

#[test]
fn test_memory_loads_latch_wz() {
    let mut cpu = cpu_with(&[0x32, 0x00, 0x40, 0x3A, 0x00, 0x40, 0x0A]); // LD (4000),A; LD A,(4000); LD A,(BC)
    cpu.a = 0x99;
    assert_eq!(step(&mut cpu), 13);
    assert_eq!(cpu.bus.ram[0x4000], 0x99);
    assert_eq!(cpu.wz, 0x9901);
    cpu.a = 0;
    step(&mut cpu);
    assert_eq!(cpu.a, 0x99);
    assert_eq!(cpu.wz, 0x4001);
    cpu.set_bc(0x4000);
    assert_eq!(step(&mut cpu), 7);
    assert_eq!(cpu.wz, 0x4001);
}

#[test]
fn test_ld_hl_indirect() {
    let mut cpu = cpu_with(&[0x22, 0x00, 0x50, 0x2A, 0x00, 0x50, 0xED, 0x5B, 0x00, 0x50]); // LD (5000),HL; LD HL,(5000); LD DE,(5000)
    cpu.set_hl(0xCAFE);
    assert_eq!(step(&mut cpu), 16);
    assert_eq!(cpu.bus.ram[0x5000], 0xFE);
    assert_eq!(cpu.bus.ram[0x5001], 0xCA);
    cpu.set_hl(0);
    step(&mut cpu);
    assert_eq!(cpu.hl(), 0xCAFE);
    assert_eq!(step(&mut cpu), 20);
    assert_eq!(cpu.de(), 0xCAFE);
}

#[test]
fn test_index_registers() {
    let mut cpu = cpu_with(&[
        0xDD, 0x21, 0x00, 0x30, // LD IX,3000
        0xDD, 0x36, 0x05, 0x42, // LD (IX+5),42
        0xDD, 0x7E, 0x05, // LD A,(IX+5)
        0xDD, 0x26, 0x12, // LD IXH,12
        0xDD, 0x66, 0xFF, // LD H,(IX-1)
    ]);
    cpu.bus.ram[0x11FF] = 0x99;

    assert_eq!(step(&mut cpu), 14);
    assert_eq!(cpu.ix, 0x3000);
    assert_eq!(step(&mut cpu), 19);
    assert_eq!(cpu.bus.ram[0x3005], 0x42);
    assert_eq!(step(&mut cpu), 19);
    assert_eq!(cpu.a, 0x42);
    assert_eq!(cpu.wz, 0x3005);
    assert_eq!(step(&mut cpu), 11);
    assert_eq!(cpu.ix, 0x1200);
    assert_eq!(step(&mut cpu), 19);
    assert_eq!(cpu.h, 0x99);
    assert_eq!(cpu.ix, 0x1200);
}

#[test]
fn test_iy_alu_and_inc() {
    let mut cpu = cpu_with(&[
        0xFD, 0x86, 0x03, // ADD A,(IY+3)
        0xFD, 0x34, 0x03, // INC (IY+3)
        0xFD, 0x23, // INC IY
    ]);
    cpu.iy = 0x2000;
    cpu.bus.ram[0x2003] = 0x10;
    cpu.a = 0x01;
    assert_eq!(step(&mut cpu), 19);
    assert_eq!(cpu.a, 0x11);
    assert_eq!(step(&mut cpu), 23);
    assert_eq!(cpu.bus.ram[0x2003], 0x11);
    assert_eq!(step(&mut cpu), 10);
    assert_eq!(cpu.iy, 0x2001);
}

#[test]
fn test_indexed_bit_ops() {
    let mut cpu = cpu_with(&[
        0xDD, 0xCB, 0x02, 0xC0, // SET 0,(IX+2) -> B
        0xDD, 0xCB, 0x02, 0x46, // BIT 0,(IX+2)
    ]);
    cpu.ix = 0x3000;
    cpu.bus.ram[0x3002] = 0x10;

    assert_eq!(step(&mut cpu), 23);
    assert_eq!(cpu.bus.ram[0x3002], 0x11);
    assert_eq!(cpu.b, 0x11);
    assert_eq!(step(&mut cpu), 20);
    assert!(!cpu.f.z);
    // X/Y come from the high byte of IX+d
    assert!(cpu.f.y);
    assert!(!cpu.f.x);
}

#[test]
fn test_prefix_without_effect() {
    let mut cpu = cpu_with(&[0xDD, 0x3C]); // INC A with a spare prefix
    assert_eq!(step(&mut cpu), 8);
    assert_eq!(cpu.a, 1);
}

#[test]
fn test_chained_prefixes() {
    let mut cpu = cpu_with(&[0xDD, 0xFD, 0x21, 0x34, 0x12]); // DD is dropped, LD IY,1234
    assert_eq!(step(&mut cpu), 4);
    assert_eq!(cpu.pc, 1);
    assert_eq!(step(&mut cpu), 14);
    assert_eq!(cpu.iy, 0x1234);
    assert_eq!(cpu.ix, 0);
}

#[test]
fn test_no_interrupt_between_chained_prefixes() {
    let mut cpu = cpu_with(&[0xDD, 0xFD, 0x21, 0x34, 0x12, 0x00]);
    cpu.im = 1;
    cpu.iff1 = true;
    cpu.iff2 = true;

    assert_eq!(step(&mut cpu), 4);
    cpu.irq();
    cpu.nmi();
    assert_eq!(step(&mut cpu), 14);
    assert_eq!(cpu.iy, 0x1234);
    assert_eq!(cpu.pc, 5);

    // Both requests are still pending, NMI first
    assert_eq!(step(&mut cpu), 11);
    assert_eq!(cpu.pc, 0x0066);
    assert_eq!(cpu.read16(cpu.sp), 5);
}

#[test]
fn test_refresh_counts_opcode_fetches() {
    let mut cpu = cpu_with(&[0x00, 0x00, 0xDD, 0x21, 0x00, 0x00]);
    cpu.r = 0x80 | 0x7F;
    step(&mut cpu);
    assert_eq!(cpu.r, 0x80);
    step(&mut cpu);
    step(&mut cpu);
    assert_eq!(cpu.r, 0x83);
}

#[test]
fn test_cb_register_and_hl() {
    let mut cpu = cpu_with(&[
        0xCB, 0x00, // RLC B
        0xCB, 0xFE, // SET 7,(HL)
        0xCB, 0x86, // RES 0,(HL)
        0xCB, 0x5E, // BIT 3,(HL)
    ]);
    cpu.b = 0x81;
    cpu.set_hl(0x4000);
    cpu.bus.ram[0x4000] = 0x09;

    assert_eq!(step(&mut cpu), 8);
    assert_eq!(cpu.b, 0x03);
    assert!(cpu.f.c);
    assert_eq!(step(&mut cpu), 15);
    assert_eq!(cpu.bus.ram[0x4000], 0x89);
    assert_eq!(step(&mut cpu), 15);
    assert_eq!(cpu.bus.ram[0x4000], 0x88);

    cpu.wz = 0x2800;
    assert_eq!(step(&mut cpu), 12);
    assert!(!cpu.f.z);
    assert!(cpu.f.x && cpu.f.y);
}

#[test]
fn test_bit_seven_sets_sign() {
    let mut cpu = cpu_with(&[0xCB, 0x7F]); // BIT 7,A
    cpu.a = 0x80;
    step(&mut cpu);
    assert!(cpu.f.s && !cpu.f.z && !cpu.f.pv && cpu.f.h);
}

#[test]
fn test_rld_rrd() {
    let mut cpu = cpu_with(&[0xED, 0x6F, 0xED, 0x67]); // RLD; RRD
    cpu.set_hl(0x5000);
    cpu.a = 0x7A;
    cpu.bus.ram[0x5000] = 0x31;
    assert_eq!(step(&mut cpu), 18);
    assert_eq!(cpu.a, 0x73);
    assert_eq!(cpu.bus.ram[0x5000], 0x1A);
    assert_eq!(cpu.wz, 0x5001);

    cpu.a = 0x84;
    cpu.bus.ram[0x5000] = 0x20;
    step(&mut cpu);
    assert_eq!(cpu.a, 0x80);
    assert_eq!(cpu.bus.ram[0x5000], 0x42);
    assert!(cpu.f.s);
}

#[test]
fn test_io_instructions() {
    let mut cpu = cpu_with(&[
        0xED, 0x78, // IN A,(C)
        0xED, 0x79, // OUT (C),A
        0xD3, 0x7F, // OUT (7F),A
        0xDB, 0x10, // IN A,(10)
    ]);
    cpu.set_bc(0x00BF);
    assert_eq!(step(&mut cpu), 12);
    assert_eq!(cpu.a, 0xFF);
    assert!(cpu.f.s && cpu.f.pv);
    assert_eq!(cpu.wz, 0x00C0);
    assert_eq!(step(&mut cpu), 12);
    assert_eq!(step(&mut cpu), 11);
    assert_eq!(cpu.bus.port_writes, vec![(0x00BF, 0xFF), (0xFF7F, 0xFF)]);
    cpu.bus.port_value = 0x12;
    assert_eq!(step(&mut cpu), 11);
    assert_eq!(cpu.a, 0x12);
}

#[test]
fn test_ld_a_i_reports_iff2() {
    let mut cpu = cpu_with(&[0xED, 0x57]);
    cpu.i = 0x80;
    cpu.iff2 = true;
    assert_eq!(step(&mut cpu), 9);
    assert_eq!(cpu.a, 0x80);
    assert!(cpu.f.s && cpu.f.pv);
}

#[test]
fn test_interrupt_mode_1() {
    let mut cpu = cpu_with(&[0xFB, 0x00, 0x00]); // EI; NOP
    cpu.irq();
    step(&mut cpu);
    // EI shadows the next instruction
    step(&mut cpu);
    assert_eq!(cpu.pc, 2);
    assert_eq!(step(&mut cpu), 13);
    assert_eq!(cpu.pc, 0x38);
    assert!(!cpu.iff1);
    assert_eq!(cpu.bus.ram[0xFFFD], 0x02);
}

#[test]
fn test_interrupt_mode_2() {
    let mut cpu = cpu_with(&[0x00]);
    cpu.im = 2;
    cpu.i = 0x40;
    cpu.iff1 = true;
    cpu.bus.ram[0x40FF] = 0x34;
    cpu.bus.ram[0x4100] = 0x12;
    cpu.irq();
    assert_eq!(step(&mut cpu), 19);
    assert_eq!(cpu.pc, 0x1234);
}

#[test]
fn test_irq_ignored_while_disabled() {
    let mut cpu = cpu_with(&[0x00, 0x00]);
    cpu.irq();
    assert_eq!(step(&mut cpu), 4);
    assert_eq!(cpu.pc, 1);
}

#[test]
fn test_nmi() {
    let mut cpu = cpu_with(&[0x00]);
    cpu.iff1 = true;
    cpu.iff2 = true;
    cpu.nmi();
    assert_eq!(step(&mut cpu), 11);
    assert_eq!(cpu.pc, 0x66);
    assert!(!cpu.iff1);
    assert!(cpu.iff2);
}

#[test]
fn test_halt_until_interrupt() {
    let mut cpu = cpu_with(&[0x76]);
    assert_eq!(step(&mut cpu), 4);
    assert!(cpu.halted);
    assert_eq!(step(&mut cpu), 4);
    assert_eq!(cpu.pc, 1);
    cpu.iff1 = true;
    cpu.im = 1;
    cpu.irq();
    step(&mut cpu);
    assert!(!cpu.halted);
    assert_eq!(cpu.pc, 0x38);
}

#[test]
fn test_retn_restores_iff1() {
    let mut cpu = cpu_with(&[0xED, 0x45]);
    cpu.sp = 0x8000;
    cpu.bus.ram[0x8000] = 0x00;
    cpu.bus.ram[0x8001] = 0x20;
    cpu.iff2 = true;
    assert_eq!(step(&mut cpu), 14);
    assert_eq!(cpu.pc, 0x2000);
    assert!(cpu.iff1);
}

#[test]
fn test_im_modes() {
    let mut cpu = cpu_with(&[0xED, 0x5E, 0xED, 0x56, 0xED, 0x46]);
    step(&mut cpu);
    assert_eq!(cpu.im, 2);
    step(&mut cpu);
    assert_eq!(cpu.im, 1);
    step(&mut cpu);
    assert_eq!(cpu.im, 0);
}

#[test]
fn test_flags_byte_round_trip() {
    let mut f = Z80Flags::from_byte(0xFF);
    assert_eq!(f.to_byte(), 0xFF);
    f.set(Z80Flags::H, false);
    assert!(!f.get(Z80Flags::H));
    assert_eq!(f.to_byte(), 0xEF);
}

#[test]
fn test_reset() {
    let mut cpu = cpu_with(&[0x3E, 0x42]);
    step(&mut cpu);
    cpu.ix = 0x1234;
    cpu.iff1 = true;
    cpu.im = 2;
    cpu.reset().unwrap();
    assert_eq!(cpu.a, 0);
    assert_eq!(cpu.ix, 0);
    assert_eq!(cpu.sp, 0xFFFF);
    assert_eq!(Cpu::pc(&cpu), 0);
    assert!(!cpu.iff1);
    assert_eq!(cpu.im, 0);
    assert_eq!(cpu.cycles(), 0);
}

#[test]
fn test_cycle_counter() {
    let mut cpu = cpu_with(&[0x00, 0x3E, 0x01, 0xC3, 0x00, 0x00]);
    step(&mut cpu);
    step(&mut cpu);
    step(&mut cpu);
    assert_eq!(cpu.cycles(), 4 + 7 + 10);
}
