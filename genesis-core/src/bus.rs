//! Shared memory bus
//!
//! One decoder for both address spaces. Every address resolves to exactly one
//! region; regions without modelled hardware answer a fixed idle value and
//! swallow writes.
//!
//! 68000 space (24-bit):
//! - 0x000000-0x3FFFFF: Cartridge ROM
//! - 0xFF0000-0xFFFFFF: Work RAM (64KB)
//! - 0xA00000-0xA0FFFF: Z80 address space
//! - everything else: I/O, VDP, PSG and reserved stubs
//!
//! Z80 space (16-bit):
//! - 0x0000-0x1FFF: Z80 RAM (8KB)
//! - everything else: YM2612, bank register, PSG and bank window stubs

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::cartridge::Cartridge;
use crate::cpu::m68k::Bus68k;
use crate::cpu::z80::BusZ80;
use crate::memory::Ram;

/// The 68000 drives 24 address lines
pub const M68K_ADDRESS_MASK: u32 = 0x00FF_FFFF;
pub const WORK_RAM_SIZE: usize = 0x10000;
pub const Z80_RAM_SIZE: usize = 0x2000;

/// Both CPUs see the bus through this handle; the mutex serialises access.
pub type SharedBus = Arc<Mutex<MemoryBus>>;

/// Hardware registers that are decoded but not modelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peripheral {
    Reserved,
    /// Sega CD / 32X windows
    ExpansionHardware,
    VersionRegister,
    ControllerData,
    ControllerControl,
    ControllerSerial,
    ExpansionPort,
    MemoryMode,
    Z80BusRequest,
    Z80Reset,
    TimeRegisters,
    Tmss,
    VdpData,
    VdpControl,
    HvCounter,
    Psg,
    DebugRegister,
    Ym2612,
    BankRegister,
    BankWindow,
}

impl Peripheral {
    /// Value returned for reads
    pub const fn idle_value(self) -> u8 {
        match self {
            // No buttons pressed (active low)
            Peripheral::ControllerData => 0xFF,
            _ => 0x00,
        }
    }
}

/// Decoded 68000 address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum M68kRegion {
    Rom(u32),
    WorkRam(u32),
    /// Bridge into the Z80 space, already masked to 16 bits
    Z80Space(u16),
    Stub(Peripheral),
}

/// Decoded Z80 address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Z80Region {
    Ram(u32),
    Stub(Peripheral),
}

/// Address decoder plus the RAM it owns
pub struct MemoryBus {
    work_ram: Ram,
    z80_ram: Ram,
    cartridge: Option<Arc<Cartridge>>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            work_ram: Ram::new(WORK_RAM_SIZE),
            z80_ram: Ram::new(Z80_RAM_SIZE),
            cartridge: None,
        }
    }

    pub fn with_cartridge(cartridge: Arc<Cartridge>) -> Self {
        let mut bus = Self::new();
        bus.attach_cartridge(cartridge);
        bus
    }

    pub fn attach_cartridge(&mut self, cartridge: Arc<Cartridge>) {
        self.cartridge = Some(cartridge);
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_deref()
    }

    pub fn has_cartridge(&self) -> bool {
        self.cartridge.is_some()
    }

    /// Zero both RAM arrays
    pub fn clear_ram(&mut self) {
        self.work_ram.clear();
        self.z80_ram.clear();
    }

    pub fn into_shared(self) -> SharedBus {
        Arc::new(Mutex::new(self))
    }

    // ========================================================================
    // Decode
    // ========================================================================

    /// Resolve a 68000 address. Ranges are tested low to high, with ROM and
    /// work RAM first.
    pub fn decode_m68k(addr: u32) -> M68kRegion {
        use Peripheral::*;

        let addr = addr & M68K_ADDRESS_MASK;
        match addr {
            0x00_0000..=0x3F_FFFF => M68kRegion::Rom(addr),
            0xFF_0000..=0xFF_FFFF => M68kRegion::WorkRam(addr & 0xFFFF),
            0x40_0000..=0x9F_FFFF => M68kRegion::Stub(ExpansionHardware),
            0xA0_0000..=0xA0_FFFF => M68kRegion::Z80Space(addr as u16),
            0xA1_0000..=0xA1_0001 => M68kRegion::Stub(VersionRegister),
            0xA1_0002..=0xA1_0005 => M68kRegion::Stub(ControllerData),
            0xA1_0006..=0xA1_0007 => M68kRegion::Stub(ExpansionPort),
            0xA1_0008..=0xA1_000B => M68kRegion::Stub(ControllerControl),
            0xA1_000C..=0xA1_000D => M68kRegion::Stub(ExpansionPort),
            0xA1_000E..=0xA1_0019 => M68kRegion::Stub(ControllerSerial),
            0xA1_001A..=0xA1_001F => M68kRegion::Stub(ExpansionPort),
            0xA1_0020..=0xA1_0FFF => M68kRegion::Stub(Reserved),
            0xA1_1000..=0xA1_1001 => M68kRegion::Stub(MemoryMode),
            0xA1_1002..=0xA1_10FF => M68kRegion::Stub(Reserved),
            0xA1_1100..=0xA1_1101 => M68kRegion::Stub(Z80BusRequest),
            0xA1_1102..=0xA1_11FF => M68kRegion::Stub(Reserved),
            0xA1_1200..=0xA1_1201 => M68kRegion::Stub(Z80Reset),
            0xA1_1202..=0xA1_2FFF => M68kRegion::Stub(Reserved),
            0xA1_3000..=0xA1_30FF => M68kRegion::Stub(TimeRegisters),
            0xA1_3100..=0xA1_3FFF => M68kRegion::Stub(Reserved),
            0xA1_4000..=0xA1_4003 => M68kRegion::Stub(Tmss),
            0xA1_4004..=0xA1_4100 => M68kRegion::Stub(Reserved),
            0xA1_4101 => M68kRegion::Stub(Tmss),
            0xA1_4102..=0xBF_FFFF => M68kRegion::Stub(Reserved),
            0xC0_0000..=0xC0_0003 => M68kRegion::Stub(VdpData),
            0xC0_0004..=0xC0_0007 => M68kRegion::Stub(VdpControl),
            0xC0_0008..=0xC0_000F => M68kRegion::Stub(HvCounter),
            0xC0_0010 => M68kRegion::Stub(Reserved),
            0xC0_0011 => M68kRegion::Stub(Psg),
            0xC0_0012 => M68kRegion::Stub(Reserved),
            0xC0_0013..=0xC0_0017 => M68kRegion::Stub(Psg),
            0xC0_0018..=0xC0_001B => M68kRegion::Stub(Reserved),
            0xC0_001C..=0xC0_001F => M68kRegion::Stub(DebugRegister),
            _ => M68kRegion::Stub(Reserved),
        }
    }

    /// Resolve a Z80 address
    pub fn decode_z80(addr: u16) -> Z80Region {
        use Peripheral::*;

        match addr {
            0x0000..=0x1FFF => Z80Region::Ram(addr as u32),
            0x2000..=0x3FFF => Z80Region::Stub(Reserved),
            0x4000..=0x4003 => Z80Region::Stub(Ym2612),
            0x4004..=0x5FFF => Z80Region::Stub(Reserved),
            0x6000 => Z80Region::Stub(BankRegister),
            0x6001..=0x7F10 => Z80Region::Stub(Reserved),
            0x7F11 => Z80Region::Stub(Psg),
            0x7F12..=0x7FFF => Z80Region::Stub(Reserved),
            0x8000..=0xFFFF => Z80Region::Stub(BankWindow),
        }
    }

    // ========================================================================
    // Z80 space
    // ========================================================================

    pub fn z80_read(&self, addr: u16) -> u8 {
        match Self::decode_z80(addr) {
            Z80Region::Ram(offset) => self.z80_ram.read(offset),
            Z80Region::Stub(p) => p.idle_value(),
        }
    }

    pub fn z80_write(&mut self, addr: u16, val: u8) {
        match Self::decode_z80(addr) {
            Z80Region::Ram(offset) => self.z80_ram.write(offset, val),
            Z80Region::Stub(p) => trace!(?p, addr, val, "z80 write discarded"),
        }
    }

    /// Little-endian: `addr` holds the low byte
    pub fn z80_read16(&self, addr: u16) -> u16 {
        let lo = self.z80_read(addr) as u16;
        let hi = self.z80_read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    pub fn z80_write16(&mut self, addr: u16, val: u16) {
        self.z80_write(addr, val as u8);
        self.z80_write(addr.wrapping_add(1), (val >> 8) as u8);
    }

    // ========================================================================
    // 68000 space
    // ========================================================================

    pub fn m68k_read(&self, addr: u32) -> u8 {
        match Self::decode_m68k(addr) {
            M68kRegion::Rom(offset) => self.cartridge.as_ref().map_or(0, |c| c.read(offset)),
            M68kRegion::WorkRam(offset) => self.work_ram.read(offset),
            M68kRegion::Z80Space(z80_addr) => self.z80_read(z80_addr),
            M68kRegion::Stub(p) => p.idle_value(),
        }
    }

    pub fn m68k_write(&mut self, addr: u32, val: u8) {
        match Self::decode_m68k(addr) {
            M68kRegion::Rom(offset) => trace!(offset, val, "write to cartridge ROM discarded"),
            M68kRegion::WorkRam(offset) => self.work_ram.write(offset, val),
            M68kRegion::Z80Space(z80_addr) => self.z80_write(z80_addr, val),
            M68kRegion::Stub(p) => trace!(?p, addr, val, "68000 write discarded"),
        }
    }

    /// Big-endian: `addr` holds the high byte
    pub fn m68k_read16(&self, addr: u32) -> u16 {
        let hi = self.m68k_read(addr) as u16;
        let lo = self.m68k_read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    pub fn m68k_write16(&mut self, addr: u32, val: u16) {
        self.m68k_write(addr, (val >> 8) as u8);
        self.m68k_write(addr.wrapping_add(1), val as u8);
    }

    pub fn m68k_read32(&self, addr: u32) -> u32 {
        let hi = self.m68k_read16(addr) as u32;
        let lo = self.m68k_read16(addr.wrapping_add(2)) as u32;
        (hi << 16) | lo
    }

    pub fn m68k_write32(&mut self, addr: u32, val: u32) {
        self.m68k_write16(addr, (val >> 16) as u16);
        self.m68k_write16(addr.wrapping_add(2), val as u16);
    }
}

// ============================================================================
// Per-CPU views
// ============================================================================

/// Z80 side of a [`SharedBus`]
#[derive(Clone)]
pub struct Z80BusView {
    bus: SharedBus,
}

impl Z80BusView {
    pub fn new(bus: SharedBus) -> Self {
        Self { bus }
    }
}

impl BusZ80 for Z80BusView {
    fn read(&mut self, addr: u16) -> u8 {
        self.bus.lock().z80_read(addr)
    }

    fn write(&mut self, addr: u16, data: u8) {
        self.bus.lock().z80_write(addr, data);
    }

    fn io_read(&mut self, _port: u16) -> u8 {
        0xFF
    }

    fn io_write(&mut self, port: u16, data: u8) {
        trace!(port, data, "z80 port write discarded");
    }
}

/// 68000 side of a [`SharedBus`]
#[derive(Clone)]
pub struct M68kBusView {
    bus: SharedBus,
}

impl M68kBusView {
    pub fn new(bus: SharedBus) -> Self {
        Self { bus }
    }
}

impl Bus68k for M68kBusView {
    fn read8(&mut self, addr: u32) -> u8 {
        self.bus.lock().m68k_read(addr)
    }

    fn write8(&mut self, addr: u32, val: u8) {
        self.bus.lock().m68k_write(addr, val);
    }

    fn read16(&mut self, addr: u32) -> u16 {
        self.bus.lock().m68k_read16(addr)
    }

    fn write16(&mut self, addr: u32, val: u16) {
        self.bus.lock().m68k_write16(addr, val);
    }
}
