//! Mega Drive system driver
//!
//! Owns the shared bus and both CPUs and runs them frame by frame. The 68000
//! leads: after each of its instructions the Z80 is stepped until it has
//! consumed its share of the same master clocks. Execution is sequential,
//! never interleaved within an instruction.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bus::{M68kBusView, MemoryBus, SharedBus, Z80BusView};
use crate::cartridge::Cartridge;
use crate::cpu::m68k::M68k;
use crate::cpu::z80::Z80;
use crate::cpu::Cpu;
use crate::{EmulationError, EmulationResult};

/// Master clocks per NTSC frame
pub const NTSC_MASTER_CLOCKS_PER_FRAME: u64 = 896_040;
/// Master clocks per PAL frame
pub const PAL_MASTER_CLOCKS_PER_FRAME: u64 = 1_067_040;

/// Television standard, which fixes the frame length
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStandard {
    #[default]
    Ntsc,
    Pal,
}

impl VideoStandard {
    pub fn master_clocks_per_frame(self) -> u64 {
        match self {
            VideoStandard::Ntsc => NTSC_MASTER_CLOCKS_PER_FRAME,
            VideoStandard::Pal => PAL_MASTER_CLOCKS_PER_FRAME,
        }
    }
}

/// Emulator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// NTSC or PAL frame timing
    pub video_standard: VideoStandard,
    /// Step the Z80 alongside the 68000
    pub run_z80: bool,
    /// Master clocks per 68000 cycle
    pub m68k_clock_divider: u32,
    /// Master clocks per Z80 cycle
    pub z80_clock_divider: u32,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            video_standard: VideoStandard::Ntsc,
            run_z80: true,
            m68k_clock_divider: 7,
            z80_clock_divider: 15,
        }
    }
}

impl EmulatorConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(text: &str) -> EmulationResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()
    }

    pub fn load(path: &Path) -> EmulationResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    fn validate(self) -> EmulationResult<Self> {
        if self.m68k_clock_divider == 0 {
            return Err(EmulationError::InvalidParameter { what: "68000 clock divider", value: 0 });
        }
        if self.z80_clock_divider == 0 {
            return Err(EmulationError::InvalidParameter { what: "Z80 clock divider", value: 0 });
        }
        Ok(self)
    }
}

/// Work done during one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub m68k_cycles: u64,
    pub z80_cycles: u64,
    pub master_clocks: u64,
}

/// Main emulator instance
pub struct Emulator {
    /// Emulator configuration
    pub config: EmulatorConfig,
    bus: SharedBus,
    m68k: M68k<M68kBusView>,
    z80: Z80<Z80BusView>,
    /// Master clocks the Z80 still has to run (negative when it overshot)
    z80_balance: i64,
    frame_count: u64,
}

impl Emulator {
    /// Create a new emulator instance
    pub fn new(config: EmulatorConfig) -> Self {
        let bus = MemoryBus::new().into_shared();
        Self {
            config,
            m68k: M68k::new(M68kBusView::new(bus.clone())),
            z80: Z80::new(Z80BusView::new(bus.clone())),
            bus,
            z80_balance: 0,
            frame_count: 0,
        }
    }

    pub fn bus(&self) -> &SharedBus {
        &self.bus
    }

    pub fn m68k(&self) -> &M68k<M68kBusView> {
        &self.m68k
    }

    pub fn m68k_mut(&mut self) -> &mut M68k<M68kBusView> {
        &mut self.m68k
    }

    pub fn z80(&self) -> &Z80<Z80BusView> {
        &self.z80
    }

    pub fn z80_mut(&mut self) -> &mut Z80<Z80BusView> {
        &mut self.z80
    }

    /// Plug in a cartridge image
    pub fn attach_cartridge(&mut self, cartridge: Cartridge) {
        self.bus.lock().attach_cartridge(Arc::new(cartridge));
    }

    /// Load a ROM file
    pub fn load_rom(&mut self, path: &Path) -> EmulationResult<()> {
        let cartridge = Cartridge::load(path)?;
        info!("Loaded Mega Drive ROM: {:?}", path);
        self.attach_cartridge(cartridge);
        Ok(())
    }

    pub fn has_cartridge(&self) -> bool {
        self.bus.lock().has_cartridge()
    }

    /// Clear RAM and reset both CPUs
    pub fn reset(&mut self) -> EmulationResult<()> {
        if !self.has_cartridge() {
            return Err(EmulationError::NoCartridge);
        }

        self.bus.lock().clear_ram();
        self.m68k.reset()?;
        self.z80.reset()?;
        self.z80_balance = 0;
        self.frame_count = 0;
        Ok(())
    }

    /// Run one frame of emulation
    pub fn run_frame(&mut self) -> EmulationResult<FrameStats> {
        if !self.has_cartridge() {
            return Err(EmulationError::NoCartridge);
        }

        let budget = self.config.video_standard.master_clocks_per_frame();
        let m68k_divider = self.config.m68k_clock_divider.max(1) as u64;
        let z80_divider = self.config.z80_clock_divider.max(1) as u64;
        let mut stats = FrameStats::default();

        while stats.master_clocks < budget {
            let cycles = self.m68k.step()? as u64;
            let clocks = cycles * m68k_divider;
            stats.m68k_cycles += cycles;
            stats.master_clocks += clocks;

            if !self.config.run_z80 {
                continue;
            }
            self.z80_balance += clocks as i64;
            while self.z80_balance > 0 {
                let cycles = self.z80.step()? as u64;
                stats.z80_cycles += cycles;
                self.z80_balance -= (cycles * z80_divider) as i64;
            }
        }

        self.frame_count += 1;
        debug!(
            frame = self.frame_count,
            m68k_cycles = stats.m68k_cycles,
            z80_cycles = stats.z80_cycles,
            "frame complete"
        );
        Ok(stats)
    }

    /// Get current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
