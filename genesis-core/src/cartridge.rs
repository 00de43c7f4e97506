//! Mega Drive cartridge images
//!
//! The image is a flat, read-only byte array mapped at 68000 address 0. The
//! header at 0x100 describes the game and the address ranges it declares.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{info, warn};

use crate::{EmulationError, EmulationResult};

/// Header plus vector table
pub const HEADER_END: usize = 0x200;
/// 40 megabits, the largest image the flat ROM window can map
pub const MAX_ROM_SIZE: usize = 0x50_0000;

/// Cartridge header at 0x100-0x1FF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisHeader {
    /// "SEGA MEGA DRIVE" / "SEGA GENESIS"
    pub system_type: String,
    pub copyright: String,
    pub domestic_title: String,
    pub overseas_title: String,
    pub serial: String,
    /// Checksum as stored in the header
    pub checksum: u16,
    pub devices: String,
    pub rom_start: u32,
    pub rom_end: u32,
    pub ram_start: u32,
    pub ram_end: u32,
    pub regions: String,
}

fn text(data: &[u8], offset: usize, len: usize) -> String {
    String::from_utf8_lossy(&data[offset..offset + len])
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

fn be_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn be_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

impl GenesisHeader {
    pub fn parse(data: &[u8]) -> EmulationResult<Self> {
        if data.len() < HEADER_END {
            return Err(EmulationError::InvalidRomFormat(format!(
                "image is {} bytes, header needs {HEADER_END:#x}",
                data.len()
            )));
        }

        Ok(Self {
            system_type: text(data, 0x100, 16),
            copyright: text(data, 0x110, 16),
            domestic_title: text(data, 0x120, 48),
            overseas_title: text(data, 0x150, 48),
            serial: text(data, 0x180, 14),
            checksum: be_u16(data, 0x18E),
            devices: text(data, 0x190, 16),
            rom_start: be_u32(data, 0x1A0),
            rom_end: be_u32(data, 0x1A4),
            ram_start: be_u32(data, 0x1A8),
            ram_end: be_u32(data, 0x1AC),
            regions: text(data, 0x1F0, 3),
        })
    }

    /// Title to show, preferring the overseas one
    pub fn title(&self) -> &str {
        if self.overseas_title.is_empty() {
            &self.domestic_title
        } else {
            &self.overseas_title
        }
    }
}

/// Sum of big-endian words from 0x200 to the end of the image
pub fn compute_checksum(data: &[u8]) -> u16 {
    data.get(HEADER_END..)
        .unwrap_or(&[])
        .chunks(2)
        .map(|w| u16::from_be_bytes([w[0], w.get(1).copied().unwrap_or(0)]))
        .fold(0u16, |acc, w| acc.wrapping_add(w))
}

/// Loaded cartridge
pub struct Cartridge {
    pub header: GenesisHeader,
    rom: Vec<u8>,
    computed_checksum: u16,
}

impl Cartridge {
    pub fn load(path: &Path) -> EmulationResult<Self> {
        let mut file = File::open(path)
            .map_err(|e| EmulationError::RomLoadError(format!("{}: {e}", path.display())))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        Self::from_bytes(data)
    }

    pub fn from_bytes(data: Vec<u8>) -> EmulationResult<Self> {
        if data.len() > MAX_ROM_SIZE {
            return Err(EmulationError::InvalidRomFormat(format!(
                "image is {} bytes, limit is {MAX_ROM_SIZE:#x}",
                data.len()
            )));
        }

        let header = GenesisHeader::parse(&data)?;

        let declared = header.rom_end as usize + 1;
        if data.len() < declared {
            return Err(EmulationError::InvalidRomFormat(format!(
                "image is {} bytes but header declares ROM end {:#x}",
                data.len(),
                header.rom_end
            )));
        }
        if data.len() > declared {
            warn!(
                size = data.len(),
                rom_end = header.rom_end,
                "image is larger than the declared ROM range"
            );
        }

        let computed_checksum = compute_checksum(&data);
        if computed_checksum != header.checksum {
            warn!(
                stored = header.checksum,
                computed = computed_checksum,
                "cartridge checksum mismatch"
            );
        }

        info!(
            title = header.title(),
            serial = %header.serial,
            regions = %header.regions,
            rom_start = header.rom_start,
            rom_end = header.rom_end,
            "Loaded cartridge"
        );

        Ok(Self { header, rom: data, computed_checksum })
    }

    /// Byte at `offset`; reads past the image return 0
    #[inline]
    pub fn read(&self, offset: u32) -> u8 {
        self.rom.get(offset as usize).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.rom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rom.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.rom
    }

    pub fn computed_checksum(&self) -> u16 {
        self.computed_checksum
    }

    pub fn checksum_valid(&self) -> bool {
        self.computed_checksum == self.header.checksum
    }
}
