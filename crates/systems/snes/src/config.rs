//! User-facing emulation settings
//!
//! Stored as JSON; every field is optional on disk and falls back to the
//! hardware defaults below.

use crate::input::Device;
use crate::SnesError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Shortest frame (NTSC) in scan lines; the end-of-frame line must be below it.
pub const MIN_LINES_PER_FRAME: u16 = 262;

/// Console region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Region {
    Ntsc,
    Pal,
    /// Take the region reported by the cartridge header
    #[default]
    Autodetect,
}

impl Region {
    /// Resolve against the cartridge's region; never returns `Autodetect`.
    pub fn resolve(self, cartridge: Region) -> Region {
        match self {
            Region::Autodetect => match cartridge {
                Region::Pal => Region::Pal,
                Region::Ntsc | Region::Autodetect => Region::Ntsc,
            },
            fixed => fixed,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ntsc" => Some(Region::Ntsc),
            "pal" => Some(Region::Pal),
            "auto" | "autodetect" => Some(Region::Autodetect),
            _ => None,
        }
    }
}

/// Peripheral plugged into the expansion port under the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExpansionPortDevice {
    None,
    /// Satellaview (BS-X) receiver
    #[default]
    Bsx,
}

/// Clock rates for one processor, per region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    pub ntsc_frequency: u64,
    pub pal_frequency: u64,
}

impl ClockConfig {
    pub fn frequency(&self, region: Region) -> u64 {
        match region {
            Region::Pal => self.pal_frequency,
            Region::Ntsc | Region::Autodetect => self.ntsc_frequency,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PpuConfig {
    /// Scan line on which a finished frame is handed to the host
    pub frame_end_line: u16,
}

impl Default for PpuConfig {
    fn default() -> Self {
        Self { frame_end_line: 241 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub region: Region,
    pub expansion_port: ExpansionPortDevice,
    pub controller_port1: Device,
    pub controller_port2: Device,
    pub cpu: ClockConfig,
    pub smp: ClockConfig,
    pub ppu: PpuConfig,
    /// Fixed power-on seed; `None` seeds from the wall clock
    pub random_seed: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: Region::Autodetect,
            expansion_port: ExpansionPortDevice::Bsx,
            controller_port1: Device::Joypad,
            controller_port2: Device::Joypad,
            cpu: ClockConfig {
                ntsc_frequency: 21_477_272,
                pal_frequency: 21_281_370,
            },
            smp: ClockConfig {
                ntsc_frequency: 24_607_104,
                pal_frequency: 24_607_104,
            },
            ppu: PpuConfig::default(),
            random_seed: None,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, SnesError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, SnesError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SnesError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SnesError> {
        for (name, clock) in [("cpu", &self.cpu), ("smp", &self.smp)] {
            if clock.ntsc_frequency == 0 || clock.pal_frequency == 0 {
                return Err(SnesError::Config(format!("{name} frequency must be non-zero")));
            }
        }
        if self.ppu.frame_end_line >= MIN_LINES_PER_FRAME {
            return Err(SnesError::Config(format!(
                "frame_end_line {} is never reached (frames have {} lines)",
                self.ppu.frame_end_line, MIN_LINES_PER_FRAME
            )));
        }
        Ok(())
    }
}
