//! Super Famicom / SNES session orchestration.
//!
//! The console is a set of independently clocked chips sharing one timeline:
//!
//! - **CPU**: 65C816 at the master clock (21.477 MHz NTSC, 21.281 MHz PAL)
//! - **SMP**: SPC700 audio processor (24.576 MHz oscillator)
//! - **DSP**: S-DSP producing one 32 kHz sample per 768 oscillator clocks
//! - **PPU**: one scan line per 1364 master clocks, 262/312 lines per frame
//! - **Coprocessors**: cartridge special chips (SA-1, SuperFX, DSP-n, ...)
//!
//! [`SnesSystem`] owns every component and drives them through the
//! cooperative [`emu_core::scheduler::Scheduler`]: free-running one frame at
//! a time, or draining each chip to the CPU's position before a save state.
//! Instruction-level behaviour of the chips is a timing model only.

pub mod board;
pub mod cartridge;
pub mod config;
pub mod coprocessor;
pub mod cpu;
pub mod dsp;
pub mod input;
pub mod interface;
pub mod ppu;
pub mod random;
pub mod serialization;
pub mod smp;
pub mod system;
pub mod video;

pub use cartridge::Cartridge;
pub use config::{Config, ExpansionPortDevice, Region};
pub use coprocessor::{ChipKind, Coprocessor, CoprocessorRegistry};
pub use interface::{Interface, MediaId, MemoryInterface};
pub use serialization::Snapshot;
pub use system::{SessionState, SnesSystem};

use emu_core::scheduler::SchedulerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnesError {
    #[error("Invalid ROM format: {0}")]
    InvalidRom(String),
    #[error("No cartridge mounted")]
    NoCartridge,
    #[error("Invalid mount point: {0}")]
    InvalidMountPoint(String),
    #[error("Cannot {op} while {state:?}")]
    InvalidState { op: &'static str, state: SessionState },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Incompatible save state: {0}")]
    IncompatibleState(String),
    #[error("Scheduler fault: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed state: {0}")]
    State(#[from] serde_json::Error),
}
