//! PPU scan-line counter
//!
//! Rendering is not modelled: the PPU only walks the raster so the board can
//! tell when the active display has finished.

use crate::config::Region;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::scheduler::{ExecutionContext, ThreadId};
use serde::{Deserialize, Serialize};

pub const THREAD: ThreadId = ThreadId(2);

/// Master clocks per scan line
pub const CLOCKS_PER_LINE: u64 = 1364;

pub const NTSC_LINES: u16 = 262;
pub const PAL_LINES: u16 = 312;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PpuState {
    pub clock: u64,
    pub vcounter: u16,
    pub field: bool,
}

pub struct Ppu {
    context: ExecutionContext,
    vcounter: u16,
    /// Interlace field, toggled every frame
    field: bool,
    lines_per_frame: u16,
}

impl Ppu {
    pub fn new(frequency: u64) -> Self {
        Self {
            context: ExecutionContext::new(THREAD, "PPU", frequency),
            vcounter: 0,
            field: false,
            lines_per_frame: NTSC_LINES,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// The PPU is clocked from the CPU's master clock.
    pub fn configure(&mut self, frequency: u64, region: Region) {
        self.context.recreate(frequency);
        self.lines_per_frame = match region {
            Region::Pal => PAL_LINES,
            Region::Ntsc | Region::Autodetect => NTSC_LINES,
        };
    }

    pub fn power(&mut self) {
        self.field = false;
    }

    pub fn reset(&mut self) {
        let frequency = self.context.frequency();
        self.context.recreate(frequency);
        self.vcounter = 0;
        self.field = false;
    }

    /// Advance one scan line.
    pub fn step(&mut self) {
        self.context.advance(CLOCKS_PER_LINE);
        self.vcounter += 1;
        if self.vcounter >= self.lines_per_frame {
            self.vcounter = 0;
            self.field = !self.field;
            log(LogCategory::Ppu, LogLevel::Trace, || {
                format!("PPU: field {} begins", u8::from(self.field))
            });
        }
    }

    pub fn vcounter(&self) -> u16 {
        self.vcounter
    }

    pub fn field(&self) -> bool {
        self.field
    }

    pub fn lines_per_frame(&self) -> u16 {
        self.lines_per_frame
    }

    pub fn state(&self) -> PpuState {
        PpuState {
            clock: self.context.clock(),
            vcounter: self.vcounter,
            field: self.field,
        }
    }

    pub fn restore(&mut self, state: PpuState) {
        self.context.set_clock(state.clock);
        self.vcounter = state.vcounter % self.lines_per_frame;
        self.field = state.field;
    }
}
