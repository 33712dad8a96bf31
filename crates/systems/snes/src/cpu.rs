//! 65C816 main CPU timing model
//!
//! Instruction decode is not emulated. Each step fetches the next byte of
//! cartridge ROM, charges the access at one of the three SNES memory speeds
//! and folds the byte into work RAM, which is what the video output samples.

use crate::serialization::memory;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::scheduler::{ExecutionContext, ThreadId};
use serde::{Deserialize, Serialize};

pub const THREAD: ThreadId = ThreadId(0);

/// 128 KiB work RAM ($7E:0000-$7F:FFFF)
pub const WRAM_SIZE: usize = 0x20000;

/// Master clocks per access: internal, slow ROM, extra-slow I/O
const FAST: u64 = 6;
const SLOW: u64 = 8;
const XSLOW: u64 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    pub clock: u64,
    pub pc: u32,
    pub acc: u8,
    pub cursor: u32,
    #[serde(with = "memory")]
    pub wram: Vec<u8>,
}

pub struct Cpu {
    context: ExecutionContext,
    wram: Vec<u8>,
    /// Offset into cartridge ROM
    pc: u32,
    acc: u8,
    /// Next work RAM address written
    cursor: u32,
}

impl Cpu {
    pub fn new(frequency: u64) -> Self {
        Self {
            context: ExecutionContext::new(THREAD, "CPU", frequency),
            wram: vec![0; WRAM_SIZE],
            pc: 0,
            acc: 0,
            cursor: 0,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn set_frequency(&mut self, frequency: u64) {
        self.context.recreate(frequency);
    }

    /// Work RAM keeps its contents across power cycles; it is restored from
    /// the persisted image at load.
    pub fn power(&mut self) {
        self.pc = 0;
        self.acc = 0;
    }

    pub fn reset(&mut self) {
        let frequency = self.context.frequency();
        self.context.recreate(frequency);
        self.pc = 0;
        self.acc = 0;
        self.cursor = 0;
    }

    pub fn step(&mut self, rom: &[u8]) {
        let opcode = if rom.is_empty() {
            0
        } else {
            rom[self.pc as usize % rom.len()]
        };

        let clocks = match opcode & 0x03 {
            0 => FAST,
            3 => XSLOW,
            _ => SLOW,
        };

        self.acc = self.acc.rotate_left(1).wrapping_add(opcode) ^ (self.pc as u8);
        self.wram[self.cursor as usize] = self.acc;
        self.cursor = (self.cursor + 1) % WRAM_SIZE as u32;
        self.pc = if rom.is_empty() {
            0
        } else {
            (self.pc + 1) % rom.len() as u32
        };

        self.context.advance(clocks);
        log(LogCategory::Cpu, LogLevel::Trace, || {
            format!(
                "CPU: op={:02X} pc={:06X} acc={:02X} +{} clocks",
                opcode, self.pc, self.acc, clocks
            )
        });
    }

    pub fn wram(&self) -> &[u8] {
        &self.wram
    }

    pub fn clear_wram(&mut self) {
        self.wram.fill(0);
    }

    /// Copy a persisted image into work RAM; short images leave the tail untouched.
    pub fn load_wram(&mut self, data: &[u8]) {
        let len = data.len().min(WRAM_SIZE);
        self.wram[..len].copy_from_slice(&data[..len]);
    }

    pub fn state(&self) -> CpuState {
        CpuState {
            clock: self.context.clock(),
            pc: self.pc,
            acc: self.acc,
            cursor: self.cursor,
            wram: self.wram.clone(),
        }
    }

    pub fn restore(&mut self, state: CpuState) {
        self.context.set_clock(state.clock);
        self.pc = state.pc;
        self.acc = state.acc;
        self.cursor = state.cursor % WRAM_SIZE as u32;
        self.wram = state.wram;
        self.wram.resize(WRAM_SIZE, 0);
    }
}
