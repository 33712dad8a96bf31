//! Every chip on the console, plus the inserted cartridge
//!
//! The board is the [`Machine`] the scheduler resumes: it maps thread ids to
//! the owning component's execution context and step function.

use crate::cartridge::Cartridge;
use crate::config::ExpansionPortDevice;
use crate::coprocessor::{self, ChipKind, Coprocessor};
use crate::cpu::{self, Cpu};
use crate::dsp::{self, Dsp};
use crate::ppu::{self, Ppu};
use crate::smp::{self, Smp};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::scheduler::{ExecutionContext, ExitLatch, ExitReason, Machine, ThreadId};

/// Main chips in save-drain order
pub const MAIN_THREADS: [ThreadId; 4] = [cpu::THREAD, smp::THREAD, ppu::THREAD, dsp::THREAD];

pub struct Board {
    pub cpu: Cpu,
    pub smp: Smp,
    pub ppu: Ppu,
    pub dsp: Dsp,
    chips: Vec<Box<dyn Coprocessor>>,
    pub cartridge: Option<Cartridge>,
    pub expansion: ExpansionPortDevice,
    /// Scan line that ends a frame
    pub frame_end_line: u16,
}

impl Board {
    pub fn new(cpu_frequency: u64, smp_frequency: u64, frame_end_line: u16) -> Self {
        let mut chips = coprocessor::build_all();
        for chip in chips.iter_mut() {
            chip.init();
        }
        Self {
            cpu: Cpu::new(cpu_frequency),
            smp: Smp::new(smp_frequency),
            ppu: Ppu::new(cpu_frequency),
            dsp: Dsp::new(smp_frequency),
            chips,
            cartridge: None,
            expansion: ExpansionPortDevice::None,
            frame_end_line,
        }
    }

    pub fn chip(&self, kind: ChipKind) -> &dyn Coprocessor {
        self.chips[kind as usize].as_ref()
    }

    pub fn chip_mut(&mut self, kind: ChipKind) -> &mut dyn Coprocessor {
        self.chips[kind as usize].as_mut()
    }

    /// Install `chip` in its kind's slot; returns the implementation it replaces.
    pub fn replace_chip(&mut self, mut chip: Box<dyn Coprocessor>) -> Box<dyn Coprocessor> {
        chip.init();
        let index = chip.kind() as usize;
        std::mem::replace(&mut self.chips[index], chip)
    }

    /// Chips the inserted cartridge (and expansion port) call for, in fan-out order
    pub fn required_chips(&self) -> Vec<ChipKind> {
        match &self.cartridge {
            Some(cartridge) => ChipKind::ALL
                .into_iter()
                .filter(|kind| kind.is_required(cartridge, self.expansion))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Called once per scan line; ends the frame on the configured line.
    pub fn scanline(&self, latch: &mut ExitLatch) {
        if self.ppu.vcounter() == self.frame_end_line {
            log(LogCategory::Ppu, LogLevel::Trace, || {
                format!("PPU: line {} reached, frame complete", self.frame_end_line)
            });
            latch.raise(ExitReason::FrameEvent);
        }
    }
}

impl Machine for Board {
    fn context(&self, thread: ThreadId) -> Option<&ExecutionContext> {
        match thread {
            cpu::THREAD => Some(self.cpu.context()),
            smp::THREAD => Some(self.smp.context()),
            ppu::THREAD => Some(self.ppu.context()),
            dsp::THREAD => Some(self.dsp.context()),
            other => ChipKind::from_thread(other).and_then(|kind| self.chip(kind).context()),
        }
    }

    fn step(&mut self, thread: ThreadId, latch: &mut ExitLatch) {
        match thread {
            cpu::THREAD => {
                let rom = self.cartridge.as_ref().map(Cartridge::rom).unwrap_or(&[]);
                self.cpu.step(rom);
            }
            smp::THREAD => self.smp.step(),
            ppu::THREAD => {
                self.ppu.step();
                self.scanline(latch);
            }
            dsp::THREAD => self.dsp.step(self.smp.apuram()),
            other => {
                if let Some(kind) = ChipKind::from_thread(other) {
                    self.chip_mut(kind).step();
                }
            }
        }
    }
}
