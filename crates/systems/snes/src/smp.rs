//! SPC700 audio processor timing model

use crate::random::Random;
use crate::serialization::memory;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::scheduler::{ExecutionContext, ThreadId};
use serde::{Deserialize, Serialize};

pub const THREAD: ThreadId = ThreadId(1);

pub const APURAM_SIZE: usize = 0x10000;
pub const IPLROM_SIZE: usize = 64;

/// The IPL ROM overlays the top of the address space
const IPLROM_BASE: u16 = 0xFFC0;

/// Oscillator clocks per SPC700 cycle
const CLOCKS_PER_CYCLE: u64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmpState {
    pub clock: u64,
    pub pc: u16,
    #[serde(with = "memory")]
    pub apuram: Vec<u8>,
}

pub struct Smp {
    context: ExecutionContext,
    apuram: Vec<u8>,
    iplrom: [u8; IPLROM_SIZE],
    pc: u16,
}

impl Smp {
    pub fn new(frequency: u64) -> Self {
        Self {
            context: ExecutionContext::new(THREAD, "SMP", frequency),
            apuram: vec![0; APURAM_SIZE],
            iplrom: [0; IPLROM_SIZE],
            pc: IPLROM_BASE,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn set_frequency(&mut self, frequency: u64) {
        self.context.recreate(frequency);
    }

    /// Install the boot ROM. Images other than 64 bytes are truncated or zero-padded.
    pub fn load_iplrom(&mut self, data: &[u8]) {
        self.iplrom = [0; IPLROM_SIZE];
        let len = data.len().min(IPLROM_SIZE);
        self.iplrom[..len].copy_from_slice(&data[..len]);
        if data.len() != IPLROM_SIZE {
            log(LogCategory::Smp, LogLevel::Warn, || {
                format!("SMP: IPL ROM is {} bytes, expected {}", data.len(), IPLROM_SIZE)
            });
        }
    }

    /// Audio RAM powers up holding noise.
    pub fn power(&mut self, random: &mut Random) {
        random.fill(&mut self.apuram);
    }

    pub fn reset(&mut self) {
        let frequency = self.context.frequency();
        self.context.recreate(frequency);
        self.pc = IPLROM_BASE;
    }

    pub fn step(&mut self) {
        let opcode = if self.pc >= IPLROM_BASE {
            self.iplrom[usize::from(self.pc - IPLROM_BASE)]
        } else {
            self.apuram[usize::from(self.pc)]
        };
        // 2-5 cycles per instruction
        let cycles = 2 + u64::from(opcode & 0x03);

        // CPU communication ports $F4-$F7
        let port = 0xF4 + usize::from(opcode & 0x03);
        self.apuram[port] = self.apuram[port].wrapping_add(opcode);
        self.pc = self.pc.wrapping_add(1);

        self.context.advance(cycles * CLOCKS_PER_CYCLE);
    }

    pub fn apuram(&self) -> &[u8] {
        &self.apuram
    }

    pub fn state(&self) -> SmpState {
        SmpState {
            clock: self.context.clock(),
            pc: self.pc,
            apuram: self.apuram.clone(),
        }
    }

    pub fn restore(&mut self, state: SmpState) {
        self.context.set_clock(state.clock);
        self.pc = state.pc;
        self.apuram = state.apuram;
        self.apuram.resize(APURAM_SIZE, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_cost() {
        let mut smp = Smp::new(24_607_104);
        smp.load_iplrom(&[0x00, 0x03]);
        smp.reset();
        smp.step();
        assert_eq!(smp.context().clock(), 2 * CLOCKS_PER_CYCLE);
        smp.step();
        assert_eq!(smp.context().clock(), 7 * CLOCKS_PER_CYCLE);
    }

    #[test]
    fn test_power_fills_from_random() {
        let mut a = Smp::new(24_607_104);
        let mut b = Smp::new(24_607_104);
        let mut rng = Random::default();
        rng.seed(5);
        a.power(&mut rng.clone());
        b.power(&mut rng);
        assert_eq!(a.apuram(), b.apuram());
        assert!(a.apuram().iter().any(|&x| x != 0));
    }

    #[test]
    fn test_pc_wraps_out_of_ipl() {
        let mut smp = Smp::new(24_607_104);
        smp.reset();
        for _ in 0..IPLROM_SIZE {
            smp.step();
        }
        assert_eq!(smp.state().pc, 0);
        smp.step();
        assert_eq!(smp.state().pc, 1);
    }
}
