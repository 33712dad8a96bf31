//! S-DSP sample clock
//!
//! One step is one 32 kHz output sample. Mixing is not modelled; the sample
//! value is a running fold over audio RAM so the state still evolves.

use emu_core::scheduler::{ExecutionContext, ThreadId};
use serde::{Deserialize, Serialize};

pub const THREAD: ThreadId = ThreadId(3);

/// SMP oscillator clocks per output sample
pub const CLOCKS_PER_SAMPLE: u64 = 768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DspState {
    pub clock: u64,
    pub counter: u32,
    pub sample: i16,
}

pub struct Dsp {
    context: ExecutionContext,
    counter: u32,
    sample: i16,
}

impl Dsp {
    pub fn new(frequency: u64) -> Self {
        Self {
            context: ExecutionContext::new(THREAD, "DSP", frequency),
            counter: 0,
            sample: 0,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn set_frequency(&mut self, frequency: u64) {
        self.context.recreate(frequency);
    }

    pub fn power(&mut self) {
        self.sample = 0;
    }

    pub fn reset(&mut self) {
        let frequency = self.context.frequency();
        self.context.recreate(frequency);
        self.counter = 0;
        self.sample = 0;
    }

    pub fn step(&mut self, apuram: &[u8]) {
        if !apuram.is_empty() {
            let byte = apuram[self.counter as usize % apuram.len()] as i8;
            self.sample = (self.sample >> 1).wrapping_add(i16::from(byte) << 6);
        }
        self.counter = self.counter.wrapping_add(1);
        self.context.advance(CLOCKS_PER_SAMPLE);
    }

    pub fn sample(&self) -> i16 {
        self.sample
    }

    pub fn state(&self) -> DspState {
        DspState {
            clock: self.context.clock(),
            counter: self.counter,
            sample: self.sample,
        }
    }

    pub fn restore(&mut self, state: DspState) {
        self.context.set_clock(state.clock);
        self.counter = state.counter;
        self.sample = state.sample;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate() {
        let mut dsp = Dsp::new(24_576_000);
        for _ in 0..32_000 {
            dsp.step(&[0x40; 16]);
        }
        // 32000 samples at 768 clocks = one second
        assert_eq!(dsp.context().clock(), 24_576_000);
        assert_ne!(dsp.sample(), 0);
    }
}
