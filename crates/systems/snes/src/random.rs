//! Power-on pseudo-random source
//!
//! Memory that real hardware leaves in an undefined state at power-on is
//! filled from this LFSR. It is seeded once per power cycle and saved with
//! the rest of the machine, so restored sessions stay deterministic.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

const POLYNOMIAL: u32 = 0xEDB8_8320;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Random {
    iter: u32,
}

impl Random {
    pub fn seed(&mut self, seed: u32) {
        self.iter = seed;
    }

    /// Seed from wall-clock seconds
    pub fn seed_from_time(&mut self) {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.seed(secs as u32);
    }

    pub fn next_u32(&mut self) -> u32 {
        let n = self.iter;
        self.iter = (n >> 1) ^ ((n & 1).wrapping_sub(1) & POLYNOMIAL);
        self.iter
    }

    pub fn next_u8(&mut self) -> u8 {
        self.next_u32() as u8
    }

    pub fn fill(&mut self, buf: &mut [u8]) {
        for byte in buf {
            *byte = self.next_u8();
        }
    }
}
