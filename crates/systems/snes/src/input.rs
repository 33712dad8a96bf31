//! Controller port connections

use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

/// Peripheral attached to a controller port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Device {
    None,
    #[default]
    Joypad,
    Multitap,
    Mouse,
    SuperScope,
    Justifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Input {
    ports: [Device; 2],
}

impl Input {
    pub fn connect(&mut self, port: usize, device: Device) {
        if let Some(slot) = self.ports.get_mut(port) {
            log(LogCategory::System, LogLevel::Debug, || {
                format!("Input: port {} -> {:?}", port + 1, device)
            });
            *slot = device;
        }
    }

    pub fn device(&self, port: usize) -> Device {
        self.ports.get(port).copied().unwrap_or(Device::None)
    }
}
