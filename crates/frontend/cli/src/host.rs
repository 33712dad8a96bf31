use emu_core::types::Frame;
use emu_snes::{Interface, MediaId};
use std::path::PathBuf;

/// File-system backed host for the headless runner
pub struct FsHost {
    system: PathBuf,
    cartridge: PathBuf,
    frames: u64,
}

impl FsHost {
    pub fn new(system: PathBuf, cartridge: PathBuf) -> Self {
        Self {
            system,
            cartridge,
            frames: 0,
        }
    }
}

impl Interface for FsHost {
    fn path(&self, id: MediaId) -> PathBuf {
        match id {
            MediaId::System => self.system.clone(),
            MediaId::Cartridge => self.cartridge.clone(),
        }
    }

    fn notify(&mut self, message: &str) {
        log::warn!("{}", message);
    }

    fn video_refresh(&mut self, frame: &Frame) {
        self.frames += 1;
        log::trace!("frame {} ({}x{})", self.frames, frame.width, frame.height);
    }
}
