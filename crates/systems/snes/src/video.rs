//! Frame presentation

use crate::interface::Interface;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::types::Frame;

pub const WIDTH: u32 = 256;
pub const HEIGHT: u32 = 224;

pub struct Video {
    frame: Frame,
    frames: u64,
}

impl Video {
    pub fn new() -> Self {
        Self {
            frame: Frame::new(WIDTH, HEIGHT),
            frames: 0,
        }
    }

    /// Finish the current frame from work RAM and hand it to the host.
    pub fn update(&mut self, wram: &[u8], host: &mut dyn Interface) {
        for (i, pixel) in self.frame.pixels.iter_mut().enumerate() {
            let level = u32::from(wram.get(i).copied().unwrap_or(0));
            *pixel = 0xFF00_0000 | (level << 16) | (level << 8) | level;
        }
        self.frames += 1;
        log(LogCategory::Ppu, LogLevel::Debug, || {
            format!("Video: frame {} presented", self.frames)
        });
        host.video_refresh(&self.frame);
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Frames presented since the session was loaded
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn clear(&mut self) {
        self.frame = Frame::new(WIDTH, HEIGHT);
        self.frames = 0;
    }
}

impl Default for Video {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::MemoryInterface;

    #[test]
    fn test_update_presents_grayscale() {
        let host = MemoryInterface::new();
        let mut handle = host.clone();
        let mut video = Video::new();
        let wram = [0x00, 0x80, 0xFF];

        video.update(&wram, &mut handle);

        let frames = host.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].width, WIDTH);
        assert_eq!(frames[0].pixels[0], 0xFF00_0000);
        assert_eq!(frames[0].pixels[1], 0xFF80_8080);
        assert_eq!(frames[0].pixels[2], 0xFFFF_FFFF);
        assert_eq!(frames[0].pixels[3], 0xFF00_0000);
        assert_eq!(video.frame_count(), 1);
    }
}
