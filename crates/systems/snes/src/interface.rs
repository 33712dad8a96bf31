//! Host-side services the system depends on
//!
//! The system never touches the file system or the screen directly: paths,
//! file contents, notifications and finished frames all go through an
//! [`Interface`] supplied by the host.

use emu_core::types::Frame;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Media locations the system asks the host about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaId {
    /// Console firmware, manifest and work RAM
    System,
    /// Cartridge-side files (coprocessor firmware)
    Cartridge,
}

pub trait Interface {
    /// Directory holding the files for `id`
    fn path(&self, id: MediaId) -> PathBuf;

    /// Contents of a named file, or `None` if it does not exist
    fn read(&mut self, path: &Path) -> Option<Vec<u8>> {
        fs::read(path).ok()
    }

    fn write(&mut self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::write(path, data)
    }

    /// Report a recoverable problem to the user
    fn notify(&mut self, message: &str);

    /// A finished frame is ready for presentation
    fn video_refresh(&mut self, frame: &Frame) {
        let _ = frame;
    }
}

/// Everything a [`MemoryInterface`] has seen
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub files: BTreeMap<PathBuf, Vec<u8>>,
    pub notices: Vec<String>,
    pub frames: Vec<Frame>,
}

/// In-memory host for headless use.
///
/// Clones share one [`MemoryStore`], so a caller can hand one clone to the
/// system and inspect the store through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryInterface {
    store: Rc<RefCell<MemoryStore>>,
}

impl MemoryInterface {
    pub const SYSTEM_PATH: &'static str = "/system";
    pub const CARTRIDGE_PATH: &'static str = "/cartridge";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_file(&self, id: MediaId, name: &str, data: Vec<u8>) {
        let path = self.path(id).join(name);
        self.store.borrow_mut().files.insert(path, data);
    }

    pub fn file(&self, id: MediaId, name: &str) -> Option<Vec<u8>> {
        self.store.borrow().files.get(&self.path(id).join(name)).cloned()
    }

    pub fn notices(&self) -> Vec<String> {
        self.store.borrow().notices.clone()
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.store.borrow().frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.store.borrow().frames.len()
    }
}

impl Interface for MemoryInterface {
    fn path(&self, id: MediaId) -> PathBuf {
        match id {
            MediaId::System => PathBuf::from(Self::SYSTEM_PATH),
            MediaId::Cartridge => PathBuf::from(Self::CARTRIDGE_PATH),
        }
    }

    fn read(&mut self, path: &Path) -> Option<Vec<u8>> {
        self.store.borrow().files.get(path).cloned()
    }

    fn write(&mut self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.store
            .borrow_mut()
            .files
            .insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn notify(&mut self, message: &str) {
        self.store.borrow_mut().notices.push(message.to_string());
    }

    fn video_refresh(&mut self, frame: &Frame) {
        self.store.borrow_mut().frames.push(frame.clone());
    }
}
