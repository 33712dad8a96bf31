use anyhow::{bail, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum number of save slots per game
pub const MAX_SAVE_SLOTS: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveSlot {
    /// Base64 encoded snapshot JSON
    pub data: String,
    pub timestamp: u64,
    #[serde(default)]
    pub rom_hash: Option<String>,
}

/// Save slots for one game, stored as `<dir>/<rom hash>/states.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GameSaves {
    pub slots: HashMap<u8, SaveSlot>,
}

impl GameSaves {
    /// SHA-256 of the ROM image, hex encoded
    pub fn rom_hash(rom_data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(rom_data);
        format!("{:x}", hasher.finalize())
    }

    pub fn game_save_path(dir: &Path, rom_hash: &str) -> PathBuf {
        dir.join(rom_hash).join("states.json")
    }

    /// Saves for a game; a missing or unreadable file yields no slots.
    pub fn load(dir: &Path, rom_hash: &str) -> Self {
        let path = Self::game_save_path(dir, rom_hash);
        let Ok(contents) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_json::from_str(&contents) {
            Ok(saves) => saves,
            Err(e) => {
                log::warn!("Failed to parse {}: {}. Using empty saves.", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, dir: &Path, rom_hash: &str) -> Result<()> {
        let path = Self::game_save_path(dir, rom_hash);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn save_slot(&mut self, dir: &Path, slot: u8, data: &[u8], rom_hash: &str) -> Result<()> {
        check_slot(slot)?;
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_secs();

        self.slots.insert(
            slot,
            SaveSlot {
                data: BASE64.encode(data),
                timestamp,
                rom_hash: Some(rom_hash.to_string()),
            },
        );
        self.save(dir, rom_hash)
    }

    /// Snapshot bytes in `slot`; refuses slots written for a different ROM.
    pub fn load_slot(&self, slot: u8, current_rom_hash: &str) -> Result<Vec<u8>> {
        check_slot(slot)?;
        let Some(save_slot) = self.slots.get(&slot) else {
            bail!("No save data in slot {}", slot);
        };
        if let Some(saved_hash) = &save_slot.rom_hash {
            if saved_hash != current_rom_hash {
                bail!("ROM hash mismatch: save state was created with a different ROM");
            }
        }
        Ok(BASE64.decode(&save_slot.data)?)
    }

    pub fn has_slot(&self, slot: u8) -> bool {
        self.slots.contains_key(&slot)
    }
}

fn check_slot(slot: u8) -> Result<()> {
    if !(1..=MAX_SAVE_SLOTS).contains(&slot) {
        bail!("Slot must be between 1 and {}", MAX_SAVE_SLOTS);
    }
    Ok(())
}
