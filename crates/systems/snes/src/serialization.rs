//! Save-state snapshot format
//!
//! A snapshot is only meaningful once every chip has been drained to the
//! CPU's position; [`crate::SnesSystem::serialize`] takes care of that
//! before capturing one.

use crate::config::{ExpansionPortDevice, Region};
use crate::coprocessor::ChipKind;
use crate::cpu::CpuState;
use crate::dsp::DspState;
use crate::input::Input;
use crate::ppu::PpuState;
use crate::random::Random;
use crate::smp::SmpState;
use crate::SnesError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Memory blobs are stored as base64 strings instead of JSON number arrays.
pub mod memory {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipSnapshot {
    pub kind: ChipKind,
    pub state: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub region: Region,
    pub expansion: ExpansionPortDevice,
    pub cpu_frequency: u64,
    pub smp_frequency: u64,
    pub random: Random,
    pub input: Input,
    pub cpu: CpuState,
    pub smp: SmpState,
    pub ppu: PpuState,
    pub dsp: DspState,
    /// Registry chips, in attachment order
    pub coprocessors: Vec<ChipSnapshot>,
}

impl Snapshot {
    pub fn to_value(&self) -> Result<Value, SnesError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: &Value) -> Result<Self, SnesError> {
        let snapshot: Snapshot = Snapshot::deserialize(value)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnesError::IncompatibleState(format!(
                "version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        Ok(snapshot)
    }

    pub fn chips(&self) -> impl Iterator<Item = ChipKind> + '_ {
        self.coprocessors.iter().map(|chip| chip.kind)
    }
}
