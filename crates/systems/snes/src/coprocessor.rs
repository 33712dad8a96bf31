//! Cartridge coprocessors and expansion-port peripherals
//!
//! Every special chip the console can meet is created once when the system is
//! built. Whether a chip takes part in a session is decided by probing the
//! cartridge (and the expansion port) with [`ChipKind::is_required`]; the same
//! probe drives load, unload, power and reset, so the fan-out never depends on
//! which chips happen to be present.
//!
//! Chips with their own instruction stream ([`ChipKind::is_threaded`]) get an
//! execution context and are attached to the [`CoprocessorRegistry`] at reset,
//! which is what the scheduler and the save-state drain iterate over.
//! The chips' internal behaviour (decode, decompression, clock registers) is
//! not modelled: a threaded chip walks its firmware at the chip's native
//! clock so the scheduler sees a realistic cycle stream.

use crate::cartridge::Cartridge;
use crate::config::ExpansionPortDevice;
use crate::interface::{Interface, MediaId};
use crate::SnesError;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::scheduler::{ExecutionContext, ThreadId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// First thread id handed to coprocessors; ids below belong to the main chips.
pub const FIRST_COPROCESSOR_THREAD: usize = 4;

/// Master clock assumed until a cartridge is loaded
const DEFAULT_CPU_FREQUENCY: u64 = 21_477_272;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChipKind {
    /// Satellaview receiver on the expansion port
    Satellaview,
    /// Super Game Boy interface
    Icd2,
    BsxCartridge,
    BsxFlash,
    SufamiTurbo,
    /// Nintendo Super System DIP switches
    NssDip,
    Sa1,
    SuperFx,
    /// ST018
    ArmDsp,
    /// CX4
    HitachiDsp,
    /// DSP-1..4, ST010, ST011
    NecDsp,
    EpsonRtc,
    SharpRtc,
    Spc7110,
    Sdd1,
    Obc1,
    Msu1,
}

impl ChipKind {
    /// Every chip, in lifecycle fan-out order
    pub const ALL: [ChipKind; 17] = [
        ChipKind::Satellaview,
        ChipKind::Icd2,
        ChipKind::BsxCartridge,
        ChipKind::BsxFlash,
        ChipKind::SufamiTurbo,
        ChipKind::NssDip,
        ChipKind::Sa1,
        ChipKind::SuperFx,
        ChipKind::ArmDsp,
        ChipKind::HitachiDsp,
        ChipKind::NecDsp,
        ChipKind::EpsonRtc,
        ChipKind::SharpRtc,
        ChipKind::Spc7110,
        ChipKind::Sdd1,
        ChipKind::Obc1,
        ChipKind::Msu1,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChipKind::Satellaview => "Satellaview",
            ChipKind::Icd2 => "ICD2",
            ChipKind::BsxCartridge => "BS-X cartridge",
            ChipKind::BsxFlash => "BS-X flash",
            ChipKind::SufamiTurbo => "Sufami Turbo",
            ChipKind::NssDip => "NSS DIP",
            ChipKind::Sa1 => "SA-1",
            ChipKind::SuperFx => "SuperFX",
            ChipKind::ArmDsp => "ARM DSP",
            ChipKind::HitachiDsp => "Hitachi DSP",
            ChipKind::NecDsp => "NEC DSP",
            ChipKind::EpsonRtc => "Epson RTC",
            ChipKind::SharpRtc => "Sharp RTC",
            ChipKind::Spc7110 => "SPC7110",
            ChipKind::Sdd1 => "S-DD1",
            ChipKind::Obc1 => "OBC-1",
            ChipKind::Msu1 => "MSU-1",
        }
    }

    /// Chips that run their own instruction stream
    pub fn is_threaded(self) -> bool {
        matches!(
            self,
            ChipKind::Icd2
                | ChipKind::Sa1
                | ChipKind::SuperFx
                | ChipKind::ArmDsp
                | ChipKind::HitachiDsp
                | ChipKind::NecDsp
                | ChipKind::EpsonRtc
                | ChipKind::SharpRtc
                | ChipKind::Spc7110
                | ChipKind::Msu1
        )
    }

    /// The Sufami Turbo adapter only maps slots; it has no power/reset sequence.
    pub fn has_power_cycle(self) -> bool {
        self != ChipKind::SufamiTurbo
    }

    /// Firmware file requested from the cartridge path at load
    pub fn firmware(self) -> Option<&'static str> {
        match self {
            ChipKind::Icd2 => Some("sgb.boot.rom"),
            ChipKind::ArmDsp => Some("st018.program.rom"),
            ChipKind::HitachiDsp => Some("cx4.data.rom"),
            ChipKind::NecDsp => Some("dsp.program.rom"),
            _ => None,
        }
    }

    /// Native clock in Hz
    pub fn frequency(self, cpu_frequency: u64) -> u64 {
        match self {
            ChipKind::Icd2 => cpu_frequency / 5,
            ChipKind::Sa1 | ChipKind::SuperFx | ChipKind::Spc7110 => cpu_frequency,
            ChipKind::ArmDsp => 21_477_272,
            ChipKind::HitachiDsp => 20_000_000,
            ChipKind::NecDsp => 7_600_000,
            ChipKind::EpsonRtc => 32_768,
            ChipKind::SharpRtc => 1,
            ChipKind::Msu1 => 44_100,
            _ => cpu_frequency,
        }
    }

    /// Clocks consumed by one step
    fn step_clocks(self) -> u64 {
        match self {
            ChipKind::Icd2 => 4,
            ChipKind::Sa1 => 6,
            ChipKind::SuperFx | ChipKind::HitachiDsp => 2,
            ChipKind::ArmDsp => 4,
            ChipKind::Spc7110 => 12,
            _ => 1,
        }
    }

    pub fn thread(self) -> ThreadId {
        ThreadId(FIRST_COPROCESSOR_THREAD + self as usize)
    }

    pub fn from_thread(thread: ThreadId) -> Option<ChipKind> {
        thread
            .0
            .checked_sub(FIRST_COPROCESSOR_THREAD)
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Capability probe shared by every lifecycle fan-out
    pub fn is_required(self, cartridge: &Cartridge, expansion: ExpansionPortDevice) -> bool {
        match self {
            ChipKind::Satellaview => expansion == ExpansionPortDevice::Bsx,
            other => cartridge.has(other),
        }
    }
}

/// Lifecycle shared by every special chip
pub trait Coprocessor {
    fn kind(&self) -> ChipKind;

    /// One-time setup when the system is built
    fn init(&mut self) {}

    fn load(&mut self, host: &mut dyn Interface, cpu_frequency: u64);
    fn unload(&mut self);
    fn power(&mut self);
    fn reset(&mut self);

    fn is_loaded(&self) -> bool;
    fn is_powered(&self) -> bool;

    /// Execution context, for chips that run their own instruction stream
    fn context(&self) -> Option<&ExecutionContext> {
        None
    }

    fn step(&mut self) {}

    fn serialize(&self) -> Result<Value, SnesError> {
        Ok(Value::Null)
    }

    /// Fails if `state` could not be restored by `unserialize`; leaves the chip untouched.
    fn check_state(&self, state: &Value) -> Result<(), SnesError> {
        let _ = state;
        Ok(())
    }

    fn unserialize(&mut self, state: &Value) -> Result<(), SnesError> {
        let _ = state;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ThreadedState {
    clock: u64,
    cursor: u32,
    accumulator: u32,
}

impl ThreadedState {
    fn decode(state: &Value) -> Result<Self, SnesError> {
        Ok(ThreadedState::deserialize(state)?)
    }
}

/// A chip with its own execution context
pub struct ThreadedChip {
    kind: ChipKind,
    context: ExecutionContext,
    firmware: Option<Vec<u8>>,
    loaded: bool,
    powered: bool,
    cursor: u32,
    accumulator: u32,
}

impl ThreadedChip {
    pub fn new(kind: ChipKind) -> Self {
        Self {
            kind,
            context: ExecutionContext::new(
                kind.thread(),
                kind.name(),
                kind.frequency(DEFAULT_CPU_FREQUENCY),
            ),
            firmware: None,
            loaded: false,
            powered: false,
            cursor: 0,
            accumulator: 0,
        }
    }

    /// False when required firmware was missing at load
    pub fn has_firmware(&self) -> bool {
        self.kind.firmware().is_none() || self.firmware.is_some()
    }
}

impl Coprocessor for ThreadedChip {
    fn kind(&self) -> ChipKind {
        self.kind
    }

    fn load(&mut self, host: &mut dyn Interface, cpu_frequency: u64) {
        self.context.recreate(self.kind.frequency(cpu_frequency));
        self.firmware = None;
        if let Some(name) = self.kind.firmware() {
            let path = host.path(MediaId::Cartridge).join(name);
            self.firmware = host.read(&path).filter(|data| !data.is_empty());
            if self.firmware.is_none() {
                log(LogCategory::Coprocessor, LogLevel::Warn, || {
                    format!("{}: firmware {} not found, running degraded", self.kind.name(), name)
                });
                host.notify(&format!("Error: required firmware {} not found.", name));
            }
        }
        self.loaded = true;
        log(LogCategory::Coprocessor, LogLevel::Info, || {
            format!(
                "{}: loaded at {} Hz",
                self.kind.name(),
                self.context.frequency()
            )
        });
    }

    fn unload(&mut self) {
        self.firmware = None;
        self.loaded = false;
        self.powered = false;
    }

    fn power(&mut self) {
        self.powered = true;
    }

    fn reset(&mut self) {
        let frequency = self.context.frequency();
        self.context.recreate(frequency);
        self.cursor = 0;
        self.accumulator = 0;
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn is_powered(&self) -> bool {
        self.powered
    }

    fn context(&self) -> Option<&ExecutionContext> {
        Some(&self.context)
    }

    fn step(&mut self) {
        let byte = match &self.firmware {
            Some(data) => data[self.cursor as usize % data.len()],
            None => 0,
        };
        self.accumulator = self.accumulator.rotate_left(5) ^ u32::from(byte) ^ self.cursor;
        self.cursor = self.cursor.wrapping_add(1);
        self.context.advance(self.kind.step_clocks());
    }

    fn serialize(&self) -> Result<Value, SnesError> {
        Ok(serde_json::to_value(ThreadedState {
            clock: self.context.clock(),
            cursor: self.cursor,
            accumulator: self.accumulator,
        })?)
    }

    fn check_state(&self, state: &Value) -> Result<(), SnesError> {
        ThreadedState::decode(state).map(|_| ())
    }

    fn unserialize(&mut self, state: &Value) -> Result<(), SnesError> {
        let state = ThreadedState::decode(state)?;
        self.context.set_clock(state.clock);
        self.cursor = state.cursor;
        self.accumulator = state.accumulator;
        Ok(())
    }
}

/// A chip that only responds to bus accesses; it never runs on its own.
pub struct MappedChip {
    kind: ChipKind,
    loaded: bool,
    powered: bool,
}

impl MappedChip {
    pub fn new(kind: ChipKind) -> Self {
        Self {
            kind,
            loaded: false,
            powered: false,
        }
    }
}

impl Coprocessor for MappedChip {
    fn kind(&self) -> ChipKind {
        self.kind
    }

    fn load(&mut self, _host: &mut dyn Interface, _cpu_frequency: u64) {
        self.loaded = true;
        log(LogCategory::Coprocessor, LogLevel::Info, || {
            format!("{}: loaded", self.kind.name())
        });
    }

    fn unload(&mut self) {
        self.loaded = false;
        self.powered = false;
    }

    fn power(&mut self) {
        self.powered = true;
    }

    fn reset(&mut self) {}

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn is_powered(&self) -> bool {
        self.powered
    }
}

/// One instance of every chip, indexed by `ChipKind as usize`
pub fn build_all() -> Vec<Box<dyn Coprocessor>> {
    ChipKind::ALL
        .iter()
        .map(|&kind| -> Box<dyn Coprocessor> {
            if kind.is_threaded() {
                Box::new(ThreadedChip::new(kind))
            } else {
                Box::new(MappedChip::new(kind))
            }
        })
        .collect()
}

/// Threaded chips attached to the running session, in attachment order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoprocessorRegistry {
    attached: Vec<ChipKind>,
}

impl CoprocessorRegistry {
    /// Attach every threaded chip the cartridge requires, in canonical order.
    pub fn rebuild(&mut self, cartridge: &Cartridge) {
        self.attached.clear();
        for kind in ChipKind::ALL {
            if kind.is_threaded() && cartridge.has(kind) {
                self.attach(kind);
            }
        }
    }

    /// Returns false if `kind` is already attached.
    pub fn attach(&mut self, kind: ChipKind) -> bool {
        if self.attached.contains(&kind) {
            return false;
        }
        self.attached.push(kind);
        true
    }

    pub fn clear(&mut self) {
        self.attached.clear();
    }

    pub fn contains(&self, kind: ChipKind) -> bool {
        self.attached.contains(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = ChipKind> + '_ {
        self.attached.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.attached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }
}
