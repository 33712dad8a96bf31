//! Session lifecycle: load, power, reset, run, save and unload
//!
//! ```text
//! Unloaded --load--> Loaded --power--> Powered --run--> Running
//!     ^                                                    |
//!     +---------------------- unload ----------------------+
//! ```
//!
//! `reset` is valid from `Loaded` onwards and lands in `Powered`. A scheduler
//! fault moves the session to `Faulted`, from which only `unload` is
//! accepted.

use crate::board::{Board, MAIN_THREADS};
use crate::cartridge::Cartridge;
use crate::config::{Config, ExpansionPortDevice, Region};
use crate::coprocessor::{ChipKind, Coprocessor, CoprocessorRegistry};
use crate::cpu::{self, WRAM_SIZE};
use crate::input::Input;
use crate::interface::{Interface, MediaId};
use crate::random::Random;
use crate::serialization::{ChipSnapshot, Snapshot, SNAPSHOT_VERSION};
use crate::video::Video;
use crate::SnesError;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::scheduler::{ExitReason, Scheduler, SchedulerError, SyncMode, ThreadId};
use emu_core::types::Frame;
use emu_core::{MountPointInfo, System};
use serde_json::Value;

const MANIFEST: &str = "manifest.json";
const DEFAULT_IPL_FIRMWARE: &str = "ipl.rom";
const WRAM_FILE: &str = "wram.rwm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unloaded,
    Loaded,
    Powered,
    Running,
    /// A chip failed to reach its synchronization point; unload to recover.
    Faulted,
}

pub struct SnesSystem {
    config: Config,
    interface: Box<dyn Interface>,
    board: Board,
    scheduler: Scheduler,
    registry: CoprocessorRegistry,
    video: Video,
    input: Input,
    random: Random,
    region: Region,
    cpu_frequency: u64,
    smp_frequency: u64,
    state: SessionState,
}

impl SnesSystem {
    pub fn new(config: Config, interface: Box<dyn Interface>) -> Result<Self, SnesError> {
        config.validate()?;
        let board = Board::new(
            config.cpu.ntsc_frequency,
            config.smp.ntsc_frequency,
            config.ppu.frame_end_line,
        );
        Ok(Self {
            cpu_frequency: config.cpu.ntsc_frequency,
            smp_frequency: config.smp.ntsc_frequency,
            region: Region::Ntsc,
            config,
            interface,
            board,
            scheduler: Scheduler::new(cpu::THREAD),
            registry: CoprocessorRegistry::default(),
            video: Video::new(),
            input: Input::default(),
            random: Random::default(),
            state: SessionState::Unloaded,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolved region of the loaded session; never `Autodetect`
    pub fn region(&self) -> Region {
        self.region
    }

    pub fn expansion(&self) -> ExpansionPortDevice {
        self.board.expansion
    }

    pub fn cpu_frequency(&self) -> u64 {
        self.cpu_frequency
    }

    pub fn smp_frequency(&self) -> u64 {
        self.smp_frequency
    }

    pub fn registry(&self) -> &CoprocessorRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.board.cartridge.as_ref()
    }

    /// Most recently presented frame
    pub fn frame(&self) -> &Frame {
        self.video.frame()
    }

    pub fn frame_count(&self) -> u64 {
        self.video.frame_count()
    }

    fn expect_state(&self, op: &'static str, allowed: &[SessionState]) -> Result<(), SnesError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SnesError::InvalidState {
                op,
                state: self.state,
            })
        }
    }

    fn expect_powered(&self, op: &'static str) -> Result<(), SnesError> {
        self.expect_state(op, &[SessionState::Powered, SessionState::Running])
    }

    /// Every thread the scheduler resumes, main chips first
    fn threads(&self) -> Vec<ThreadId> {
        MAIN_THREADS
            .into_iter()
            .chain(self.registry.iter().map(ChipKind::thread))
            .collect()
    }

    fn fault(&mut self, err: SchedulerError) -> SnesError {
        log(LogCategory::System, LogLevel::Error, || {
            format!("System: session halted: {}", err)
        });
        self.interface
            .notify(&format!("Emulation halted: {}. Unload to continue.", err));
        self.state = SessionState::Faulted;
        SnesError::Scheduler(err)
    }

    /// Swap in a host-supplied implementation of one chip. Only while unloaded.
    pub fn replace_chip(&mut self, chip: Box<dyn Coprocessor>) -> Result<(), SnesError> {
        self.expect_state("replace_chip", &[SessionState::Unloaded])?;
        let kind = chip.kind();
        self.board.replace_chip(chip);
        log(LogCategory::Coprocessor, LogLevel::Info, || {
            format!("System: {} implementation replaced", kind.name())
        });
        Ok(())
    }

    pub fn load(&mut self, cartridge: Cartridge) -> Result<(), SnesError> {
        self.expect_state("load", &[SessionState::Unloaded])?;

        let system_path = self.interface.path(MediaId::System);
        let firmware = self.ipl_firmware_name();
        match self.interface.read(&system_path.join(&firmware)) {
            Some(data) => self.board.smp.load_iplrom(&data),
            None => {
                log(LogCategory::System, LogLevel::Warn, || {
                    format!("System: firmware {} not found", firmware)
                });
                self.board.smp.load_iplrom(&[]);
                self.interface.notify(&format!(
                    "Error: required Super Famicom firmware {} not found.",
                    firmware
                ));
            }
        }

        self.board.cpu.clear_wram();
        match self.interface.read(&system_path.join(WRAM_FILE)) {
            Some(data) => {
                if data.len() != WRAM_SIZE {
                    log(LogCategory::System, LogLevel::Warn, || {
                        format!(
                            "System: {} is {} bytes, expected {}",
                            WRAM_FILE,
                            data.len(),
                            WRAM_SIZE
                        )
                    });
                }
                self.board.cpu.load_wram(&data);
            }
            None => log(LogCategory::System, LogLevel::Info, || {
                format!("System: no {}, starting with cleared work RAM", WRAM_FILE)
            }),
        }

        self.region = self.config.region.resolve(cartridge.region());
        self.board.expansion = self.config.expansion_port;
        self.cpu_frequency = self.config.cpu.frequency(self.region);
        self.smp_frequency = self.config.smp.frequency(self.region);

        self.board.cpu.set_frequency(self.cpu_frequency);
        self.board.smp.set_frequency(self.smp_frequency);
        self.board.dsp.set_frequency(self.smp_frequency);
        self.board.ppu.configure(self.cpu_frequency, self.region);
        self.board.frame_end_line = self.config.ppu.frame_end_line;
        self.board.cartridge = Some(cartridge);

        for kind in self.board.required_chips() {
            self.board
                .chip_mut(kind)
                .load(&mut *self.interface, self.cpu_frequency);
        }

        self.video.clear();
        self.state = SessionState::Loaded;
        log(LogCategory::System, LogLevel::Info, || {
            format!(
                "System: loaded, region {:?}, expansion {:?}, CPU {} Hz, SMP {} Hz",
                self.region, self.board.expansion, self.cpu_frequency, self.smp_frequency
            )
        });
        Ok(())
    }

    /// `system.smp.firmware.name` from the manifest, or the stock IPL ROM
    fn ipl_firmware_name(&mut self) -> String {
        let path = self.interface.path(MediaId::System).join(MANIFEST);
        let Some(data) = self.interface.read(&path) else {
            return DEFAULT_IPL_FIRMWARE.to_string();
        };
        match serde_json::from_slice::<Value>(&data) {
            Ok(manifest) => manifest
                .pointer("/system/smp/firmware/name")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_IPL_FIRMWARE)
                .to_string(),
            Err(err) => {
                log(LogCategory::System, LogLevel::Warn, || {
                    format!("System: ignoring malformed {}: {}", MANIFEST, err)
                });
                DEFAULT_IPL_FIRMWARE.to_string()
            }
        }
    }

    /// Persist work RAM and release the cartridge. Unloading an empty console is a no-op.
    pub fn unload(&mut self) -> Result<(), SnesError> {
        if self.state == SessionState::Unloaded {
            return Ok(());
        }

        let path = self.interface.path(MediaId::System).join(WRAM_FILE);
        if let Err(err) = self.interface.write(&path, self.board.cpu.wram()) {
            log(LogCategory::System, LogLevel::Error, || {
                format!("System: could not write {}: {}", path.display(), err)
            });
            self.interface
                .notify(&format!("Error: could not save {}: {}", WRAM_FILE, err));
        }

        for kind in self.board.required_chips() {
            self.board.chip_mut(kind).unload();
        }
        self.registry.clear();
        self.board.cartridge = None;
        self.scheduler.init(cpu::THREAD, MAIN_THREADS.to_vec());
        self.state = SessionState::Unloaded;
        log(LogCategory::System, LogLevel::Info, || "System: unloaded".to_string());
        Ok(())
    }

    pub fn power(&mut self) -> Result<(), SnesError> {
        self.expect_state(
            "power",
            &[
                SessionState::Loaded,
                SessionState::Powered,
                SessionState::Running,
            ],
        )?;

        match self.config.random_seed {
            Some(seed) => self.random.seed(seed),
            None => self.random.seed_from_time(),
        }

        self.board.cpu.power();
        self.board.smp.power(&mut self.random);
        self.board.dsp.power();
        self.board.ppu.power();
        for kind in self.board.required_chips() {
            if kind.has_power_cycle() {
                self.board.chip_mut(kind).power();
            }
        }

        self.reset()
    }

    pub fn reset(&mut self) -> Result<(), SnesError> {
        self.expect_state(
            "reset",
            &[
                SessionState::Loaded,
                SessionState::Powered,
                SessionState::Running,
            ],
        )?;

        self.board.cpu.reset();
        self.board.smp.reset();
        self.board.dsp.reset();
        self.board.ppu.reset();
        for kind in self.board.required_chips() {
            if kind.has_power_cycle() {
                self.board.chip_mut(kind).reset();
            }
        }

        match &self.board.cartridge {
            Some(cartridge) => self.registry.rebuild(cartridge),
            None => self.registry.clear(),
        }
        self.scheduler.init(cpu::THREAD, self.threads());

        self.input.connect(0, self.config.controller_port1);
        self.input.connect(1, self.config.controller_port2);

        self.state = SessionState::Powered;
        log(LogCategory::System, LogLevel::Debug, || {
            format!(
                "System: reset, coprocessors {:?}",
                self.registry.iter().map(ChipKind::name).collect::<Vec<_>>()
            )
        });
        Ok(())
    }

    /// Emulate until the next frame is presented.
    pub fn run(&mut self) -> Result<ExitReason, SnesError> {
        self.expect_powered("run")?;
        self.scheduler.set_sync_mode(SyncMode::None, None)?;

        match self.scheduler.enter(&mut self.board) {
            Ok(reason) => {
                if reason == ExitReason::FrameEvent {
                    self.video.update(self.board.cpu.wram(), &mut *self.interface);
                }
                self.state = SessionState::Running;
                Ok(reason)
            }
            Err(err) => Err(self.fault(err)),
        }
    }

    /// Drain every chip to the CPU's position, one at a time.
    ///
    /// Frames completed while draining are still presented.
    pub fn run_to_save(&mut self) -> Result<(), SnesError> {
        self.expect_powered("run_to_save")?;

        for thread in self.threads() {
            self.scheduler
                .set_sync_mode(SyncMode::LockToReference, Some(cpu::THREAD))?;
            self.scheduler.set_target(thread);
            loop {
                match self.scheduler.enter(&mut self.board) {
                    Ok(ExitReason::SynchronizeEvent) => break,
                    Ok(ExitReason::FrameEvent) => {
                        self.video.update(self.board.cpu.wram(), &mut *self.interface);
                    }
                    Err(err) => return Err(self.fault(err)),
                }
            }
        }

        self.scheduler.set_sync_mode(SyncMode::None, None)?;
        log(LogCategory::System, LogLevel::Debug, || {
            format!(
                "System: synchronized at CPU clock {}",
                self.board.cpu.context().clock()
            )
        });
        Ok(())
    }

    /// Bring the machine to a consistent instant and capture it.
    pub fn serialize(&mut self) -> Result<Snapshot, SnesError> {
        self.run_to_save()?;

        let coprocessors = self
            .registry
            .iter()
            .map(|kind| {
                Ok(ChipSnapshot {
                    kind,
                    state: self.board.chip(kind).serialize()?,
                })
            })
            .collect::<Result<Vec<_>, SnesError>>()?;

        Ok(Snapshot {
            version: SNAPSHOT_VERSION,
            region: self.region,
            expansion: self.board.expansion,
            cpu_frequency: self.cpu_frequency,
            smp_frequency: self.smp_frequency,
            random: self.random,
            input: self.input,
            cpu: self.board.cpu.state(),
            smp: self.board.smp.state(),
            ppu: self.board.ppu.state(),
            dsp: self.board.dsp.state(),
            coprocessors,
        })
    }

    /// Restore a snapshot taken from a session with the same cartridge and settings.
    pub fn unserialize(&mut self, snapshot: &Snapshot) -> Result<(), SnesError> {
        self.expect_powered("unserialize")?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnesError::IncompatibleState(format!(
                "version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        if snapshot.region != self.region || snapshot.expansion != self.board.expansion {
            return Err(SnesError::IncompatibleState(format!(
                "saved on {:?}/{:?}, running {:?}/{:?}",
                snapshot.region, snapshot.expansion, self.region, self.board.expansion
            )));
        }
        if snapshot.cpu_frequency != self.cpu_frequency
            || snapshot.smp_frequency != self.smp_frequency
        {
            return Err(SnesError::IncompatibleState(
                "clock frequencies differ".to_string(),
            ));
        }
        if !snapshot.chips().eq(self.registry.iter()) {
            return Err(SnesError::IncompatibleState(
                "coprocessor set differs".to_string(),
            ));
        }

        // nothing is written until every chip has accepted its state
        for chip in &snapshot.coprocessors {
            self.board.chip(chip.kind).check_state(&chip.state)?;
        }
        for chip in &snapshot.coprocessors {
            self.board.chip_mut(chip.kind).unserialize(&chip.state)?;
        }
        self.random = snapshot.random;
        self.input = snapshot.input;
        self.board.cpu.restore(snapshot.cpu.clone());
        self.board.smp.restore(snapshot.smp.clone());
        self.board.ppu.restore(snapshot.ppu);
        self.board.dsp.restore(snapshot.dsp);

        self.scheduler.init(cpu::THREAD, self.threads());
        self.state = SessionState::Powered;
        log(LogCategory::System, LogLevel::Info, || {
            format!(
                "System: state restored at CPU clock {}",
                self.board.cpu.context().clock()
            )
        });
        Ok(())
    }
}

impl System for SnesSystem {
    type Error = SnesError;

    fn reset(&mut self) {
        if matches!(self.state, SessionState::Powered | SessionState::Running) {
            if let Err(err) = SnesSystem::reset(self) {
                log(LogCategory::System, LogLevel::Error, || {
                    format!("System: reset failed: {}", err)
                });
            }
        }
    }

    fn step_frame(&mut self) -> Result<Frame, Self::Error> {
        if self.state == SessionState::Unloaded {
            return Err(SnesError::NoCartridge);
        }
        while self.run()? != ExitReason::FrameEvent {}
        Ok(self.video.frame().clone())
    }

    fn save_state(&mut self) -> Result<Value, Self::Error> {
        self.serialize()?.to_value()
    }

    fn load_state(&mut self, v: &Value) -> Result<(), Self::Error> {
        let snapshot = Snapshot::from_value(v)?;
        self.unserialize(&snapshot)
    }

    fn supports_save_states(&self) -> bool {
        true
    }

    fn mount_points(&self) -> Vec<MountPointInfo> {
        vec![MountPointInfo {
            id: "Cartridge".to_string(),
            name: "Cartridge Slot".to_string(),
            extensions: vec!["sfc".to_string(), "smc".to_string()],
            required: true,
        }]
    }

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error> {
        if mount_point_id != "Cartridge" {
            return Err(SnesError::InvalidMountPoint(mount_point_id.to_string()));
        }
        let cartridge = Cartridge::load(data)?;
        self.unload()?;
        self.load(cartridge)?;
        self.power()
    }

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error> {
        if mount_point_id != "Cartridge" {
            return Err(SnesError::InvalidMountPoint(mount_point_id.to_string()));
        }
        self.unload()
    }

    fn is_mounted(&self, mount_point_id: &str) -> bool {
        mount_point_id == "Cartridge" && self.board.cartridge.is_some()
    }
}
