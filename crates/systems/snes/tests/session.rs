//! Session-level behaviour of the SNES orchestrator, driven through an
//! in-memory host.

use emu_core::scheduler::{ExecutionContext, ExitReason, Scheduler, SchedulerError, SyncMode};
use emu_core::System;
use emu_snes::board::{Board, MAIN_THREADS};
use emu_snes::coprocessor::ChipKind;
use emu_snes::{
    cpu, Cartridge, Config, Coprocessor, ExpansionPortDevice, Interface, MediaId, MemoryInterface,
    Region, SessionState, SnesError, Snapshot, SnesSystem,
};

const NTSC: u8 = 0x01;
const PAL: u8 = 0x02;

/// 64 KiB LoROM image with a valid header and a non-trivial program body
fn rom_image(country: u8, cart_type: u8) -> Vec<u8> {
    let mut data: Vec<u8> = (0..0x10000usize)
        .map(|i| (i.wrapping_mul(37) ^ (i >> 8)) as u8)
        .collect();
    let header = 0x7FC0;
    data[header..header + 0x15].copy_from_slice(b"SESSION TEST         ");
    data[header + 0x15] = 0x20;
    data[header + 0x16] = cart_type;
    data[header + 0x17] = 0x09;
    data[header + 0x19] = country;
    data[header + 0x1C..header + 0x20].copy_from_slice(&[0x00, 0x00, 0xFF, 0xFF]);
    data[header + 0x3C] = 0x00;
    data[header + 0x3D] = 0x80;
    data
}

fn host() -> MemoryInterface {
    let host = MemoryInterface::new();
    host.insert_file(MediaId::System, "ipl.rom", (0..64).collect());
    host.insert_file(MediaId::Cartridge, "dsp.program.rom", vec![0x5A; 2048]);
    host
}

fn config() -> Config {
    Config {
        random_seed: Some(0x1994),
        ..Config::default()
    }
}

fn powered(host: &MemoryInterface, config: Config, cartridge: Cartridge) -> SnesSystem {
    let mut sys = SnesSystem::new(config, Box::new(host.clone())).unwrap();
    sys.load(cartridge).unwrap();
    sys.power().unwrap();
    sys
}

fn dsp_cartridge() -> Cartridge {
    // DSP-1 board, plus MSU-1 audio
    Cartridge::load(&rom_image(NTSC, 0x03))
        .unwrap()
        .with_chip(ChipKind::Msu1)
}

#[test]
fn test_run_returns_frame_event_on_end_line() {
    let host = host();
    let mut sys = powered(&host, config(), dsp_cartridge());

    for frame in 1..=4 {
        assert_eq!(sys.run().unwrap(), ExitReason::FrameEvent);
        assert_eq!(sys.board().ppu.vcounter(), 241);
        assert_eq!(host.frame_count(), frame);
    }

    // already synchronized to the end line: draining must not finish another frame
    sys.run_to_save().unwrap();
    assert_eq!(host.frame_count(), 4);
}

#[test]
fn test_custom_frame_end_line() {
    let host = host();
    let mut config = config();
    config.ppu.frame_end_line = 100;
    let mut sys = powered(&host, config, dsp_cartridge());

    assert_eq!(sys.run().unwrap(), ExitReason::FrameEvent);
    assert_eq!(sys.board().ppu.vcounter(), 100);
    assert_eq!(sys.run().unwrap(), ExitReason::FrameEvent);
    assert_eq!(sys.board().ppu.vcounter(), 100);
    assert_eq!(
        sys.board().ppu.context().clock(),
        (262 + 100) * emu_snes::ppu::CLOCKS_PER_LINE
    );
}

#[test]
fn test_save_restore_reproduces_frames() {
    let original_host = host();
    let mut original = powered(&original_host, config(), dsp_cartridge());
    for _ in 0..2 {
        original.run().unwrap();
    }
    let saved = original.save_state().unwrap();
    for _ in 0..3 {
        original.run().unwrap();
    }

    let restored_host = host();
    let mut restored = powered(&restored_host, config(), dsp_cartridge());
    restored.load_state(&saved).unwrap();
    for _ in 0..3 {
        restored.run().unwrap();
    }

    // a session that never paused for the save
    let unsaved_host = host();
    let mut unsaved = powered(&unsaved_host, config(), dsp_cartridge());
    for _ in 0..5 {
        unsaved.run().unwrap();
    }

    let original_frames = original_host.frames();
    let restored_frames = restored_host.frames();
    let unsaved_frames = unsaved_host.frames();
    assert_eq!(original_frames.len(), 5);
    assert_eq!(restored_frames.len(), 3);
    assert_eq!(&original_frames[2..], &restored_frames[..]);
    assert_eq!(&unsaved_frames[2..], &restored_frames[..]);
}

#[test]
fn test_snapshot_survives_json_text() {
    let host = host();
    let mut sys = powered(&host, config(), dsp_cartridge());
    sys.run().unwrap();
    let snapshot = sys.serialize().unwrap();
    let text = serde_json::to_string(&snapshot.to_value().unwrap()).unwrap();

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let parsed = Snapshot::from_value(&value).unwrap();
    assert_eq!(parsed, snapshot);
    assert_eq!(
        parsed.chips().collect::<Vec<_>>(),
        vec![ChipKind::NecDsp, ChipKind::Msu1]
    );
}

#[test]
fn test_reset_rebuilds_same_registry() {
    let host = host();
    let cartridge = dsp_cartridge()
        .with_chip(ChipKind::Sdd1)
        .with_chip(ChipKind::Sa1);
    let mut sys = powered(&host, config(), cartridge);

    sys.reset().unwrap();
    let first: Vec<ChipKind> = sys.registry().iter().collect();
    let first_threads = sys.scheduler().threads().to_vec();
    sys.reset().unwrap();
    let second: Vec<ChipKind> = sys.registry().iter().collect();

    assert_eq!(first, vec![ChipKind::Sa1, ChipKind::NecDsp, ChipKind::Msu1]);
    assert_eq!(first, second);
    assert_eq!(first_threads, sys.scheduler().threads());
}

#[test]
fn test_reload_resolves_same_configuration() {
    let host = host();
    let mut sys = SnesSystem::new(config(), Box::new(host.clone())).unwrap();
    let image = rom_image(PAL, 0x00);

    sys.load(Cartridge::load(&image).unwrap()).unwrap();
    let first = (
        sys.region(),
        sys.expansion(),
        sys.cpu_frequency(),
        sys.smp_frequency(),
    );
    sys.unload().unwrap();
    sys.load(Cartridge::load(&image).unwrap()).unwrap();
    let second = (
        sys.region(),
        sys.expansion(),
        sys.cpu_frequency(),
        sys.smp_frequency(),
    );

    assert_eq!(first, second);
    assert_eq!(first, (Region::Pal, ExpansionPortDevice::Bsx, 21_281_370, 24_607_104));
}

#[test]
fn test_autodetect_uses_cartridge_region() {
    let host = host();
    let config = config();
    assert_eq!(config.region, Region::Autodetect);

    let sys = powered(&host, config.clone(), Cartridge::load(&rom_image(NTSC, 0)).unwrap());
    assert_eq!(sys.region(), Region::Ntsc);
    assert_eq!(sys.cpu_frequency(), config.cpu.ntsc_frequency);
    assert_eq!(sys.smp_frequency(), config.smp.ntsc_frequency);
    assert_eq!(sys.board().ppu.lines_per_frame(), 262);

    let sys = powered(&host, config.clone(), Cartridge::load(&rom_image(PAL, 0)).unwrap());
    assert_eq!(sys.region(), Region::Pal);
    assert_eq!(sys.cpu_frequency(), config.cpu.pal_frequency);
    assert_eq!(sys.board().ppu.lines_per_frame(), 312);
}

#[test]
fn test_forced_region_overrides_cartridge() {
    let host = host();
    let config = Config {
        region: Region::Pal,
        ..config()
    };
    let sys = powered(&host, config, Cartridge::load(&rom_image(NTSC, 0)).unwrap());
    assert_eq!(sys.region(), Region::Pal);
    assert_eq!(sys.cpu_frequency(), 21_281_370);
}

#[test]
fn test_plain_cartridge_touches_no_coprocessor() {
    let host = host();
    let config = Config {
        expansion_port: ExpansionPortDevice::None,
        ..config()
    };
    let mut sys = powered(&host, config, Cartridge::load(&rom_image(NTSC, 0x02)).unwrap());
    sys.reset().unwrap();

    assert!(sys.registry().is_empty());
    assert_eq!(sys.scheduler().threads(), &MAIN_THREADS[..]);
    for kind in ChipKind::ALL {
        let chip = sys.board().chip(kind);
        assert!(!chip.is_loaded(), "{} was loaded", kind.name());
        assert!(!chip.is_powered(), "{} was powered", kind.name());
    }
    assert_eq!(sys.run().unwrap(), ExitReason::FrameEvent);
}

#[test]
fn test_expansion_port_peripheral_follows_config() {
    let host = host();
    let mut sys = powered(&host, config(), Cartridge::load(&rom_image(NTSC, 0)).unwrap());
    assert!(sys.board().chip(ChipKind::Satellaview).is_powered());
    // mapped only: never scheduled
    assert!(sys.registry().is_empty());

    sys.unload().unwrap();
    assert!(!sys.board().chip(ChipKind::Satellaview).is_loaded());
}

#[test]
fn test_firmware_missing_runs_degraded() {
    let host = MemoryInterface::new();
    let mut sys = powered(&host, config(), dsp_cartridge());

    let notices = host.notices();
    assert!(notices.iter().any(|n| n.contains("ipl.rom")));
    assert!(notices.iter().any(|n| n.contains("dsp.program.rom")));
    assert_eq!(sys.run().unwrap(), ExitReason::FrameEvent);
}

#[test]
fn test_lock_to_self_clears_stale_exit() {
    let mut board = Board::new(21_477_272, 24_607_104, 241);
    board.cartridge = Some(Cartridge::blank());
    let mut scheduler = Scheduler::new(cpu::THREAD);
    scheduler.init(cpu::THREAD, vec![cpu::THREAD]);

    scheduler.raise_exit(ExitReason::FrameEvent);
    scheduler
        .set_sync_mode(SyncMode::LockToReference, Some(cpu::THREAD))
        .unwrap();
    scheduler.set_target(cpu::THREAD);

    assert_eq!(scheduler.enter(&mut board), Ok(ExitReason::SynchronizeEvent));
    assert_eq!(scheduler.exit_reason(), Some(ExitReason::SynchronizeEvent));
}

#[test]
fn test_unload_returns_to_unloaded() {
    let host = host();
    let mut sys = powered(&host, config(), dsp_cartridge());
    sys.run().unwrap();
    sys.unload().unwrap();

    assert_eq!(sys.state(), SessionState::Unloaded);
    assert!(sys.registry().is_empty());
    assert!(!sys.board().chip(ChipKind::NecDsp).is_loaded());
    assert!(host.file(MediaId::System, "wram.rwm").is_some());
}

#[test]
fn test_spc7110_rtc_board_registers_both_chips() {
    let mut image = rom_image(NTSC, 0xF9);
    image[0x7FD5] = 0x3A;
    let host = host();
    let sys = powered(&host, config(), Cartridge::load(&image).unwrap());

    assert!(sys.registry().contains(ChipKind::Spc7110));
    assert!(sys.registry().contains(ChipKind::EpsonRtc));
    assert!(sys.board().chip(ChipKind::Spc7110).is_powered());
}

/// SA-1 stand-in whose clock never moves
struct StuckChip {
    context: ExecutionContext,
    loaded: bool,
    powered: bool,
}

impl StuckChip {
    fn new() -> Self {
        Self {
            context: ExecutionContext::new(ChipKind::Sa1.thread(), "stuck", 10_738_636),
            loaded: false,
            powered: false,
        }
    }
}

impl Coprocessor for StuckChip {
    fn kind(&self) -> ChipKind {
        ChipKind::Sa1
    }

    fn load(&mut self, _host: &mut dyn Interface, _cpu_frequency: u64) {
        self.loaded = true;
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

    fn context(&self) -> Option<&ExecutionContext> {
        Some(&self.context)
    }
}

#[test]
fn test_stalled_chip_faults_session_until_unload() {
    let host = host();
    let mut sys = SnesSystem::new(config(), Box::new(host.clone())).unwrap();
    sys.replace_chip(Box::new(StuckChip::new())).unwrap();
    sys.load(Cartridge::blank().with_chip(ChipKind::Sa1)).unwrap();
    sys.power().unwrap();

    let err = sys.run().unwrap_err();
    assert!(matches!(
        err,
        SnesError::Scheduler(SchedulerError::Stalled { thread, .. }) if thread == ChipKind::Sa1.thread()
    ));
    assert_eq!(sys.state(), SessionState::Faulted);
    assert!(host
        .notices()
        .iter()
        .any(|notice| notice.starts_with("Emulation halted")));

    for result in [sys.run().map(|_| ()), sys.run_to_save(), sys.serialize().map(|_| ())] {
        assert!(matches!(
            result,
            Err(SnesError::InvalidState {
                state: SessionState::Faulted,
                ..
            })
        ));
    }
    assert!(sys.power().is_err());
    assert!(sys.reset().is_err());

    sys.unload().unwrap();
    assert_eq!(sys.state(), SessionState::Unloaded);
    assert!(!sys.board().chip(ChipKind::Sa1).is_loaded());

    sys.load(Cartridge::blank()).unwrap();
    sys.power().unwrap();
    assert_eq!(sys.run().unwrap(), ExitReason::FrameEvent);
}

#[test]
fn test_replace_chip_only_while_unloaded() {
    let host = host();
    let mut sys = powered(&host, config(), Cartridge::blank());
    assert!(matches!(
        sys.replace_chip(Box::new(StuckChip::new())),
        Err(SnesError::InvalidState { .. })
    ));
}
