mod host;
mod message;
mod slots;

use anyhow::{bail, Context, Result};
use clap::Parser;
use emu_core::logging::{LogCategory, LogConfig, LogLevel};
use emu_snes::{Cartridge, Config, Region, Snapshot, SnesSystem};
use host::FsHost;
use message::{Buttons, Response};
use slots::GameSaves;
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hsnes", about = "Headless Super Famicom runner")]
struct Args {
    /// Cartridge image (.sfc / .smc)
    rom: PathBuf,

    /// Directory holding ipl.rom, manifest.json and wram.rwm
    #[arg(long, default_value = ".")]
    system_path: PathBuf,

    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// ntsc, pal or auto (overrides the settings file)
    #[arg(long)]
    region: Option<String>,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Save a state into this slot (1-5) after running
    #[arg(long)]
    slot: Option<u8>,

    /// Restore a state from this slot (1-5) before running
    #[arg(long)]
    load_slot: Option<u8>,

    /// Overwrite an existing slot without asking
    #[arg(long, default_value_t = false)]
    yes: bool,

    /// Core log level: "debug", or per category, e.g. "scheduler=trace,cpu=off"
    #[arg(long)]
    log_level: Option<String>,

    /// Also write core log messages to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn configure_logging(args: &Args) -> Result<()> {
    let config = LogConfig::global();
    if let Some(spec) = &args.log_level {
        for item in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.split_once('=') {
                Some((category, level)) => {
                    let Some(category) = LogCategory::from_str(category) else {
                        bail!("Unknown log category: {}", category);
                    };
                    let Some(level) = LogLevel::from_str(level) else {
                        bail!("Unknown log level: {}", level);
                    };
                    config.set_level(category, level);
                }
                None => {
                    let Some(level) = LogLevel::from_str(item) else {
                        bail!("Unknown log level: {}", item);
                    };
                    config.set_global_level(level);
                }
            }
        }
    }
    if let Some(path) = &args.log_file {
        config
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("reading settings {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(region) = &args.region {
        let Some(region) = Region::from_str(region) else {
            bail!("Unknown region: {} (expected ntsc, pal or auto)", region);
        };
        config.region = region;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    configure_logging(&args)?;
    let config = load_config(&args)?;

    let rom = fs::read(&args.rom).with_context(|| format!("reading {}", args.rom.display()))?;
    let cartridge = Cartridge::load(&rom)?;
    log::info!(
        "{}: \"{}\", {} KB, {:?}",
        args.rom.display(),
        cartridge.title(),
        cartridge.rom_size() / 1024,
        cartridge.region()
    );

    let cartridge_path = args
        .rom
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let host = FsHost::new(args.system_path.clone(), cartridge_path);
    let mut sys = SnesSystem::new(config, Box::new(host))?;
    sys.load(cartridge)?;
    sys.power()?;

    let rom_hash = GameSaves::rom_hash(&rom);
    let saves_dir = args.system_path.join("saves");

    if let Some(slot) = args.load_slot {
        let data = GameSaves::load(&saves_dir, &rom_hash).load_slot(slot, &rom_hash)?;
        let value: serde_json::Value = serde_json::from_slice(&data)?;
        sys.unserialize(&Snapshot::from_value(&value)?)?;
        log::info!("Restored slot {}", slot);
    }

    for _ in 0..args.frames {
        sys.run()?;
    }
    log::info!(
        "Ran {} frames ({} presented) on {:?}",
        args.frames,
        sys.frame_count(),
        sys.region()
    );

    if let Some(slot) = args.slot {
        let mut saves = GameSaves::load(&saves_dir, &rom_hash);
        let confirmed = args.yes
            || !saves.has_slot(slot)
            || message::ask(
                Buttons::OkCancel,
                &format!("Slot {} already holds a state. Overwrite?", slot),
                &mut io::stdin().lock(),
                &mut io::stdout(),
            )? == Response::Ok;

        if confirmed {
            let snapshot = sys.serialize()?;
            let data = serde_json::to_vec(&snapshot.to_value()?)?;
            saves.save_slot(&saves_dir, slot, &data, &rom_hash)?;
            log::info!("Saved slot {}", slot);
        } else {
            log::info!("Kept existing slot {}", slot);
        }
    }

    sys.unload()?;
    Ok(())
}
