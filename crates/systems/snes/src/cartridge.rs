//! SNES cartridge image and header probing

use crate::config::Region;
use crate::coprocessor::ChipKind;
use crate::SnesError;
use emu_core::logging::{log, LogCategory, LogLevel};
use std::collections::BTreeSet;

const LOROM_HEADER: usize = 0x7FC0;
const HIROM_HEADER: usize = 0xFFC0;

const SUFAMI_TURBO_TITLE: &str = "BANDAI SFC-ADX";
const BSX_TITLE: &str = "Satellaview BS-X";

/// ROM mapping mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MappingMode {
    LoROM,
    HiROM,
}

impl MappingMode {
    fn header(self) -> usize {
        match self {
            MappingMode::LoROM => LOROM_HEADER,
            MappingMode::HiROM => HIROM_HEADER,
        }
    }
}

/// SNES cartridge
#[derive(Debug, Clone)]
pub struct Cartridge {
    rom: Vec<u8>,
    /// 512 if the image carried a copier (SMC) header
    header_offset: usize,
    mapping_mode: MappingMode,
    title: String,
    region: Region,
    chips: BTreeSet<ChipKind>,
}

impl Cartridge {
    pub fn load(data: &[u8]) -> Result<Self, SnesError> {
        if data.len() < 0x8000 {
            log(LogCategory::System, LogLevel::Error, || {
                format!(
                    "SNES Cartridge: ROM too small ({} bytes, minimum 32KB)",
                    data.len()
                )
            });
            return Err(SnesError::InvalidRom(
                "ROM too small (minimum 32KB)".to_string(),
            ));
        }

        let header_offset = if data.len() % 1024 == 512 { 512 } else { 0 };
        let rom = &data[header_offset..];
        if rom.len() < 0x8000 {
            return Err(SnesError::InvalidRom(
                "ROM data too small after header".to_string(),
            ));
        }

        let mapping_mode = Self::detect_mapping_mode(rom);
        let header = &rom[mapping_mode.header()..mapping_mode.header() + 0x40];
        let title = Self::parse_title(&header[..0x15]);
        let region = Self::parse_region(header[0x19]);
        let subtype = rom[mapping_mode.header() - 1];
        let chips = Self::detect_chips(header[0x15], header[0x16], subtype, &title);

        log(LogCategory::System, LogLevel::Info, || {
            format!(
                "SNES Cartridge: \"{}\" {} KB, SMC header: {}, mapping: {:?}, region: {:?}, chips: {:?}",
                title,
                rom.len() / 1024,
                if header_offset > 0 { "yes" } else { "no" },
                mapping_mode,
                region,
                chips
            )
        });

        Ok(Self {
            rom: rom.to_vec(),
            header_offset,
            mapping_mode,
            title,
            region,
            chips,
        })
    }

    /// 32 KiB of zeroes: NTSC, LoROM, no special chips
    pub fn blank() -> Self {
        Self {
            rom: vec![0; 0x8000],
            header_offset: 0,
            mapping_mode: MappingMode::LoROM,
            title: String::new(),
            region: Region::Ntsc,
            chips: BTreeSet::new(),
        }
    }

    /// Declare a chip the header does not advertise (board-level chips such as MSU-1).
    pub fn with_chip(mut self, chip: ChipKind) -> Self {
        self.chips.insert(chip);
        self
    }

    pub fn has(&self, chip: ChipKind) -> bool {
        self.chips.contains(&chip)
    }

    pub fn chips(&self) -> impl Iterator<Item = ChipKind> + '_ {
        self.chips.iter().copied()
    }

    /// `Ntsc` or `Pal`; never `Autodetect`
    pub fn region(&self) -> Region {
        self.region
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn rom_size(&self) -> usize {
        self.rom.len()
    }

    pub fn has_smc_header(&self) -> bool {
        self.header_offset == 512
    }

    pub fn is_hirom(&self) -> bool {
        self.mapping_mode == MappingMode::HiROM
    }

    fn detect_mapping_mode(rom: &[u8]) -> MappingMode {
        let lorom_score = Self::score_header(rom, LOROM_HEADER);
        let hirom_score = Self::score_header(rom, HIROM_HEADER);
        if hirom_score > lorom_score {
            MappingMode::HiROM
        } else {
            MappingMode::LoROM
        }
    }

    /// Higher is more likely to be the real header
    fn score_header(rom: &[u8], offset: usize) -> u32 {
        if offset + 0x40 > rom.len() {
            return 0;
        }

        let mut score = 0u32;

        let map_mode = rom[offset + 0x15];
        if map_mode & 0xE0 == 0x20 {
            score += 2;
            // bit 0 set on HiROM-style boards
            if (map_mode & 1 == 1) == (offset == HIROM_HEADER) {
                score += 1;
            }
        }

        let rom_size = rom[offset + 0x17];
        if (0x07..=0x0D).contains(&rom_size) {
            score += 2;
        }

        let checksum_comp = u16::from_le_bytes([rom[offset + 0x1C], rom[offset + 0x1D]]);
        let checksum = u16::from_le_bytes([rom[offset + 0x1E], rom[offset + 0x1F]]);
        if checksum_comp == !checksum {
            score += 4;
        }

        let reset_vector = u16::from_le_bytes([rom[offset + 0x3C], rom[offset + 0x3D]]);
        if reset_vector >= 0x8000 {
            score += 2;
        }

        score
    }

    fn parse_title(raw: &[u8]) -> String {
        raw.iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { ' ' })
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn parse_region(country: u8) -> Region {
        if country <= 0x01 || country >= 0x0D {
            Region::Ntsc
        } else {
            Region::Pal
        }
    }

    fn detect_chips(map_mode: u8, kind: u8, subtype: u8, title: &str) -> BTreeSet<ChipKind> {
        let mut chips = BTreeSet::new();

        if title.starts_with(SUFAMI_TURBO_TITLE) {
            chips.insert(ChipKind::SufamiTurbo);
        }
        if title.starts_with(BSX_TITLE) {
            chips.insert(ChipKind::BsxCartridge);
            chips.insert(ChipKind::BsxFlash);
        }

        // SPC7110 boards use types 0xF5 and 0xF9 (with RTC) outside the usual nibble scheme
        if map_mode == 0x3A && (kind == 0xF5 || kind == 0xF9) {
            chips.insert(ChipKind::Spc7110);
            if kind == 0xF9 {
                chips.insert(ChipKind::EpsonRtc);
            }
            return chips;
        }

        // low nibble 3..=6: a coprocessor is present; high nibble says which
        if !(0x03..=0x06).contains(&(kind & 0x0F)) {
            return chips;
        }
        match kind >> 4 {
            0x0 => {
                chips.insert(ChipKind::NecDsp);
            }
            0x1 => {
                chips.insert(ChipKind::SuperFx);
            }
            0x2 => {
                chips.insert(ChipKind::Obc1);
            }
            0x3 => {
                chips.insert(ChipKind::Sa1);
            }
            0x4 => {
                chips.insert(ChipKind::Sdd1);
            }
            0x5 => {
                chips.insert(ChipKind::SharpRtc);
            }
            0xE => {
                chips.insert(ChipKind::Icd2);
            }
            0xF => {
                let chip = match subtype {
                    0x02 => ChipKind::ArmDsp,
                    0x10 => ChipKind::HitachiDsp,
                    _ => ChipKind::NecDsp,
                };
                chips.insert(chip);
            }
            _ => {}
        }
        chips
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(size: usize, header: usize, map_mode: u8, kind: u8, country: u8) -> Vec<u8> {
        let mut data = vec![0; size];
        data[header..header + 0x15].copy_from_slice(b"HEXAGON TEST CART    ");
        data[header + 0x15] = map_mode;
        data[header + 0x16] = kind;
        data[header + 0x17] = 0x09;
        data[header + 0x19] = country;
        data[header + 0x1C] = 0x00;
        data[header + 0x1D] = 0x00;
        data[header + 0x1E] = 0xFF;
        data[header + 0x1F] = 0xFF;
        data[header + 0x3C] = 0x00;
        data[header + 0x3D] = 0x80;
        data
    }

    #[test]
    fn test_load_too_small() {
        assert!(matches!(
            Cartridge::load(&[0; 1024]),
            Err(SnesError::InvalidRom(_))
        ));
    }

    #[test]
    fn test_load_with_smc_header() {
        let mut data = vec![0; 512 + 0x8000];
        data.iter_mut().take(512).for_each(|x| *x = 0xFF);

        let cart = Cartridge::load(&data).unwrap();
        assert!(cart.has_smc_header());
        assert_eq!(cart.rom_size(), 0x8000);
    }

    #[test]
    fn test_blank_rom_is_plain_ntsc() {
        let cart = Cartridge::load(&[0; 0x8000]).unwrap();
        assert!(!cart.has_smc_header());
        assert!(!cart.is_hirom());
        assert_eq!(cart.region(), Region::Ntsc);
        assert_eq!(cart.chips().count(), 0);
    }

    #[test]
    fn test_mapping_mode_detection() {
        let lorom = Cartridge::load(&image(0x10000, LOROM_HEADER, 0x20, 0x00, 0x01)).unwrap();
        assert!(!lorom.is_hirom());
        assert_eq!(lorom.title(), "HEXAGON TEST CART");

        let hirom = Cartridge::load(&image(0x10000, HIROM_HEADER, 0x21, 0x00, 0x01)).unwrap();
        assert!(hirom.is_hirom());
    }

    #[test]
    fn test_region_from_country_code() {
        for (country, region) in [
            (0x00, Region::Ntsc),
            (0x01, Region::Ntsc),
            (0x02, Region::Pal),
            (0x0C, Region::Pal),
            (0x0D, Region::Ntsc),
        ] {
            let cart = Cartridge::load(&image(0x8000, LOROM_HEADER, 0x20, 0, country)).unwrap();
            assert_eq!(cart.region(), region, "country {:#04x}", country);
        }
    }

    #[test]
    fn test_chip_detection() {
        let cases = [
            (0x20, 0x03, vec![ChipKind::NecDsp]),
            (0x20, 0x15, vec![ChipKind::SuperFx]),
            (0x20, 0x25, vec![ChipKind::Obc1]),
            (0x23, 0x35, vec![ChipKind::Sa1]),
            (0x32, 0x43, vec![ChipKind::Sdd1]),
            (0x31, 0x55, vec![ChipKind::SharpRtc]),
            (0x20, 0xE3, vec![ChipKind::Icd2]),
            (0x3A, 0xF5, vec![ChipKind::Spc7110]),
            (0x3A, 0xF9, vec![ChipKind::EpsonRtc, ChipKind::Spc7110]),
            (0x20, 0x02, vec![]),
            (0x20, 0xF9, vec![]),
        ];
        for (map_mode, kind, expected) in cases {
            let cart = Cartridge::load(&image(0x8000, LOROM_HEADER, map_mode, kind, 0)).unwrap();
            assert_eq!(cart.chips().collect::<Vec<_>>(), expected, "type {:#04x}", kind);
        }
    }

    #[test]
    fn test_custom_chip_subtype() {
        let mut data = image(0x8000, LOROM_HEADER, 0x20, 0xF3, 0);
        data[LOROM_HEADER - 1] = 0x10;
        assert!(Cartridge::load(&data).unwrap().has(ChipKind::HitachiDsp));

        data[LOROM_HEADER - 1] = 0x02;
        assert!(Cartridge::load(&data).unwrap().has(ChipKind::ArmDsp));
    }

    #[test]
    fn test_sufami_turbo_by_title() {
        let mut data = image(0x8000, LOROM_HEADER, 0x20, 0, 0);
        data[LOROM_HEADER..LOROM_HEADER + 0x15].copy_from_slice(b"BANDAI SFC-ADX       ");
        let cart = Cartridge::load(&data).unwrap();
        assert!(cart.has(ChipKind::SufamiTurbo));
    }

    #[test]
    fn test_with_chip() {
        let cart = Cartridge::blank().with_chip(ChipKind::Msu1);
        assert!(cart.has(ChipKind::Msu1));
        assert!(!cart.has(ChipKind::Sa1));
    }
}
