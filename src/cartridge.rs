use std::fmt;

// Header layout (gbdev.io/pandocs/The_Cartridge_Header.html)
const HEADER_TITLE: usize = 0x134;
const HEADER_TITLE_LEN: usize = 16;
const HEADER_CART_TYPE: usize = 0x147;
const HEADER_ROM_SIZE: usize = 0x148;
const HEADER_RAM_SIZE: usize = 0x149;
const HEADER_END: usize = 0x150;

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    NoMbc,
    Mbc1,
    Mbc2,
    Mbc5,
}

/// Reasons a cartridge image is rejected at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartridgeError {
    /// Image is shorter than the header area.
    TruncatedImage(usize),
    /// Cartridge-type code names a mapper this core does not implement.
    UnsupportedMapper(u8),
    /// ROM-size code outside the documented range.
    UnsupportedRomSize(u8),
    /// RAM-size code outside the documented range.
    UnsupportedRamSize(u8),
}

impl fmt::Display for CartridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CartridgeError::TruncatedImage(len) => {
                write!(f, "ROM image too small for a cartridge header: {len} bytes")
            }
            CartridgeError::UnsupportedMapper(code) => {
                write!(f, "unsupported cartridge type code {code:#04X}")
            }
            CartridgeError::UnsupportedRomSize(code) => {
                write!(f, "unsupported ROM size code {code:#04X}")
            }
            CartridgeError::UnsupportedRamSize(code) => {
                write!(f, "unsupported RAM size code {code:#04X}")
            }
        }
    }
}

impl std::error::Error for CartridgeError {}

/// Per-mapper banking registers. One variant per supported mapper; selected
/// once from the header and never changed afterwards.
#[derive(Debug)]
enum MbcState {
    NoMbc,
    Mbc1 {
        rom_bank: u8,
        ram_bank: u8,
        mode: u8,
        ram_enable: bool,
    },
    Mbc2 {
        rom_bank: u8,
        ram_enable: bool,
    },
    Mbc5 {
        rom_bank: u16,
        ram_bank: u8,
        ram_enable: bool,
    },
}

pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub mbc: MbcType,
    pub title: String,
    mbc_state: MbcState,
}

impl Cartridge {
    /// Parse the header and construct the matching mapper. Fails (and leaves
    /// nothing half-built) when the header names a mapper or size this core
    /// does not support.
    pub fn load(data: Vec<u8>) -> Result<Self, CartridgeError> {
        if data.len() < HEADER_END {
            return Err(CartridgeError::TruncatedImage(data.len()));
        }

        let cart_type = data[HEADER_CART_TYPE];
        let mbc = match cart_type {
            0x00 | 0x08 | 0x09 => MbcType::NoMbc,
            0x01..=0x03 => MbcType::Mbc1,
            0x05 | 0x06 => MbcType::Mbc2,
            0x19..=0x1E => MbcType::Mbc5,
            code => return Err(CartridgeError::UnsupportedMapper(code)),
        };

        let rom_size_code = data[HEADER_ROM_SIZE];
        if rom_size_code > 0x08 {
            return Err(CartridgeError::UnsupportedRomSize(rom_size_code));
        }

        let ram_size = match data[HEADER_RAM_SIZE] {
            0x00 | 0x01 => 0,
            0x02 => RAM_BANK_SIZE,
            0x03 => 4 * RAM_BANK_SIZE,
            0x04 => 16 * RAM_BANK_SIZE,
            0x05 => 8 * RAM_BANK_SIZE,
            code => return Err(CartridgeError::UnsupportedRamSize(code)),
        };
        // MBC2 RAM is built into the mapper: 512 half-bytes.
        let ram_size = if mbc == MbcType::Mbc2 { 0x200 } else { ram_size };

        let title = data[HEADER_TITLE..HEADER_TITLE + HEADER_TITLE_LEN]
            .iter()
            .copied()
            .take_while(|&b| b != 0)
            .map(|b| b as char)
            .collect();

        let mbc_state = match mbc {
            MbcType::NoMbc => MbcState::NoMbc,
            MbcType::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                ram_bank: 0,
                mode: 0,
                ram_enable: false,
            },
            MbcType::Mbc2 => MbcState::Mbc2 {
                rom_bank: 1,
                ram_enable: false,
            },
            MbcType::Mbc5 => MbcState::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
            },
        };

        Ok(Self {
            rom: data,
            ram: vec![0; ram_size],
            mbc,
            title,
            mbc_state,
        })
    }

    /// Build a plain ROM-only cartridge without header validation. Intended
    /// for tests and synthetic images.
    pub fn from_bytes_with_ram(data: Vec<u8>, ram_size: usize) -> Self {
        Self {
            rom: data,
            ram: vec![0; ram_size],
            mbc: MbcType::NoMbc,
            title: String::new(),
            mbc_state: MbcState::NoMbc,
        }
    }

    fn rom_bank_count(&self) -> usize {
        (self.rom.len() / ROM_BANK_SIZE).max(1)
    }

    fn rom_at(&self, offset: usize) -> u8 {
        match self.rom.get(offset) {
            Some(b) => *b,
            None => {
                log::warn!(
                    "ROM read out of range: {:#07X} of {:#07X} bytes",
                    offset,
                    self.rom.len()
                );
                0xFF
            }
        }
    }

    fn ram_at(&self, offset: usize) -> u8 {
        match self.ram.get(offset) {
            Some(b) => *b,
            None => {
                log::warn!(
                    "cartridge RAM read out of range: {:#06X} of {:#06X} bytes",
                    offset,
                    self.ram.len()
                );
                0xFF
            }
        }
    }

    fn ram_write(ram: &mut [u8], offset: usize, val: u8) {
        let len = ram.len();
        match ram.get_mut(offset) {
            Some(b) => *b = val,
            None => {
                log::warn!("cartridge RAM write out of range: {offset:#06X} of {len:#06X} bytes");
            }
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        let rom_bank_count = self.rom_bank_count();
        match (&self.mbc_state, addr) {
            (MbcState::NoMbc, 0x0000..=0x7FFF) => self.rom_at(addr as usize),
            (MbcState::NoMbc, 0xA000..=0xBFFF) => {
                if self.ram.is_empty() {
                    0xFF
                } else {
                    self.ram_at(addr as usize - 0xA000)
                }
            }

            (MbcState::Mbc1 { ram_bank, mode, .. }, 0x0000..=0x3FFF) => {
                // In mode 1 the secondary register also banks the low window.
                let bank = if *mode == 0 {
                    0
                } else {
                    (((*ram_bank as usize) & 0x03) << 5) % rom_bank_count
                };
                self.rom_at(bank * ROM_BANK_SIZE + addr as usize)
            }
            (
                MbcState::Mbc1 {
                    rom_bank, ram_bank, ..
                },
                0x4000..=0x7FFF,
            ) => {
                // Bank 0 in the 5-bit register selects bank 1; the coercion
                // happens before the secondary bits are composed in.
                let mut low = (*rom_bank as usize) & 0x1F;
                if low == 0 {
                    low = 1;
                }
                let bank = ((((*ram_bank as usize) & 0x03) << 5) | low) % rom_bank_count;
                self.rom_at(bank * ROM_BANK_SIZE + addr as usize - 0x4000)
            }
            (
                MbcState::Mbc1 {
                    ram_enable,
                    ram_bank,
                    mode,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if !*ram_enable || self.ram.is_empty() {
                    0xFF
                } else {
                    let mut offset = (addr as usize - 0xA000) & 0x1FFF;
                    if *mode == 1 && self.ram.len() > RAM_BANK_SIZE {
                        offset |= ((*ram_bank as usize) & 0x03) << 13;
                    }
                    self.ram_at(offset)
                }
            }

            (MbcState::Mbc2 { .. }, 0x0000..=0x3FFF) => self.rom_at(addr as usize),
            (MbcState::Mbc2 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = ((*rom_bank as usize) & 0x0F).max(1) % rom_bank_count;
                self.rom_at(bank * ROM_BANK_SIZE + addr as usize - 0x4000)
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    0xFF
                } else {
                    // 512x4-bit RAM, mirrored across the whole window; the
                    // upper nibble reads open-bus.
                    0xF0 | (self.ram_at((addr as usize - 0xA000) & 0x01FF) & 0x0F)
                }
            }

            (MbcState::Mbc5 { .. }, 0x0000..=0x3FFF) => self.rom_at(addr as usize),
            (MbcState::Mbc5 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = (*rom_bank as usize) % rom_bank_count;
                self.rom_at(bank * ROM_BANK_SIZE + addr as usize - 0x4000)
            }
            (
                MbcState::Mbc5 {
                    ram_enable,
                    ram_bank,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if !*ram_enable || self.ram.is_empty() {
                    0xFF
                } else {
                    self.ram_at(((*ram_bank as usize) * RAM_BANK_SIZE + addr as usize - 0xA000)
                        % self.ram.len())
                }
            }

            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match (&mut self.mbc_state, addr) {
            (MbcState::NoMbc, 0xA000..=0xBFFF) => {
                if !self.ram.is_empty() {
                    Self::ram_write(&mut self.ram, addr as usize - 0xA000, val);
                }
            }

            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x1F;
            }
            (MbcState::Mbc1 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x03;
            }
            (MbcState::Mbc1 { mode, .. }, 0x6000..=0x7FFF) => {
                *mode = val & 0x01;
            }
            (
                MbcState::Mbc1 {
                    ram_enable,
                    ram_bank,
                    mode,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if *ram_enable && !self.ram.is_empty() {
                    let mut offset = (addr as usize - 0xA000) & 0x1FFF;
                    if *mode == 1 && self.ram.len() > RAM_BANK_SIZE {
                        offset |= ((*ram_bank as usize) & 0x03) << 13;
                    }
                    Self::ram_write(&mut self.ram, offset, val);
                }
            }

            (
                MbcState::Mbc2 {
                    rom_bank,
                    ram_enable,
                },
                0x0000..=0x3FFF,
            ) => {
                // Address bit 8 selects between RAM enable and ROM bank.
                if addr & 0x0100 == 0 {
                    *ram_enable = val & 0x0F == 0x0A;
                } else {
                    *rom_bank = (val & 0x0F).max(1);
                }
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    Self::ram_write(&mut self.ram, (addr as usize - 0xA000) & 0x01FF, val & 0x0F);
                }
            }

            (MbcState::Mbc5 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x2000..=0x2FFF) => {
                *rom_bank = (*rom_bank & 0x0100) | val as u16;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x3000..=0x3FFF) => {
                *rom_bank = ((val as u16 & 0x01) << 8) | (*rom_bank & 0x00FF);
            }
            (MbcState::Mbc5 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x0F;
            }
            (
                MbcState::Mbc5 {
                    ram_enable,
                    ram_bank,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if *ram_enable && !self.ram.is_empty() {
                    let offset = ((*ram_bank as usize) * RAM_BANK_SIZE + addr as usize - 0xA000)
                        % self.ram.len();
                    Self::ram_write(&mut self.ram, offset, val);
                }
            }

            _ => {}
        }
    }
}
