use crate::{
    cartridge::Cartridge, input::Input, ppu::Ppu, serial::Serial, timer::Timer,
};

const WRAM_SIZE: usize = 0x2000;
const HRAM_SIZE: usize = 0x7F;

/// Number of bytes an OAM DMA transfer copies.
const DMA_TRANSFER_LEN: u16 = 0xA0;
/// M-cycles between a mid-transfer DMA register write and the restart.
const DMA_RESTART_COUNTDOWN: u8 = 3;

/// OAM DMA engine states. A register write walks the engine through two
/// delay cycles before the transfer is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DmaState {
    Stopped,
    StartM1,
    StartM2,
    Init,
    Running,
}

/// The OAM DMA engine: copies 160 bytes from `reg << 8` into OAM, one byte
/// per M-cycle, monopolizing the OAM bus while it runs.
#[derive(Debug)]
struct OamDma {
    state: DmaState,
    /// Last value written to 0xFF46, also the register readback.
    reg: u8,
    source: u16,
    offset: u16,
    /// Whether a transfer is in flight regardless of the startup state.
    active: bool,
    restart_countdown: u8,
}

impl OamDma {
    fn new() -> Self {
        Self {
            state: DmaState::Stopped,
            reg: 0xFF,
            source: 0,
            offset: 0,
            active: false,
            restart_countdown: 0,
        }
    }
}

pub struct Mmu {
    pub wram: [u8; WRAM_SIZE],
    pub hram: [u8; HRAM_SIZE],
    pub cart: Option<Cartridge>,
    pub if_reg: u8,
    pub ie_reg: u8,
    pub serial: Serial,
    pub ppu: Ppu,
    pub timer: Timer,
    pub input: Input,
    dma: OamDma,
}

impl Mmu {
    /// A machine in the post-boot state.
    pub fn new() -> Self {
        let mut mmu = Self::new_power_on();
        // DIV phase and pending VBlank as left by the boot ROM.
        mmu.timer.div = 0xABCC;
        mmu.if_reg = 0x01;
        mmu.ppu.apply_boot_state();
        mmu
    }

    /// A machine with every counter and register cleared, LCD off.
    pub fn new_power_on() -> Self {
        Self {
            wram: [0; WRAM_SIZE],
            hram: [0; HRAM_SIZE],
            cart: None,
            if_reg: 0,
            ie_reg: 0,
            serial: Serial::new(),
            ppu: Ppu::new(),
            timer: Timer::new(),
            input: Input::new(),
            dma: OamDma::new(),
        }
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    pub fn take_serial(&mut self) -> Vec<u8> {
        self.serial.take_output()
    }

    /// Return true if an OAM DMA transfer is in progress.
    pub fn dma_active(&self) -> bool {
        self.dma.active
    }

    pub fn read_byte(&mut self, addr: u16) -> u8 {
        // While DMA monopolizes the OAM bus, external reads see open bus.
        if self.dma.active && (0xFE00..=0xFE9F).contains(&addr) {
            return 0xFF;
        }
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF)
            }
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.vram[(addr - 0x8000) as usize]
                } else {
                    0xFF
                }
            }
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            // Echo RAM folds into the primary work RAM range.
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => {
                if self.ppu.oam_accessible() {
                    self.ppu.oam[(addr - 0xFE00) as usize]
                } else {
                    0xFF
                }
            }
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.input.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg | 0xE0,
            0xFF46 => self.dma.reg,
            0xFF40..=0xFF4B => self.ppu.read_reg(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
            _ => 0xFF,
        }
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        if self.dma.active && (0xFE00..=0xFE9F).contains(&addr) {
            return;
        }
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.vram[(addr - 0x8000) as usize] = val;
                }
            }
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = val,
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = val,
            0xFE00..=0xFE9F => {
                if self.ppu.oam_accessible() {
                    self.ppu.oam[(addr - 0xFE00) as usize] = val;
                }
            }
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.input.write(val),
            0xFF01 | 0xFF02 => self.serial.write(addr, val, &mut self.if_reg),
            0xFF04..=0xFF07 => self.timer.write(addr, val, &mut self.if_reg),
            0xFF0F => self.if_reg = val & 0x1F,
            0xFF46 => {
                self.dma.reg = val;
                if self.dma.state == DmaState::Stopped {
                    self.dma.state = DmaState::StartM1;
                } else {
                    // A write while the engine runs re-initializes the
                    // transfer instead of queueing a second one.
                    self.dma.restart_countdown = DMA_RESTART_COUNTDOWN;
                }
            }
            0xFF40..=0xFF4B => self.ppu.write_reg(addr, val),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
            _ => {}
        }
    }

    /// Advance every tick-driven peripheral by `m_cycles` machine cycles:
    /// 4 timer quarter-cycles and 4 PPU dots per M-cycle, one DMA step per
    /// M-cycle. Called by the CPU after every bus access.
    pub fn tick(&mut self, m_cycles: u8) {
        for _ in 0..m_cycles {
            self.timer.step(4, &mut self.if_reg);
            self.ppu.step(4, &mut self.if_reg);
            self.dma_step();
        }
    }

    fn dma_step(&mut self) {
        if self.dma.restart_countdown > 0 {
            self.dma.restart_countdown -= 1;
            if self.dma.restart_countdown == 0 {
                self.dma.state = DmaState::Init;
            }
        }
        match self.dma.state {
            DmaState::Stopped => {}
            DmaState::StartM1 => self.dma.state = DmaState::StartM2,
            DmaState::StartM2 => self.dma.state = DmaState::Init,
            DmaState::Init => {
                self.dma.source = (self.dma.reg as u16) << 8;
                self.dma.offset = 0;
                self.dma.active = true;
                self.dma.state = DmaState::Running;
                // The first byte moves in the same cycle the engine
                // initializes.
                self.dma_copy_byte();
            }
            DmaState::Running => self.dma_copy_byte(),
        }
    }

    fn dma_copy_byte(&mut self) {
        let byte = self.dma_read(self.dma.source | self.dma.offset);
        self.ppu.oam[self.dma.offset as usize] = byte;
        self.dma.offset += 1;
        if self.dma.offset >= DMA_TRANSFER_LEN {
            self.dma.state = DmaState::Stopped;
            self.dma.offset = 0;
            self.dma.active = false;
        }
    }

    /// Source read for the DMA engine. Bypasses the CPU-facing lockouts and
    /// folds sources above the work RAM into the echo image.
    fn dma_read(&mut self, addr: u16) -> u8 {
        let addr = if addr >= 0xE000 {
            addr.wrapping_sub(0x2000)
        } else {
            addr
        };
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF)
            }
            0x8000..=0x9FFF => self.ppu.vram[(addr - 0x8000) as usize],
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            _ => 0xFF,
        }
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}
