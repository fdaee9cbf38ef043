/// Timer interrupt request bit in IF.
const IF_TIMER: u8 = 0x04;

/// TIMA overflow/reload sequencing. An 8-bit overflow does not reload TIMA
/// immediately: the counter reads 0 for one M-cycle, then TMA is loaded and
/// the interrupt is requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reload {
    /// No overflow in flight.
    Idle,
    /// Overflow happened; the reload fires when the countdown reaches zero.
    Pending { value: u8, delay: u8 },
    /// TIMA was reloaded this quarter-cycle; TIMA writes are lost.
    Reloading,
}

pub struct Timer {
    /// 16-bit internal divider counter. DIV register is the upper 8 bits.
    pub div: u16,
    /// Timer counter
    pub tima: u8,
    /// Timer modulo
    pub tma: u8,
    /// Timer control
    pub tac: u8,
    /// Previous value of the enable-gated multiplexer bit, for edge detection.
    last_signal: bool,
    /// Previous value of TMA when a write occurred this cycle
    tma_latch: Option<u8>,
    reload: Reload,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            div: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            last_signal: false,
            tma_latch: None,
            reload: Reload::Idle,
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.div >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8, if_reg: &mut u8) {
        match addr {
            0xFF04 => {
                self.reset_div(if_reg);
            }
            0xFF05 => match self.reload {
                // Writes in the reload cycle, or in the last delay cycle
                // (where the reload is already committed), are lost.
                Reload::Reloading | Reload::Pending { delay: 0, .. } => {}
                // Writing earlier in the delay cancels the pending reload.
                Reload::Pending { .. } => {
                    self.tima = val;
                    self.reload = Reload::Idle;
                }
                Reload::Idle => self.tima = val,
            },
            0xFF06 => {
                // Store the old value so that if a reload occurs in the same
                // cycle, the old value will be used.
                self.tma_latch = Some(self.tma);
                self.tma = val;
                match &mut self.reload {
                    // Mid-delay writes affect the value about to be loaded.
                    Reload::Pending { value, .. } => *value = val,
                    Reload::Reloading => self.tima = val,
                    Reload::Idle => {}
                }
            }
            0xFF07 => {
                let prev = Self::signal_of(self.div, self.tac);
                self.tac = val & 0x07;
                let new = Self::signal_of(self.div, self.tac);
                if prev && !new {
                    let tma_old = self.tma_latch.take();
                    self.increment(tma_old);
                }
                self.last_signal = new;
            }
            _ => {}
        }
    }

    /// Advance the timer by `quarter_cycles` and update IF when TIMA
    /// overflows.
    pub fn step(&mut self, quarter_cycles: u16, if_reg: &mut u8) {
        for _ in 0..quarter_cycles {
            self.advance_reload(if_reg);
            let prev = self.last_signal;
            // Take any pending TMA write for this cycle
            let tma_old = self.tma_latch.take();
            self.div = self.div.wrapping_add(1);
            let new = self.signal();
            if prev && !new {
                self.increment(tma_old);
            }
            self.last_signal = new;
        }
    }

    /// Reset the internal divider counter, applying TIMA edge logic.
    pub fn reset_div(&mut self, if_reg: &mut u8) {
        self.advance_reload(if_reg);
        let prev = Self::signal_of(self.div, self.tac);
        self.div = 0;
        let new = Self::signal_of(self.div, self.tac);
        if prev && !new {
            let tma_old = self.tma_latch.take();
            self.increment(tma_old);
        }
        self.last_signal = new;
    }

    fn advance_reload(&mut self, if_reg: &mut u8) {
        self.reload = match self.reload {
            Reload::Idle | Reload::Reloading => Reload::Idle,
            Reload::Pending { value, delay: 0 } => {
                self.tima = value;
                *if_reg |= IF_TIMER;
                Reload::Reloading
            }
            Reload::Pending { value, delay } => Reload::Pending {
                value,
                delay: delay - 1,
            },
        };
    }

    fn increment(&mut self, tma_old: Option<u8>) {
        if self.tima == 0xFF {
            // TIMA stays 0 during the reload delay.
            self.tima = 0;
            self.reload = Reload::Pending {
                value: tma_old.unwrap_or(self.tma),
                delay: 3,
            };
        } else {
            self.tima = self.tima.wrapping_add(1);
        }
    }

    fn signal(&self) -> bool {
        Self::signal_of(self.div, self.tac)
    }

    fn signal_of(div: u16, tac: u8) -> bool {
        if tac & 0x04 == 0 {
            return false;
        }
        let bit = match tac & 0x03 {
            0x00 => (div >> 9) & 1,
            0x01 => (div >> 3) & 1,
            0x02 => (div >> 5) & 1,
            _ => (div >> 7) & 1,
        };
        bit != 0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
