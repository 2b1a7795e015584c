//! Clocked serial shift engine
//!
//! The engine streams one `data_width` bit word MSB first onto `SDI`. Each bit takes a SETUP
//! half clock period with `SCLK` high followed by a HOLD half clock period with `SCLK` low. The
//! receiver samples on the falling `SCLK` edge. The word is framed by the active-low select
//! line `CS_N`, which returns high once the last bit has been held.
//!
//! Both the DAC and the PGIA controllers are built on the half clock countdown and the shift
//! register in this module.
use serde::{Deserialize, Serialize};

/// Serial device parameters.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Params {
    /// Number of channels in use, i.e. words per update.
    pub channels: usize,
    /// Width of one word to be transferred.
    pub data_width: u8,
    /// Serial clock half period in system clock ticks.
    pub clk_width: u32,
}

/// Largest serial clock half period in system clock ticks.
pub const MAX_CLK_WIDTH: u32 = 1 << 16;

/// Invalid serial device parameters.
#[derive(Copy, Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Serial clock half period must be 1 to 65536 ticks")]
    ClockWidth,
    #[error("Invalid word width: {0} bits")]
    DataWidth(u8),
    #[error("Invalid channel count: {0}")]
    Channels(usize),
}

impl Params {
    pub fn validate(&self) -> Result<(), Error> {
        if !(1..=MAX_CLK_WIDTH).contains(&self.clk_width) {
            return Err(Error::ClockWidth);
        }
        if !(1..=32).contains(&self.data_width) {
            return Err(Error::DataWidth(self.data_width));
        }
        if !(1..=crate::design_parameters::MAX_CHANNELS).contains(&self.channels) {
            return Err(Error::Channels(self.channels));
        }
        Ok(())
    }

    /// The number of ticks the engine is busy (not ready) for one word.
    pub const fn transfer_ticks(&self) -> u32 {
        self.data_width as u32 * 2 * self.clk_width
    }
}

/// Fixed width shift register. All updates are masked to the declared width.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ShiftRegister {
    value: u32,
    width: u8,
}

impl ShiftRegister {
    /// # Args
    /// * `width` - Register width in bits, `1..=32`.
    pub fn new(width: u8) -> Self {
        debug_assert!((1..=32).contains(&width));
        Self { value: 0, width }
    }

    pub fn mask(&self) -> u32 {
        u32::MAX >> (32 - self.width as u32)
    }

    pub fn load(&mut self, value: u32) {
        self.value = value & self.mask();
    }

    /// Shift towards the MSB by one bit, shifting in a zero.
    pub fn shift_left(&mut self) {
        self.value = (self.value << 1) & self.mask();
    }

    pub fn msb(&self) -> bool {
        (self.value >> (self.width - 1)) & 1 != 0
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn width(&self) -> u8 {
        self.width
    }
}

/// Half serial clock period countdown.
///
/// The shift state machines only advance on ticks where the countdown has expired. A state that
/// requests a reload is held for `clk_width` ticks.
#[derive(Copy, Clone, Debug)]
pub struct HalfClock {
    count: u32,
    reload: u32,
}

impl HalfClock {
    pub fn new(clk_width: u32) -> Self {
        Self {
            count: 0,
            reload: clk_width.saturating_sub(1),
        }
    }

    pub fn done(&self) -> bool {
        self.count == 0
    }

    /// Advance by one tick.
    ///
    /// # Args
    /// * `load` - Reload the countdown if it has expired.
    pub fn update(&mut self, load: bool) {
        if self.count == 0 {
            if load {
                self.count = self.reload;
            }
        } else {
            self.count -= 1;
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Setup,
    Hold,
}

/// Serial pin levels.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SpiPins {
    pub sdi: bool,
    pub sclk: bool,
    /// Active-low select (`SYNC` on the AD5372).
    pub cs_n: bool,
}

/// Serial transceiver engine.
#[derive(Clone, Debug)]
pub struct Spi {
    params: Params,
    state: State,
    clock: HalfClock,
    // Bits remaining after the current one.
    bits: u8,
    sr: ShiftRegister,
}

impl Spi {
    pub fn new(params: Params) -> Result<Self, Error> {
        params.validate()?;
        Ok(Self {
            state: State::Idle,
            clock: HalfClock::new(params.clk_width),
            bits: params.data_width - 1,
            sr: ShiftRegister::new(params.data_width),
            params,
        })
    }

    /// Advance by one system clock tick.
    ///
    /// # Args
    /// * `start` - Start a transfer. Sampled only while ready.
    /// * `data` - The word to transfer, latched on start.
    pub fn tick(&mut self, start: bool, data: u32) {
        let mut load = false;
        if self.clock.done() {
            self.state = match self.state {
                State::Idle => {
                    self.bits = self.params.data_width - 1;
                    if start {
                        self.sr.load(data);
                        load = true;
                        State::Setup
                    } else {
                        State::Idle
                    }
                }
                State::Setup => {
                    load = true;
                    State::Hold
                }
                State::Hold => {
                    if self.bits == 0 {
                        self.bits = self.params.data_width - 1;
                        State::Idle
                    } else {
                        self.bits -= 1;
                        self.sr.shift_left();
                        load = true;
                        State::Setup
                    }
                }
            };
        }
        self.clock.update(load);
    }

    /// Idle and ready to accept a new word.
    pub fn ready(&self) -> bool {
        self.state == State::Idle
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn pins(&self) -> SpiPins {
        SpiPins {
            sdi: self.sr.msb(),
            sclk: self.state == State::Setup,
            cs_n: self.state == State::Idle,
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn transfer_ticks(&self) -> u32 {
        self.params.transfer_ticks()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::Monitor;

    fn params(data_width: u8, clk_width: u32) -> Params {
        Params {
            channels: 1,
            data_width,
            clk_width,
        }
    }

    /// Start one transfer and count the ticks until ready.
    fn busy_ticks(spi: &mut Spi, data: u32, monitor: &mut Monitor) -> u32 {
        assert!(spi.ready());
        spi.tick(true, data);
        let mut busy = 0;
        while !spi.ready() {
            let pins = spi.pins();
            monitor.sample(!pins.cs_n, pins.sclk, pins.sdi);
            busy += 1;
            spi.tick(false, 0);
            assert!(busy < 10_000);
        }
        let pins = spi.pins();
        monitor.sample(!pins.cs_n, pins.sclk, pins.sdi);
        busy
    }

    #[test]
    fn transfer_length() {
        for (width, clk) in [(24, 2), (16, 2), (24, 1), (8, 3), (32, 1), (1, 4)] {
            let mut spi = Spi::new(params(width, clk)).unwrap();
            let mut monitor = Monitor::falling();
            let busy = busy_ticks(&mut spi, 0xa5a5_a5a5, &mut monitor);
            assert_eq!(busy, width as u32 * 2 * clk);
            assert_eq!(busy, spi.transfer_ticks());
        }
    }

    #[test]
    fn msb_first() {
        let mut spi = Spi::new(params(24, 2)).unwrap();
        let mut monitor = Monitor::falling();
        for word in [0x22000, 0xcd1234, 0xffffff, 0x800001] {
            busy_ticks(&mut spi, word, &mut monitor);
        }
        assert_eq!(monitor.words(), [
            (0x22000, 24),
            (0xcd1234, 24),
            (0xffffff, 24),
            (0x800001, 24)
        ]);
    }

    #[test]
    fn truncates_to_width() {
        let mut spi = Spi::new(params(8, 1)).unwrap();
        let mut monitor = Monitor::falling();
        busy_ticks(&mut spi, 0x1ff, &mut monitor);
        assert_eq!(monitor.words(), [(0xff, 8)]);
    }

    #[test]
    fn start_ignored_while_busy() {
        let mut spi = Spi::new(params(4, 1)).unwrap();
        spi.tick(true, 0b1010);
        for _ in 0..3 {
            spi.tick(true, 0b0101);
        }
        let mut busy = 3;
        while !spi.ready() {
            spi.tick(false, 0);
            busy += 1;
        }
        assert_eq!(busy, 8);
    }

    #[test]
    fn select_idle_high() {
        let mut spi = Spi::new(params(16, 2)).unwrap();
        for _ in 0..5 {
            spi.tick(false, 0xffff);
            assert_eq!(
                spi.pins(),
                SpiPins {
                    sdi: false,
                    sclk: false,
                    cs_n: true
                }
            );
        }
    }

    #[test]
    fn invalid() {
        assert_eq!(Spi::new(params(24, 0)).unwrap_err(), Error::ClockWidth);
        assert_eq!(
            Spi::new(params(24, 1 << 28)).unwrap_err(),
            Error::ClockWidth
        );
        assert!(Spi::new(params(32, MAX_CLK_WIDTH)).is_ok());
        assert_eq!(Spi::new(params(0, 2)).unwrap_err(), Error::DataWidth(0));
        assert_eq!(Spi::new(params(33, 2)).unwrap_err(), Error::DataWidth(33));
        let p = Params {
            channels: 9,
            ..params(24, 2)
        };
        assert_eq!(Spi::new(p).unwrap_err(), Error::Channels(9));
    }

    #[test]
    fn shift_register() {
        let mut sr = ShiftRegister::new(3);
        sr.load(0b1101);
        assert_eq!(sr.value(), 0b101);
        assert!(sr.msb());
        sr.shift_left();
        assert_eq!(sr.value(), 0b010);
        assert!(!sr.msb());
        let sr = ShiftRegister::new(32);
        assert_eq!(sr.mask(), u32::MAX);
    }
}
