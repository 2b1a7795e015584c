//! Sampler programmable gain instrumentation amplifiers (PGIA)
//!
//! The gains of all Sampler channels are set once through a chain of shift registers with
//! separate shift clock (`SRCLK`) and output register clock (`RCLK`). The two clocks are pulsed
//! together, so the output register always lags the shift register by one bit and a final,
//! extra `RCLK` pulse latches the last bit.
use arbitrary_int::u2;
use bitbybit::bitenum;
use serde::{Deserialize, Serialize};

use crate::design_parameters::MAX_CHANNELS;
use crate::spi::{self, HalfClock, ShiftRegister};

#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
#[bitenum(u2, exhaustive = true)]
pub enum Gain {
    /// +/- 10 V input range
    #[default]
    G1 = 0b00,
    /// +/- 1 V
    G10 = 0b01,
    G100 = 0b10,
    G1000 = 0b11,
}

impl Gain {
    /// Get the PGIA gain as a numerical value.
    pub const fn multiplier(self) -> f32 {
        match self {
            Gain::G1 => 1.0,
            Gain::G10 => 10.0,
            Gain::G100 => 100.0,
            Gain::G1000 => 1000.0,
        }
    }
}

/// Packed gain codes, two bits per channel, channel `i` at bits `2i + 1..=2i`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct GainVector(u32);

impl GainVector {
    pub fn new(gains: &[Gain; MAX_CHANNELS]) -> Self {
        Self(gains.iter().enumerate().fold(0, |v, (i, g)| {
            v | (g.raw_value().value() as u32) << (2 * i)
        }))
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }

    pub fn gain(&self, channel: usize) -> Gain {
        Gain::new_with_raw_value(u2::new(((self.0 >> (2 * channel)) & 0b11) as u8))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Setup,
    Hold,
    Rclk,
    /// Terminal. The PGIA is only programmed once.
    End,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PgiaPins {
    pub sdi: bool,
    pub srclk: bool,
    pub rclk: bool,
}

/// One-shot PGIA gain sequencer.
#[derive(Clone, Debug)]
pub struct Pgia {
    gains: GainVector,
    state: State,
    clock: HalfClock,
    bits_left: u8,
    sr: ShiftRegister,
    // Latched and never cleared.
    initialized: bool,
}

impl Pgia {
    /// Construct the sequencer.
    ///
    /// # Args
    /// * `params` - Serial parameters. `data_width` must cover two bits per channel.
    /// * `gains` - The gain vector to program.
    pub fn new(params: spi::Params, gains: GainVector) -> Result<Self, spi::Error> {
        params.validate()?;
        if params.data_width as usize != 2 * params.channels {
            return Err(spi::Error::DataWidth(params.data_width));
        }
        Ok(Self {
            gains,
            state: State::Idle,
            clock: HalfClock::new(params.clk_width),
            bits_left: params.data_width,
            sr: ShiftRegister::new(params.data_width),
            initialized: false,
        })
    }

    /// Advance by one system clock tick.
    pub fn tick(&mut self, start: bool) {
        let mut load = false;
        if self.clock.done() {
            self.state = match self.state {
                State::Idle => {
                    self.bits_left = self.sr.width();
                    if start {
                        self.sr.load(self.gains.raw());
                        load = true;
                        State::Setup
                    } else {
                        State::Idle
                    }
                }
                State::Setup => {
                    load = true;
                    if self.bits_left == 0 {
                        State::Rclk
                    } else {
                        State::Hold
                    }
                }
                State::Hold => {
                    self.bits_left -= 1;
                    self.sr.shift_left();
                    load = true;
                    State::Setup
                }
                State::Rclk => {
                    self.initialized = true;
                    log::info!("PGIA gains set: {:#06x}", self.gains.raw());
                    State::End
                }
                State::End => State::End,
            };
        }
        self.clock.update(load);
    }

    pub fn ready(&self) -> bool {
        self.state == State::Idle
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn gains(&self) -> GainVector {
        self.gains
    }

    pub fn pins(&self) -> PgiaPins {
        let clk = matches!(self.state, State::Hold | State::Rclk);
        PgiaPins {
            sdi: self.sr.msb(),
            srclk: clk,
            rclk: clk,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::Monitor;
    use std::vec::Vec;

    fn params(clk_width: u32) -> spi::Params {
        spi::Params {
            channels: 8,
            data_width: 16,
            clk_width,
        }
    }

    /// Shift register chain with output register (74HC595).
    #[derive(Default)]
    struct Chain {
        pins: PgiaPins,
        shift: u16,
        output: u16,
        rclk_edges: u32,
    }

    impl Chain {
        fn sample(&mut self, pins: PgiaPins) {
            // Both registers see the state before the edge.
            let shift = self.shift;
            if pins.srclk && !self.pins.srclk {
                self.shift = (shift << 1) | pins.sdi as u16;
            }
            if pins.rclk && !self.pins.rclk {
                self.output = shift;
                self.rclk_edges += 1;
            }
            self.pins = pins;
        }
    }

    fn run(pgia: &mut Pgia, chain: &mut Chain) -> Vec<State> {
        let mut states = Vec::new();
        pgia.tick(true);
        while !pgia.initialized() {
            states.push(pgia.state());
            chain.sample(pgia.pins());
            pgia.tick(false);
            assert!(states.len() < 10_000);
        }
        chain.sample(pgia.pins());
        states
    }

    #[test]
    fn program() {
        for raw in [0x5555, 0x0000, 0xffff, 0x1b1b, 0x8001] {
            let mut pgia = Pgia::new(params(2), GainVector::from_raw(raw)).unwrap();
            let mut chain = Chain::default();
            let mut monitor = Monitor::rising();
            pgia.tick(true);
            while !pgia.initialized() {
                let pins = pgia.pins();
                chain.sample(pins);
                monitor.sample(true, pins.srclk, pins.sdi);
                pgia.tick(false);
            }
            chain.sample(pgia.pins());
            monitor.end();
            assert_eq!(chain.output, raw as u16);
            assert_eq!(chain.rclk_edges, 17);
            // MSB first, then a zero with the final RCLK
            assert_eq!(monitor.words(), [((raw as u32) << 1, 17)]);
        }
    }

    #[test]
    fn hold_count_and_rclk() {
        for clk_width in [1, 2, 3] {
            let mut pgia = Pgia::new(params(clk_width), GainVector::from_raw(0x5555)).unwrap();
            let states = run(&mut pgia, &mut Chain::default());
            let holds = states
                .windows(2)
                .filter(|w| w[0] != State::Hold && w[1] == State::Hold)
                .count();
            assert_eq!(holds, 16);
            let last_hold = states.iter().rposition(|s| *s == State::Hold).unwrap();
            let rclk = states.iter().position(|s| *s == State::Rclk).unwrap();
            // One SETUP half clock period in between
            assert_eq!(rclk, last_hold + 1 + clk_width as usize);
            assert!(states[last_hold + 1..rclk].iter().all(|s| *s == State::Setup));
        }
    }

    #[test]
    fn one_shot() {
        let mut pgia = Pgia::new(params(1), GainVector::from_raw(0x5555)).unwrap();
        assert!(pgia.ready());
        run(&mut pgia, &mut Chain::default());
        assert_eq!(pgia.state(), State::End);
        for _ in 0..100 {
            pgia.tick(true);
            assert!(pgia.initialized());
            assert!(!pgia.ready());
            assert!(!pgia.pins().srclk);
        }
    }

    #[test]
    fn gains() {
        let g = GainVector::new(&[Gain::G10; 8]);
        assert_eq!(g.raw(), 0x5555);
        let mut gains = [Gain::G1; 8];
        gains[1] = Gain::G10;
        gains[2] = Gain::G100;
        gains[3] = Gain::G1000;
        gains[7] = Gain::G100;
        let g = GainVector::new(&gains);
        assert_eq!(g.raw(), (0b10 << 14) | 0b11_10_01_00);
        assert_eq!(g.gain(2), Gain::G100);
        assert_eq!(g.gain(7), Gain::G100);
        assert_eq!(Gain::G1000.multiplier(), 1000.0);
    }

    #[test]
    fn width_mismatch() {
        let p = spi::Params {
            data_width: 12,
            ..params(2)
        };
        assert_eq!(
            Pgia::new(p, GainVector::default()).unwrap_err(),
            spi::Error::DataWidth(12)
        );
    }
}
