//! Zotino DAC (AD5372) output controller
//!
//! After a one-time initialization write of the offset register, every update streams one data
//! register write per channel through the serial engine. Transfers are paced by a fixed transfer
//! cycle counter instead of the engine's ready flag, so that `SYNC` stays high for the time the
//! AD5372 requires between two words.
use ad5372::{Word, GROUP0, OFS0_DEFAULT};
use arbitrary_int::u3;

use crate::design_parameters::{MAX_CHANNELS, SYNC_HIGH_TICKS};
use crate::spi::{self, HalfClock, Spi};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Init,
    Data,
}

/// Inputs sampled by the DAC controller on one tick.
#[derive(Copy, Clone, Debug)]
pub struct DacInput<'a> {
    /// Perform the offset register initialization. Takes precedence over `start`.
    pub init: bool,
    /// Start an update of all channels.
    pub start: bool,
    /// Channel profiles. Latched while idle.
    pub profiles: &'a [u64],
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DacPins {
    pub sdi: bool,
    pub sclk: bool,
    pub sync_n: bool,
    /// Low while data is written.
    pub ldac: bool,
}

/// Ticks between two word starts: the engine transfer, its start tick and the `SYNC` high time.
pub const fn transfer_cycle(params: &spi::Params) -> u32 {
    params.transfer_ticks() + 1 + SYNC_HIGH_TICKS
}

/// Output controller for one group of AD5372 channels.
#[derive(Clone, Debug)]
pub struct Dac {
    spi: Spi,
    state: State,
    cycle: HalfClock,
    transfer_cycle: u32,
    // Registered from a cycle counter reload.
    spi_start: bool,
    // Words left after the current one.
    remaining: usize,
    words: [u32; MAX_CHANNELS],
    initialized: bool,
}

impl Dac {
    pub fn new(params: spi::Params) -> Result<Self, spi::Error> {
        let spi = Spi::new(params)?;
        let transfer_cycle = transfer_cycle(&params);
        Ok(Self {
            spi,
            state: State::Idle,
            cycle: HalfClock::new(transfer_cycle),
            transfer_cycle,
            spi_start: false,
            remaining: params.channels - 1,
            words: [0; MAX_CHANNELS],
            initialized: false,
        })
    }

    /// Compose the data register write for one channel.
    ///
    /// # Args
    /// * `channel` - Channel index within the group.
    /// * `profile` - Channel profile. Bits `[63:48]` are the signed output value.
    pub fn word(channel: usize, profile: u64) -> u32 {
        let code = ad5372::offset_binary((profile >> 48) as u16 as i16);
        Word::dac(GROUP0, u3::new(channel as u8 & 0b111), code)
            .raw_value()
            .value()
    }

    /// Advance by one system clock tick.
    pub fn tick(&mut self, input: &DacInput<'_>) {
        let cycle_done = self.cycle.done();
        let data = if self.initialized {
            self.words[0]
        } else {
            Word::ofs0(OFS0_DEFAULT).raw_value().value()
        };
        self.spi.tick(self.spi_start, data);

        let mut load = false;
        let mut shift = false;
        let state = self.state;
        self.state = match state {
            State::Idle => {
                if input.init || input.start {
                    load = true;
                }
                if input.init {
                    State::Init
                } else if input.start {
                    State::Data
                } else {
                    State::Idle
                }
            }
            State::Init => {
                if cycle_done {
                    if !self.initialized {
                        log::info!("DAC offset initialized");
                    }
                    self.initialized = true;
                    State::Idle
                } else {
                    State::Init
                }
            }
            State::Data => {
                if cycle_done && self.remaining == 0 {
                    State::Idle
                } else {
                    if cycle_done {
                        shift = true;
                        load = true;
                    }
                    State::Data
                }
            }
        };

        self.cycle.update(load);
        self.spi_start = load;

        let channels = self.spi.params().channels;
        match state {
            State::Idle => {
                self.remaining = channels - 1;
                for (ch, (word, profile)) in self.words.iter_mut().zip(input.profiles).enumerate() {
                    *word = Self::word(ch, *profile);
                }
            }
            State::Data if shift => {
                self.remaining -= 1;
                self.words.copy_within(1..channels, 0);
                self.words[channels - 1] = 0;
            }
            _ => {}
        }
    }

    /// Idle and ready to accept a start.
    pub fn ready(&self) -> bool {
        self.state == State::Idle
    }

    /// The offset register has been written. Never cleared.
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn pins(&self) -> DacPins {
        let pins = self.spi.pins();
        DacPins {
            sdi: pins.sdi,
            sclk: pins.sclk,
            sync_n: pins.cs_n,
            ldac: self.state != State::Data,
        }
    }

    /// Ticks between two word starts.
    pub fn transfer_cycle(&self) -> u32 {
        self.transfer_cycle
    }

    /// Ticks from the start tick of an update until ready again, inclusive.
    pub fn output_ticks(&self) -> u32 {
        self.spi.params().channels as u32 * self.transfer_cycle + 1
    }

    pub fn params(&self) -> &spi::Params {
        self.spi.params()
    }
}
