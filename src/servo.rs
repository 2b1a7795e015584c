//! Servo scheduler
//!
//! The scheduler runs the Sampler ADC, the IIR engine and the Zotino DAC as a three stage
//! pipeline with a fixed period. Before the first cycle it programs the PGIA gains, initializes
//! the DAC offset and writes the filter coefficients, all concurrently.
//!
//! A new acquisition is started exactly one cycle after the previous one. The cycle is long
//! enough for every stage to complete and never shorter than the DAC settling time.
use bitbybit::bitfield;

use crate::adc::Acquisition;
use crate::dac::{self, Dac, DacInput};
use crate::design_parameters::{Ticks, MAX_CHANNELS};
use crate::iir::{self, CoeffWrite, Ctrl, Filter, FilterInput, ProfileCoefficients};
use crate::pgia::Pgia;
use crate::settings::{Config, Settings};
use crate::spi;

#[derive(Copy, Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Serial device: {0}")]
    Spi(#[from] spi::Error),
    #[error("Channel {channel} coefficients")]
    Coefficient {
        channel: usize,
        #[source]
        source: iir::Error,
    },
    #[error("Cycle of {cycle} ticks shorter than the pipeline latency of {latency} ticks")]
    Period { cycle: u32, latency: u32 },
    #[error("DAC word width {0} is not 24")]
    Word(u8),
    #[error("PGIA word width {0} does not match the channel count")]
    Gains(u8),
    #[error("Channel count mismatch")]
    Channels,
    #[error("No ADC data lanes")]
    Lanes,
    #[error("Filter engine widths")]
    Widths(#[source] iir::Error),
    #[error("Timing budget overflow")]
    Overflow,
}

/// Stage latencies and the resulting cycle, in system clock ticks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimingBudget {
    pub acquisition: u32,
    pub filter: u32,
    /// Output of the first channel word
    pub first_word: u32,
    /// Output of all channels
    pub output: u32,
    pub cycle: u32,
    /// Remainder of the cycle after the acquisition, filter and first word latencies
    pub restart: u32,
}

impl TimingBudget {
    pub fn new(config: &Config) -> Result<Self, Error> {
        if config.adc.lanes == 0 {
            return Err(Error::Lanes);
        }
        config.iir.validate().map_err(Error::Widths)?;
        config.dac.validate()?;

        let acquisition = config.adc.latency().ok_or(Error::Overflow)?;
        let filter = config.iir.latency();
        let first_word = dac::transfer_cycle(&config.dac);
        let output = config.dac.channels as u32 * first_word + 1;
        let cycle = acquisition.max(filter).max(output).max(config.cycle_floor);
        let latency = acquisition
            .checked_add(filter)
            .and_then(|l| l.checked_add(first_word))
            .ok_or(Error::Overflow)?;
        if cycle < latency {
            return Err(Error::Period { cycle, latency });
        }
        Ok(Self {
            acquisition,
            filter,
            first_word,
            output,
            cycle,
            restart: cycle - latency,
        })
    }

    /// Acquisition start to first DAC word.
    pub fn latency(&self) -> u32 {
        self.acquisition + self.filter + self.first_word
    }

    pub fn period(&self) -> Ticks {
        Ticks::from_ticks(self.cycle)
    }

    /// The cycle period in seconds.
    pub fn period_s(&self) -> f64 {
        self.period().to_nanos() as f64 * 1e-9
    }
}

/// The pipeline stages holding the samples of a cycle.
#[bitfield(u8, default = 0)]
#[derive(Debug, PartialEq)]
pub struct Active {
    #[bit(0, rw)]
    acquisition: bool,
    #[bit(1, rw)]
    filter: bool,
    #[bit(2, rw)]
    output: bool,
}

/// Reason an acquisition start was deferred.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stall {
    /// The ADC has not completed the previous acquisition.
    Acquisition,
    /// The filter has not yet accepted the previous samples.
    Filter,
}

/// The servo scheduler owning all stages.
pub struct Servo<A, F> {
    adc: A,
    iir: F,
    dac: Dac,
    pgia: Pgia,
    budget: TimingBudget,
    channels: usize,
    start_cnt: u32,
    // Pipeline window, then restart remainder, both loaded at acquisition start.
    window: u32,
    restart: u32,
    active: Active,
    deferred: bool,
    stalls: u32,
    last_stall: Option<Stall>,
    cycles: u32,
    initialized: bool,
}

impl<A: Acquisition, F: Filter> Servo<A, F> {
    /// Construct the servo.
    ///
    /// Validates the configuration, computes the timing budget, translates the settings into
    /// PGIA codes and filter coefficients and stages them.
    ///
    /// # Args
    /// * `config` - Static device configuration
    /// * `settings` - Channel gains
    /// * `adc` - The acquisition engine
    /// * `iir` - The filter engine
    pub fn new(config: &Config, settings: &Settings, adc: A, mut iir: F) -> Result<Self, Error> {
        let budget = TimingBudget::new(config)?;
        let channels = config.dac.channels;
        if config.adc.channels != channels
            || config.pgia.channels != channels
            || channels > 1 << config.iir.channel
            || channels > MAX_CHANNELS
        {
            return Err(Error::Channels);
        }
        if config.dac.data_width != 24 {
            return Err(Error::Word(config.dac.data_width));
        }
        if config.pgia.data_width as usize != 2 * channels {
            return Err(Error::Gains(config.pgia.data_width));
        }

        let dac = Dac::new(config.dac)?;
        let pgia = Pgia::new(config.pgia, settings.gain_vector())?;
        log::info!(
            "Cycle {} ticks ({} ns): acquisition {}, filter {}, first word {}, output {}, restart {}",
            budget.cycle,
            budget.period().to_nanos(),
            budget.acquisition,
            budget.filter,
            budget.first_word,
            budget.output,
            budget.restart
        );

        let period = budget.period_s();
        let mut writes: heapless::Vec<CoeffWrite, { 8 * MAX_CHANNELS }> = heapless::Vec::new();
        for channel in 0..channels {
            let coefficients = iir::coeff_to_mu(
                settings.kp[channel].0 as f64,
                settings.ki[channel].0 as f64,
                period,
                &config.iir,
            )
            .map_err(|source| Error::Coefficient { channel, source })?;
            log::debug!("Channel {channel}: {coefficients:?}");
            let profile = ProfileCoefficients::new(coefficients, channel as u8);
            writes.extend(profile.writes(&config.iir, channel, 0));
        }
        iir.stage(&writes);
        for channel in 0..channels {
            iir.set_ctrl(
                channel,
                Ctrl {
                    en_iir: true,
                    en_out: true,
                    profile: 0,
                },
            );
        }

        Ok(Self {
            adc,
            iir,
            dac,
            pgia,
            budget,
            channels,
            start_cnt: config.start_delay,
            window: 0,
            restart: 0,
            active: Active::default(),
            deferred: false,
            stalls: 0,
            last_stall: None,
            cycles: 0,
            initialized: false,
        })
    }

    /// Advance all stages by one system clock tick.
    ///
    /// # Args
    /// * `start` - Run the servo. Initialization and acquisition starts are only requested
    ///   while set.
    pub fn tick(&mut self, start: bool) {
        let n = self.channels;
        let request = start && self.start_cnt == 0;
        let dac_init = request && !self.dac.initialized();
        let pgia_start = request && !self.pgia.initialized();
        let start_coeff = request && !self.iir.done_writing();

        let adc_done = self.adc.done();
        let iir_done = self.iir.done();
        let dac_ready = self.dac.ready();
        let iir_start = self.active.acquisition() && adc_done;
        let dac_start = self.active.filter() && (self.iir.shifting() || iir_done);
        // The filter takes the samples on this tick.
        let iir_accept = iir_start && iir_done;
        let dac_accept = dac_start && dac_ready;

        let due = self.window == 0 && self.restart == 0;
        let mut adc_start = false;
        if request && due && self.initialized {
            let stall = if !adc_done {
                Some(Stall::Acquisition)
            } else if self.active.acquisition() && !iir_accept {
                Some(Stall::Filter)
            } else {
                None
            };
            match stall {
                None => {
                    adc_start = true;
                    self.deferred = false;
                }
                Some(stall) => {
                    if !self.deferred {
                        self.deferred = true;
                        self.stalls += 1;
                        log::warn!("Acquisition start deferred: {stall:?}");
                    }
                    self.last_stall = Some(stall);
                }
            }
        }

        let mut samples = [0i16; MAX_CHANNELS];
        for (i, sample) in samples[..n].iter_mut().enumerate() {
            *sample = self.adc.sample(n - 1 - i);
        }
        let mut profiles = [0u64; MAX_CHANNELS];
        for (ch, profile) in profiles[..n].iter_mut().enumerate() {
            *profile = self.iir.profile(ch);
        }
        if !self.iir.loading() {
            for ch in 0..n {
                self.iir.route(ch, ch as u8);
            }
        }

        self.adc.tick(adc_start);
        self.iir.tick(&FilterInput {
            start: iir_start,
            start_coeff,
            adc: &samples[..n],
        });
        self.dac.tick(&DacInput {
            init: dac_init,
            start: dac_start,
            profiles: &profiles[..n],
        });
        self.pgia.tick(pgia_start);

        let mut active = self.active;
        if dac_ready {
            active = active.with_output(false);
        }
        if dac_accept {
            log::debug!("Output start");
            active = active.with_output(true).with_filter(false);
        }
        if iir_accept {
            log::debug!("Filter start");
            active = active.with_filter(true).with_acquisition(false);
        }
        if adc_start {
            active = active.with_acquisition(true);
        }
        self.active = active;

        if adc_start {
            self.window = self.budget.latency() - 1;
            self.restart = self.budget.restart;
            self.cycles = self.cycles.wrapping_add(1);
        } else if self.window > 0 {
            self.window -= 1;
        } else if self.restart > 0 {
            self.restart -= 1;
        }
        if self.start_cnt > 0 {
            self.start_cnt -= 1;
        }

        if !self.initialized
            && self.dac.initialized()
            && self.pgia.initialized()
            && self.iir.done_writing()
        {
            self.initialized = true;
            log::info!("Servo initialized");
        }
    }

    /// The output stage is idle.
    pub fn done(&self) -> bool {
        self.dac.ready()
    }

    /// DAC, PGIA and coefficients have been initialized.
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    pub fn active(&self) -> Active {
        self.active
    }

    pub fn budget(&self) -> &TimingBudget {
        &self.budget
    }

    /// Number of deferred acquisition starts.
    pub fn stalls(&self) -> u32 {
        self.stalls
    }

    pub fn last_stall(&self) -> Option<Stall> {
        self.last_stall
    }

    /// Number of acquisitions started.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn adc(&self) -> &A {
        &self.adc
    }

    pub fn iir(&self) -> &F {
        &self.iir
    }

    pub fn dac(&self) -> &Dac {
        &self.dac
    }

    pub fn pgia(&self) -> &Pgia {
        &self.pgia
    }
}
