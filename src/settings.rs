//! Servo Settings Management
//!
//! # Design
//! Two types of settings are supported:
//! 1. Static Device Configuration
//! 2. Run-time Settings
//!
//! The static device configuration describes the gateware: the acquisition and filter engine
//! geometry, the serial device parameters and the cycle floor. It is fixed for the lifetime of a
//! [crate::servo::Servo] and is checked completely at construction.
//!
//! The run-time settings are the user facing channel gains and loop filter gains. They are
//! translated into PGIA codes and filter coefficients when the servo is constructed.
use miniconf::{Leaf, Tree};
use serde::{Deserialize, Serialize};

use crate::adc::AdcParams;
use crate::design_parameters::{
    COEFF_SHIFT, COEFF_WIDTH, DAC_SETTLE_TICKS, MAX_CHANNELS, START_DELAY,
};
use crate::iir::IirWidths;
use crate::pgia::{Gain, GainVector};
use crate::spi;

/// Static device configuration.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub adc: AdcParams,
    pub iir: IirWidths,
    pub dac: spi::Params,
    pub pgia: spi::Params,
    /// Ticks after construction before the first request.
    pub start_delay: u32,
    /// Minimum servo cycle length in ticks.
    pub cycle_floor: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adc: AdcParams {
                width: 16,
                channels: MAX_CHANNELS,
                lanes: 4,
                t_cnvh: 4,
                t_conv: 53,
                t_rtt: 4 * 2,
            },
            iir: IirWidths {
                state: 25,
                coeff: COEFF_WIDTH,
                adc: 16,
                asf: 14,
                word: 16,
                accu: 48,
                shift: COEFF_SHIFT,
                channel: 3,
                profile: 1,
            },
            dac: spi::Params {
                channels: MAX_CHANNELS,
                data_width: 24,
                clk_width: 2,
            },
            pgia: spi::Params {
                channels: MAX_CHANNELS,
                data_width: 2 * MAX_CHANNELS as u8,
                clk_width: 2,
            },
            start_delay: START_DELAY,
            cycle_floor: DAC_SETTLE_TICKS,
        }
    }
}

/// Run-time settings.
#[derive(Clone, Debug, Tree)]
pub struct Settings {
    /// Sampler PGIA gain of each channel.
    pub gain: [Leaf<Gain>; MAX_CHANNELS],

    /// Proportional gain of each channel.
    pub kp: [Leaf<f32>; MAX_CHANNELS],

    /// Integral gain of each channel in 1/s. Zero disables the integrator.
    pub ki: [Leaf<f32>; MAX_CHANNELS],
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gain: [Leaf(Gain::G10); MAX_CHANNELS],
            kp: [Leaf(1.0); MAX_CHANNELS],
            ki: [Leaf(0.0); MAX_CHANNELS],
        }
    }
}

impl Settings {
    /// The packed PGIA gain codes.
    pub fn gain_vector(&self) -> GainVector {
        let gains: [Gain; MAX_CHANNELS] = core::array::from_fn(|ch| self.gain[ch].0);
        GainVector::new(&gains)
    }
}
