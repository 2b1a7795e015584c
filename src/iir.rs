//! IIR filter engine interface and coefficient translation
//!
//! The IIR arithmetic engine itself is external. The servo talks to it through [Filter]: a
//! start/done handshake for the per-cycle update, a coefficient memory write port that is
//! programmed once before the loop starts, and per-channel control and routing.
//!
//! Each channel/profile has a first order section
//! `y0 = (a1*y1 + b0*(x0 + offset) + b1*(x1 + offset)) >> shift`
//! with signed `coeff` bit wide coefficients. The feed-forward coefficients carry one more bit of
//! normalization than the feed-back coefficient.
use num_traits::float::FloatCore;
use serde::{Deserialize, Serialize};

use crate::design_parameters::MAX_CHANNELS;

/// Bit widths of the IIR engine.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IirWidths {
    /// State (x, y) width
    pub state: u8,
    /// Coefficient width
    pub coeff: u8,
    /// ADC sample width
    pub adc: u8,
    /// Amplitude scale factor width
    pub asf: u8,
    /// Output word width
    pub word: u8,
    /// Accumulator width
    pub accu: u8,
    /// Output shift after accumulation
    pub shift: u8,
    /// log2 of the number of channels
    pub channel: u8,
    /// log2 of the number of profiles per channel
    pub profile: u8,
}

impl IirWidths {
    pub fn validate(&self) -> Result<(), Error> {
        if !(2..=32).contains(&self.coeff)
            || self.shift > 61
            || self.channel as u32 > MAX_CHANNELS.trailing_zeros()
            || self.channel as u16 + self.profile as u16 + 2 > 16
        {
            return Err(Error::Widths);
        }
        Ok(())
    }

    /// Worst case number of ticks for one update of all channels: prepare, four
    /// multiply-accumulate steps and one shift per channel.
    pub const fn latency(&self) -> u32 {
        ((1 + 4 + 1) << self.channel) + 1
    }

    /// Largest coefficient magnitude (exclusive).
    pub const fn coeff_max(&self) -> i64 {
        1 << (self.coeff - 1)
    }

    pub fn coeff_mask(&self) -> u32 {
        u32::MAX
            .checked_shr(32u32.saturating_sub(self.coeff as u32))
            .unwrap_or(0)
    }
}

/// Coefficient memory slots of one channel and profile.
///
/// The discriminant is the slot index. Even slots are stored in the low word, odd slots in
/// the high word of a memory location.
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::EnumIter, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Coeff {
    Ftw1 = 0,
    B1 = 1,
    Pow = 2,
    Cfg = 3,
    Offset = 4,
    A1 = 5,
    Ftw0 = 6,
    B0 = 7,
}

impl Coeff {
    /// The order in which a complete profile is written.
    pub const PROGRAM: [Coeff; 8] = [
        Coeff::Ftw1,
        Coeff::Pow,
        Coeff::Offset,
        Coeff::Ftw0,
        Coeff::B1,
        Coeff::Cfg,
        Coeff::A1,
        Coeff::B0,
    ];
}

/// One coefficient memory write.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CoeffWrite {
    /// Memory address (channel, profile, slot pair)
    pub addr: u16,
    /// Value, masked to the coefficient width
    pub value: u32,
    /// High (`true`) or low word of the memory location
    pub word: bool,
    pub mask: u32,
}

/// Compose the memory write for one coefficient.
///
/// `widths` must be valid, see [IirWidths::validate].
pub fn coeff_write(
    widths: &IirWidths,
    channel: usize,
    profile: usize,
    coeff: Coeff,
    value: i32,
) -> CoeffWrite {
    let slot = coeff as u32;
    let mask = widths.coeff_mask();
    let addr = ((channel as u32) << (widths.profile + 2)) | ((profile as u32) << 2) | (slot >> 1);
    CoeffWrite {
        addr: addr as u16,
        value: value as u32 & mask,
        word: slot & 1 != 0,
        mask,
    }
}

/// Filter coefficients `(a1, b0, b1)` in machine units.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Coefficients {
    pub a1: i32,
    pub b0: i32,
    pub b1: i32,
}

/// Complete coefficient set of one channel profile.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProfileCoefficients {
    /// Phase offset word
    pub pow: u16,
    /// IIR offset
    pub offset: i32,
    /// Frequency tuning word, low and high half
    pub ftw0: u16,
    pub ftw1: u16,
    pub iir: Coefficients,
    /// `adc | (delay << 3)`
    pub cfg: u8,
}

impl ProfileCoefficients {
    pub fn new(iir: Coefficients, adc: u8) -> Self {
        Self {
            pow: 0x0000,
            offset: 0x0000,
            ftw0: 0x1727,
            ftw1: 0x1929,
            iir,
            cfg: adc & 0b111,
        }
    }

    pub fn value(&self, coeff: Coeff) -> i32 {
        match coeff {
            Coeff::Ftw1 => self.ftw1 as _,
            Coeff::B1 => self.iir.b1,
            Coeff::Pow => self.pow as _,
            Coeff::Cfg => self.cfg as _,
            Coeff::Offset => self.offset,
            Coeff::A1 => self.iir.a1,
            Coeff::Ftw0 => self.ftw0 as _,
            Coeff::B0 => self.iir.b0,
        }
    }

    /// The memory writes for this profile, in programming order.
    pub fn writes<'a>(
        &'a self,
        widths: &'a IirWidths,
        channel: usize,
        profile: usize,
    ) -> impl Iterator<Item = CoeffWrite> + 'a {
        Coeff::PROGRAM.into_iter().map(move |coeff| {
            coeff_write(widths, channel, profile, coeff, self.value(coeff))
        })
    }
}

/// Per-channel control.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Ctrl {
    pub en_iir: bool,
    pub en_out: bool,
    pub profile: u8,
}

/// Inputs sampled by the filter engine on one tick.
#[derive(Copy, Clone, Debug)]
pub struct FilterInput<'a> {
    /// Start an update of all channels. Sampled while done.
    pub start: bool,
    /// Start writing the staged coefficients. Sampled until writing is done.
    pub start_coeff: bool,
    /// Input samples, indexed by filter input.
    pub adc: &'a [i16],
}

/// The external IIR filter engine.
pub trait Filter {
    /// Stage the coefficient memory writes performed after `start_coeff`.
    fn stage(&mut self, writes: &[CoeffWrite]);

    fn set_ctrl(&mut self, channel: usize, ctrl: Ctrl);

    /// Select the filter input feeding `channel`.
    fn route(&mut self, channel: usize, adc: u8);

    /// Coefficient memory is being written.
    fn loading(&self) -> bool;

    /// All staged coefficients have been written.
    fn done_writing(&self) -> bool;

    /// Idle, the last update has completed.
    fn done(&self) -> bool;

    /// Outputs of the current update are becoming available.
    fn shifting(&self) -> bool;

    /// Output profile of a channel: `[63:48]` output value, the lower bits are carried along.
    fn profile(&self, channel: usize) -> u64;

    fn tick(&mut self, input: &FilterInput<'_>);
}

/// Coefficient translation errors.
#[derive(Copy, Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    /// The integrator term would not contribute.
    #[error("Low integrator gain")]
    Degenerate,
    #[error("High gains")]
    Range,
    #[error("Invalid filter engine widths")]
    Widths,
}

/// Convert continuous time P/PI gains to machine unit coefficients.
///
/// # Args
/// * `kp` - Proportional gain
/// * `ki` - Integral gain in 1/s. Zero for a pure proportional section.
/// * `period` - Sample period in seconds
/// * `widths` - IIR engine widths determining normalization and coefficient range
///
/// # Returns
/// The `(a1, b0, b1)` coefficients, with `|a1|, |b0|, |b1| < 2^(coeff - 1)`.
pub fn coeff_to_mu(
    kp: f64,
    ki: f64,
    period: f64,
    widths: &IirWidths,
) -> Result<Coefficients, Error> {
    widths.validate()?;
    if !(kp.is_finite() && ki.is_finite() && period.is_finite()) {
        return Err(Error::Range);
    }
    let b_norm = (1i64 << (widths.shift + 1)) as f64;
    let kp = kp * b_norm;
    let (a1, b0, b1) = if ki == 0.0 {
        // pure P
        (0, FloatCore::round(kp) as i64, 0)
    } else {
        // I or PI
        let ki = ki * b_norm * period / 2.0;
        let b0 = FloatCore::round(2.0 * kp + ki) as i64;
        let b1 = FloatCore::round(ki - 2.0 * kp) as i64;
        if b1 == -b0 {
            return Err(Error::Degenerate);
        }
        (1i64 << widths.shift, b0, b1)
    };
    let max = widths.coeff_max();
    if [a1, b0, b1].iter().any(|c| c.abs() >= max) {
        return Err(Error::Range);
    }
    Ok(Coefficients {
        a1: a1 as _,
        b0: b0 as _,
        b1: b1 as _,
    })
}
