//! Sampler ADC acquisition interface
//!
//! The acquisition engine converts all channels simultaneously and reads them back over
//! `lanes` parallel serial data lines. It is external to this crate and is driven through
//! [Acquisition].
use serde::{Deserialize, Serialize};

/// Acquisition engine timing and geometry.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdcParams {
    /// Sample width in bits
    pub width: u8,
    pub channels: usize,
    /// Parallel serial data lanes
    pub lanes: u8,
    /// Conversion start pulse width in ticks
    pub t_cnvh: u32,
    /// Conversion time in ticks
    pub t_conv: u32,
    /// Read clock round trip time in ticks
    pub t_rtt: u32,
}

impl AdcParams {
    /// Ticks from acquisition start to samples available.
    ///
    /// `None` without lanes or if the latency does not fit.
    pub fn latency(&self) -> Option<u32> {
        let bits = u32::try_from(self.channels)
            .ok()?
            .checked_mul(self.width as u32)?;
        self.t_cnvh
            .checked_add(self.t_conv)?
            .checked_add(self.t_rtt)?
            .checked_add(bits.checked_div(self.lanes as u32)?)?
            .checked_add(1)
    }
}

/// The external acquisition engine.
pub trait Acquisition {
    /// Idle with a complete set of samples.
    fn done(&self) -> bool;

    /// The last acquired sample of `channel`.
    fn sample(&self, channel: usize) -> i16;

    /// Advance by one tick. `start` is sampled while done.
    fn tick(&mut self, start: bool);
}
