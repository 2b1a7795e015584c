#![cfg_attr(not(test), no_std)]

pub mod adc;
pub mod dac;
pub mod design_parameters;
pub mod iir;
pub mod pgia;
pub mod servo;
pub mod settings;
pub mod spi;

#[cfg(test)]
mod testing;

pub use servo::{Servo, Stall, TimingBudget};
pub use settings::{Config, Settings};
