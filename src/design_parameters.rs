/// The system clock frequency driving every state machine. One tick is 8 ns.
pub const SYS_CLK_HZ: u32 = 125_000_000;

/// Duration measured in system clock ticks.
pub type Ticks = fugit::TimerDurationU32<SYS_CLK_HZ>;

/// The number of channels of one Sampler and one Zotino DAC group.
/// The AD5372 word has a 3 bit channel address.
pub const MAX_CHANNELS: usize = 8;

/// Number of system clock ticks the DAC SYNC line is kept high between two words, in excess of
/// the engine's start tick. The AD5372 requires SYNC high for at least 4 ticks (32 ns).
pub const SYNC_HIGH_TICKS: u32 = 3;

/// Delay after reset before the servo issues its first request. This allows all the signals to
/// settle to their initial values.
pub const START_DELAY: u32 = 100;

// The DAC output needs about 34 us to settle (4256 ticks at 8 ns). The servo cycle is never
// shorter than that.
pub const DAC_SETTLE_TICKS: u32 = 4256;

// Coefficient fixed point format.
// The IIR output is shifted down by `COEFF_SHIFT` bits after accumulation.
pub const COEFF_SHIFT: u8 = 11;
pub const COEFF_WIDTH: u8 = 18;

/// PGIA gain codes of all channels after power-up: `G10` (+/- 1 V Sampler input range).
pub const PGIA_GAINS: u16 = 0x5555;
