#![no_std]

use arbitrary_int::{u24, u3};
use bitbybit::{bitenum, bitfield};

/// Target register selected by the two mode bits `M1 M0`.
#[bitenum(u2, exhaustive = true)]
#[derive(PartialEq, Debug)]
pub enum Mode {
    /// Special function, the address bits select the function.
    Special = 0b00,
    Gain = 0b01,
    Offset = 0b10,
    Data = 0b11,
}

/// Special function codes, placed in the six address bits.
#[derive(Copy, Clone, PartialEq, Debug)]
#[repr(u8)]
pub enum Special {
    Nop = 0b000000,
    Control = 0b000001,
    Ofs0 = 0b000010,
    Ofs1 = 0b000011,
    Readback = 0b000101,
}

/// One 24 bit serial input word, shifted out MSB first.
#[bitfield(u24, default = 0)]
#[derive(PartialEq, Debug)]
pub struct Word {
    #[bits(0..=15, rw)]
    data: u16,
    #[bits(16..=18, rw)]
    channel: u3,
    #[bits(19..=21, rw)]
    group: u3,
    #[bits(22..=23, rw)]
    mode: Mode,
}

/// Group address of the first group of eight channels.
///
/// `0b000` would address all groups at once.
pub const GROUP0: u3 = u3::new(0b001);

/// Offset DAC code that centers the output span.
pub const OFS0_DEFAULT: u16 = 0x2000;

impl Word {
    /// Input data register write for `channel` in `group`.
    pub fn dac(group: u3, channel: u3, data: u16) -> Self {
        Self::new_with_raw_value(u24::new(0))
            .with_mode(Mode::Data)
            .with_group(group)
            .with_channel(channel)
            .with_data(data)
    }

    /// Special function write.
    pub fn special(function: Special, data: u16) -> Self {
        Self::new_with_raw_value(u24::new(
            ((function as u32) << 16) | data as u32,
        ))
    }

    /// The offset register write performed once after power-up.
    pub fn ofs0(offset: u16) -> Self {
        // OFS0 is 14 bits wide
        Self::special(Special::Ofs0, offset & 0x3fff)
    }
}

/// Encode a signed code as offset binary for the bipolar output span.
pub fn offset_binary(code: i16) -> u16 {
    code.wrapping_add(i16::MIN) as u16
}

/// Inverse of [offset_binary].
pub fn signed(code: u16) -> i16 {
    (code as i16).wrapping_sub(i16::MIN)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn init_word() {
        assert_eq!(Word::ofs0(OFS0_DEFAULT).raw_value().value(), 0x22000);
        assert_eq!(Word::ofs0(OFS0_DEFAULT).mode(), Mode::Special);
    }

    #[test]
    fn data_word() {
        let w = Word::dac(GROUP0, u3::new(5), 0x1234);
        assert_eq!(w.raw_value().value(), 0xc0_0000 | 0x0d_0000 | 0x1234);
        assert_eq!(w.channel(), u3::new(5));
        assert_eq!(w.group(), GROUP0);
        assert_eq!(w.mode(), Mode::Data);
        assert_eq!(w.data(), 0x1234);
    }

    #[test]
    fn offset() {
        assert_eq!(offset_binary(0), 0x8000);
        assert_eq!(offset_binary(i16::MIN), 0);
        assert_eq!(offset_binary(-1), 0x7fff);
        for code in [i16::MIN, -1, 0, 1, 0x90cb_u16 as i16, i16::MAX] {
            assert_eq!(signed(offset_binary(code)), code);
        }
    }
}
