//! Reassembly and integrity check of a channel result.
//!
//! A channel is spread over two registers:
//!
//! ```plain
//!          15    12 11                     0
//! MSB reg │ E[3:0] │       R[19:8]          │
//!          15              8 7     4 3     0
//! LSB reg │     R[7:0]      │ C[3:0] │ CRC   │
//! ```
//!
//! `E` is the exponent, `R` the mantissa and `C` a sample counter that the device increments
//! with every conversion.


use crate::error::CrcMismatch;
use crate::value::ChannelValue;


/// Which bits of exponent, mantissa and counter feed one CRC output bit.
struct CrcTap {
    stride: usize,
    offset: usize,
    include_exponent_and_counter: bool,
}

/// One entry per CRC output bit, least significant first.
const CRC_TAPS: [CrcTap; 4] = [
    CrcTap { stride: 2, offset: 0, include_exponent_and_counter: true },
    CrcTap { stride: 2, offset: 1, include_exponent_and_counter: true },
    CrcTap { stride: 4, offset: 3, include_exponent_and_counter: true },
    CrcTap { stride: 8, offset: 3, include_exponent_and_counter: false },
];


fn parity(value: u32, width: usize, stride: usize, offset: usize) -> u8 {
    let mut parity = 0;
    for bit in (offset..width).step_by(stride) {
        parity ^= ((value >> bit) & 1) as u8;
    }
    parity
}


/// A fully decoded channel result.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelReading {
    value: ChannelValue,
    counter: u8,
    crc: u8,
}
impl ChannelReading {
    /// Decodes the contents of a channel's MSB and LSB registers.
    pub fn from_words(msb: u16, lsb: u16) -> Self {
        let exponent = (msb >> 12) as u8;
        let mantissa_high = u32::from(msb & 0x0FFF);
        let mantissa_low = u32::from(lsb >> 8);
        let mantissa = (mantissa_high << 8) | mantissa_low;

        let value = ChannelValue::new(mantissa, exponent)
            .unwrap_or_default(); // unreachable: the masks above keep both fields in range
        Self {
            value,
            counter: ((lsb >> 4) & 0x0F) as u8,
            crc: (lsb & 0x0F) as u8,
        }
    }

    pub const fn value(&self) -> ChannelValue { self.value }
    pub const fn mantissa(&self) -> u32 { self.value.mantissa() }
    pub const fn exponent(&self) -> u8 { self.value.exponent() }
    pub const fn counter(&self) -> u8 { self.counter }

    /// The CRC as transmitted by the device.
    pub const fn crc(&self) -> u8 { self.crc }

    pub fn to_adc(&self) -> f32 {
        self.value.to_adc()
    }

    /// Recomputes the 4-bit CRC over exponent, mantissa and counter.
    pub fn compute_crc(&self) -> u8 {
        let exponent = u32::from(self.exponent());
        let mantissa = self.mantissa();
        let counter = u32::from(self.counter);

        let mut crc = 0;
        for (bit, tap) in CRC_TAPS.iter().enumerate() {
            let mut value = parity(mantissa, 20, tap.stride, tap.offset);
            if tap.include_exponent_and_counter {
                value ^= parity(exponent, 4, tap.stride, tap.offset);
                value ^= parity(counter, 4, tap.stride, tap.offset);
            }
            crc |= value << bit;
        }
        crc
    }

    pub fn crc_ok(&self) -> bool {
        self.compute_crc() == self.crc
    }

    /// Like [`crc_ok`](Self::crc_ok), but reports both values on mismatch.
    pub fn crc_check(&self) -> Result<(), CrcMismatch> {
        let computed = self.compute_crc();
        if computed == self.crc {
            Ok(())
        } else {
            Err(CrcMismatch { received: self.crc, computed })
        }
    }
}
