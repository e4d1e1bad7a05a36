//! The sensor's floating-point formats.
//!
//! Both formats store an unsigned mantissa and a 4-bit exponent without bias; the magnitude is
//! `mantissa << exponent`. Channel results carry a 20-bit mantissa, thresholds a 12-bit one.


const EXPONENT_MAX: u8 = 0x0F;


/// A channel result: 20-bit mantissa, 4-bit exponent.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelValue {
    mantissa: u32,
    exponent: u8,
}
impl ChannelValue {
    pub const MANTISSA_BITS: u32 = 20;
    pub const MANTISSA_MAX: u32 = (1 << Self::MANTISSA_BITS) - 1;

    pub const fn new(mantissa: u32, exponent: u8) -> Option<Self> {
        if mantissa > Self::MANTISSA_MAX || exponent > EXPONENT_MAX {
            None
        } else {
            Some(Self { mantissa, exponent })
        }
    }

    pub const fn mantissa(&self) -> u32 { self.mantissa }
    pub const fn exponent(&self) -> u8 { self.exponent }

    /// The magnitude in ADC counts, `mantissa × 2^exponent`.
    pub fn to_adc(&self) -> f32 {
        // at most 20 significant bits, so the conversion to f32 is exact
        (u64::from(self.mantissa) << self.exponent) as f32
    }

    /// Encodes an ADC count, truncating bits that do not fit the mantissa.
    ///
    /// Negative and NaN inputs encode as zero; values beyond the format saturate.
    pub fn from_adc(adc: f32) -> Self {
        let (mantissa, exponent) = encode(adc, Self::MANTISSA_BITS);
        Self { mantissa, exponent }
    }
}


/// A threshold: 12-bit mantissa, 4-bit exponent, packed into a single register.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThresholdValue {
    mantissa: u16,
    exponent: u8,
}
impl ThresholdValue {
    pub const MANTISSA_BITS: u32 = 12;
    pub const MANTISSA_MAX: u16 = (1 << Self::MANTISSA_BITS) - 1;

    pub const fn new(mantissa: u16, exponent: u8) -> Option<Self> {
        if mantissa > Self::MANTISSA_MAX || exponent > EXPONENT_MAX {
            None
        } else {
            Some(Self { mantissa, exponent })
        }
    }

    pub const fn mantissa(&self) -> u16 { self.mantissa }
    pub const fn exponent(&self) -> u8 { self.exponent }

    /// Splits a threshold register: exponent in bits 15:12, mantissa in bits 11:0.
    pub const fn from_register(raw: u16) -> Self {
        Self {
            mantissa: raw & Self::MANTISSA_MAX,
            exponent: (raw >> Self::MANTISSA_BITS) as u8,
        }
    }

    pub const fn to_register(&self) -> u16 {
        ((self.exponent as u16) << Self::MANTISSA_BITS) | self.mantissa
    }

    pub fn to_adc(&self) -> f32 {
        (u64::from(self.mantissa) << self.exponent) as f32
    }

    pub fn from_adc(adc: f32) -> Self {
        let (mantissa, exponent) = encode(adc, Self::MANTISSA_BITS);
        Self { mantissa: mantissa as u16, exponent }
    }
}


/// Picks the smallest exponent whose shifted value fits into `mantissa_bits`.
fn encode(adc: f32, mantissa_bits: u32) -> (u32, u8) {
    let mantissa_max = (1u64 << mantissa_bits) - 1;
    let largest = mantissa_max << EXPONENT_MAX;

    // `!(adc > 0.0)` also catches NaN
    if !(adc > 0.0) {
        return (0, 0);
    }
    if adc >= largest as f32 {
        return (mantissa_max as u32, EXPONENT_MAX);
    }

    let counts = adc as u64;
    let mut exponent = 0u8;
    while (counts >> exponent) > mantissa_max {
        exponent += 1;
    }
    ((counts >> exponent) as u32, exponent)
}
