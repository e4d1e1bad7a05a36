//! Register map of the OPT4048.
//!
//! Every register is 16 bits wide and travels most significant byte first.


use from_to_repr::from_to_other;


#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u8, derive_compare = "as_int")]
pub enum Register {
    ResultCh0Msb = 0x00,
    ResultCh0Lsb = 0x01,
    ResultCh1Msb = 0x02,
    ResultCh1Lsb = 0x03,
    ResultCh2Msb = 0x04,
    ResultCh2Lsb = 0x05,
    ResultCh3Msb = 0x06,
    ResultCh3Lsb = 0x07,
    ThresholdLow = 0x08,
    ThresholdHigh = 0x09,
    ConfigA = 0x0A,
    ConfigB = 0x0B,
    DeviceId = 0x11,
    Other(u8),
}


/// One of the four light-sensing channels.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    Ch0,
    Ch1,
    Ch2,
    Ch3,
}
impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Ch0, Channel::Ch1, Channel::Ch2, Channel::Ch3];

    /// Returns the channel with the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not in `0..=3`. Use [`Channel::try_from`] for untrusted input.
    pub const fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Ch0,
            1 => Self::Ch1,
            2 => Self::Ch2,
            3 => Self::Ch3,
            _ => panic!("channel index out of range"),
        }
    }

    pub const fn index(&self) -> usize {
        match self {
            Self::Ch0 => 0,
            Self::Ch1 => 1,
            Self::Ch2 => 2,
            Self::Ch3 => 3,
        }
    }

    /// The register holding the exponent and the upper mantissa bits.
    pub fn msb_register(&self) -> Register {
        Register::from_base_type((self.index() as u8) * 2)
    }

    /// The register holding the lower mantissa bits, the counter and the CRC.
    pub fn lsb_register(&self) -> Register {
        Register::from_base_type((self.index() as u8) * 2 + 1)
    }
}
impl TryFrom<u8> for Channel {
    type Error = ();
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0..=3 => Ok(Self::from_index(value.into())),
            _ => Err(()),
        }
    }
}


/// Which of the two interrupt thresholds.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Limit {
    Low,
    High,
}
impl Limit {
    pub const fn register(&self) -> Register {
        match self {
            Self::Low => Register::ThresholdLow,
            Self::High => Register::ThresholdHigh,
        }
    }
}


/// Raw contents of configuration register A (0x0A).
///
/// The meaning of the individual fields is left to the caller; the driver only makes sure the
/// reserved bit 14 is written as zero. Bit 15 (quick wake-up) belongs to the caller.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigA(u16);
impl ConfigA {
    const FIXED_ZERO_MASK: u16 = 0b0100_0000_0000_0000;

    pub const fn from_raw(raw: u16) -> Self { Self(raw) }
    pub const fn raw(&self) -> u16 { self.0 }

    /// The value actually sent to the device.
    pub const fn to_register(&self) -> u16 {
        self.0 & !Self::FIXED_ZERO_MASK
    }
}
impl Default for ConfigA {
    fn default() -> Self {
        // power-on value
        Self(0x3208)
    }
}


/// Raw contents of configuration register B (0x0B).
///
/// Bits 15:8 must be written as 0x80 and bit 1 as zero; the driver enforces both.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigB(u16);
impl ConfigB {
    const FIXED_ZERO_MASK: u16 = 0b0000_0000_0000_0010;
    const FIXED_FIELD_MASK: u16 = 0b1111_1111_0000_0000;
    const FIXED_FIELD_VALUE: u16 = 0x80;

    pub const fn from_raw(raw: u16) -> Self { Self(raw) }
    pub const fn raw(&self) -> u16 { self.0 }

    /// The value actually sent to the device.
    pub const fn to_register(&self) -> u16 {
        (self.0 & !(Self::FIXED_ZERO_MASK | Self::FIXED_FIELD_MASK))
            | (Self::FIXED_FIELD_VALUE << 8)
    }
}
impl Default for ConfigB {
    fn default() -> Self {
        // power-on value
        Self(0x8011)
    }
}
