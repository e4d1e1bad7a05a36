//! Driver for the Texas Instruments OPT4048 four-channel colour and ambient light sensor.
//!
//! The sensor digitises three colour-filtered photodiodes (X, Y, Z) and one wide-band channel.
//! [`Opt4048`] reads the raw channel results over any [`RegisterLink`], checks their CRC and
//! turns them into CIE XYZ, xy chromaticity, illuminance or display RGB.
//!
//! ```ignore
//! let link = I2cLink::new(i2c);
//! let mut sensor = Opt4048::new(link, delay, DEFAULT_ADDRESS);
//! sensor.write_config_a(ConfigA::default())?;
//! let xyz = sensor.read_xyz()?;
//! ```
#![cfg_attr(not(test), no_std)]


mod channel;
mod color;
mod device;
mod error;
mod link;
mod register;
mod value;


pub use crate::channel::ChannelReading;
pub use crate::color::{
    ADC_TO_XYZ, AdcQuad, Chromaticity, Companding, LUX_PER_COUNT, Rgb, RgbConversion, WhitePoint,
    Xyz, XyzToRgbMatrix, lux_from_adc,
};
pub use crate::device::{Opt4048, POLL_ATTEMPTS, POLL_INTERVAL_US};
pub use crate::error::{CrcMismatch, DomainError, Error};
pub use crate::link::{I2cAddress, I2cLink, LinkError, RegisterLink, link_error_from_kind};
pub use crate::register::{Channel, ConfigA, ConfigB, Limit, Register};
pub use crate::value::{ChannelValue, ThresholdValue};


/// Address with the ADDR pin tied to ground.
pub const DEFAULT_ADDRESS: I2cAddress = match I2cAddress::new(0x44) {
    Some(address) => address,
    None => panic!("default address out of range"),
};
