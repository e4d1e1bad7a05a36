//! The two-wire transport as seen by the driver.
//!
//! The driver only needs two primitives from the bus: write a handful of bytes to a device and
//! fetch a response from it. Everything below that (start/stop conditions, clock stretching,
//! acknowledgement handling) belongs to whatever implements [`RegisterLink`].


use core::fmt;

use embedded_hal::i2c::{ErrorKind, I2c, NoAcknowledgeSource};


/// A 7-bit two-wire device address.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cAddress(u8);
impl I2cAddress {
    pub const fn new(address: u8) -> Option<Self> {
        if address & 0b1000_0000 != 0 {
            None
        } else {
            Some(Self(address))
        }
    }

    pub const fn as_u8(&self) -> u8 {
        self.0
    }
}
impl TryFrom<u8> for I2cAddress {
    type Error = ();
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(())
    }
}
impl From<I2cAddress> for u8 {
    fn from(value: I2cAddress) -> Self { value.as_u8() }
}
impl fmt::Display for I2cAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}


/// What went wrong on the bus.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// Nobody acknowledged the device address.
    NackOnAddress,

    /// The device acknowledged its address but refused a data byte.
    NackOnData,

    /// Any other transport failure (arbitration loss, bus error, overrun, ...).
    Other,
}
impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NackOnAddress => write!(f, "address not acknowledged"),
            Self::NackOnData => write!(f, "data not acknowledged"),
            Self::Other => write!(f, "transport error"),
        }
    }
}


/// Byte transport to a register-based device.
///
/// A register read is a [`write`](RegisterLink::write) of the one-byte command code followed by
/// a [`read`](RegisterLink::read) of the response. A register write is a single `write` of the
/// command code followed by the value bytes.
pub trait RegisterLink {
    /// Writes `bytes` to the device at `address` in one transaction.
    fn write(&mut self, address: I2cAddress, bytes: &[u8]) -> Result<(), LinkError>;

    /// Attempts to fill `buffer` with the device's response.
    ///
    /// Returns `Err(nb::Error::WouldBlock)` while the response is not available yet; the caller
    /// decides how long it is willing to keep asking.
    fn read(&mut self, address: I2cAddress, buffer: &mut [u8]) -> nb::Result<(), LinkError>;
}
impl<T: RegisterLink + ?Sized> RegisterLink for &mut T {
    fn write(&mut self, address: I2cAddress, bytes: &[u8]) -> Result<(), LinkError> {
        T::write(self, address, bytes)
    }

    fn read(&mut self, address: I2cAddress, buffer: &mut [u8]) -> nb::Result<(), LinkError> {
        T::read(self, address, buffer)
    }
}


/// Maps an `embedded-hal` error kind onto the driver's transport taxonomy.
pub fn link_error_from_kind(kind: ErrorKind) -> LinkError {
    match kind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address) => LinkError::NackOnAddress,
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data) => LinkError::NackOnData,
        // an unattributed NACK almost always means nobody answered
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown) => LinkError::NackOnAddress,
        _ => LinkError::Other,
    }
}


/// [`RegisterLink`] on top of any blocking `embedded-hal` I2C bus.
///
/// Blocking buses always complete a read, so this link never reports `WouldBlock` and the
/// driver never reports [`Error::Timeout`](crate::Error::Timeout) through it. A bus that gives
/// up waiting on its own hands back some non-NACK [`ErrorKind`], which ends up as
/// [`LinkError::Other`].
#[derive(Debug)]
pub struct I2cLink<I> {
    bus: I,
}
impl<I: I2c> I2cLink<I> {
    pub const fn new(bus: I) -> Self {
        Self { bus }
    }

    pub fn release(self) -> I { self.bus }
}
impl<I: I2c> RegisterLink for I2cLink<I> {
    fn write(&mut self, address: I2cAddress, bytes: &[u8]) -> Result<(), LinkError> {
        self.bus.write(address.as_u8(), bytes)
            .map_err(|e| link_error_from_kind(embedded_hal::i2c::Error::kind(&e)))
    }

    fn read(&mut self, address: I2cAddress, buffer: &mut [u8]) -> nb::Result<(), LinkError> {
        self.bus.read(address.as_u8(), buffer)
            .map_err(|e| nb::Error::Other(link_error_from_kind(embedded_hal::i2c::Error::kind(&e))))
    }
}


#[cfg(test)]
mod tests {
    use super::{I2cAddress, I2cLink, LinkError, RegisterLink, link_error_from_kind};
    use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
    use embedded_hal_mock::eh1::i2c::{Mock, Transaction};

    const ADDR: I2cAddress = I2cAddress::new(0x44).unwrap();

    #[test]
    fn test_address_range() {
        assert_eq!(I2cAddress::new(0x44).map(|a| a.as_u8()), Some(0x44));
        assert_eq!(I2cAddress::new(0x7F).map(|a| a.as_u8()), Some(0x7F));
        assert_eq!(I2cAddress::new(0x80), None);
        assert_eq!(I2cAddress::try_from(0xFFu8), Err(()));
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            link_error_from_kind(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)),
            LinkError::NackOnAddress,
        );
        assert_eq!(
            link_error_from_kind(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)),
            LinkError::NackOnData,
        );
        assert_eq!(link_error_from_kind(ErrorKind::ArbitrationLoss), LinkError::Other);
        assert_eq!(link_error_from_kind(ErrorKind::Bus), LinkError::Other);
    }

    #[test]
    fn test_i2c_link_passes_bytes_through() {
        let expectations = [
            Transaction::write(0x44, vec![0x11]),
            Transaction::read(0x44, vec![0x08, 0x21]),
        ];
        let mut link = I2cLink::new(Mock::new(&expectations));

        link.write(ADDR, &[0x11]).unwrap();
        let mut buf = [0u8; 2];
        link.read(ADDR, &mut buf).unwrap();
        assert_eq!(buf, [0x08, 0x21]);

        link.release().done();
    }

    #[test]
    fn test_i2c_link_maps_nack() {
        let expectations = [
            Transaction::write(0x44, vec![0x0A])
                .with_error(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)),
            Transaction::read(0x44, vec![0x00, 0x00])
                .with_error(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)),
        ];
        let mut link = I2cLink::new(Mock::new(&expectations));

        assert_eq!(link.write(ADDR, &[0x0A]), Err(LinkError::NackOnData));
        let mut buf = [0u8; 2];
        assert_eq!(
            link.read(ADDR, &mut buf),
            Err(nb::Error::Other(LinkError::NackOnAddress)),
        );

        link.release().done();
    }
}
