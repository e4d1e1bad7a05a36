use core::fmt;

use crate::link::LinkError;


/// Failures of the colour maths that are not transport problems.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DomainError {
    /// X + Y + Z is zero, so there is no chromaticity.
    ZeroTristimulus,

    /// The chromaticity came out infinite or NaN (non-finite input).
    NotFinite,
}
impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroTristimulus => write!(f, "tristimulus sum is zero"),
            Self::NotFinite => write!(f, "result is not finite"),
        }
    }
}


/// Received and recomputed CRC of a channel reading disagree.
///
/// This never aborts a read; the decoded value is still handed out.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CrcMismatch {
    pub received: u8,
    pub computed: u8,
}
impl fmt::Display for CrcMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CRC mismatch (received 0x{:X}, computed 0x{:X})", self.received, self.computed)
    }
}


#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The device never delivered its response within the polling bound.
    Timeout,

    /// The device did not acknowledge its address.
    NackOnAddress,

    /// The device did not acknowledge a data byte.
    NackOnData,

    /// Some other transport failure.
    Transport,

    /// The read succeeded but the conversion has no defined result.
    Domain(DomainError),
}
impl Error {
    /// Whether this error came from the bus rather than the maths.
    pub const fn is_transport(&self) -> bool {
        !matches!(self, Self::Domain(_))
    }
}
impl From<LinkError> for Error {
    fn from(value: LinkError) -> Self {
        match value {
            LinkError::NackOnAddress => Self::NackOnAddress,
            LinkError::NackOnData => Self::NackOnData,
            LinkError::Other => Self::Transport,
        }
    }
}
impl From<DomainError> for Error {
    fn from(value: DomainError) -> Self {
        Self::Domain(value)
    }
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out waiting for the device"),
            Self::NackOnAddress => write!(f, "address not acknowledged"),
            Self::NackOnData => write!(f, "data not acknowledged"),
            Self::Transport => write!(f, "transport error"),
            Self::Domain(e) => write!(f, "{}", e),
        }
    }
}
impl core::error::Error for Error {}
