//! The driver proper.


use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::channel::ChannelReading;
use crate::color::{AdcQuad, Chromaticity, Rgb, RgbConversion, Xyz, lux_from_adc};
use crate::error::Error;
use crate::link::{I2cAddress, RegisterLink};
use crate::register::{Channel, ConfigA, ConfigB, Limit, Register};
use crate::value::ThresholdValue;


/// How often the response is polled before giving up.
pub const POLL_ATTEMPTS: u32 = 250;

/// Pause between two polls of the response.
pub const POLL_INTERVAL_US: u32 = 10_000;


/// OPT4048 on a [`RegisterLink`].
///
/// Every operation takes `&mut self`, so there is never more than one transaction in flight and
/// the two halves of a channel result are always read back to back. Share the driver between
/// contexts by wrapping it, e.g. in a `critical_section::Mutex`.
#[derive(Debug)]
pub struct Opt4048<L, D> {
    link: L,
    delay: D,
    address: I2cAddress,
}
impl<L: RegisterLink, D: DelayNs> Opt4048<L, D> {
    pub const fn new(link: L, delay: D, address: I2cAddress) -> Self {
        Self { link, delay, address }
    }

    pub const fn address(&self) -> I2cAddress { self.address }

    /// Gives back the link and the delay provider.
    pub fn release(self) -> (L, D) {
        (self.link, self.delay)
    }

    /// Reads a register: command byte out, two bytes back.
    pub fn read_register(&mut self, register: Register) -> Result<u16, Error> {
        let command = register.to_base_type();
        self.link.write(self.address, &[command])?;

        let mut buf = [0u8; 2];
        let mut attempts = 0;
        loop {
            match self.link.read(self.address, &mut buf) {
                Ok(()) => break,
                Err(nb::Error::Other(e)) => return Err(e.into()),
                Err(nb::Error::WouldBlock) => {
                    attempts += 1;
                    if attempts >= POLL_ATTEMPTS {
                        warn!("no response to register 0x{:02X} after {} polls", command, attempts);
                        return Err(Error::Timeout);
                    }
                    self.delay.delay_us(POLL_INTERVAL_US);
                },
            }
        }

        let value = u16::from_be_bytes(buf);
        debug!("read register 0x{:02X} = 0x{:04X}", command, value);
        Ok(value)
    }

    /// Writes a register: command byte and both value bytes in one transaction.
    pub fn write_register(&mut self, register: Register, value: u16) -> Result<(), Error> {
        let command = register.to_base_type();
        let [high, low] = value.to_be_bytes();
        debug!("write register 0x{:02X} = 0x{:04X}", command, value);
        self.link.write(self.address, &[command, high, low])?;
        Ok(())
    }

    pub fn read_device_id(&mut self) -> Result<u16, Error> {
        self.read_register(Register::DeviceId)
    }

    /// Reads and reassembles one channel.
    ///
    /// A CRC mismatch does not fail the read; check [`ChannelReading::crc_ok`].
    pub fn read_channel(&mut self, channel: Channel) -> Result<ChannelReading, Error> {
        let msb = self.read_register(channel.msb_register())?;
        let lsb = self.read_register(channel.lsb_register())?;

        let reading = ChannelReading::from_words(msb, lsb);
        if let Err(mismatch) = reading.crc_check() {
            debug!("channel {}: {}", channel.index(), mismatch);
        }
        Ok(reading)
    }

    /// Reads channels 0 to 3 in order, stopping at the first failure.
    pub fn read_all_channels(&mut self) -> Result<[ChannelReading; 4], Error> {
        let mut readings = [ChannelReading::default(); 4];
        for (channel, slot) in Channel::ALL.into_iter().zip(readings.iter_mut()) {
            *slot = self.read_channel(channel)?;
        }
        Ok(readings)
    }

    pub fn read_adc(&mut self) -> Result<AdcQuad, Error> {
        let readings = self.read_all_channels()?;
        Ok(AdcQuad::from_readings(&readings))
    }

    pub fn read_xyz(&mut self) -> Result<Xyz, Error> {
        Ok(self.read_adc()?.to_xyz())
    }

    /// CIE xy; a dark scene (X + Y + Z = 0) ends up as [`Error::Domain`].
    pub fn read_chromaticity(&mut self) -> Result<Chromaticity, Error> {
        Ok(self.read_xyz()?.chromaticity()?)
    }

    /// Illuminance from channel 1 only; cheaper than [`read_xyz`](Self::read_xyz).
    pub fn read_lux(&mut self) -> Result<f32, Error> {
        let reading = self.read_channel(Channel::Ch1)?;
        Ok(lux_from_adc(reading.to_adc()))
    }

    pub fn read_rgb(&mut self, conversion: &RgbConversion) -> Result<Rgb, Error> {
        Ok(self.read_xyz()?.to_rgb(conversion))
    }

    pub fn read_limit(&mut self, limit: Limit) -> Result<ThresholdValue, Error> {
        let raw = self.read_register(limit.register())?;
        Ok(ThresholdValue::from_register(raw))
    }

    pub fn write_limit(&mut self, limit: Limit, threshold: ThresholdValue) -> Result<(), Error> {
        self.write_register(limit.register(), threshold.to_register())
    }

    pub fn read_low_limit(&mut self) -> Result<ThresholdValue, Error> {
        self.read_limit(Limit::Low)
    }

    pub fn read_high_limit(&mut self) -> Result<ThresholdValue, Error> {
        self.read_limit(Limit::High)
    }

    pub fn write_low_limit(&mut self, threshold: ThresholdValue) -> Result<(), Error> {
        self.write_limit(Limit::Low, threshold)
    }

    pub fn write_high_limit(&mut self, threshold: ThresholdValue) -> Result<(), Error> {
        self.write_limit(Limit::High, threshold)
    }

    pub fn read_config_a(&mut self) -> Result<ConfigA, Error> {
        Ok(ConfigA::from_raw(self.read_register(Register::ConfigA)?))
    }

    pub fn read_config_b(&mut self) -> Result<ConfigB, Error> {
        Ok(ConfigB::from_raw(self.read_register(Register::ConfigB)?))
    }

    /// Writes configuration register A with its reserved bit cleared.
    pub fn write_config_a(&mut self, config: ConfigA) -> Result<(), Error> {
        self.write_register(Register::ConfigA, config.to_register())
    }

    /// Writes configuration register B with its fixed bits in place.
    pub fn write_config_b(&mut self, config: ConfigB) -> Result<(), Error> {
        self.write_register(Register::ConfigB, config.to_register())
    }
}


#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::vec::Vec;

    use embedded_hal_mock::eh1::delay::NoopDelay;

    use super::{Opt4048, POLL_ATTEMPTS};
    use crate::color::{LUX_PER_COUNT, RgbConversion};
    use crate::error::{DomainError, Error};
    use crate::link::{I2cAddress, LinkError, RegisterLink};
    use crate::register::{Channel, ConfigA, ConfigB, Limit};
    use crate::value::ThresholdValue;

    const ADDR: I2cAddress = I2cAddress::new(0x44).unwrap();

    /// What the fake device answers to a read.
    #[derive(Clone, Copy, Debug)]
    enum Response {
        Word(u16),
        Fail(LinkError),
        NeverReady,
        /// Not ready for the given number of polls, then the word.
        Slow(u32, u16),
    }

    /// Scripted device: one queued response per register read.
    #[derive(Debug, Default)]
    struct FakeLink {
        responses: VecDeque<Response>,
        written: Vec<Vec<u8>>,
        write_error: Option<LinkError>,
        polls: u32,
    }
    impl FakeLink {
        fn answering(responses: &[Response]) -> Self {
            Self {
                responses: responses.iter().copied().collect(),
                ..Self::default()
            }
        }

        fn words(words: &[u16]) -> Self {
            let responses: Vec<Response> = words.iter().map(|w| Response::Word(*w)).collect();
            Self::answering(&responses)
        }

        /// Command bytes of all register reads, in order.
        fn commands(&self) -> Vec<u8> {
            self.written.iter()
                .filter(|w| w.len() == 1)
                .map(|w| w[0])
                .collect()
        }
    }
    impl RegisterLink for FakeLink {
        fn write(&mut self, address: I2cAddress, bytes: &[u8]) -> Result<(), LinkError> {
            assert_eq!(address, ADDR);
            if let Some(e) = self.write_error {
                return Err(e);
            }
            self.written.push(bytes.to_vec());
            Ok(())
        }

        fn read(&mut self, address: I2cAddress, buffer: &mut [u8]) -> nb::Result<(), LinkError> {
            assert_eq!(address, ADDR);
            self.polls += 1;
            match self.responses.front().copied().expect("unexpected read") {
                Response::Word(word) => {
                    self.responses.pop_front();
                    buffer.copy_from_slice(&word.to_be_bytes());
                    Ok(())
                },
                Response::Fail(e) => {
                    self.responses.pop_front();
                    Err(nb::Error::Other(e))
                },
                Response::NeverReady => Err(nb::Error::WouldBlock),
                Response::Slow(0, word) => {
                    self.responses.pop_front();
                    buffer.copy_from_slice(&word.to_be_bytes());
                    Ok(())
                },
                Response::Slow(remaining, word) => {
                    self.responses[0] = Response::Slow(remaining - 1, word);
                    Err(nb::Error::WouldBlock)
                },
            }
        }
    }

    fn driver(link: FakeLink) -> Opt4048<FakeLink, NoopDelay> {
        Opt4048::new(link, NoopDelay::new(), ADDR)
    }

    fn assert_close(actual: f32, expected: f32, tolerance: f32) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "{} is not within {} of {}", actual, tolerance, expected,
        );
    }

    #[test]
    fn test_read_channel() {
        let mut sensor = driver(FakeLink::words(&[0x3208, 0x45FA]));
        let reading = sensor.read_channel(Channel::Ch2).unwrap();
        assert_eq!(reading.exponent(), 3);
        assert_eq!(reading.mantissa(), 0x20845);
        assert_eq!(reading.counter(), 0xF);
        assert!(reading.crc_ok());

        let (link, _) = sensor.release();
        assert_eq!(link.commands(), [0x04, 0x05]);
    }

    #[test]
    fn test_read_channel_crc_mismatch_is_soft() {
        let mut sensor = driver(FakeLink::words(&[0x3208, 0x45F0]));
        let reading = sensor.read_channel(Channel::Ch0).unwrap();
        assert!(!reading.crc_ok());
        assert_eq!(reading.mantissa(), 0x20845);
    }

    #[test]
    fn test_read_channel_first_half_fails() {
        let mut sensor = driver(FakeLink::answering(&[
            Response::Fail(LinkError::NackOnAddress),
            Response::Word(0x45F0),
        ]));
        assert_eq!(sensor.read_channel(Channel::Ch1), Err(Error::NackOnAddress));

        // the second half is never requested
        let (link, _) = sensor.release();
        assert_eq!(link.commands(), [0x02]);
        assert_eq!(link.responses.len(), 1);
    }

    #[test]
    fn test_read_channel_second_half_fails() {
        let mut sensor = driver(FakeLink::answering(&[
            Response::Word(0x3208),
            Response::Fail(LinkError::NackOnData),
        ]));
        assert_eq!(sensor.read_channel(Channel::Ch3), Err(Error::NackOnData));
    }

    #[test]
    fn test_command_write_fails() {
        let mut link = FakeLink::words(&[0x0821]);
        link.write_error = Some(LinkError::Other);
        let mut sensor = driver(link);
        assert_eq!(sensor.read_device_id(), Err(Error::Transport));
    }

    #[test]
    fn test_read_device_id() {
        let mut sensor = driver(FakeLink::words(&[0x0821]));
        assert_eq!(sensor.read_device_id(), Ok(0x0821));
        let (link, _) = sensor.release();
        assert_eq!(link.commands(), [0x11]);
    }

    #[test]
    fn test_read_all_channels_short_circuits() {
        let mut sensor = driver(FakeLink::answering(&[
            Response::Word(0x1000), Response::Word(0x0100), // ch0
            Response::Word(0x1000), Response::Word(0x0100), // ch1
            Response::Word(0x1000), Response::Fail(LinkError::Other), // ch2
            Response::Word(0x1000), Response::Word(0x0100), // ch3, would succeed
        ]));
        assert_eq!(sensor.read_all_channels(), Err(Error::Transport));

        let (link, _) = sensor.release();
        assert_eq!(link.commands(), [0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(link.responses.len(), 2);
    }

    #[test]
    fn test_read_adc() {
        let mut sensor = driver(FakeLink::words(&[
            0x0000, 0x0100, // 1 << 0
            0xF000, 0x0100, // 1 << 15
            0x0FFF, 0xFF00, // 0xFFFFF << 0
            0x3208, 0x45F0, // 0x20845 << 3
        ]));
        let adc = sensor.read_adc().unwrap();
        assert_eq!(adc.0, [1.0, 32768.0, 1048575.0, 1065512.0]);
        assert_eq!(adc.channel(Channel::Ch1), 32768.0);
    }

    #[test]
    fn test_read_adc_fails_atomically() {
        let mut sensor = driver(FakeLink::answering(&[
            Response::Word(0x0000), Response::Word(0x0100),
            Response::Fail(LinkError::NackOnData),
        ]));
        assert_eq!(sensor.read_adc(), Err(Error::NackOnData));
    }

    #[test]
    fn test_read_xyz_and_lux() {
        // only channel 1 lit: 0x1000 << 0
        let words = [0x0000, 0x0000, 0x0010, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000];
        let mut sensor = driver(FakeLink::words(&words));
        let xyz = sensor.read_xyz().unwrap();
        assert_close(xyz.x, 4096.0 * 4.07467441e-5, 1e-6);
        assert_close(xyz.y, 4096.0 * 1.98958202e-4, 1e-6);
        assert_close(xyz.z, 4096.0 * -1.58848115e-5, 1e-6);

        let mut sensor = driver(FakeLink::words(&[0x0010, 0x0000]));
        let lux = sensor.read_lux().unwrap();
        assert_eq!(lux, xyz.lux);
        assert_close(lux, 4096.0 * LUX_PER_COUNT, 1e-6);

        let (link, _) = sensor.release();
        assert_eq!(link.commands(), [0x02, 0x03]);
    }

    #[test]
    fn test_read_chromaticity_dark() {
        let mut sensor = driver(FakeLink::words(&[0; 8]));
        assert_eq!(
            sensor.read_chromaticity(),
            Err(Error::Domain(DomainError::ZeroTristimulus)),
        );
        assert!(!Error::Domain(DomainError::ZeroTristimulus).is_transport());
    }

    #[test]
    fn test_read_chromaticity() {
        let words = [0x0010, 0x0000, 0x0010, 0x0000, 0x0010, 0x0000, 0x0000, 0x0000];
        let mut sensor = driver(FakeLink::words(&words));
        let xy = sensor.read_chromaticity().unwrap();

        let quad = crate::color::AdcQuad::new([4096.0, 4096.0, 4096.0, 0.0]);
        let expected = quad.to_xyz().chromaticity().unwrap();
        assert_eq!(xy, expected);
    }

    #[test]
    fn test_read_rgb_propagates_transport_error() {
        let mut sensor = driver(FakeLink::answering(&[Response::Fail(LinkError::NackOnAddress)]));
        assert_eq!(
            sensor.read_rgb(&RgbConversion::default()).map(|_| ()),
            Err(Error::NackOnAddress),
        );
    }

    #[test]
    fn test_read_rgb_dark_is_black() {
        let mut sensor = driver(FakeLink::words(&[0; 8]));
        let rgb = sensor.read_rgb(&RgbConversion::default()).unwrap();
        assert_eq!(rgb.to_rgb8(), [0, 0, 0]);
    }

    #[test]
    fn test_timeout_is_bounded() {
        let mut sensor = driver(FakeLink::answering(&[Response::NeverReady]));
        assert_eq!(sensor.read_register(crate::register::Register::ConfigA), Err(Error::Timeout));

        let (link, _) = sensor.release();
        assert_eq!(link.polls, POLL_ATTEMPTS);
    }

    #[test]
    fn test_slow_response_within_bound() {
        let mut sensor = driver(FakeLink::answering(&[Response::Slow(POLL_ATTEMPTS - 1, 0x3208)]));
        assert_eq!(sensor.read_config_a(), Ok(ConfigA::default()));

        let (link, _) = sensor.release();
        assert_eq!(link.polls, POLL_ATTEMPTS);
    }

    #[test]
    fn test_limits() {
        let mut sensor = driver(FakeLink::words(&[0xB123, 0x0FFF]));
        let low = sensor.read_low_limit().unwrap();
        assert_eq!(low, ThresholdValue::new(0x123, 0xB).unwrap());
        let high = sensor.read_high_limit().unwrap();
        assert_eq!(high.to_adc(), 4095.0);

        sensor.write_limit(Limit::Low, ThresholdValue::new(0x456, 0x2).unwrap()).unwrap();
        sensor.write_high_limit(ThresholdValue::from_adc(4096.0)).unwrap();

        let (link, _) = sensor.release();
        assert_eq!(link.commands(), [0x08, 0x09]);
        assert_eq!(link.written[2], [0x08, 0x24, 0x56]);
        assert_eq!(link.written[3], [0x09, 0x18, 0x00]);
    }

    #[test]
    fn test_config_writes_enforce_fixed_bits() {
        let mut sensor = driver(FakeLink::default());
        sensor.write_config_a(ConfigA::from_raw(0xFFFF)).unwrap();
        sensor.write_config_b(ConfigB::from_raw(0x0013)).unwrap();

        let (link, _) = sensor.release();
        assert_eq!(link.written, [vec![0x0A, 0xBF, 0xFF], vec![0x0B, 0x80, 0x11]]);
    }

    #[test]
    fn test_config_a_write_keeps_quick_wake() {
        let mut sensor = driver(FakeLink::default());
        sensor.write_config_a(ConfigA::from_raw(0xF208)).unwrap();

        let (link, _) = sensor.release();
        assert_eq!(link.written, [vec![0x0A, 0xB2, 0x08]]);
    }

    #[test]
    fn test_i2c_bus_timeout_is_transport_error() {
        use embedded_hal::i2c::ErrorKind;
        use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
        use crate::link::I2cLink;

        // a bus that gives up waiting reports `Other`; there is no timeout kind to map from
        let expectations = [
            Transaction::write(0x44, vec![0x11]),
            Transaction::read(0x44, vec![0x00, 0x00])
                .with_error(ErrorKind::Other),
        ];
        let link = I2cLink::new(Mock::new(&expectations));
        let mut sensor = Opt4048::new(link, NoopDelay::new(), ADDR);

        assert_eq!(sensor.read_device_id(), Err(Error::Transport));

        let (link, _) = sensor.release();
        link.release().done();
    }

    #[test]
    fn test_over_i2c_bus() {
        use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
        use crate::link::I2cLink;

        let expectations = [
            Transaction::write(0x44, vec![0x11]),
            Transaction::read(0x44, vec![0x08, 0x21]),
            Transaction::write(0x44, vec![0x02]),
            Transaction::read(0x44, vec![0x32, 0x08]),
            Transaction::write(0x44, vec![0x03]),
            Transaction::read(0x44, vec![0x45, 0xFA]),
            Transaction::write(0x44, vec![0x0B, 0x80, 0x11]),
        ];
        let link = I2cLink::new(Mock::new(&expectations));
        let mut sensor = Opt4048::new(link, NoopDelay::new(), ADDR);

        assert_eq!(sensor.read_device_id(), Ok(0x0821));
        let reading = sensor.read_channel(Channel::Ch1).unwrap();
        assert!(reading.crc_ok());
        assert_eq!(reading.to_adc(), 1065512.0);
        sensor.write_config_b(ConfigB::default()).unwrap();

        let (link, _) = sensor.release();
        link.release().done();
    }

    #[test]
    fn test_config_reads() {
        let mut sensor = driver(FakeLink::words(&[0x3208, 0x8011]));
        assert_eq!(sensor.read_config_a(), Ok(ConfigA::default()));
        assert_eq!(sensor.read_config_b(), Ok(ConfigB::default()));
    }
}
