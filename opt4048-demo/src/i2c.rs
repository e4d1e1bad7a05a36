use core::marker::PhantomData;

use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation, SevenBitAddress};
use stm32f7::stm32f745::i2c1;
use stm32f7::stm32f745::Peripherals;


/// Status register polls before a transfer is given up.
const WAIT_LIMIT: u32 = 100_000;


pub trait I2cPeripheral {
    fn get_peripheral(peripherals: &Peripherals) -> &i2c1::RegisterBlock;
    fn enable_peripheral_clock(peripherals: &Peripherals);
}


/// An I2C peripheral in controller mode, usable through `embedded-hal`.
pub struct I2cController<'p, P> {
    peripherals: &'p Peripherals,
    peripheral: PhantomData<P>,
}
impl<'p, P: I2cPeripheral> I2cController<'p, P> {
    pub fn set_up(peripherals: &'p Peripherals) -> Self {
        let i2c = P::get_peripheral(peripherals);

        // assumes pins are already set up

        // gimme clock
        P::enable_peripheral_clock(peripherals);

        // set up noise filter
        i2c.cr1().modify(|_, w| w
            .anfoff().enabled() // analog filter enabled
            .dnf().filter15() // 15-period digital filter
            .txdmaen().disabled() // no DMA for transmission
            .rxdmaen().disabled() // no DMA for reception
            .sbc().disabled() // this option may only be enabled if we're the peripheral
            .nostretch().disabled() // this option may only be enabled if we're the peripheral
            .smbhen().disabled() // ignore the SMBus host address
            .smbden().disabled() // ignore the SMBus default address
            .alerten().disabled() // no SMBus alerts
            .pecen().disabled() // no packet error checking
        );
        i2c.cr2().modify(|_, w| w
            .add10().bit7() // 7-bit addresses
        );
        // calculated speed parameters from values:
        // target I2C bus frequency: 100 kHz
        // I2C peripheral clock frequency: 16_000 kHz
        // I2C mode: standard
        // analog filter active: yes
        // digital noise filter count: 15
        // rise time (ns): 1000
        // fall time (ns): 300
        i2c.timingr().modify(|_, w| w
            .presc().set(1)
            .sdadel().set(0)
            .scldel().set(9)
            .scll().set(28)
            .sclh().set(23)
        );

        // turn on
        i2c.cr1().modify(|_, w| w
            .pe().enabled()
        );

        Self {
            peripherals,
            peripheral: PhantomData,
        }
    }

    fn registers(&self) -> &i2c1::RegisterBlock {
        P::get_peripheral(self.peripherals)
    }

    /// Spins until `ready` holds, bailing out on bus errors or after `WAIT_LIMIT` polls.
    ///
    /// `nack_source` is what a NACK seen during this wait is blamed on.
    fn wait_until<F: Fn(&i2c1::RegisterBlock) -> bool>(
        &self,
        nack_source: NoAcknowledgeSource,
        ready: F,
    ) -> Result<(), ErrorKind> {
        let i2c = self.registers();
        for _ in 0..WAIT_LIMIT {
            let isr = i2c.isr().read();
            if isr.nackf().bit_is_set() {
                // the peripheral sends STOP by itself after a NACK
                i2c.icr().write(|w| w.nackcf().set_bit());
                return Err(ErrorKind::NoAcknowledge(nack_source));
            }
            if isr.arlo().bit_is_set() {
                i2c.icr().write(|w| w.arlocf().set_bit());
                return Err(ErrorKind::ArbitrationLoss);
            }
            if isr.berr().bit_is_set() {
                i2c.icr().write(|w| w.berrcf().set_bit());
                return Err(ErrorKind::Bus);
            }
            if ready(i2c) {
                return Ok(());
            }
        }
        // embedded-hal has no timeout kind; the driver sees this as a transport error
        Err(ErrorKind::Other)
    }

    /// Issues a (repeated) START for a transfer of `length` bytes.
    fn start(&self, address: u8, read: bool, length: usize) -> Result<(), ErrorKind> {
        if length > 0xFF {
            // would need reload mode
            return Err(ErrorKind::Other);
        }
        let i2c = self.registers();

        i2c.cr2().modify(|_, w| {
            let w = w
                .sadd().set(u16::from(address) << 1) // 7-bit address lives in SADD[7:1]
                .nbytes().set(length as u8)
                .reload().clear_bit() // no reloading after 255 bytes
                .autoend().clear_bit(); // we will issue the STOP condition ourselves
            if read {
                w.rd_wrn().read()
            } else {
                w.rd_wrn().write()
            }
        });

        // go go go!
        i2c.cr2().modify(|_, w| w
            .start().set_bit()
        );
        Ok(())
    }

    fn write_bytes(&self, address: u8, bytes: &[u8]) -> Result<(), ErrorKind> {
        let i2c = self.registers();
        self.start(address, false, bytes.len())?;

        for (i, &byte) in bytes.iter().enumerate() {
            let nack_source = if i == 0 { NoAcknowledgeSource::Address } else { NoAcknowledgeSource::Data };

            // wait until the peripheral wants the next byte
            self.wait_until(nack_source, |i2c| i2c.isr().read().txis().bit_is_set())?;

            i2c.txdr().modify(|_, w| w
                .txdata().set(byte)
            );
        }

        let nack_source = if bytes.is_empty() { NoAcknowledgeSource::Address } else { NoAcknowledgeSource::Data };
        self.wait_until(nack_source, |i2c| i2c.isr().read().tc().is_complete())
    }

    fn read_bytes(&self, address: u8, buffer: &mut [u8]) -> Result<(), ErrorKind> {
        let i2c = self.registers();
        self.start(address, true, buffer.len())?;

        for byte in buffer.iter_mut() {
            // wait until the read register is full
            self.wait_until(NoAcknowledgeSource::Address, |i2c| i2c.isr().read().rxne().is_not_empty())?;
            *byte = i2c.rxdr().read().rxdata().bits();
        }

        self.wait_until(NoAcknowledgeSource::Address, |i2c| i2c.isr().read().tc().is_complete())
    }
}
impl<P: I2cPeripheral> ErrorType for I2cController<'_, P> {
    type Error = ErrorKind;
}
impl<P: I2cPeripheral> embedded_hal::i2c::I2c<SevenBitAddress> for I2cController<'_, P> {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        // wait until bus is idle
        self.wait_until(NoAcknowledgeSource::Unknown, |i2c| i2c.isr().read().busy().is_not_busy())?;

        let mut result = Ok(());
        for operation in operations.iter_mut() {
            result = match operation {
                Operation::Write(bytes) => self.write_bytes(address, bytes),
                Operation::Read(buffer) => self.read_bytes(address, buffer),
            };
            if result.is_err() {
                break;
            }
        }

        match result {
            Err(ErrorKind::NoAcknowledge(_)) => {
                // STOP already sent by the peripheral
            },
            _ => {
                // we are done
                self.registers().cr2().modify(|_, w| w
                    .stop().set_bit()
                );
            },
        }
        result
    }
}


macro_rules! implement_i2c {
    (
        $struct_name:ident,
        $peripheral_name:ident,
        $rcc_enable_register:ident,
        $rcc_field:ident $(,)?
    ) => {
        pub struct $struct_name;
        impl I2cPeripheral for $struct_name {
            fn get_peripheral(peripherals: &Peripherals) -> &i2c1::RegisterBlock {
                &*peripherals.$peripheral_name
            }

            fn enable_peripheral_clock(peripherals: &Peripherals) {
                peripherals.RCC.$rcc_enable_register().modify(|_, w| w
                    .$rcc_field().set_bit()
                );
            }
        }
    };
}

implement_i2c!(I2c2, I2C2, apb1enr, i2c2en);
