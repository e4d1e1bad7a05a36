use core::fmt;
use core::marker::PhantomData;

use log::{LevelFilter, Log, Metadata, Record};
use stm32f7::stm32f745::Peripherals;
use stm32f7::stm32f745::usart1;


pub trait Uart {
    fn get_peripheral(peripherals: &Peripherals) -> &usart1::RegisterBlock;
    fn enable_peripheral_clock(peripherals: &Peripherals);

    fn set_up(peripherals: &Peripherals, speed_divisor: u16) {
        let uart = Self::get_peripheral(peripherals);

        // assumes pins are already set up

        // gimme clock
        Self::enable_peripheral_clock(peripherals);

        // set up
        uart.cr1().modify(|_, w| w
            .m0().bit8() // 8 bits per byte
            .m1().m0() // yes, 8 bits per byte
            .over8().oversampling16() // sample 16 bits, not 8
            .pce().disabled() // no hardware parity calculation
        );
        uart.brr().modify(|_, w| w
            .brr().set(speed_divisor)
        );
        uart.cr2().modify(|_, w| w
            .stop().stop1() // 1 stop bit
            .txinv().standard() // transmission pin not inverted
            .rxinv().standard() // reception pin not inverted
            .datainv().positive() // data polarity not inverted
            .msbfirst().clear_bit() // RS232 says least significant byte first
        );

        uart.cr1().modify(|_, w| w
            .ue().enabled() // turn on UART
        );

        // transmit only; nobody talks back to us
        uart.cr1().modify(|_, w| w
            .te().enabled()
        );
    }

    /// Writes via UART.
    fn write(peripherals: &Peripherals, data: &[u8]) {
        let uart = Self::get_peripheral(peripherals);

        for b in data {
            // wait until transmit buffer is empty
            while uart.isr().read().txe().is_full() {
            }

            // write the byte
            uart.tdr().modify(|_, w| w
                .tdr().set(*b as u16)
            );
        }

        // wait until transmit buffer is empty one last time
        while uart.isr().read().txe().is_full() {
        }
    }
}


pub struct Usart3;
impl Uart for Usart3 {
    fn get_peripheral(peripherals: &Peripherals) -> &usart1::RegisterBlock {
        &*peripherals.USART3
    }

    fn enable_peripheral_clock(peripherals: &Peripherals) {
        peripherals.RCC.apb1enr().modify(|_, w| w
            .usart3en().set_bit()
        );
    }
}


/// Lets `write!` target a UART.
pub struct UartWriter<'p, U> {
    peripherals: &'p Peripherals,
    uart: PhantomData<U>,
}
impl<'p, U: Uart> UartWriter<'p, U> {
    pub const fn new(peripherals: &'p Peripherals) -> Self {
        Self {
            peripherals,
            uart: PhantomData,
        }
    }
}
impl<U: Uart> fmt::Write for UartWriter<'_, U> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        U::write(self.peripherals, s.as_bytes());
        Ok(())
    }
}


/// Sends log records to USART3.
struct UartLogger;
impl Log for UartLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        // the UART has been set up before the logger was installed
        let peripherals = unsafe { Peripherals::steal() };
        let mut writer: UartWriter<Usart3> = UartWriter::new(&peripherals);
        let _ = fmt::Write::write_fmt(
            &mut writer,
            format_args!("[{}] {}\r\n", record.level(), record.args()),
        );
    }

    fn flush(&self) {
    }
}

static LOGGER: UartLogger = UartLogger;


/// Routes the `log` facade to USART3, which must already be set up.
pub fn install_logger(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
