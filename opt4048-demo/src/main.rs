#![no_main]
#![no_std]


mod i2c;
mod systick;
mod uart;


use core::fmt::Write;
use core::panic::PanicInfo;

use cortex_m_rt::entry;
use embedded_hal::delay::DelayNs;
use log::LevelFilter;
use opt4048::{ConfigA, ConfigB, DEFAULT_ADDRESS, Error, I2cLink, Opt4048, RgbConversion};
use stm32f7::stm32f745::Peripherals;

use crate::i2c::{I2c2, I2cController};
use crate::systick::SysTickDelay;
use crate::uart::{Uart, UartWriter, Usart3, install_logger};


pub const CLOCK_SPEED_HZ: u32 = 16_000_000;

/// Pause between two measurements.
const MEASUREMENT_PERIOD_MS: u32 = 1000;


#[panic_handler]
fn handle_panic(_info: &PanicInfo) -> ! {
    loop {
    }
}


/// Reconfigures the clocks of the microcontroller.
///
/// The board has an external 16 MHz oscillator, which we feed through unchanged:
///
/// ```plain
/// ╭────────╮ ╒══════╕
/// │ HSE    ├─┤ HPRE ├───┬─────────┬─────────┐ AHB (max. 216 MHz)
/// │ 16 MHz │ │   /1 ├┐  │         │         │
/// ╰────────╯ └──────┘│ ┌┴───────┐┌┴───────┐┌┴───────┐
///                    │ │ SYSCLK ││ GPIOB  ││ GPIOD  │
///                    │ │ 16 MHz ││ 16 MHz ││ 16 MHz │
///                    │ └────────┘└────────┘└────────┘
///                    │╒═══════╕
///                    └┤ PPRE1 ├──┬─────────┐ APB1 (max. 54 MHz)
///                     │    /1 │  │         │
///                     └───────┘ ┌┴───────┐┌┴───────┐
///                               │ USART3 ││ I2C2   │
///                               │ 16 MHz ││ 16 MHz │
///                               └────────┘└────────┘
/// ```
///
/// The debug USART we can configure for any speed; even a USARTDIV of 1666 (0x682) for the
/// venerable 9600 b/s fits.
///
/// The OPT4048 does up to 1 MHz, but 100 kHz standard mode is plenty for a handful of registers
/// per second.
fn setup_clocks(peripherals: &mut Peripherals) {
    // start up the external high-speed oscillator (HSE)

    // HSEBYP=0: crystal between OSCIN and OSCOUT
    // HSEBYP=1: clock on OSCIN while OSCOUT is floating
    // we have a crystal, not a clock
    peripherals.RCC.cr().modify(|_, w| w
        .hsebyp().clear_bit()
    );

    // turn on HSE
    peripherals.RCC.cr().modify(|_, w| w
        .hseon().set_bit()
    );

    // wait for HSE to become ready
    while peripherals.RCC.cr().read().hserdy().is_not_ready() {
    }

    // set flash wait states
    // we run on 3.3V, which means steps of 30 MHz
    // 0 MHz < 16 MHz < 30 MHz => 0 wait states
    peripherals.FLASH.acr().modify(|_, w| w
        .latency().ws0()
    );

    // set prescalers to /1
    peripherals.RCC.cfgr().modify(|_, w| w
        .hpre().div1() // warning: max. 216 MHz
        .ppre1().div1() // warning: max. 54 MHz
    );

    // switch clock input over to HSE
    peripherals.RCC.cfgr().modify(|_, w| w
        .sw().hse()
    );

    // wait until clock input switches over
    while !peripherals.RCC.cfgr().read().sws().is_hse() {
    }

    // feed the clock to the peripherals we want
    peripherals.RCC.ahb1enr().modify(|_, w| w
        .gpioben().enabled()
        .gpioden().enabled()
    );
    peripherals.RCC.apb1enr().modify(|_, w| w
        .usart3en().enabled()
        .i2c2en().enabled()
    );
}

fn setup_pins(peripherals: &mut Peripherals) {
    // choose alternate functions
    peripherals.GPIOB.afrh().modify(|_, w| w
        .afrh10().af4() // PB10 to I2C2 SCL
        .afrh11().af4() // PB11 to I2C2 SDA
    );
    peripherals.GPIOD.afrh().modify(|_, w| w
        .afrh8().af7() // PD8 to USART3 Tx
        .afrh9().af7() // PD9 to USART3 Rx
    );

    // I2C is open-drain, the UART push-pull
    peripherals.GPIOB.otyper().modify(|_, w| w
        .ot10().open_drain()
        .ot11().open_drain()
    );
    peripherals.GPIOD.otyper().modify(|_, w| w
        .ot8().push_pull()
        .ot9().push_pull()
    );

    // set port modes
    peripherals.GPIOB.moder().modify(|_, w| w
        .moder10().alternate() // I2C2
        .moder11().alternate() // I2C2
    );
    peripherals.GPIOD.moder().modify(|_, w| w
        .moder8().alternate() // USART3
        .moder9().alternate() // USART3
    );

    // set I2C ports to fast
    peripherals.GPIOB.ospeedr().modify(|_, w| w
        .ospeedr10().high_speed()
        .ospeedr11().high_speed()
    );
}


const fn divide_u32_to_u16_round(dividend: u32, divisor: u32) -> u16 {
    let quotient = (dividend + (divisor / 2)) / divisor;
    assert!(quotient <= (u16::MAX as u32));
    quotient as u16
}


/// Takes one full measurement and prints it.
fn report<L, D, W>(sensor: &mut Opt4048<L, D>, conversion: &RgbConversion, out: &mut W) -> Result<(), Error>
    where
        L: opt4048::RegisterLink,
        D: DelayNs,
        W: Write,
{
    let xyz = sensor.read_xyz()?;
    let _ = write!(out, "X={:.3} Y={:.3} Z={:.3} lux={:.2}", xyz.x, xyz.y, xyz.z, xyz.lux);

    match xyz.chromaticity() {
        Ok(xy) => {
            let _ = write!(out, " x={:.4} y={:.4}", xy.x, xy.y);
        },
        Err(e) => {
            let _ = write!(out, " xy: {}", e);
        },
    }

    let [r, g, b] = xyz.to_rgb(conversion).to_rgb8();
    let _ = write!(out, " rgb=#{:02X}{:02X}{:02X}\r\n", r, g, b);
    Ok(())
}


#[entry]
fn main() -> ! {
    let mut peripherals = unsafe { Peripherals::steal() };
    let core_peripherals = unsafe { cortex_m::Peripherals::steal() };

    setup_clocks(&mut peripherals);
    setup_pins(&mut peripherals);
    systick::set_up(&core_peripherals);

    // set up peripherals:
    // * I2C2 (light sensor)
    // * USART3 (debugging)

    // use the venerable 9600 b/s
    Usart3::set_up(
        &peripherals,
        divide_u32_to_u16_round(CLOCK_SPEED_HZ, 9_600),
    );
    install_logger(LevelFilter::Info);
    let mut out: UartWriter<Usart3> = UartWriter::new(&peripherals);

    let i2c: I2cController<I2c2> = I2cController::set_up(&peripherals);
    let mut sensor = Opt4048::new(I2cLink::new(i2c), SysTickDelay, DEFAULT_ADDRESS);

    match sensor.read_device_id() {
        Ok(id) => {
            let _ = write!(out, "OPT4048 at {}, device ID 0x{:04X}\r\n", sensor.address(), id);
        },
        Err(e) => {
            let _ = write!(out, "OPT4048 at {} not responding: {}\r\n", sensor.address(), e);
        },
    }

    // power-on values, except operating mode (bits 5:4) switched from power-down to continuous;
    // automatic range, 100 ms per channel
    const CONFIG_A_CONTINUOUS: ConfigA = ConfigA::from_raw(0x3238);
    if let Err(e) = sensor.write_config_b(ConfigB::default()) {
        let _ = write!(out, "failed to write config B: {}\r\n", e);
    }
    if let Err(e) = sensor.write_config_a(CONFIG_A_CONTINUOUS) {
        let _ = write!(out, "failed to write config A: {}\r\n", e);
    }

    let conversion = RgbConversion::srgb_d65();
    let mut delay = SysTickDelay;
    loop {
        if let Err(e) = report(&mut sensor, &conversion, &mut out) {
            let _ = write!(out, "measurement failed: {}\r\n", e);
        }
        delay.delay_ms(MEASUREMENT_PERIOD_MS);
    }
}
