//! Nunchuk MIDI is [Embassy](https://embassy.dev)-based firmware which turns a
//! [Wii Nunchuk](https://en.wikipedia.org/wiki/Wii_Remote#Nunchuk) into a MIDI controller. The firmware runs on the
//! [Nucleo-F767ZI development board](https://www.st.com/en/evaluation-tools/nucleo-f767zi.html).
//!
//! The Nunchuk's joystick and accelerometer axes are mapped onto control changes, pitch bend, and notes quantized to a
//! scale. How they are mapped is described in a small text format (see
//! [`nunchuk_midi_lib::configuration`]) which is typed or pasted into a serial terminal connected to the board's USB
//! port. Accepted configurations are kept in flash. The red LED lights up when something went wrong and stays lit
//! until a configuration is accepted; the blue LED toggles with every note played.
//!
//! Wiring:
//! - Nunchuk: SCL to PB8, SDA to PB9 (I2C1), powered from 3.3V.
//! - MIDI out: PD5 (USART2 TX) through the usual 220Ω resistors to pin 5 of a DIN socket.

#![no_std]
#![no_main]

mod console;
mod flash;
mod midi_out;

use crate::{
    console::{LINES, MAX_PACKET_SIZE, REPLIES, Reply, UsbDriver, console_task},
    flash::FlashRegion,
    midi_out::{BAUD_RATE, UartMidi},
};
use defmt::*;
use embassy_executor::Spawner;
use embassy_stm32::{
    Config, bind_interrupts,
    gpio::{Level, Output, Speed},
    i2c::{self, I2c},
    peripherals,
    time::Hertz,
    usart::{self, UartTx},
    usb,
};
use embassy_time::{Delay, Duration, Instant, Ticker};
use embassy_usb::{
    Builder, UsbDevice,
    class::cdc_acm::{CdcAcmClass, State},
};
use nunchuk_midi_lib::{
    engine::Engine,
    persistence::SaveSlot,
    sensor::{SensorState, nunchuk::Nunchuk},
};
use static_cell::StaticCell;

use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(
    #[doc(hidden)]
    struct Irqs {
        OTG_FS => usb::InterruptHandler<peripherals::USB_OTG_FS>;
    }
);

/// How often the Nunchuk is sampled and MIDI is sent.
const TICK: Duration = Duration::from_millis(1);

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Initializing Nunchuk MIDI");

    let mut config = Config::default();
    {
        use embassy_stm32::rcc::*;
        // hse: high-speed external clock
        config.rcc.hse = Some(Hse {
            freq: Hertz(8_000_000),
            mode: HseMode::Bypass,
        });

        // pll: phase-locked loop, crucial for dividing clock
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL216,
            divp: Some(PllPDiv::DIV2), // 8mhz / 4 * 216 / 2 = 216Mhz
            // the 48MHz clock used for USB OTG FS is derived from the main PLL VCO (PLLQ clock)
            divq: Some(PllQDiv::DIV9), // 8mhz / 4 * 216 / 9 = 48Mhz
            divr: None,
        });
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.mux.clk48sel = mux::Clk48sel::PLL1_Q;
    }
    let p = embassy_stm32::init(config);

    let mut fault_led = Output::new(p.PB14, Level::High, Speed::Low);
    let mut note_led = Output::new(p.PB7, Level::Low, Speed::Low);

    // Create the driver, from the HAL.
    static ENDPOINT_OUT_BUFFER: StaticCell<[u8; 256]> = StaticCell::new();
    let mut config = embassy_stm32::usb::Config::default();

    // USB devices which are self-powered (i.e., that can stay powered on if unplugged from the host)
    // need to enable vbus_detection to comply with the USB spec. Per section 6.10 of the Nucleo board
    // manual (UM1974), CN13 (the USB port) cannot power the board; external power is necessary.
    config.vbus_detection = true;

    let driver = usb::Driver::new_fs(
        p.USB_OTG_FS,
        Irqs,
        p.PA12,
        p.PA11,
        ENDPOINT_OUT_BUFFER.init([0; 256]),
        config,
    );

    // per https://pid.codes, FOSS projects can apply to be listed under the vendor ID owned by InterBiometrics;
    // 0x0001 is the shared test PID
    let vendor_id = 0x1209;
    let product_id = 0x0001;

    let mut config = embassy_usb::Config::new(vendor_id, product_id);
    config.manufacturer = Some("Pawpaw Works");
    config.product = Some("Nunchuk MIDI");
    config.self_powered = true;
    config.max_power = 0;

    // required for Windows to bind the CDC-ACM driver to the interface association
    config.device_class = 0xEF;
    config.device_sub_class = 0x02;
    config.device_protocol = 0x01;
    config.composite_with_iads = true;

    // Create embassy-usb DeviceBuilder using the driver and config.
    // It needs some buffers for building the descriptors.
    static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static CONTROL_BUFFER: StaticCell<[u8; 64]> = StaticCell::new();
    static CDC_STATE: StaticCell<State> = StaticCell::new();

    let mut builder = Builder::new(
        driver,
        config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        &mut [], // no msos descriptors
        CONTROL_BUFFER.init([0; 64]),
    );

    let class = CdcAcmClass::new(&mut builder, CDC_STATE.init(State::new()), MAX_PACKET_SIZE);
    let usb = builder.build();

    unwrap!(spawner.spawn(usb_task(usb)));
    unwrap!(spawner.spawn(console_task(class)));

    let mut midi_config = usart::Config::default();
    midi_config.baudrate = BAUD_RATE;
    let mut midi = UartMidi::new(unwrap!(UartTx::new_blocking(p.USART2, p.PD5, midi_config)));

    let mut slot = unwrap!(SaveSlot::new(FlashRegion::new(p.FLASH)));
    let mut engine = Engine::boot(&mut slot);

    // release anything left sounding by a previous run
    if engine.silence(&mut midi).is_err() {
        error!("Unable to send MIDI");
        engine.raise_fault();
    }

    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = Hertz(100_000);
    let i2c = I2c::new_blocking(p.I2C1, p.PB8, p.PB9, i2c_config);
    let mut nunchuk = match Nunchuk::new(i2c, Delay) {
        Ok(nunchuk) => Some(nunchuk),
        Err(e) => {
            error!("Nunchuk not responding: {}", e);
            None
        }
    };

    let mut sensor = SensorState::default();
    let mut reply = Reply::new();
    let mut ticker = Ticker::every(TICK);
    loop {
        while let Ok(line) = LINES.try_receive() {
            reply.clear();
            if let Some(outcome) = engine.receive_line(&line, &mut slot, &mut reply) {
                info!("{}", outcome);
            }
            REPLIES.write_all(reply.as_bytes()).await;
        }

        match nunchuk.as_mut().map(|nunchuk| nunchuk.read()) {
            Some(Ok(reading)) => sensor.update(reading),
            Some(Err(e)) => {
                warn!("Nunchuk read failed: {}", e);
                engine.raise_fault();
            }
            None => engine.raise_fault(),
        }

        match engine.tick(Instant::now(), &sensor, &mut midi) {
            Ok(tick) if tick.note_triggered => note_led.toggle(),
            Ok(_) => {}
            Err(e) => {
                warn!("MIDI out failed: {}", e);
                engine.raise_fault();
            }
        }

        fault_led.set_level(engine.has_fault().into());
        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn usb_task(mut usb: UsbDevice<'static, UsbDriver>) -> ! {
    usb.run().await
}
