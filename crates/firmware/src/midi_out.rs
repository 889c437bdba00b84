//! MIDI out over a UART at the standard 31250 baud.

use defmt::trace;
use embassy_stm32::{
    mode::Blocking,
    usart::{self, UartTx},
};
use nunchuk_midi_lib::midi::{MidiOut, encode};
use wmidi::MidiMessage;

/// The MIDI baud rate.
pub const BAUD_RATE: u32 = 31_250;

pub struct UartMidi {
    tx: UartTx<'static, Blocking>,
}

impl UartMidi {
    pub fn new(tx: UartTx<'static, Blocking>) -> Self {
        Self { tx }
    }
}

impl MidiOut for UartMidi {
    type Error = usart::Error;

    fn send(&mut self, message: &MidiMessage<'_>) -> Result<(), Self::Error> {
        if let Some(bytes) = encode(message) {
            trace!("MIDI out: {:02x}", bytes);
            self.tx.blocking_write(&bytes)?;
        }
        Ok(())
    }
}
