//! The USB serial console over which configurations are received.
//!
//! Lines are handed to the control loop through [`LINES`]; the control loop answers through [`REPLIES`]. Both wait
//! for room rather than dropping anything, so a whole configuration pasted at once arrives intact.

use defmt::*;
use embassy_futures::join::join;
use embassy_stm32::{peripherals, usb};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel, pipe::Pipe};
use embassy_usb::class::cdc_acm::{CdcAcmClass, Receiver, Sender};
use heapless::{String, Vec};
use nunchuk_midi_lib::line_reader::{LineReader, MAX_LINE_LEN};

pub type UsbDriver = usb::Driver<'static, peripherals::USB_OTG_FS>;

/// A complete console line.
pub type Line = String<MAX_LINE_LEN>;

/// Lines waiting for the control loop.
pub static LINES: Channel<CriticalSectionRawMutex, Line, 4> = Channel::new();

/// Text waiting to be written to the console. Line breaks are sent as `\r\n`.
pub static REPLIES: Pipe<CriticalSectionRawMutex, 512> = Pipe::new();

/// Longest reply to a single line: a saved configuration or a hexdump.
pub const MAX_REPLY_LEN: usize = 8192;

/// Everything the control loop prints in response to one line.
pub type Reply = String<MAX_REPLY_LEN>;

/// Packet size of the CDC-ACM endpoints.
pub const MAX_PACKET_SIZE: u16 = 64;

#[embassy_executor::task]
pub async fn console_task(class: CdcAcmClass<'static, UsbDriver>) -> ! {
    let (sender, receiver) = class.split();
    join(read_lines(receiver), write_replies(sender)).await.0
}

async fn read_lines(mut receiver: Receiver<'static, UsbDriver>) -> ! {
    let mut reader = LineReader::<MAX_LINE_LEN>::new();
    let mut buf = [0; MAX_PACKET_SIZE as usize];
    loop {
        receiver.wait_connection().await;
        info!("Console connected");

        while let Ok(n) = receiver.read_packet(&mut buf).await {
            for &byte in &buf[..n] {
                // lines are never longer than the reader's buffer
                if let Some(line) = reader.push(byte).and_then(|line| Line::try_from(line).ok()) {
                    LINES.send(line).await;
                }
            }
        }

        info!("Console disconnected");
    }
}

async fn write_replies(mut sender: Sender<'static, UsbDriver>) -> ! {
    let mut text = [0; MAX_PACKET_SIZE as usize / 2];
    loop {
        let n = REPLIES.read(&mut text).await;

        let mut packet: Vec<u8, { MAX_PACKET_SIZE as usize }> = Vec::new();
        for &byte in &text[..n] {
            if byte == b'\n' {
                let _ = packet.push(b'\r');
            }
            let _ = packet.push(byte);
        }

        // replies are only meaningful to a connected terminal
        if sender.write_packet(&packet).await.is_err() {
            trace!("Reply dropped");
        }
    }
}
