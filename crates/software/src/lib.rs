//! This crate contains architecture-agnostic logic for the Nunchuk MIDI controller, a device which turns the joystick,
//! buttons, and accelerometer of a [Wii Nunchuk](https://en.wikipedia.org/wiki/Wii_Remote#Nunchuk) into
//! [MIDI](https://midi.org/midi-1-0) notes, control changes, and pitch bends.
//!
//! How sensor movements become MIDI is described by a small textual configuration language (see [`configuration`]) which
//! the performer sends to the device over a serial connection. Accepted configurations are written to flash (see
//! [`persistence`]) so they survive a power cycle.

#![deny(missing_docs)]
#![no_std]

#[macro_use]
mod fmt;

mod error;
pub use error::{Error, Result};

pub mod configuration;
pub mod engine;

pub mod line_reader;
pub mod midi;
pub mod persistence;
pub mod sensor;
