//! The MIDI messages the controller emits, and the seam to whatever transmits them.

use wmidi::{Channel, ControlFunction, MidiMessage, Note, U7, U14};

/// Velocity of every note the controller plays.
pub const NOTE_VELOCITY: u8 = 127;

/// A MIDI transmitter, e.g. a UART running at 31250 baud.
pub trait MidiOut {
    /// Failure reported by the transmitter.
    type Error;

    /// Transmits a single message.
    fn send(&mut self, message: &MidiMessage<'_>) -> Result<(), Self::Error>;
}

fn channel(index: u8) -> Channel {
    Channel::from_index(index.min(15)).unwrap_or(Channel::Ch16)
}

fn u7(value: u8) -> U7 {
    U7::from_u8_lossy(value.min(0x7F))
}

/// A Note On for `note` on the channel with index `channel_index` (0–15).
pub fn note_on(channel_index: u8, note: u8, velocity: u8) -> MidiMessage<'static> {
    MidiMessage::NoteOn(
        channel(channel_index),
        Note::from_u8_lossy(note.min(0x7F)),
        u7(velocity),
    )
}

/// A Note Off for `note`, with zero release velocity.
pub fn note_off(channel_index: u8, note: u8) -> MidiMessage<'static> {
    MidiMessage::NoteOff(channel(channel_index), Note::from_u8_lossy(note.min(0x7F)), u7(0))
}

/// Sets `controller` to `value`. Both are clamped to seven bits.
pub fn control_change(channel_index: u8, controller: u8, value: u8) -> MidiMessage<'static> {
    MidiMessage::ControlChange(
        channel(channel_index),
        ControlFunction(u7(controller)),
        u7(value),
    )
}

/// Bends the pitch. `value` is clamped to 14 bits; `0x2000` is centered.
pub fn pitch_bend(channel_index: u8, value: u16) -> MidiMessage<'static> {
    MidiMessage::PitchBendChange(channel(channel_index), U14::try_from(value).unwrap_or(U14::MAX))
}

/// Serializes a three byte channel message for the wire. Returns `None` for messages of any other length.
pub fn encode(message: &MidiMessage<'_>) -> Option<[u8; 3]> {
    let mut bytes = [0; 3];
    match message.copy_to_slice(&mut bytes) {
        Ok(3) => Some(bytes),
        _ => None,
    }
}

/// Collects encoded messages, for testing.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct Recorder {
    pub(crate) sent: heapless::Vec<[u8; 3], 256>,
}

#[cfg(test)]
impl Recorder {
    pub(crate) fn take(&mut self) -> heapless::Vec<[u8; 3], 256> {
        core::mem::take(&mut self.sent)
    }
}

#[cfg(test)]
impl MidiOut for Recorder {
    type Error = ();

    fn send(&mut self, message: &MidiMessage<'_>) -> Result<(), Self::Error> {
        let bytes = encode(message).ok_or(())?;
        self.sent.push(bytes).map_err(|_| ())
    }
}
