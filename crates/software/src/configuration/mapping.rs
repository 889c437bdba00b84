//! A single rule describing how one sensor channel drives one kind of MIDI output, and the value remapping it relies on.

use crate::sensor::SensorReading;
use core::fmt;

/// Largest value a 14-bit MIDI pitch bend can carry.
pub const PITCH_BEND_MAX: u16 = 0x3FFF;

/// Linearly remaps `raw` from the domain `[from_lo, from_hi]` onto the integers `[to_lo, to_hi]`.
///
/// Values outside the domain saturate at the nearest bound. A reversed domain (`from_lo > from_hi`) inverts the
/// output. A degenerate domain (narrower than 0.001) always yields `to_lo`.
///
/// The output span is `to_hi - to_lo + 1` wide and the result truncated, so every output value covers an equal share
/// of the domain; only the exact upper bound of the domain would land past `to_hi`, and it is clamped back.
pub fn remap(raw: f32, from_lo: f32, from_hi: f32, to_lo: u16, to_hi: u16) -> u16 {
    let domain = from_hi - from_lo;
    if domain > -0.001 && domain < 0.001 {
        return to_lo;
    }

    let normalized = ((raw - from_lo) / domain).clamp(0.0, 1.0);
    let span = f32::from(to_hi) - f32::from(to_lo) + 1.0;
    let value = (normalized * span) as u32 + u32::from(to_lo);
    value.clamp(u32::from(to_lo), u32::from(to_hi.max(to_lo))) as u16
}

/// The sensor channel a [`Mapping`] reads.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Input {
    /// Joystick X axis, `-1.0..=1.0`.
    JoyX,
    /// Left half of the joystick X axis, rectified: `0.0..=1.0`.
    JoyXNeg,
    /// Right half of the joystick X axis: `0.0..=1.0`.
    JoyXPos,
    /// Joystick Y axis, `-1.0..=1.0`.
    #[default]
    JoyY,
    /// Lower half of the joystick Y axis, rectified: `0.0..=1.0`.
    JoyYNeg,
    /// Upper half of the joystick Y axis: `0.0..=1.0`.
    JoyYPos,
    /// Acceleration along X.
    AccelX,
    /// Acceleration along Y.
    AccelY,
    /// Acceleration along Z.
    AccelZ,
}

impl Input {
    /// Parses an input mnemonic: `a` plus an axis (`ax`, `ay`, `az`), or `j` plus an axis (`jx`, `jy`) optionally
    /// followed by `-` or `+` to select one half of the axis. Letters may be in either case.
    pub fn parse(token: &str) -> Option<Self> {
        let mut chars = token.chars().map(|c| c.to_ascii_lowercase());
        let input = match (chars.next()?, chars.next()?, chars.next()) {
            ('a', 'x', None) => Self::AccelX,
            ('a', 'y', None) => Self::AccelY,
            ('a', 'z', None) => Self::AccelZ,
            ('j', 'x', None) => Self::JoyX,
            ('j', 'x', Some('-')) => Self::JoyXNeg,
            ('j', 'x', Some('+')) => Self::JoyXPos,
            ('j', 'y', None) => Self::JoyY,
            ('j', 'y', Some('-')) => Self::JoyYNeg,
            ('j', 'y', Some('+')) => Self::JoyYPos,
            _ => return None,
        };
        chars.next().is_none().then_some(input)
    }

    /// Reads this channel from a sample. Half-axis inputs are rectified so that the selected half reads positive and
    /// the other half reads zero.
    pub fn raw_value(self, reading: &SensorReading) -> f32 {
        match self {
            Self::JoyX => reading.joy_x,
            Self::JoyXNeg => (-reading.joy_x).max(0.0),
            Self::JoyXPos => reading.joy_x.max(0.0),
            Self::JoyY => reading.joy_y,
            Self::JoyYNeg => (-reading.joy_y).max(0.0),
            Self::JoyYPos => reading.joy_y.max(0.0),
            Self::AccelX => reading.accel_x,
            Self::AccelY => reading.accel_y,
            Self::AccelZ => reading.accel_z,
        }
    }

    /// The domain assumed when a mapping does not declare one.
    pub fn default_domain(self) -> (f32, f32) {
        match self {
            Self::JoyXNeg | Self::JoyXPos | Self::JoyYNeg | Self::JoyYPos => (0.0, 1.0),
            _ => (-1.0, 1.0),
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            Self::JoyX => "jx",
            Self::JoyXNeg => "jx-",
            Self::JoyXPos => "jx+",
            Self::JoyY => "jy",
            Self::JoyYNeg => "jy-",
            Self::JoyYPos => "jy+",
            Self::AccelX => "ax",
            Self::AccelY => "ay",
            Self::AccelZ => "az",
        }
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// The kind of MIDI output a [`Mapping`] drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Destination {
    /// A Control Change on the given controller number (0–127).
    ControlChange(u8),
    /// Pitch Bend.
    PitchBend,
    /// The note played when the Z button is pressed, snapped to the configured scale.
    Note,
}

impl Default for Destination {
    fn default() -> Self {
        Self::ControlChange(1)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ControlChange(controller) => write!(f, "cc {controller}"),
            Self::PitchBend => f.write_str("pb"),
            Self::Note => f.write_str("note"),
        }
    }
}

/// Maps one [`Input`] to one [`Destination`], remapping the input's domain onto an output range.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mapping {
    input: Input,
    from_lo: f32,
    from_hi: f32,
    to_lo: u16,
    to_hi: u16,
    destination: Destination,
}

impl Mapping {
    /// Constructs a [`Mapping`]. Returns `None` if the output range is reversed.
    pub fn new(input: Input, from: (f32, f32), to: (u16, u16), destination: Destination) -> Option<Self> {
        (to.0 <= to.1).then_some(Self {
            input,
            from_lo: from.0,
            from_hi: from.1,
            to_lo: to.0,
            to_hi: to.1,
            destination,
        })
    }

    /// Getter.
    pub fn input(&self) -> Input {
        self.input
    }

    /// Getter.
    pub fn destination(&self) -> Destination {
        self.destination
    }

    /// The declared input domain, `(from_lo, from_hi)`.
    pub fn domain(&self) -> (f32, f32) {
        (self.from_lo, self.from_hi)
    }

    /// The output range, `(to_lo, to_hi)`, both inclusive.
    pub fn range(&self) -> (u16, u16) {
        (self.to_lo, self.to_hi)
    }

    pub(super) fn set_range(&mut self, to_lo: u16, to_hi: u16) {
        if to_lo <= to_hi {
            self.to_lo = to_lo;
            self.to_hi = to_hi;
        }
    }

    /// Reads this mapping's input from a sample and remaps it onto the output range.
    pub fn value(&self, reading: &SensorReading) -> u16 {
        remap(
            self.input.raw_value(reading),
            self.from_lo,
            self.from_hi,
            self.to_lo,
            self.to_hi,
        )
    }
}

/// Formats the mapping in the canonical configuration syntax, e.g. `ax -1 1 48 100 note`, always spelling out the
/// ranges.
impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.input, self.from_lo, self.from_hi, self.to_lo, self.to_hi, self.destination
        )
    }
}
