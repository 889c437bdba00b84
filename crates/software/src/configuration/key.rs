use core::fmt;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

/// The twelve pitch classes, used as the root of a scale. Discriminants are semitones above C.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ToPrimitive, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Key {
    /// C
    #[default]
    C,
    /// C♯/D♭
    Db,
    /// D
    D,
    /// D♯/E♭
    Eb,
    /// E
    E,
    /// F
    F,
    /// F♯/G♭
    Gb,
    /// G
    G,
    /// G♯/A♭
    Ab,
    /// A
    A,
    /// A♯/B♭
    Bb,
    /// B
    B,
}

impl Key {
    /// Parses a note name such as `D`, `eb`, or `F#`: a letter `A`–`G` in either case, optionally followed by `b` (flat)
    /// or `#` (sharp).
    pub fn parse(token: &str) -> Option<Self> {
        let mut chars = token.chars();
        let natural = match chars.next()?.to_ascii_uppercase() {
            'A' => Self::A,
            'B' => Self::B,
            'C' => Self::C,
            'D' => Self::D,
            'E' => Self::E,
            'F' => Self::F,
            'G' => Self::G,
            _ => return None,
        };

        match (chars.next(), chars.next()) {
            (None, _) => Some(natural),
            (Some('b'), None) => Some(natural.transpose(11)),
            (Some('#'), None) => Some(natural.transpose(1)),
            _ => None,
        }
    }

    /// Semitones above C.
    pub fn pitch_class(self) -> u8 {
        self as u8
    }

    fn transpose(self, semitones: u8) -> Self {
        Self::from_u8((self.pitch_class() + semitones) % 12).unwrap_or(self)
    }

    fn name(self) -> &'static str {
        match self {
            Self::C => "C",
            Self::Db => "Db",
            Self::D => "D",
            Self::Eb => "Eb",
            Self::E => "E",
            Self::F => "F",
            Self::Gb => "Gb",
            Self::G => "G",
            Self::Ab => "Ab",
            Self::A => "A",
            Self::Bb => "Bb",
            Self::B => "B",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
