//! The configuration language and the [`Config`] it describes.
//!
//! A configuration is a whitespace-separated list of commands. Only the first letter of each command is significant,
//! so `CHAN`, `CHANNEL`, and `C` are equivalent. A `#` at the start of a command begins a comment which runs to the end
//! of the line.
//!
//! | Command | Arguments | Effect |
//! |---|---|---|
//! | `CHAN` | channel | MIDI channel index, 0–15 |
//! | `ROOT` | note name | root of the scale, e.g. `C`, `Eb`, `F#` |
//! | `SCALE` | intervals… | semitones above the root, ascending, up to [`MAX_SCALE_NOTES`] |
//! | `OCTAVES` | first last | octaves the scale spans (C3 is MIDI note 60) |
//! | `BPM` | tempo | with `DIV`, sets the auto-repeat rate |
//! | `DIV` | fraction | fraction of a beat between auto-repeated notes |
//! | `MAP` | input \[from_lo from_hi to_lo to_hi\] destination | adds a [`Mapping`], up to [`MAX_MAPPINGS`] |
//! | `END` | | marks the end of the configuration |
//!
//! For example:
//!
//! ```text
//! CHAN 1 ROOT C SCALE 0 1 5 7 10 OCTAVES 2 7 BPM 100 DIV 0.25
//! MAP ax -1 1 48 100 note
//! MAP jx- cc 16
//! MAP jy pb
//! END.
//! ```

mod key;
pub use key::*;

mod mapping;
pub use mapping::*;

mod note_table;
pub use note_table::*;

mod parser;

use crate::{Error, Result, sensor::SensorReading};
use core::fmt;
use embassy_time::Duration;
use tinyvec::ArrayVec;

/// Most `MAP` commands a configuration may contain.
pub const MAX_MAPPINGS: usize = 10;

/// Most intervals a `SCALE` command may list.
pub const MAX_SCALE_NOTES: usize = 16;

/// Longest auto-repeat interval; slower tempos are clamped to it.
const MAX_AUTO_REPEAT_MILLIS: u64 = u32::MAX as u64;

/// Configuration used when nothing valid has been saved yet.
pub const DEFAULT_CONFIG: &str = "
    CHAN 1
    ROOT C
    SCALE 0 1 5 7 10
    OCTAVES 2 7
    BPM 100
    DIV 0.25

    MAP ax -1 1 48 100 note
    MAP jx- cc 16
    MAP jx+ cc 19
    MAP jy pb
    MAP ay cc 17
    MAP az 1 -1 0 127 cc 18

    END.
";

/// The result of successfully parsing a configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Parsed {
    /// The parsed configuration.
    pub config: Config,
    /// The first recoverable problem encountered, if any. Parsing continued with a clamped value, but the performer
    /// should be told.
    pub warning: Option<Error>,
}

/// Everything the device needs to turn sensor readings into MIDI.
///
/// A [`Config`] is only ever produced whole: [`Config::parse`] starts from the defaults and either returns a complete
/// configuration or an error, so a failed parse never leaves a half-applied configuration behind.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    channel: u8,
    root_key: Key,
    scale_intervals: ArrayVec<[u8; MAX_SCALE_NOTES]>,
    first_octave: u8,
    last_octave: u8,
    tempo_bpm: u16,
    note_division: f32,
    mappings: ArrayVec<[Mapping; MAX_MAPPINGS]>,

    // derived from the above by `refresh`
    valid_notes: NoteTable,
    auto_repeat: Duration,
    notes_mapping: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            channel: 1,
            root_key: Key::C,
            scale_intervals: ArrayVec::from_array_len([0, 4, 7, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 3),
            first_octave: 2,
            last_octave: 7,
            tempo_bpm: 100,
            note_division: 0.5,
            mappings: ArrayVec::new(),
            valid_notes: NoteTable::default(),
            auto_repeat: Duration::from_millis(0),
            notes_mapping: None,
        };
        config.refresh();
        config
    }
}

impl Config {
    /// Parses configuration text. Commands not present in the text keep their default values.
    pub fn parse(text: &str) -> Result<Parsed> {
        parser::Parser::new(text).parse()
    }

    /// Recomputes the note table, the auto-repeat interval, and which mapping plays notes.
    fn refresh(&mut self) {
        self.valid_notes = NoteTable::build(
            self.root_key,
            &self.scale_intervals,
            self.first_octave..=self.last_octave,
        );

        // `as` saturates, and negative or NaN divisions become 0
        let millis = (60_000.0 / f32::from(self.tempo_bpm.max(1)) * self.note_division) as u64;
        self.auto_repeat = Duration::from_millis(millis.min(MAX_AUTO_REPEAT_MILLIS));

        self.notes_mapping = self
            .mappings
            .iter()
            .rposition(|mapping| mapping.destination() == Destination::Note);
    }

    /// MIDI channel index, 0–15.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Root of the scale.
    pub fn root_key(&self) -> Key {
        self.root_key
    }

    /// Intervals of the scale, in semitones above the root.
    pub fn scale_intervals(&self) -> &[u8] {
        &self.scale_intervals
    }

    /// First and last octave of the note table, inclusive.
    pub fn octaves(&self) -> (u8, u8) {
        (self.first_octave, self.last_octave)
    }

    /// Getter.
    pub fn tempo_bpm(&self) -> u16 {
        self.tempo_bpm
    }

    /// Fraction of a beat between auto-repeated notes.
    pub fn note_division(&self) -> f32 {
        self.note_division
    }

    /// Mappings in the order they were declared.
    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    /// Notes of the scale across the configured octaves.
    pub fn valid_notes(&self) -> &NoteTable {
        &self.valid_notes
    }

    /// Minimum time between auto-repeated notes.
    pub fn auto_repeat(&self) -> Duration {
        self.auto_repeat
    }

    /// The mapping which selects notes, if any. When several mappings target notes, the last one wins.
    pub fn notes_mapping(&self) -> Option<&Mapping> {
        self.notes_mapping.and_then(|index| self.mappings.get(index))
    }

    /// Returns `true` if there is a note mapping and a non-empty note table.
    pub fn notes_enabled(&self) -> bool {
        self.notes_mapping.is_some() && !self.valid_notes.is_empty()
    }

    /// Evaluates the note mapping against a sample and snaps the result to the scale.
    pub fn mapped_note(&self, reading: &SensorReading) -> Result<u8> {
        let mapping = self.notes_mapping().ok_or(Error::NoteModeUnavailable)?;
        self.valid_notes.quantize(mapping.value(reading))
    }
}

/// Formats the configuration as text which parses back into an equal [`Config`].
impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CHAN {} ROOT {} SCALE", self.channel, self.root_key)?;
        for interval in self.scale_intervals.iter() {
            write!(f, " {interval}")?;
        }
        write!(
            f,
            " OCTAVES {} {} BPM {} DIV {}",
            self.first_octave, self.last_octave, self.tempo_bpm, self.note_division
        )?;
        for mapping in self.mappings.iter() {
            write!(f, " MAP {mapping}")?;
        }
        f.write_str(" END.")
    }
}
