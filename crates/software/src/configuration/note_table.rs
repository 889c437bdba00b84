//! Provides [`NoteTable`], the sorted set of notes belonging to the configured scale, and quantization onto it.

use super::{Key, MAX_SCALE_NOTES};
use crate::{Error, Result};
use core::ops::RangeInclusive;
use tinyvec::ArrayVec;

/// Highest MIDI note number.
const HIGHEST_NOTE: u16 = 127;

/// Octaves are numbered so that C3 is MIDI note 60; octave 0 therefore starts two octaves above MIDI note 0.
const OCTAVE_OFFSET: u16 = 2;

/// Only octaves 0 through 8 contain MIDI notes, which bounds the size of the table.
const MAX_VALID_NOTES: usize = MAX_SCALE_NOTES * 9;

/// The notes of a scale across a range of octaves, ascending.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NoteTable {
    notes: ArrayVec<[u8; MAX_VALID_NOTES]>,
}

impl NoteTable {
    /// Builds the table octave by octave, each octave listing `root` plus every interval, in interval order.
    ///
    /// The result is ascending as long as the intervals are ascending and less than an octave apart; this is not
    /// enforced. Notes above the MIDI range are left out.
    pub fn build(root: Key, intervals: &[u8], octaves: RangeInclusive<u8>) -> Self {
        let mut notes = ArrayVec::new();

        'octaves: for octave in octaves {
            let base = u16::from(root.pitch_class()) + 12 * (u16::from(octave) + OCTAVE_OFFSET);
            for &interval in intervals {
                let note = base + u16::from(interval);
                if note > HIGHEST_NOTE {
                    continue;
                }
                if notes.try_push(note as u8).is_some() {
                    break 'octaves;
                }
            }
        }

        if !notes.is_sorted() {
            warn!("Scale intervals are not ascending; note quantization will be unreliable");
        }

        Self { notes }
    }

    /// Returns `true` if no notes are available, i.e. note mode is disabled.
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// The notes, ascending.
    pub fn as_slice(&self) -> &[u8] {
        &self.notes
    }

    /// The lowest and highest notes, if any.
    pub fn bounds(&self) -> Option<(u8, u8)> {
        Some((*self.notes.first()?, *self.notes.last()?))
    }

    /// Snaps `candidate` to the nearest note in the table. Candidates outside the table's range snap to its lowest or
    /// highest note; a candidate exactly halfway between two notes snaps to the lower one.
    pub fn quantize(&self, candidate: u16) -> Result<u8> {
        let (lowest, highest) = self.bounds().ok_or(Error::NoteModeUnavailable)?;
        if candidate <= u16::from(lowest) {
            return Ok(lowest);
        }

        let index = self.notes.partition_point(|&note| u16::from(note) < candidate);
        let Some(&above) = self.notes.get(index) else {
            return Ok(highest);
        };
        let Some(&below) = index.checked_sub(1).and_then(|i| self.notes.get(i)) else {
            return Ok(above);
        };

        if u16::from(above).abs_diff(candidate) < candidate.abs_diff(u16::from(below)) {
            Ok(above)
        } else {
            Ok(below)
        }
    }
}
