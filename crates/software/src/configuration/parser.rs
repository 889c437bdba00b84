//! Turns configuration text into a [`Config`].
//!
//! The parser walks an immutable `&str` with a byte cursor. Tokens are separated by ASCII whitespace, so every token
//! boundary is also a `char` boundary and tokens can be handed out as `&str` slices for diagnostics.

use super::{Config, Destination, Input, Key, MAX_MAPPINGS, MAX_SCALE_NOTES, Mapping, PITCH_BEND_MAX, Parsed};
use crate::{Error, Result};
use num_traits::{Bounded, FromPrimitive, ToPrimitive};
use tinyvec::ArrayVec;

/// Highest MIDI channel index.
const MAX_CHANNEL: u8 = 15;

/// Highest MIDI controller number.
const MAX_CONTROLLER: u8 = 127;

/// Output range of a mapping which doesn't declare one.
const DEFAULT_RANGE: (u16, u16) = (0, 127);

pub(super) struct Parser<'a> {
    text: &'a str,
    cursor: usize,
    /// 1-based number of the command being parsed, for diagnostics.
    command: usize,
    warning: Option<Error>,
}

impl<'a> Parser<'a> {
    pub(super) fn new(text: &'a str) -> Self {
        Self {
            text,
            cursor: 0,
            command: 1,
            warning: None,
        }
    }

    pub(super) fn parse(mut self) -> Result<Parsed> {
        let mut config = Config::default();
        config.mappings.clear();
        // note mappings without an explicit range span the whole note table, which is only known at the end
        let mut spanning_note_table: ArrayVec<[usize; MAX_MAPPINGS]> = ArrayVec::new();

        while let Some(byte) = self.peek_byte() {
            if byte == b'#' {
                self.skip_comment();
                continue;
            }

            let (position, command) = self.token()?;
            match command.as_bytes()[0] {
                b'C' => {
                    let position = self.position();
                    let channel: u8 = self.integer()?;
                    if channel > MAX_CHANNEL {
                        self.recover(Error::OutOfRange(position), "channel");
                    }
                    config.channel = channel.min(MAX_CHANNEL);
                }
                b'R' => {
                    let (position, token) = self.token()?;
                    config.root_key = Key::parse(token).ok_or_else(|| self.malformed(position, token, "key"))?;
                }
                b'S' => config.scale_intervals = self.scale()?,
                b'O' => {
                    config.first_octave = self.integer()?;
                    config.last_octave = self.integer()?;
                }
                b'B' => {
                    let position = self.position();
                    let tempo: u16 = self.integer()?;
                    if tempo == 0 {
                        self.recover(Error::OutOfRange(position), "0");
                    }
                    config.tempo_bpm = tempo.max(1);
                }
                b'D' => config.note_division = self.float()?,
                b'M' => {
                    if config.mappings.len() == MAX_MAPPINGS {
                        error!("{}: too many mappings (at most {})", self.command, MAX_MAPPINGS);
                        return Err(Error::TooManyMappings);
                    }
                    let (mapping, explicit_range) = self.mapping()?;
                    if mapping.destination() == Destination::Note && !explicit_range {
                        spanning_note_table.push(config.mappings.len());
                    }
                    config.mappings.push(mapping);
                }
                b'E' => {}
                _ => {
                    error!(
                        "{}: unknown command '{}' at char {}",
                        self.command, command, position
                    );
                    return Err(Error::MalformedToken(position));
                }
            }

            self.command += 1;
        }

        config.refresh();
        if let Some((lowest, highest)) = config.valid_notes.bounds() {
            for &index in spanning_note_table.iter() {
                config.mappings[index].set_range(lowest.into(), highest.into());
            }
        }

        match self.warning {
            None => info!("Read config successfully"),
            Some(_) => warn!("Read config with clamped values"),
        }

        Ok(Parsed {
            config,
            warning: self.warning,
        })
    }

    /// Parses the arguments of `MAP`. Also returns whether the output range was given explicitly.
    fn mapping(&mut self) -> Result<(Mapping, bool)> {
        let (position, token) = self.token()?;
        let input = Input::parse(token).ok_or_else(|| self.malformed(position, token, "input"))?;

        // the four remap values are optional as a group; a letter means the destination follows immediately
        let explicit_range = self
            .peek_token()
            .is_some_and(|token| !token.as_bytes()[0].is_ascii_alphabetic());
        let (from, to_position, mut to) = if explicit_range {
            let from = (self.float()?, self.float()?);
            let to_position = self.position();
            (from, to_position, (self.integer()?, self.integer()?))
        } else {
            (input.default_domain(), self.position(), DEFAULT_RANGE)
        };

        let (position, token) = self.token()?;
        let destination = match token.as_bytes()[0].to_ascii_lowercase() {
            b'c' => {
                let position = self.position();
                let controller: u8 = self.integer()?;
                if controller > MAX_CONTROLLER {
                    self.recover(Error::OutOfRange(position), "controller");
                }
                Destination::ControlChange(controller.min(MAX_CONTROLLER))
            }
            b'p' => {
                if !explicit_range {
                    to = (0, PITCH_BEND_MAX);
                }
                Destination::PitchBend
            }
            b'n' => Destination::Note,
            _ => return Err(self.malformed(position, token, "destination")),
        };

        let mapping = Mapping::new(input, from, to, destination).ok_or_else(|| {
            error!(
                "{}: output range {}..{} is reversed at char {}",
                self.command, to.0, to.1, to_position
            );
            Error::MalformedToken(to_position)
        })?;
        Ok((mapping, explicit_range))
    }

    /// Parses the intervals of `SCALE`: every following token that starts with a digit.
    fn scale(&mut self) -> Result<ArrayVec<[u8; MAX_SCALE_NOTES]>> {
        let mut intervals = ArrayVec::new();
        while self
            .peek_token()
            .is_some_and(|token| token.as_bytes()[0].is_ascii_digit())
        {
            if intervals.len() == MAX_SCALE_NOTES {
                error!("{}: too many scale notes (at most {})", self.command, MAX_SCALE_NOTES);
                return Err(Error::TooManyScaleNotes);
            }
            intervals.push(self.integer()?);
        }
        Ok(intervals)
    }

    /// Parses a decimal integer with an optional sign. Values which don't fit `T` are clamped into its range and
    /// recorded as a warning; tokens which aren't integers at all are errors.
    fn integer<T>(&mut self) -> Result<T>
    where
        T: Bounded + FromPrimitive + ToPrimitive,
    {
        let (position, token) = self.token()?;
        let value = parse_integer(token).ok_or_else(|| self.malformed(position, token, "integer"))?;

        if let Some(value) = T::from_i64(value) {
            return Ok(value);
        }

        self.recover(Error::OutOfRange(position), token);
        let lowest = T::min_value().to_i64().unwrap_or(i64::MIN);
        let highest = T::max_value().to_i64().unwrap_or(i64::MAX);
        T::from_i64(value.clamp(lowest, highest)).ok_or(Error::OutOfRange(position))
    }

    fn float(&mut self) -> Result<f32> {
        let (position, token) = self.token()?;
        token
            .parse::<f32>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| self.malformed(position, token, "number"))
    }

    /// Records a recoverable problem. Only the first is kept.
    fn recover(&mut self, warning: Error, token: &str) {
        warn!("{}: '{}' is out of range and was clamped", self.command, token);
        if self.warning.is_none() {
            self.warning = Some(warning);
        }
    }

    fn malformed(&self, position: usize, token: &str, expected: &str) -> Error {
        error!(
            "{}: expected {} but found '{}' at char {}",
            self.command, expected, token, position
        );
        Error::MalformedToken(position)
    }

    /// Consumes the next token, failing if the text has run out.
    fn token(&mut self) -> Result<(usize, &'a str)> {
        let position = self.position();
        let end = self.text[position..]
            .find(|c: char| c.is_ascii_whitespace())
            .map_or(self.text.len(), |length| position + length);
        if end == position {
            error!("{}: unexpected end of configuration", self.command);
            return Err(Error::MalformedToken(position));
        }

        self.cursor = end;
        Ok((position, &self.text[position..end]))
    }

    fn peek_token(&mut self) -> Option<&'a str> {
        let cursor = self.cursor;
        let token = self.token().ok().map(|(_, token)| token);
        self.cursor = cursor;
        token
    }

    /// Skips whitespace and returns the offset of the next token.
    fn position(&mut self) -> usize {
        while self.peek_raw().is_some_and(|byte| byte.is_ascii_whitespace()) {
            self.cursor += 1;
        }
        self.cursor
    }

    fn peek_byte(&mut self) -> Option<u8> {
        self.position();
        self.peek_raw()
    }

    fn peek_raw(&self) -> Option<u8> {
        self.text.as_bytes().get(self.cursor).copied()
    }

    fn skip_comment(&mut self) {
        self.cursor = self.text[self.cursor..]
            .find(['\n', '\r'])
            .map_or(self.text.len(), |length| self.cursor + length);
    }
}

/// Parses an optionally signed run of ASCII digits, saturating rather than overflowing.
fn parse_integer(token: &str) -> Option<i64> {
    let (negative, digits) = match token.as_bytes().first()? {
        b'-' => (true, &token[1..]),
        b'+' => (false, &token[1..]),
        _ => (false, token),
    };
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    let magnitude = digits.bytes().fold(0_i64, |acc, digit| {
        acc.saturating_mul(10).saturating_add(i64::from(digit - b'0'))
    });
    Some(if negative { -magnitude } else { magnitude })
}
