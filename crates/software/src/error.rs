/// Everything that can go wrong while parsing, evaluating, or persisting a configuration.
///
/// Positions are byte offsets into the configuration text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A command, key, input, destination, or number could not be understood (or the text ended where one was expected).
    #[error("malformed token at char {0}")]
    MalformedToken(usize),
    /// An integer did not fit the width of its field. The parser recovers from this by clamping.
    #[error("integer out of range at char {0}")]
    OutOfRange(usize),
    /// More `MAP` commands than [`MAX_MAPPINGS`](crate::configuration::MAX_MAPPINGS).
    #[error("too many mappings")]
    TooManyMappings,
    /// More `SCALE` intervals than [`MAX_SCALE_NOTES`](crate::configuration::MAX_SCALE_NOTES).
    #[error("too many scale notes")]
    TooManyScaleNotes,
    /// A note was requested but there is no note mapping or the note table is empty.
    #[error("note mode unavailable")]
    NoteModeUnavailable,
    /// The text (plus header and terminator) does not fit in the save slot.
    #[error("configuration too large for the save slot")]
    StorageCapacityExceeded,
    /// The save slot holds no complete record.
    #[error("no valid configuration saved")]
    StorageInvalid,
    /// The storage medium's page or sector layout cannot hold the record format.
    #[error("unsupported storage geometry")]
    UnsupportedGeometry,
    /// The storage medium reported a failure while reading, erasing, or programming.
    #[error("storage medium failure")]
    Storage,
}

impl Error {
    /// Byte offset into the configuration text of the token at fault, for errors which have one.
    pub fn position(&self) -> Option<usize> {
        match *self {
            Self::MalformedToken(position) | Self::OutOfRange(position) => Some(position),
            _ => None,
        }
    }
}

/// Shorthand for results carrying this crate's [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
