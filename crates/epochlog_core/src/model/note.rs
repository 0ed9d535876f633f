//! Timestamped entity notes and their fixed-width record codec.
//!
//! # Responsibility
//! - Define the immutable `Note` value.
//! - Encode/decode notes to the 56-byte record stored in `notes` datasets.
//!
//! # Invariants
//! - Record layout (little endian): `utc_ticks: i64`, `utc_offset_hours: f64`,
//!   `text: [u8; 40]` UTF-8, zero padded.
//! - Text longer than `NOTE_TEXT_CAPACITY` bytes is rejected, never truncated.
//! - Text must not contain NUL, which is reserved for padding.
//! - Timestamps must be whole ticks; finer precision is rejected, never
//!   rounded.

use crate::model::time::{
    from_utc_ticks, is_tick_exact, to_utc_ticks, utc_offset_hours, Timestamp,
};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Maximum encoded text length in bytes.
pub const NOTE_TEXT_CAPACITY: usize = 40;
const TICKS_LEN: usize = 8;
const OFFSET_LEN: usize = 8;
/// Size of one encoded note record.
pub const NOTE_RECORD_SIZE: usize = TICKS_LEN + OFFSET_LEN + NOTE_TEXT_CAPACITY;

/// One timestamped note attached to an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    timestamp: Timestamp,
    text: String,
}

impl Note {
    /// Builds a note after checking that it can be encoded.
    pub fn new(timestamp: Timestamp, text: impl Into<String>) -> Result<Self, NoteCodecError> {
        let note = Self {
            timestamp,
            text: text.into(),
        };
        note.validate()?;
        Ok(note)
    }

    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn validate(&self) -> Result<(), NoteCodecError> {
        let length = self.text.len();
        if length > NOTE_TEXT_CAPACITY {
            return Err(NoteCodecError::TextTooLong {
                length,
                capacity: NOTE_TEXT_CAPACITY,
            });
        }
        if self.text.contains('\0') {
            return Err(NoteCodecError::InteriorNul);
        }
        if to_utc_ticks(&self.timestamp).is_none() {
            return Err(NoteCodecError::TimestampOutOfRange);
        }
        if !is_tick_exact(&self.timestamp) {
            return Err(NoteCodecError::SubTickPrecision);
        }
        Ok(())
    }
}

/// Errors from note validation and record decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteCodecError {
    /// Encoded text exceeds the fixed text field.
    TextTooLong { length: usize, capacity: usize },
    /// Text contains a NUL byte.
    InteriorNul,
    /// Timestamp cannot be represented as 64-bit ticks.
    TimestampOutOfRange,
    /// Timestamp is finer than one tick.
    SubTickPrecision,
    /// Stored record has the wrong length.
    RecordSize { expected: usize, actual: usize },
    /// Stored ticks/offset do not form a valid timestamp.
    InvalidTimestamp,
    /// Stored text is not UTF-8.
    InvalidText,
}

impl Display for NoteCodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TextTooLong { length, capacity } => write!(
                f,
                "note text is {length} bytes; capacity is {capacity} bytes"
            ),
            Self::InteriorNul => write!(f, "note text must not contain NUL"),
            Self::TimestampOutOfRange => write!(f, "note timestamp is out of range"),
            Self::SubTickPrecision => {
                write!(f, "note timestamp is finer than 100 ns and cannot be stored")
            }
            Self::RecordSize { expected, actual } => write!(
                f,
                "note record is {actual} bytes; expected {expected} bytes"
            ),
            Self::InvalidTimestamp => write!(f, "note record holds an invalid timestamp"),
            Self::InvalidText => write!(f, "note record text is not valid UTF-8"),
        }
    }
}

impl Error for NoteCodecError {}

/// Encodes one note into its fixed-width record.
pub fn encode_note(note: &Note) -> Result<[u8; NOTE_RECORD_SIZE], NoteCodecError> {
    note.validate()?;
    let ticks = to_utc_ticks(&note.timestamp).ok_or(NoteCodecError::TimestampOutOfRange)?;

    let mut record = [0u8; NOTE_RECORD_SIZE];
    record[..TICKS_LEN].copy_from_slice(&ticks.to_le_bytes());
    record[TICKS_LEN..TICKS_LEN + OFFSET_LEN]
        .copy_from_slice(&utc_offset_hours(&note.timestamp).to_le_bytes());
    let text = note.text.as_bytes();
    record[TICKS_LEN + OFFSET_LEN..TICKS_LEN + OFFSET_LEN + text.len()].copy_from_slice(text);
    Ok(record)
}

/// Decodes one stored record back into a note.
pub fn decode_note(record: &[u8]) -> Result<Note, NoteCodecError> {
    if record.len() != NOTE_RECORD_SIZE {
        return Err(NoteCodecError::RecordSize {
            expected: NOTE_RECORD_SIZE,
            actual: record.len(),
        });
    }

    let (ticks_bytes, rest) = record.split_at(TICKS_LEN);
    let (offset_bytes, text_field) = rest.split_at(OFFSET_LEN);
    let ticks = i64::from_le_bytes(
        ticks_bytes
            .try_into()
            .map_err(|_| NoteCodecError::InvalidTimestamp)?,
    );
    let offset_hours = f64::from_le_bytes(
        offset_bytes
            .try_into()
            .map_err(|_| NoteCodecError::InvalidTimestamp)?,
    );
    let timestamp = from_utc_ticks(ticks, offset_hours).ok_or(NoteCodecError::InvalidTimestamp)?;

    let text_len = text_field
        .iter()
        .position(|byte| *byte == 0)
        .unwrap_or(text_field.len());
    let text = std::str::from_utf8(&text_field[..text_len])
        .map_err(|_| NoteCodecError::InvalidText)?
        .to_string();

    Ok(Note { timestamp, text })
}
