//! Error types for patchbay messages and codecs

use thiserror::Error;

use crate::ableton::AbletonEvent;

/// Result type alias for patchbay core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed system exclusive data
    #[error("invalid sysex: {0}")]
    InvalidSysex(String),

    /// Status byte that is not a supported channel or sysex message
    #[error("unsupported MIDI status byte: 0x{0:02x}")]
    UnsupportedStatus(u8),

    /// Fewer bytes than the message kind requires
    #[error("truncated MIDI message: status 0x{status:02x} needs {needed} bytes, got {have}")]
    Truncated { status: u8, needed: usize, have: usize },

    /// Channel outside 1-16
    #[error("MIDI channel out of range: {0} (expected 1-16)")]
    ChannelOutOfRange(u8),

    /// Data byte with the high bit set
    #[error("MIDI data byte out of range: {0} (expected 0-127)")]
    DataOutOfRange(u8),

    /// Remote event/index combination missing from the CC table
    #[error("no remote mapping for {event}{}", index.map(|i| format!("[{}]", i)).unwrap_or_default())]
    UnmappedEvent {
        event: AbletonEvent,
        index: Option<usize>,
    },

    /// Invalid network endpoint
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}
