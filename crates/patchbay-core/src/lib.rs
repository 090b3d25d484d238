//! Patchbay Core
//!
//! Message model, pattern matching and wire codecs for patchbay.
//!
//! This crate provides:
//! - The message envelope ([`Msg`]) and its typed variants
//! - Structural patterns ([`Pattern`], [`Cond`])
//! - The MIDI wire codec ([`midi::decode`], [`midi::encode`])
//! - The remote-script control map ([`RemoteMap`])
//! - The OSC value model ([`OscValue`])

pub mod ableton;
pub mod cond;
pub mod error;
pub mod midi;
pub mod osc;
pub mod types;

pub use ableton::{AbletonEvent, AbletonMsg, AbletonPattern, AbletonValue, RemoteMap};
pub use cond::Cond;
pub use error::{Error, Result};
pub use midi::{ChannelMsg, MidiKind, MidiMsg, MidiPattern, SysexMsg};
pub use osc::{OscMsg, OscPattern, OscValue};
pub use types::*;

/// Default OSC UDP port used by the CLI
pub const DEFAULT_OSC_PORT: u16 = 9000;
