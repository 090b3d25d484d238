//! MIDI messages and wire codec
//!
//! Channel messages are decoded from the status byte: the high nibble selects
//! the [`MidiKind`], the low nibble the channel. Channels are 1-16 in the
//! message model and 0-15 on the wire.
//!
//! System exclusive messages are framed by `0xF0 .. 0xF7` and split into
//! manufacturer id, 2-byte sub id and payload:
//!
//! ```text
//! F0 41 10 42 12 40 00 7F 00 41 F7
//!    |  |     |                 |
//!    |  |     payload ...       end
//!    |  sub id (2 bytes)
//!    manufacturer id (1 byte, 3 if the first byte is 0, 2 for 0x7E/0x7F)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::cond::{describe_fields, Cond};
use crate::{Error, PortId, Result};

/// System exclusive start byte
pub const SYSEX_START: u8 = 0xF0;

/// System exclusive end byte
pub const SYSEX_END: u8 = 0xF7;

/// Sub id length of a sysex message
const SYSEX_SUB_ID_LEN: usize = 2;

/// MIDI message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MidiKind {
    NoteOff,
    NoteOn,
    PolyTouch,
    ControlChange,
    ProgramChange,
    Aftertouch,
    PitchBend,
    Sysex,
}

impl MidiKind {
    /// Kind for a status byte
    pub fn from_status(status: u8) -> Option<Self> {
        match status & 0xF0 {
            0x80 => Some(MidiKind::NoteOff),
            0x90 => Some(MidiKind::NoteOn),
            0xA0 => Some(MidiKind::PolyTouch),
            0xB0 => Some(MidiKind::ControlChange),
            0xC0 => Some(MidiKind::ProgramChange),
            0xD0 => Some(MidiKind::Aftertouch),
            0xE0 => Some(MidiKind::PitchBend),
            _ if status == SYSEX_START => Some(MidiKind::Sysex),
            _ => None,
        }
    }

    /// Status high nibble, `None` for sysex
    pub fn status_nibble(self) -> Option<u8> {
        match self {
            MidiKind::NoteOff => Some(0x80),
            MidiKind::NoteOn => Some(0x90),
            MidiKind::PolyTouch => Some(0xA0),
            MidiKind::ControlChange => Some(0xB0),
            MidiKind::ProgramChange => Some(0xC0),
            MidiKind::Aftertouch => Some(0xD0),
            MidiKind::PitchBend => Some(0xE0),
            MidiKind::Sysex => None,
        }
    }

    /// Wire length including the status byte, `None` for sysex
    pub fn wire_len(self) -> Option<usize> {
        match self {
            MidiKind::ProgramChange | MidiKind::Aftertouch => Some(2),
            MidiKind::Sysex => None,
            _ => Some(3),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MidiKind::NoteOff => "NOTE_OFF",
            MidiKind::NoteOn => "NOTE_ON",
            MidiKind::PolyTouch => "POLYTOUCH",
            MidiKind::ControlChange => "CONTROL_CHANGE",
            MidiKind::ProgramChange => "PROGRAM_CHANGE",
            MidiKind::Aftertouch => "AFTERTOUCH",
            MidiKind::PitchBend => "PITCH_BEND",
            MidiKind::Sysex => "SYSEX",
        }
    }
}

impl fmt::Display for MidiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel voice/mode message
#[derive(Debug, Clone)]
pub struct ChannelMsg {
    pub kind: MidiKind,
    /// Channel (1-16)
    pub channel: u8,
    /// Note, controller, program or pressure depending on kind (0-127)
    pub data1: u8,
    /// Velocity or value depending on kind (0-127), 0 for 2-byte kinds
    pub data2: u8,
    /// Input port that produced the message
    pub source: Option<PortId>,
    pub(crate) created_at: Instant,
}

impl ChannelMsg {
    pub fn new(kind: MidiKind, channel: u8, data1: u8, data2: u8) -> Self {
        Self {
            kind,
            channel,
            data1,
            data2,
            source: None,
            created_at: Instant::now(),
        }
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(MidiKind::NoteOn, channel, note, velocity)
    }

    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(MidiKind::NoteOff, channel, note, velocity)
    }

    pub fn poly_touch(channel: u8, note: u8, pressure: u8) -> Self {
        Self::new(MidiKind::PolyTouch, channel, note, pressure)
    }

    pub fn control_change(channel: u8, control: u8, value: u8) -> Self {
        Self::new(MidiKind::ControlChange, channel, control, value)
    }

    pub fn program_change(channel: u8, program: u8) -> Self {
        Self::new(MidiKind::ProgramChange, channel, program, 0)
    }

    pub fn aftertouch(channel: u8, pressure: u8) -> Self {
        Self::new(MidiKind::Aftertouch, channel, pressure, 0)
    }

    /// Pitch bend with a 14-bit value (0-16383, center 8192)
    pub fn pitch_bend(channel: u8, value: u16) -> Self {
        let mut msg = Self::new(MidiKind::PitchBend, channel, 0, 0);
        msg.set_combined_data(value);
        msg
    }

    pub fn with_source(mut self, source: PortId) -> Self {
        self.source = Some(source);
        self
    }

    /// Both data bytes as a 14-bit number
    pub fn combined_data(&self) -> u16 {
        (self.data1 as u16) | ((self.data2 as u16) << 7)
    }

    pub fn set_combined_data(&mut self, value: u16) {
        self.data1 = (value & 0x7F) as u8;
        self.data2 = ((value >> 7) & 0x7F) as u8;
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Encode to wire bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let (nibble, len) = match (self.kind.status_nibble(), self.kind.wire_len()) {
            (Some(nibble), Some(len)) => (nibble, len),
            _ => return Err(Error::UnsupportedStatus(SYSEX_START)),
        };
        if !(1..=16).contains(&self.channel) {
            return Err(Error::ChannelOutOfRange(self.channel));
        }
        check_data_byte(self.data1)?;
        check_data_byte(self.data2)?;

        let status = nibble | (self.channel - 1);
        let bytes = [status, self.data1, self.data2];
        Ok(bytes[..len].to_vec())
    }

    pub fn matches(&self, pattern: &MidiPattern) -> bool {
        pattern.kind.test(&self.kind)
            && pattern.channel.test(&self.channel)
            && pattern.data1.test(&self.data1)
            && pattern.data2.test(&self.data2)
            && pattern.manufacturer.is_any()
            && pattern.sub_id.is_any()
    }
}

impl Default for ChannelMsg {
    fn default() -> Self {
        Self::new(MidiKind::ControlChange, 1, 0, 127)
    }
}

impl PartialEq for ChannelMsg {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.channel == other.channel
            && self.data1 == other.data1
            && self.data2 == other.data2
    }
}

impl Eq for ChannelMsg {}

impl fmt::Display for ChannelMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {} | {}",
            self.kind, self.channel, self.data1, self.data2
        )
    }
}

/// System exclusive message
#[derive(Debug, Clone)]
pub struct SysexMsg {
    /// Manufacturer id (1, 2 or 3 bytes)
    pub manufacturer: Vec<u8>,
    /// Sub id: model, device, command (2 bytes)
    pub sub_id: Vec<u8>,
    /// Remaining data
    pub payload: Vec<u8>,
    /// Input port that produced the message
    pub source: Option<PortId>,
    pub(crate) created_at: Instant,
}

impl SysexMsg {
    /// Build from parts; consistency is checked when encoding
    pub fn new(manufacturer: Vec<u8>, sub_id: Vec<u8>, payload: Vec<u8>) -> Self {
        Self {
            manufacturer,
            sub_id,
            payload,
            source: None,
            created_at: Instant::now(),
        }
    }

    /// Decode a complete `F0 .. F7` message
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 || bytes[0] != SYSEX_START || bytes[bytes.len() - 1] != SYSEX_END {
            return Err(Error::InvalidSysex(
                "message must start with 0xF0 and end with 0xF7".to_string(),
            ));
        }

        let body = &bytes[1..bytes.len() - 1];
        let id_len = match body.first() {
            Some(first) => manufacturer_id_len(*first),
            None => return Err(Error::InvalidSysex("empty payload".to_string())),
        };

        let minimal_len = 1 + id_len + SYSEX_SUB_ID_LEN + 1;
        if bytes.len() < minimal_len {
            return Err(Error::InvalidSysex(format!(
                "message should be at least {} bytes including 0xF0 and 0xF7, it has only {}",
                minimal_len,
                bytes.len()
            )));
        }
        check_seven_bit(body)?;

        Ok(Self::new(
            body[..id_len].to_vec(),
            body[id_len..id_len + SYSEX_SUB_ID_LEN].to_vec(),
            body[id_len + SYSEX_SUB_ID_LEN..].to_vec(),
        ))
    }

    /// Whole message including the `0xF0` and `0xF7` delimiters
    pub fn combined_data(&self) -> Result<Vec<u8>> {
        let first = *self
            .manufacturer
            .first()
            .ok_or_else(|| Error::InvalidSysex("empty manufacturer id".to_string()))?;

        let expected = manufacturer_id_len(first);
        if self.manufacturer.len() != expected {
            return Err(Error::InvalidSysex(format!(
                "manufacturer id starting with 0x{:02x} must be {} byte(s), got {}",
                first,
                expected,
                self.manufacturer.len()
            )));
        }
        if self.sub_id.len() != SYSEX_SUB_ID_LEN {
            return Err(Error::InvalidSysex(format!(
                "sub id must be {} bytes, got {}",
                SYSEX_SUB_ID_LEN,
                self.sub_id.len()
            )));
        }

        let mut bytes = Vec::with_capacity(
            2 + self.manufacturer.len() + self.sub_id.len() + self.payload.len(),
        );
        bytes.push(SYSEX_START);
        bytes.extend_from_slice(&self.manufacturer);
        bytes.extend_from_slice(&self.sub_id);
        bytes.extend_from_slice(&self.payload);
        check_seven_bit(&bytes[1..])?;
        bytes.push(SYSEX_END);
        Ok(bytes)
    }

    pub fn with_source(mut self, source: PortId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn matches(&self, pattern: &MidiPattern) -> bool {
        pattern.kind.test(&MidiKind::Sysex)
            && pattern.channel.is_any()
            && pattern.data1.is_any()
            && pattern.data2.is_any()
            && pattern.manufacturer.test(&self.manufacturer)
            && pattern.sub_id.test(&self.sub_id)
    }
}

impl PartialEq for SysexMsg {
    fn eq(&self, other: &Self) -> bool {
        self.manufacturer == other.manufacturer
            && self.sub_id == other.sub_id
            && self.payload == other.payload
    }
}

impl Eq for SysexMsg {}

impl fmt::Display for SysexMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SYSEX | {}", hex(&self.manufacturer))?;
        write!(f, " | {}", hex(&self.sub_id))?;
        if !self.payload.is_empty() {
            write!(f, " | {}", hex(&self.payload))?;
        }
        Ok(())
    }
}

/// Any MIDI message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMsg {
    Channel(ChannelMsg),
    Sysex(SysexMsg),
}

impl MidiMsg {
    pub fn kind(&self) -> MidiKind {
        match self {
            MidiMsg::Channel(msg) => msg.kind,
            MidiMsg::Sysex(_) => MidiKind::Sysex,
        }
    }

    pub fn source(&self) -> Option<&PortId> {
        match self {
            MidiMsg::Channel(msg) => msg.source.as_ref(),
            MidiMsg::Sysex(msg) => msg.source.as_ref(),
        }
    }

    pub fn set_source(&mut self, source: Option<PortId>) {
        match self {
            MidiMsg::Channel(msg) => msg.source = source,
            MidiMsg::Sysex(msg) => msg.source = source,
        }
    }

    pub fn created_at(&self) -> Instant {
        match self {
            MidiMsg::Channel(msg) => msg.created_at,
            MidiMsg::Sysex(msg) => msg.created_at,
        }
    }

    pub fn matches(&self, pattern: &MidiPattern) -> bool {
        match self {
            MidiMsg::Channel(msg) => msg.matches(pattern),
            MidiMsg::Sysex(msg) => msg.matches(pattern),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(self)
    }
}

impl From<ChannelMsg> for MidiMsg {
    fn from(msg: ChannelMsg) -> Self {
        MidiMsg::Channel(msg)
    }
}

impl From<SysexMsg> for MidiMsg {
    fn from(msg: SysexMsg) -> Self {
        MidiMsg::Sysex(msg)
    }
}

impl fmt::Display for MidiMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiMsg::Channel(msg) => msg.fmt(f),
            MidiMsg::Sysex(msg) => msg.fmt(f),
        }
    }
}

/// Conditions on MIDI message fields
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MidiPattern {
    pub kind: Cond<MidiKind>,
    pub channel: Cond<u8>,
    pub data1: Cond<u8>,
    pub data2: Cond<u8>,
    /// Sysex only
    pub manufacturer: Cond<Vec<u8>>,
    /// Sysex only
    pub sub_id: Cond<Vec<u8>>,
}

impl MidiPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: MidiKind) -> Self {
        self.kind = Cond::Eq(kind);
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = MidiKind>) -> Self {
        self.kind = Cond::one_of(kinds);
        self
    }

    pub fn channel(mut self, channel: u8) -> Self {
        self.channel = Cond::Eq(channel);
        self
    }

    pub fn channels(mut self, channels: impl IntoIterator<Item = u8>) -> Self {
        self.channel = Cond::one_of(channels);
        self
    }

    pub fn data1(mut self, data1: u8) -> Self {
        self.data1 = Cond::Eq(data1);
        self
    }

    pub fn data1_in(mut self, values: impl IntoIterator<Item = u8>) -> Self {
        self.data1 = Cond::one_of(values);
        self
    }

    pub fn data2(mut self, data2: u8) -> Self {
        self.data2 = Cond::Eq(data2);
        self
    }

    pub fn data2_in(mut self, values: impl IntoIterator<Item = u8>) -> Self {
        self.data2 = Cond::one_of(values);
        self
    }

    pub fn manufacturer(mut self, manufacturer: impl Into<Vec<u8>>) -> Self {
        self.manufacturer = Cond::Eq(manufacturer.into());
        self
    }

    pub fn sub_id(mut self, sub_id: impl Into<Vec<u8>>) -> Self {
        self.sub_id = Cond::Eq(sub_id.into());
        self
    }
}

impl fmt::Display for MidiPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&describe_fields([
            self.kind.describe("kind"),
            self.channel.describe("channel"),
            self.data1.describe("data1"),
            self.data2.describe("data2"),
            self.manufacturer.describe("manufacturer"),
            self.sub_id.describe("sub_id"),
        ]))
    }
}

/// Decode wire bytes into a MIDI message
pub fn decode(bytes: &[u8]) -> Result<MidiMsg> {
    let status = *bytes.first().ok_or(Error::Truncated {
        status: 0,
        needed: 1,
        have: 0,
    })?;

    if status == SYSEX_START {
        return SysexMsg::parse(bytes).map(MidiMsg::Sysex);
    }

    let kind = match MidiKind::from_status(status) {
        Some(kind) if status < SYSEX_START => kind,
        _ => return Err(Error::UnsupportedStatus(status)),
    };

    // Channel kinds always have a wire length
    let needed = kind.wire_len().unwrap_or(3);
    if bytes.len() < needed {
        return Err(Error::Truncated {
            status,
            needed,
            have: bytes.len(),
        });
    }

    let data1 = check_data_byte(bytes[1])?;
    let data2 = if needed == 3 {
        check_data_byte(bytes[2])?
    } else {
        0
    };

    Ok(MidiMsg::Channel(ChannelMsg::new(
        kind,
        (status & 0x0F) + 1,
        data1,
        data2,
    )))
}

/// Encode a MIDI message to wire bytes
pub fn encode(msg: &MidiMsg) -> Result<Vec<u8>> {
    match msg {
        MidiMsg::Channel(msg) => msg.to_bytes(),
        MidiMsg::Sysex(msg) => msg.combined_data(),
    }
}

/// Manufacturer id length implied by its first byte
pub fn manufacturer_id_len(first: u8) -> usize {
    match first {
        0 => 3,
        126 | 127 => 2,
        _ => 1,
    }
}

fn check_data_byte(byte: u8) -> Result<u8> {
    if byte > 0x7F {
        Err(Error::DataOutOfRange(byte))
    } else {
        Ok(byte)
    }
}

fn check_seven_bit(bytes: &[u8]) -> Result<()> {
    match bytes.iter().find(|b| **b > 0x7F) {
        Some(byte) => Err(Error::InvalidSysex(format!(
            "data byte 0x{:02x} has the high bit set",
            byte
        ))),
        None => Ok(()),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
