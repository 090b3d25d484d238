//! Message envelope, port identity and patterns

use std::fmt;
use std::time::{Duration, Instant};

use crate::ableton::{AbletonMsg, AbletonPattern};
use crate::cond::{describe_fields, Cond};
use crate::midi::{ChannelMsg, MidiMsg, MidiPattern, SysexMsg};
use crate::osc::{OscMsg, OscPattern};

/// Port identity: port type plus user or forced uid
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId {
    pub kind: &'static str,
    pub uid: String,
}

impl PortId {
    pub fn new(kind: &'static str, uid: impl Into<String>) -> Self {
        Self {
            kind,
            uid: uid.into(),
        }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.kind, self.uid)
    }
}

/// Kinds of the synthetic events produced by the router and timer ports
pub mod event_kind {
    /// First open of an input
    pub const PORT_OPEN: &str = "PORT OPEN";
    /// Metronome tick
    pub const CLICK: &str = "Click";
    /// MIDI device list changed
    pub const MIDI_PORTS_CHANGED: &str = "MIDI Ports Changed";
}

/// Synthetic message
#[derive(Debug, Clone)]
pub struct EventMsg {
    pub kind: String,
    /// Input port that produced the message
    pub source: Option<PortId>,
    pub(crate) created_at: Instant,
}

impl EventMsg {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            source: None,
            created_at: Instant::now(),
        }
    }

    pub fn with_source(mut self, source: PortId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn matches(&self, pattern: &EventPattern) -> bool {
        pattern.kind.test(&self.kind)
    }
}

impl PartialEq for EventMsg {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for EventMsg {}

impl fmt::Display for EventMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)
    }
}

/// Conditions on synthetic messages
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventPattern {
    pub kind: Cond<String>,
}

impl EventPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Cond::Eq(kind.into());
        self
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&describe_fields([self.kind.describe("kind")]))
    }
}

/// Any message routed between ports
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    Midi(MidiMsg),
    Osc(OscMsg),
    Ableton(AbletonMsg),
    Event(EventMsg),
}

impl Msg {
    /// Short name of the variant
    pub fn type_name(&self) -> &'static str {
        match self {
            Msg::Midi(MidiMsg::Channel(_)) => "ChannelMsg",
            Msg::Midi(MidiMsg::Sysex(_)) => "SysexMsg",
            Msg::Osc(_) => "OscMsg",
            Msg::Ableton(_) => "AbletonMsg",
            Msg::Event(_) => "Msg",
        }
    }

    pub fn source(&self) -> Option<&PortId> {
        match self {
            Msg::Midi(msg) => msg.source(),
            Msg::Osc(msg) => msg.source.as_ref(),
            Msg::Ableton(msg) => msg.source.as_ref(),
            Msg::Event(msg) => msg.source.as_ref(),
        }
    }

    pub fn set_source(&mut self, source: Option<PortId>) {
        match self {
            Msg::Midi(msg) => msg.set_source(source),
            Msg::Osc(msg) => msg.source = source,
            Msg::Ableton(msg) => msg.source = source,
            Msg::Event(msg) => msg.source = source,
        }
    }

    pub fn with_source(mut self, source: PortId) -> Self {
        self.set_source(Some(source));
        self
    }

    pub fn created_at(&self) -> Instant {
        match self {
            Msg::Midi(msg) => msg.created_at(),
            Msg::Osc(msg) => msg.created_at,
            Msg::Ableton(msg) => msg.created_at,
            Msg::Event(msg) => msg.created_at,
        }
    }

    /// Time since construction
    pub fn age(&self) -> Duration {
        self.created_at().elapsed()
    }

    /// True when every condition of the pattern holds
    pub fn matches(&self, pattern: &Pattern) -> bool {
        match (self, pattern) {
            (Msg::Midi(msg), Pattern::Midi(p)) => msg.matches(p),
            (Msg::Osc(msg), Pattern::Osc(p)) => msg.matches(p),
            (Msg::Ableton(msg), Pattern::Ableton(p)) => msg.matches(p),
            (Msg::Event(msg), Pattern::Event(p)) => msg.matches(p),
            _ => false,
        }
    }

    pub fn as_midi(&self) -> Option<&MidiMsg> {
        match self {
            Msg::Midi(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<&ChannelMsg> {
        match self {
            Msg::Midi(MidiMsg::Channel(msg)) => Some(msg),
            _ => None,
        }
    }

    pub fn as_osc(&self) -> Option<&OscMsg> {
        match self {
            Msg::Osc(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn as_ableton(&self) -> Option<&AbletonMsg> {
        match self {
            Msg::Ableton(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn as_event(&self) -> Option<&EventMsg> {
        match self {
            Msg::Event(msg) => Some(msg),
            _ => None,
        }
    }
}

impl From<MidiMsg> for Msg {
    fn from(msg: MidiMsg) -> Self {
        Msg::Midi(msg)
    }
}

impl From<ChannelMsg> for Msg {
    fn from(msg: ChannelMsg) -> Self {
        Msg::Midi(MidiMsg::Channel(msg))
    }
}

impl From<SysexMsg> for Msg {
    fn from(msg: SysexMsg) -> Self {
        Msg::Midi(MidiMsg::Sysex(msg))
    }
}

impl From<OscMsg> for Msg {
    fn from(msg: OscMsg) -> Self {
        Msg::Osc(msg)
    }
}

impl From<AbletonMsg> for Msg {
    fn from(msg: AbletonMsg) -> Self {
        Msg::Ableton(msg)
    }
}

impl From<EventMsg> for Msg {
    fn from(msg: EventMsg) -> Self {
        Msg::Event(msg)
    }
}

impl fmt::Display for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Msg::Midi(msg) => msg.fmt(f),
            Msg::Osc(msg) => msg.fmt(f),
            Msg::Ableton(msg) => msg.fmt(f),
            Msg::Event(msg) => msg.fmt(f),
        }
    }
}

/// Structural pattern over one message variant
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Midi(MidiPattern),
    Osc(OscPattern),
    Ableton(AbletonPattern),
    Event(EventPattern),
}

impl From<MidiPattern> for Pattern {
    fn from(p: MidiPattern) -> Self {
        Pattern::Midi(p)
    }
}

impl From<OscPattern> for Pattern {
    fn from(p: OscPattern) -> Self {
        Pattern::Osc(p)
    }
}

impl From<AbletonPattern> for Pattern {
    fn from(p: AbletonPattern) -> Self {
        Pattern::Ableton(p)
    }
}

impl From<EventPattern> for Pattern {
    fn from(p: EventPattern) -> Self {
        Pattern::Event(p)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Midi(p) => write!(f, "Midi({})", p),
            Pattern::Osc(p) => write!(f, "Osc({})", p),
            Pattern::Ableton(p) => write!(f, "Ableton({})", p),
            Pattern::Event(p) => write!(f, "Event({})", p),
        }
    }
}
