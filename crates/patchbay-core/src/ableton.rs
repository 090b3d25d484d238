//! Remote-script control protocol
//!
//! The DAW side remote script speaks plain control change messages on MIDI
//! channel 15. Each controller number is assigned to a semantic
//! [`AbletonEvent`]; list entries (per-track controls, encoders) cover a run of
//! consecutive controllers and are addressed by index.
//!
//! Both translation directions are derived from the single [`TABLE`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::cond::{describe_fields, Cond};
use crate::midi::{ChannelMsg, MidiKind};
use crate::{Error, PortId, Result};

/// Channel used by the remote script
pub const REMOTE_CHANNEL: u8 = 15;

/// Message kind used by the remote script
pub const REMOTE_KIND: MidiKind = MidiKind::ControlChange;

/// Remote-script event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbletonEvent {
    Encoder,
    DeviceBank,
    DeviceBankNext,
    DeviceBankPrev,
    DeviceToggle,
    DeviceLock,
    TrackVol,
    TrackSendA,
    TrackSendB,
    TrackMute,
    TrackSolo,
    TrackSelect,
    TrackArm,
    #[serde(rename = "TRACK_NEXT_8")]
    TrackNext8,
    #[serde(rename = "TRACK_PREV_8")]
    TrackPrev8,
    MasterVol,
    CueVol,
    Crossfader,
    Stop,
    Play,
    Rec,
    SessionRec,
    Overdub,
    Metronome,
    Loop,
    Rewind,
    Forward,
    PunchIn,
    PunchOut,
    NudgeUp,
    NudgeDown,
    TapTempo,
    /// Controller without an assignment
    Unsupported,
}

impl AbletonEvent {
    pub const ALL: [AbletonEvent; 33] = [
        AbletonEvent::Encoder,
        AbletonEvent::DeviceBank,
        AbletonEvent::DeviceBankNext,
        AbletonEvent::DeviceBankPrev,
        AbletonEvent::DeviceToggle,
        AbletonEvent::DeviceLock,
        AbletonEvent::TrackVol,
        AbletonEvent::TrackSendA,
        AbletonEvent::TrackSendB,
        AbletonEvent::TrackMute,
        AbletonEvent::TrackSolo,
        AbletonEvent::TrackSelect,
        AbletonEvent::TrackArm,
        AbletonEvent::TrackNext8,
        AbletonEvent::TrackPrev8,
        AbletonEvent::MasterVol,
        AbletonEvent::CueVol,
        AbletonEvent::Crossfader,
        AbletonEvent::Stop,
        AbletonEvent::Play,
        AbletonEvent::Rec,
        AbletonEvent::SessionRec,
        AbletonEvent::Overdub,
        AbletonEvent::Metronome,
        AbletonEvent::Loop,
        AbletonEvent::Rewind,
        AbletonEvent::Forward,
        AbletonEvent::PunchIn,
        AbletonEvent::PunchOut,
        AbletonEvent::NudgeUp,
        AbletonEvent::NudgeDown,
        AbletonEvent::TapTempo,
        AbletonEvent::Unsupported,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AbletonEvent::Encoder => "ENCODER",
            AbletonEvent::DeviceBank => "DEVICE_BANK",
            AbletonEvent::DeviceBankNext => "DEVICE_BANK_NEXT",
            AbletonEvent::DeviceBankPrev => "DEVICE_BANK_PREV",
            AbletonEvent::DeviceToggle => "DEVICE_TOGGLE",
            AbletonEvent::DeviceLock => "DEVICE_LOCK",
            AbletonEvent::TrackVol => "TRACK_VOL",
            AbletonEvent::TrackSendA => "TRACK_SEND_A",
            AbletonEvent::TrackSendB => "TRACK_SEND_B",
            AbletonEvent::TrackMute => "TRACK_MUTE",
            AbletonEvent::TrackSolo => "TRACK_SOLO",
            AbletonEvent::TrackSelect => "TRACK_SELECT",
            AbletonEvent::TrackArm => "TRACK_ARM",
            AbletonEvent::TrackNext8 => "TRACK_NEXT_8",
            AbletonEvent::TrackPrev8 => "TRACK_PREV_8",
            AbletonEvent::MasterVol => "MASTER_VOL",
            AbletonEvent::CueVol => "CUE_VOL",
            AbletonEvent::Crossfader => "CROSSFADER",
            AbletonEvent::Stop => "STOP",
            AbletonEvent::Play => "PLAY",
            AbletonEvent::Rec => "REC",
            AbletonEvent::SessionRec => "SESSION_REC",
            AbletonEvent::Overdub => "OVERDUB",
            AbletonEvent::Metronome => "METRONOME",
            AbletonEvent::Loop => "LOOP",
            AbletonEvent::Rewind => "REWIND",
            AbletonEvent::Forward => "FORWARD",
            AbletonEvent::PunchIn => "PUNCH_IN",
            AbletonEvent::PunchOut => "PUNCH_OUT",
            AbletonEvent::NudgeUp => "NUDGE_UP",
            AbletonEvent::NudgeDown => "NUDGE_DOWN",
            AbletonEvent::TapTempo => "TAP_TEMPO",
            AbletonEvent::Unsupported => "UNSUPPORTED",
        }
    }
}

impl fmt::Display for AbletonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AbletonEvent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        AbletonEvent::ALL
            .iter()
            .copied()
            .find(|event| event.as_str() == upper)
            .ok_or_else(|| format!("unknown remote event: {}", s))
    }
}

/// Value carried by a remote event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AbletonValue {
    /// Button state
    Toggle(bool),
    /// Continuous level (0-127)
    Level(u8),
}

impl AbletonValue {
    /// Controller value on the wire
    pub fn to_cc_value(self) -> u8 {
        match self {
            AbletonValue::Toggle(true) => 127,
            AbletonValue::Toggle(false) => 0,
            AbletonValue::Level(v) => v,
        }
    }
}

impl From<bool> for AbletonValue {
    fn from(v: bool) -> Self {
        AbletonValue::Toggle(v)
    }
}

impl From<u8> for AbletonValue {
    fn from(v: u8) -> Self {
        AbletonValue::Level(v)
    }
}

impl fmt::Display for AbletonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbletonValue::Toggle(b) => write!(f, "{}", b),
            AbletonValue::Level(v) => write!(f, "{}", v),
        }
    }
}

/// Remote-script event message
#[derive(Debug, Clone)]
pub struct AbletonMsg {
    pub event: AbletonEvent,
    /// Position within a list entry (track, encoder, bank)
    pub index: Option<usize>,
    pub value: AbletonValue,
    /// Input port that produced the message
    pub source: Option<PortId>,
    pub(crate) created_at: Instant,
}

impl AbletonMsg {
    pub fn new(event: AbletonEvent, index: Option<usize>, value: impl Into<AbletonValue>) -> Self {
        Self {
            event,
            index,
            value: value.into(),
            source: None,
            created_at: Instant::now(),
        }
    }

    /// Event of a scalar entry
    pub fn scalar(event: AbletonEvent, value: impl Into<AbletonValue>) -> Self {
        Self::new(event, None, value)
    }

    /// Event of a list entry
    pub fn indexed(event: AbletonEvent, index: usize, value: impl Into<AbletonValue>) -> Self {
        Self::new(event, Some(index), value)
    }

    pub fn with_source(mut self, source: PortId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn matches(&self, pattern: &AbletonPattern) -> bool {
        pattern.event.test(&self.event)
            && pattern.index.test(&self.index)
            && pattern.value.test(&self.value)
    }
}

impl PartialEq for AbletonMsg {
    fn eq(&self, other: &Self) -> bool {
        self.event == other.event && self.index == other.index && self.value == other.value
    }
}

impl Eq for AbletonMsg {}

impl fmt::Display for AbletonMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{} | {} | {}", self.event, index, self.value),
            None => write!(f, "{} | {}", self.event, self.value),
        }
    }
}

/// Conditions on remote event fields
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AbletonPattern {
    pub event: Cond<AbletonEvent>,
    pub index: Cond<Option<usize>>,
    pub value: Cond<AbletonValue>,
}

impl AbletonPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(mut self, event: AbletonEvent) -> Self {
        self.event = Cond::Eq(event);
        self
    }

    pub fn events(mut self, events: impl IntoIterator<Item = AbletonEvent>) -> Self {
        self.event = Cond::one_of(events);
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.index = Cond::Eq(Some(index));
        self
    }

    pub fn indices(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.index = Cond::one_of(indices.into_iter().map(Some));
        self
    }

    /// Scalar entries only
    pub fn no_index(mut self) -> Self {
        self.index = Cond::Eq(None);
        self
    }

    pub fn value(mut self, value: impl Into<AbletonValue>) -> Self {
        self.value = Cond::Eq(value.into());
        self
    }
}

impl fmt::Display for AbletonPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&describe_fields([
            self.event.describe("event"),
            self.index.describe("index"),
            self.value.describe("value"),
        ]))
    }
}

/// How a controller value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueClass {
    /// Nonzero is on
    Toggle,
    /// Raw 0-127
    Level,
}

/// Controller assignment of a table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcAssign {
    One(u8),
    /// `count` consecutive controllers starting at `first`
    Span { first: u8, count: u8 },
}

/// Canonical event to controller table
pub const TABLE: &[(AbletonEvent, ValueClass, CcAssign)] = &[
    (AbletonEvent::Encoder, ValueClass::Level, CcAssign::Span { first: 1, count: 16 }),
    (AbletonEvent::DeviceBank, ValueClass::Toggle, CcAssign::Span { first: 17, count: 8 }),
    (AbletonEvent::DeviceBankNext, ValueClass::Toggle, CcAssign::One(25)),
    (AbletonEvent::DeviceBankPrev, ValueClass::Toggle, CcAssign::One(26)),
    (AbletonEvent::DeviceToggle, ValueClass::Toggle, CcAssign::One(27)),
    (AbletonEvent::DeviceLock, ValueClass::Toggle, CcAssign::One(28)),
    (AbletonEvent::TrackVol, ValueClass::Level, CcAssign::Span { first: 29, count: 8 }),
    (AbletonEvent::TrackSendA, ValueClass::Level, CcAssign::Span { first: 37, count: 8 }),
    (AbletonEvent::TrackSendB, ValueClass::Level, CcAssign::Span { first: 45, count: 8 }),
    (AbletonEvent::TrackMute, ValueClass::Toggle, CcAssign::Span { first: 53, count: 8 }),
    (AbletonEvent::TrackSolo, ValueClass::Toggle, CcAssign::Span { first: 61, count: 8 }),
    (AbletonEvent::TrackSelect, ValueClass::Toggle, CcAssign::Span { first: 69, count: 8 }),
    (AbletonEvent::TrackArm, ValueClass::Toggle, CcAssign::Span { first: 77, count: 8 }),
    (AbletonEvent::TrackNext8, ValueClass::Toggle, CcAssign::One(85)),
    (AbletonEvent::TrackPrev8, ValueClass::Toggle, CcAssign::One(86)),
    (AbletonEvent::MasterVol, ValueClass::Toggle, CcAssign::One(87)),
    (AbletonEvent::CueVol, ValueClass::Toggle, CcAssign::One(88)),
    (AbletonEvent::Crossfader, ValueClass::Toggle, CcAssign::One(89)),
    (AbletonEvent::Stop, ValueClass::Toggle, CcAssign::One(90)),
    (AbletonEvent::Play, ValueClass::Toggle, CcAssign::One(91)),
    (AbletonEvent::Rec, ValueClass::Toggle, CcAssign::One(92)),
    (AbletonEvent::SessionRec, ValueClass::Toggle, CcAssign::One(93)),
    (AbletonEvent::Overdub, ValueClass::Toggle, CcAssign::One(94)),
    (AbletonEvent::Metronome, ValueClass::Toggle, CcAssign::One(95)),
    (AbletonEvent::Loop, ValueClass::Toggle, CcAssign::One(96)),
    (AbletonEvent::Rewind, ValueClass::Toggle, CcAssign::One(97)),
    (AbletonEvent::Forward, ValueClass::Toggle, CcAssign::One(98)),
    (AbletonEvent::PunchIn, ValueClass::Toggle, CcAssign::One(99)),
    (AbletonEvent::PunchOut, ValueClass::Toggle, CcAssign::One(100)),
    (AbletonEvent::NudgeUp, ValueClass::Toggle, CcAssign::One(101)),
    (AbletonEvent::NudgeDown, ValueClass::Toggle, CcAssign::One(102)),
    (AbletonEvent::TapTempo, ValueClass::Toggle, CcAssign::One(103)),
];

/// MIDI address of one control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireControl {
    pub kind: MidiKind,
    pub channel: u8,
    pub control: u8,
}

impl WireControl {
    fn remote(control: u8) -> Self {
        Self {
            kind: REMOTE_KIND,
            channel: REMOTE_CHANNEL,
            control,
        }
    }
}

/// Wire controls of one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Controls {
    Scalar(WireControl),
    List(Vec<WireControl>),
}

#[derive(Debug, Clone)]
struct Forward {
    class: ValueClass,
    controls: Controls,
}

/// Reverse lookup result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub event: AbletonEvent,
    pub index: Option<usize>,
    pub class: ValueClass,
}

/// Bidirectional event/controller map
#[derive(Debug)]
pub struct RemoteMap {
    forward: HashMap<AbletonEvent, Forward>,
    reverse: HashMap<WireControl, Assignment>,
}

impl RemoteMap {
    /// Build both directions from a table
    pub fn from_table(table: &[(AbletonEvent, ValueClass, CcAssign)]) -> Self {
        let mut forward = HashMap::with_capacity(table.len());
        let mut reverse = HashMap::new();

        for &(event, class, assign) in table {
            let controls = match assign {
                CcAssign::One(cc) => {
                    let control = WireControl::remote(cc);
                    reverse.insert(
                        control,
                        Assignment {
                            event,
                            index: None,
                            class,
                        },
                    );
                    Controls::Scalar(control)
                }
                CcAssign::Span { first, count } => {
                    let controls: Vec<WireControl> = (0..count)
                        .map(|offset| WireControl::remote(first + offset))
                        .collect();
                    for (index, control) in controls.iter().enumerate() {
                        reverse.insert(
                            *control,
                            Assignment {
                                event,
                                index: Some(index),
                                class,
                            },
                        );
                    }
                    Controls::List(controls)
                }
            };
            forward.insert(event, Forward { class, controls });
        }

        Self { forward, reverse }
    }

    /// Map built from [`TABLE`]
    pub fn global() -> &'static RemoteMap {
        static MAP: OnceLock<RemoteMap> = OnceLock::new();
        MAP.get_or_init(|| RemoteMap::from_table(TABLE))
    }

    /// Controls assigned to an event
    pub fn controls(&self, event: AbletonEvent) -> Option<&Controls> {
        self.forward.get(&event).map(|f| &f.controls)
    }

    /// Value class of an event
    pub fn class(&self, event: AbletonEvent) -> Option<ValueClass> {
        self.forward.get(&event).map(|f| f.class)
    }

    /// Event assigned to a control
    pub fn lookup(&self, control: &WireControl) -> Option<Assignment> {
        self.reverse.get(control).copied()
    }

    /// Remote event to control change
    pub fn encode(&self, msg: &AbletonMsg) -> Result<ChannelMsg> {
        let unmapped = || Error::UnmappedEvent {
            event: msg.event,
            index: msg.index,
        };

        let forward = self.forward.get(&msg.event).ok_or_else(unmapped)?;
        let control = match (&forward.controls, msg.index) {
            (Controls::Scalar(control), None) => *control,
            (Controls::List(controls), Some(index)) => {
                *controls.get(index).ok_or_else(unmapped)?
            }
            _ => return Err(unmapped()),
        };

        Ok(ChannelMsg::new(
            control.kind,
            control.channel,
            control.control,
            msg.value.to_cc_value(),
        ))
    }

    /// Control change to remote event
    pub fn decode(&self, msg: &ChannelMsg) -> AbletonMsg {
        let control = WireControl {
            kind: msg.kind,
            channel: msg.channel,
            control: msg.data1,
        };

        let mut decoded = match self.lookup(&control) {
            Some(assignment) => {
                let value = match assignment.class {
                    ValueClass::Toggle => AbletonValue::Toggle(msg.data2 != 0),
                    ValueClass::Level => AbletonValue::Level(msg.data2),
                };
                AbletonMsg::new(assignment.event, assignment.index, value)
            }
            None => AbletonMsg::new(
                AbletonEvent::Unsupported,
                Some(msg.data1 as usize),
                AbletonValue::Level(msg.data2),
            ),
        };
        decoded.source = msg.source.clone();
        decoded
    }
}

/// Encode with the global map
pub fn encode(msg: &AbletonMsg) -> Result<ChannelMsg> {
    RemoteMap::global().encode(msg)
}

/// Decode with the global map
pub fn decode(msg: &ChannelMsg) -> AbletonMsg {
    RemoteMap::global().decode(msg)
}
