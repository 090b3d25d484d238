//! Pattern matching tests for patchbay core

use patchbay_core::{
    AbletonEvent, AbletonMsg, AbletonPattern, ChannelMsg, EventMsg, EventPattern, MidiKind,
    MidiPattern, Msg, OscMsg, OscPattern, Pattern, PortId, SysexMsg,
};

#[test]
fn test_empty_pattern_matches_every_msg_of_its_variant() {
    let msgs: Vec<Msg> = vec![
        ChannelMsg::note_on(1, 60, 100).into(),
        ChannelMsg::control_change(16, 0, 0).into(),
        SysexMsg::new(vec![0x41], vec![0x10, 0x42], vec![1, 2, 3]).into(),
    ];

    for msg in &msgs {
        assert!(msg.matches(&MidiPattern::new().into()), "{}", msg);
    }
    assert!(Msg::from(OscMsg::new("/a", 1)).matches(&OscPattern::new().into()));
    assert!(Msg::from(EventMsg::new("Click")).matches(&EventPattern::new().into()));
}

#[test]
fn test_other_variant_never_matches() {
    let msg: Msg = ChannelMsg::control_change(1, 7, 100).into();
    assert!(!msg.matches(&Pattern::Osc(OscPattern::new())));
    assert!(!msg.matches(&Pattern::Ableton(AbletonPattern::new())));
    assert!(!msg.matches(&Pattern::Event(EventPattern::new())));
}

#[test]
fn test_kind_condition() {
    let msg: Msg = ChannelMsg::note_on(1, 60, 100).into();
    assert!(msg.matches(&MidiPattern::new().kind(MidiKind::NoteOn).into()));
    assert!(!msg.matches(&MidiPattern::new().kind(MidiKind::NoteOff).into()));
    assert!(msg.matches(
        &MidiPattern::new()
            .kinds([MidiKind::NoteOn, MidiKind::NoteOff])
            .into()
    ));
}

#[test]
fn test_all_conditions_must_hold() {
    let msg: Msg = ChannelMsg::control_change(2, 7, 100).into();

    let hit = MidiPattern::new()
        .kind(MidiKind::ControlChange)
        .channels([1, 2])
        .data1(7)
        .data2_in(64..=127);
    assert!(msg.matches(&hit.into()));

    let miss = MidiPattern::new()
        .kind(MidiKind::ControlChange)
        .channel(2)
        .data1(8);
    assert!(!msg.matches(&miss.into()));
}

#[test]
fn test_ableton_pattern_index_and_value() {
    let msg: Msg = AbletonMsg::indexed(AbletonEvent::TrackMute, 3, true).into();

    assert!(msg.matches(&AbletonPattern::new().event(AbletonEvent::TrackMute).into()));
    assert!(msg.matches(&AbletonPattern::new().index(3).value(true).into()));
    assert!(msg.matches(&AbletonPattern::new().indices(0..4).into()));
    assert!(!msg.matches(&AbletonPattern::new().no_index().into()));
    assert!(!msg.matches(&AbletonPattern::new().value(false).into()));
}

#[test]
fn test_osc_address_set() {
    let msg: Msg = OscMsg::new("/mixer/fader/2", 0.25).into();
    let pattern = OscPattern::new().addresses(["/mixer/fader/1", "/mixer/fader/2"]);
    assert!(msg.matches(&pattern.into()));
}

#[test]
fn test_equality_ignores_metadata() {
    let a: Msg = OscMsg::new("/a", 1).into();
    let b: Msg = OscMsg::new("/a", 1)
        .with_source(PortId::new("OscIn", "9000"))
        .into();
    assert_eq!(a, b);
    assert_ne!(a, Msg::from(OscMsg::new("/a", 2)));
}

#[test]
fn test_source_and_type_name() {
    let id = PortId::new("MidiIn", "Keys");
    let msg = Msg::from(ChannelMsg::note_on(1, 60, 1)).with_source(id.clone());
    assert_eq!(msg.source(), Some(&id));
    assert_eq!(msg.type_name(), "ChannelMsg");
    assert_eq!(id.to_string(), "MidiIn(\"Keys\")");
}

#[test]
fn test_pattern_display() {
    let pattern: Pattern = MidiPattern::new().kind(MidiKind::NoteOn).channel(1).into();
    assert_eq!(pattern.to_string(), "Midi(kind=NoteOn, channel=1)");
    assert_eq!(Pattern::from(OscPattern::new()).to_string(), "Osc(*)");
}
