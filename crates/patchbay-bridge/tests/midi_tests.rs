//! MIDI and remote script port tests
//!
//! No devices are opened: raw bytes enter through `receive_raw`, the same path
//! the driver callback uses.

use patchbay_bridge::{
    AbletonIn, AbletonIo, MidiIn, MidiIo, MidiOut, MidiPortArgs, MidiPortsWatcher, WATCHER_UID,
};
use patchbay_core::{
    AbletonEvent, AbletonMsg, AbletonPattern, AbletonValue, ChannelMsg, MidiKind, MidiMsg,
    MidiPattern, Msg, OscMsg, PortId,
};
use patchbay_router::{Input, Output, Port, RouterError, Subscribable};
use patchbay_test_utils::{test_context, MsgRecorder, DEFAULT_TIMEOUT};
use std::sync::Arc;
use std::time::Duration;

/// Grace period to catch deliveries that should not happen
const QUIET: Duration = Duration::from_millis(100);

#[test]
fn test_ctrl_volume_scenario() {
    let ctx = test_context();
    let ctrl = ctx.declare::<MidiIn>("Ctrl").unwrap();

    let volume = MsgRecorder::new();
    let channel_two = MsgRecorder::new();
    ctrl.subscribe(MidiPattern::new().channel(1).data1(7), volume.handler())
        .unwrap();
    ctrl.subscribe(MidiPattern::new().channel(2), channel_two.handler())
        .unwrap();

    ctrl.receive_raw(&[0xB0, 7, 100]);

    assert!(volume.wait_for_count(1, DEFAULT_TIMEOUT));
    let received = volume.last().unwrap();
    assert_eq!(received, Msg::from(ChannelMsg::control_change(1, 7, 100)));
    assert_eq!(received.source(), Some(&PortId::new("MidiIn", "Ctrl")));

    std::thread::sleep(QUIET);
    assert_eq!(channel_two.count(), 0);
}

#[test]
fn test_undecodable_data_is_dropped() {
    let ctx = test_context();
    let input = ctx.declare::<MidiIn>("Keys").unwrap();
    let rec = MsgRecorder::new();
    input.subscribe_all(rec.handler()).unwrap();

    input.receive_raw(&[0xF8]);
    input.receive_raw(&[0x90, 60]);
    input.receive_raw(&[0xF0, 0x41, 0xF7]);
    input.receive_raw(&[0x90, 60, 100]);

    assert!(rec.wait_for_count(1, DEFAULT_TIMEOUT));
    std::thread::sleep(QUIET);
    assert_eq!(rec.count(), 1);
    assert_eq!(
        rec.last().unwrap().as_channel().unwrap().kind,
        MidiKind::NoteOn
    );
}

#[test]
fn test_sysex_is_delivered() {
    let ctx = test_context();
    let input = ctx.declare::<MidiIn>("Synth").unwrap();
    let roland = MsgRecorder::new();
    input
        .subscribe(MidiPattern::new().manufacturer(vec![0x41]), roland.handler())
        .unwrap();

    input.receive_raw(&[0xF0, 0x41, 0x10, 0x42, 0x12, 0xF7]);

    assert!(roland.wait_for_count(1, DEFAULT_TIMEOUT));
    let received = roland.last().unwrap();
    assert_eq!(received.type_name(), "SysexMsg");
    match received.as_midi() {
        Some(MidiMsg::Sysex(sysex)) => {
            assert_eq!(sysex.manufacturer, vec![0x41]);
            assert_eq!(sysex.sub_id, vec![0x10, 0x42]);
            assert_eq!(sysex.payload, vec![0x12]);
        }
        other => panic!("Expected sysex, got {:?}", other),
    }
}

#[test]
fn test_virtual_flag_is_part_of_the_declaration() {
    let ctx = test_context();
    ctx.declare::<MidiIn>("Bus 1").unwrap();

    let result = ctx.declare::<MidiIn>(MidiPortArgs::new_virtual("Bus 1"));
    assert!(matches!(result, Err(RouterError::ArgsMismatch { .. })));
}

#[test]
fn test_closed_output_rejects_messages() {
    let ctx = test_context();
    let output = ctx.declare::<MidiOut>("Synth").unwrap();

    assert!(!output.is_open());
    let result = output.send(&ChannelMsg::note_on(1, 60, 100).into());
    assert!(matches!(result, Err(RouterError::NotOpen(_))));

    let result = output.send(&OscMsg::new("/x", 1).into());
    assert!(matches!(result, Err(RouterError::Unsupported { .. })));

    // Pass-through data is dropped silently while closed
    output.send_raw(&[0x90, 60, 100]);
}

#[test]
fn test_passthrough_does_not_block_delivery() {
    let ctx = test_context();
    let input = ctx.declare::<MidiIn>("Pads").unwrap();
    let thru = ctx.declare::<MidiOut>("Synth").unwrap();
    input.passthrough_out(thru.clone());
    input.passthrough_out(thru);

    let rec = MsgRecorder::new();
    input.subscribe_all(rec.handler()).unwrap();
    input.receive_raw(&[0x99, 36, 127]);

    assert!(rec.wait_for_count(1, DEFAULT_TIMEOUT));
    assert_eq!(
        rec.last().unwrap(),
        Msg::from(ChannelMsg::note_on(10, 36, 127))
    );
}

#[test]
fn test_midi_io_wraps_declared_parts() {
    let ctx = test_context();
    let io = ctx.declare::<MidiIo>("Launchpad").unwrap();

    let input = ctx.get::<MidiIn>("Launchpad").unwrap();
    let output = ctx.get::<MidiOut>("Launchpad").unwrap();
    assert!(Arc::ptr_eq(io.input(), &input));
    assert!(Arc::ptr_eq(io.output(), &output));
    assert_eq!(io.id(), &PortId::new("MidiIo", "Launchpad"));

    let pads = MsgRecorder::new();
    io.subscribe(MidiPattern::new().kind(MidiKind::NoteOn), pads.handler())
        .unwrap();
    input.receive_raw(&[0x90, 11, 127]);
    assert!(pads.wait_for_count(1, DEFAULT_TIMEOUT));

    let result = io.send(&ChannelMsg::note_on(1, 11, 5).into());
    assert!(matches!(result, Err(RouterError::NotOpen(_))));
}

#[test]
fn test_remote_script_events() {
    let ctx = test_context();
    let live = ctx.declare::<AbletonIn>("Live Proxy").unwrap();

    let play = MsgRecorder::new();
    let volume = MsgRecorder::new();
    let unsupported = MsgRecorder::new();
    live.subscribe(AbletonPattern::new().event(AbletonEvent::Play), play.handler())
        .unwrap();
    live.subscribe(
        AbletonPattern::new().event(AbletonEvent::TrackVol).index(2),
        volume.handler(),
    )
    .unwrap();
    live.subscribe(
        AbletonPattern::new().event(AbletonEvent::Unsupported),
        unsupported.handler(),
    )
    .unwrap();

    // Remote channel 15 is 14 on the wire
    live.receive_raw(&[0xBE, 91, 127]);
    live.receive_raw(&[0xBE, 31, 64]);
    live.receive_raw(&[0xB0, 7, 1]);

    assert!(play.wait_for_count(1, DEFAULT_TIMEOUT));
    assert!(volume.wait_for_count(1, DEFAULT_TIMEOUT));
    assert!(unsupported.wait_for_count(1, DEFAULT_TIMEOUT));

    assert_eq!(
        play.last().unwrap(),
        Msg::from(AbletonMsg::scalar(AbletonEvent::Play, true))
    );
    assert_eq!(
        volume.last().unwrap(),
        Msg::from(AbletonMsg::indexed(AbletonEvent::TrackVol, 2, 64u8))
    );
    let other = unsupported.last().unwrap();
    let other = other.as_ableton().unwrap();
    assert_eq!(other.index, Some(7));
    assert_eq!(other.value, AbletonValue::Level(1));
}

#[test]
fn test_ableton_io_sends_through_its_output() {
    let ctx = test_context();
    let io = ctx.declare::<AbletonIo>("Live Proxy").unwrap();
    assert!(ctx.get::<AbletonIn>("Live Proxy").is_some());

    // Unmapped events are dropped before the port state matters
    io.send(&AbletonMsg::indexed(AbletonEvent::TrackArm, 99, true).into())
        .unwrap();

    let result = io.send(&AbletonMsg::scalar(AbletonEvent::Play, true).into());
    assert!(matches!(result, Err(RouterError::NotOpen(_))));
}

#[test]
fn test_watcher_has_a_single_identity() {
    let ctx = test_context();
    let first = ctx.declare::<MidiPortsWatcher>(()).unwrap();
    let second = ctx.declare::<MidiPortsWatcher>(()).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.id().uid, WATCHER_UID);
    assert!(first.history().is_empty());
}

#[test]
fn test_watcher_closes_and_reopens_from_another_thread() {
    let ctx = test_context();
    let watcher = ctx.declare::<MidiPortsWatcher>(()).unwrap();
    watcher.open();
    assert!(watcher.is_open());

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let other = watcher.clone();
    std::thread::spawn(move || {
        other.close();
        let closed = !other.is_open();
        other.open();
        done_tx.send((closed, other.is_open())).unwrap();
    });

    let (closed, reopened) = done_rx.recv_timeout(DEFAULT_TIMEOUT).unwrap();
    assert!(closed);
    assert!(reopened);

    watcher.close();
    assert!(!watcher.is_open());
}
