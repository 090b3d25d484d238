//! Wire codec tests for patchbay core

use patchbay_core::ableton::{self, Controls, RemoteMap, ValueClass, REMOTE_CHANNEL, TABLE};
use patchbay_core::midi::{self, ChannelMsg, MidiKind, MidiMsg, SysexMsg};
use patchbay_core::{AbletonEvent, AbletonMsg, AbletonValue, Error};

#[test]
fn test_channel_messages_survive_the_wire() {
    let msgs = [
        ChannelMsg::note_off(1, 60, 0),
        ChannelMsg::note_on(16, 127, 127),
        ChannelMsg::poly_touch(5, 64, 10),
        ChannelMsg::control_change(15, 91, 127),
        ChannelMsg::program_change(9, 42),
        ChannelMsg::aftertouch(2, 100),
        ChannelMsg::pitch_bend(3, 16383),
    ];

    for msg in msgs {
        let bytes = msg.to_bytes().expect("encode failed");
        assert_eq!(bytes.len(), msg.kind.wire_len().unwrap());
        let decoded = midi::decode(&bytes).expect("decode failed");
        assert_eq!(decoded, MidiMsg::Channel(msg));
    }
}

#[test]
fn test_sysex_survives_the_wire() {
    let bytes: [u8; 9] = [0xF0, 0x00, 0x20, 0x29, 0x02, 0x0D, 0x0E, 0x01, 0xF7];
    let decoded = midi::decode(&bytes).expect("decode failed");

    match &decoded {
        MidiMsg::Sysex(sysex) => {
            assert_eq!(sysex.manufacturer, vec![0x00, 0x20, 0x29]);
            assert_eq!(sysex.sub_id, vec![0x02, 0x0D]);
            assert_eq!(sysex.payload, vec![0x0E, 0x01]);
        }
        other => panic!("Expected sysex, got {:?}", other),
    }
    assert_eq!(midi::encode(&decoded).unwrap(), bytes.to_vec());
}

#[test]
fn test_sysex_manufacturer_id_lengths() {
    let cases: [(&[u8], &[u8], &[u8], &[u8]); 2] = [
        (
            &[0xF0, 0x41, 0x10, 0x42, 0x12, 0xF7],
            &[0x41],
            &[0x10, 0x42],
            &[0x12],
        ),
        (
            &[0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7],
            &[0x7E, 0x7F],
            &[0x06, 0x01],
            &[],
        ),
    ];

    for (bytes, manufacturer, sub_id, payload) in cases {
        let decoded = midi::decode(bytes).expect("decode failed");
        match &decoded {
            MidiMsg::Sysex(sysex) => {
                assert_eq!(sysex.manufacturer, manufacturer);
                assert_eq!(sysex.sub_id, sub_id);
                assert_eq!(sysex.payload, payload);
            }
            other => panic!("Expected sysex, got {:?}", other),
        }
        assert_eq!(midi::encode(&decoded).unwrap(), bytes.to_vec());
    }
}

#[test]
fn test_short_sysex_fails() {
    let result = midi::decode(&[0xF0, 0x41, 0x10, 0xF7]);
    assert!(matches!(result, Err(Error::InvalidSysex(_))));
}

#[test]
fn test_sysex_display() {
    let msg = SysexMsg::new(vec![0x41], vec![0x10, 0x42], vec![0x12]);
    assert_eq!(msg.to_string(), "SYSEX | 41 | 10 42 | 12");
}

#[test]
fn test_remote_table_is_consistent_both_ways() {
    let map = RemoteMap::global();

    for &(event, class, _) in TABLE {
        assert_eq!(map.class(event), Some(class));

        let indices: Vec<Option<usize>> = match map.controls(event).unwrap() {
            Controls::Scalar(_) => vec![None],
            Controls::List(controls) => (0..controls.len()).map(Some).collect(),
        };

        for index in indices {
            let value = match class {
                ValueClass::Toggle => AbletonValue::Toggle(true),
                ValueClass::Level => AbletonValue::Level(99),
            };
            let msg = AbletonMsg::new(event, index, value);
            let cc = ableton::encode(&msg).expect("table event must encode");

            assert_eq!(cc.kind, MidiKind::ControlChange);
            assert_eq!(cc.channel, REMOTE_CHANNEL);
            assert_eq!(ableton::decode(&cc), msg);
        }
    }
}

#[test]
fn test_remote_controllers_are_unique() {
    let mut seen = std::collections::HashSet::new();
    for &(event, _, _) in TABLE {
        let controls = match RemoteMap::global().controls(event).unwrap() {
            Controls::Scalar(c) => vec![*c],
            Controls::List(cs) => cs.clone(),
        };
        for control in controls {
            assert!(seen.insert(control.control), "cc {} assigned twice", control.control);
        }
    }
    assert_eq!(seen.len(), 103);
}

#[test]
fn test_encoder_list_index() {
    let cc = ableton::encode(&AbletonMsg::indexed(AbletonEvent::Encoder, 15, 64u8)).unwrap();
    assert_eq!(cc, ChannelMsg::control_change(15, 16, 64));

    let msg = ableton::decode(&ChannelMsg::control_change(15, 1, 3));
    assert_eq!(msg, AbletonMsg::indexed(AbletonEvent::Encoder, 0, 3u8));
}

#[test]
fn test_master_controls_are_toggles() {
    let msg = ableton::decode(&ChannelMsg::control_change(15, 87, 127));
    assert_eq!(msg, AbletonMsg::scalar(AbletonEvent::MasterVol, true));

    let msg = ableton::decode(&ChannelMsg::control_change(15, 89, 0));
    assert_eq!(msg, AbletonMsg::scalar(AbletonEvent::Crossfader, false));

    let cc = ableton::encode(&AbletonMsg::scalar(AbletonEvent::MasterVol, false)).unwrap();
    assert_eq!(cc, ChannelMsg::control_change(15, 87, 0));
    let cc = ableton::encode(&AbletonMsg::scalar(AbletonEvent::CueVol, true)).unwrap();
    assert_eq!(cc, ChannelMsg::control_change(15, 88, 127));
}
