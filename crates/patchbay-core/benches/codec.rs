//! Codec benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use patchbay_core::midi::{self, ChannelMsg, MidiKind, MidiMsg, MidiPattern, SysexMsg};
use patchbay_core::{ableton, AbletonEvent, AbletonMsg, Msg, Pattern};

fn midi_decode_benchmark(c: &mut Criterion) {
    let channel: [u8; 3] = [0x94, 60, 100];
    let sysex: [u8; 9] = [0xF0, 0x00, 0x20, 0x29, 0x02, 0x0D, 0x0E, 0x01, 0xF7];

    c.bench_function("decode_note_on", |b| {
        b.iter(|| black_box(midi::decode(black_box(&channel)).unwrap()))
    });

    c.bench_function("decode_sysex", |b| {
        b.iter(|| black_box(midi::decode(black_box(&sysex)).unwrap()))
    });
}

fn midi_encode_benchmark(c: &mut Criterion) {
    let cc: MidiMsg = ChannelMsg::control_change(3, 7, 100).into();
    let sysex: MidiMsg =
        SysexMsg::new(vec![0x00, 0x20, 0x29], vec![0x02, 0x0D], vec![0x0E, 0x01]).into();

    c.bench_function("encode_control_change", |b| {
        b.iter(|| black_box(midi::encode(&cc).unwrap()))
    });

    c.bench_function("encode_sysex", |b| {
        b.iter(|| black_box(midi::encode(&sysex).unwrap()))
    });
}

fn remote_map_benchmark(c: &mut Criterion) {
    let msg = AbletonMsg::indexed(AbletonEvent::TrackVol, 5, 90u8);
    let cc = ChannelMsg::control_change(15, 34, 90);

    c.bench_function("remote_encode", |b| {
        b.iter(|| black_box(ableton::encode(&msg).unwrap()))
    });

    c.bench_function("remote_decode", |b| b.iter(|| black_box(ableton::decode(&cc))));
}

fn matching_benchmark(c: &mut Criterion) {
    let msg: Msg = ChannelMsg::note_on(1, 60, 100).into();
    let pattern: Pattern = MidiPattern::new()
        .kinds([MidiKind::NoteOn, MidiKind::NoteOff])
        .channel(1)
        .data1_in(48..72)
        .into();

    c.bench_function("match_midi_pattern", |b| {
        b.iter(|| black_box(msg.matches(black_box(&pattern))))
    });
}

criterion_group!(
    benches,
    midi_decode_benchmark,
    midi_encode_benchmark,
    remote_map_benchmark,
    matching_benchmark
);
criterion_main!(benches);
