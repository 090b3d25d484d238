//! Metronome input tests

use patchbay_bridge::MetronomeIn;
use patchbay_core::{event_kind, EventPattern, Msg, PortId};
use patchbay_router::{Output, Port, Result, RouterError, Subscribable};
use patchbay_test_utils::{test_context, wait_for_count, MsgRecorder, DEFAULT_TIMEOUT};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Output counting what it is asked to send
struct Sink {
    id: PortId,
    sent: AtomicU32,
}

impl Port for Sink {
    fn id(&self) -> &PortId {
        &self.id
    }

    fn is_open(&self) -> bool {
        true
    }

    fn open(&self) {}

    fn close(&self) {}
}

impl Output for Sink {
    fn send(&self, msg: &Msg) -> Result<()> {
        assert_eq!(msg.as_event().unwrap().kind, event_kind::CLICK);
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_clicks_while_open() {
    let ctx = test_context();
    let metronome = ctx.declare::<MetronomeIn>(("fast", 600.0)).unwrap();

    let clicks = MsgRecorder::new();
    metronome
        .subscribe(EventPattern::new().kind(event_kind::CLICK), clicks.handler())
        .unwrap();

    metronome.open();
    assert!(clicks.wait_for_count(3, DEFAULT_TIMEOUT));
    let click = clicks.last().unwrap();
    assert_eq!(click.source(), Some(&PortId::new("MetronomeIn", "fast")));

    metronome.close();
    std::thread::sleep(Duration::from_millis(50));
    let after_close = clicks.count();
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(clicks.count(), after_close);
}

#[test]
fn test_tempo() {
    let ctx = test_context();
    let metronome = ctx.declare::<MetronomeIn>(90.0).unwrap();
    assert_eq!(metronome.id().uid, "90");
    assert_eq!(metronome.bpm(), 90.0);

    metronome.set_bpm(120.0).unwrap();
    assert_eq!(metronome.interval(), Duration::from_millis(500));

    assert!(matches!(
        metronome.set_bpm(0.0),
        Err(RouterError::Config(_))
    ));
    assert_eq!(metronome.bpm(), 120.0);
}

#[test]
fn test_invalid_tempo_is_rejected_at_declaration() {
    let ctx = test_context();
    let result = ctx.declare::<MetronomeIn>(("broken", -1.0));
    assert!(matches!(result, Err(RouterError::Config(_))));
    assert!(ctx.get::<MetronomeIn>("broken").is_none());
}

#[test]
fn test_default_tempo() {
    let ctx = test_context();
    let metronome = ctx.declare::<MetronomeIn>("slow").unwrap();
    assert_eq!(metronome.interval(), Duration::from_secs(1));
}

#[test]
fn test_clicks_pass_through_outputs() {
    let ctx = test_context();
    let metronome = ctx.declare::<MetronomeIn>(("thru", 1200.0)).unwrap();
    let sink = Arc::new(Sink {
        id: PortId::new("Sink", "clicks"),
        sent: AtomicU32::new(0),
    });
    metronome.passthrough_out(sink.clone());
    metronome.passthrough_out(sink.clone());

    metronome.open();
    assert!(wait_for_count(&sink.sent, 2, DEFAULT_TIMEOUT));
    metronome.close();
}
