//! OSC query/response correlation tests

use patchbay_bridge::{BridgeError, BridgeSettings, OscIo, OscOut, OscQueryMaker};
use patchbay_core::{OscMsg, OscPattern, OscValue};
use patchbay_router::{Input, ManualIn, Output, Port, Subscribable};
use patchbay_test_utils::{
    find_available_udp_port, test_context, wait_for, DEFAULT_CHECK_INTERVAL, DEFAULT_TIMEOUT,
};
use std::time::{Duration, Instant};

#[test]
fn test_query_over_loopback() {
    let ctx = test_context();
    let ours = find_available_udp_port();
    let theirs = find_available_udp_port();
    let io = ctx.declare::<OscIo>((ours, theirs)).unwrap();
    let device = ctx.declare::<OscIo>((theirs, ours)).unwrap();

    // Answers tempo requests like a remote application would
    let reply = device.output().clone();
    device
        .subscribe(OscPattern::new().address("/tempo"), move |_| {
            reply.send(&OscMsg::new("/tempo", 120).into()).unwrap();
        })
        .unwrap();

    ctx.open_all();
    let tempo: i64 = io
        .query_as("/tempo", OscValue::Nil, Duration::from_secs(2))
        .unwrap();
    assert_eq!(tempo, 120);
}

#[test]
fn test_unanswered_query_times_out() {
    let ctx = test_context();
    let input = ctx.declare::<ManualIn>("responses").unwrap();
    let output = ctx
        .declare::<OscOut>(find_available_udp_port().to_string())
        .unwrap();
    output.open();
    let queries = OscQueryMaker::new(input, output).unwrap();

    let started = Instant::now();
    let result = queries.query("/silent", OscValue::Nil, Duration::from_secs(1));
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(BridgeError::QueryTimeout { .. })));
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(3));
    assert_eq!(queries.pending(), 0);
}

#[test]
fn test_concurrent_queries_for_one_address_all_resolve() {
    let ctx = test_context();
    let input = ctx.declare::<ManualIn>("responses").unwrap();
    let output = ctx
        .declare::<OscOut>(find_available_udp_port().to_string())
        .unwrap();
    output.open();
    let queries = OscQueryMaker::new(input.clone(), output).unwrap();

    std::thread::scope(|s| {
        let first = s.spawn(|| queries.query("/level", OscValue::Nil, DEFAULT_TIMEOUT));
        let second = s.spawn(|| queries.query("/level", OscValue::Nil, DEFAULT_TIMEOUT));

        assert!(wait_for(
            || queries.pending() == 2,
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT
        ));
        input.deliver(OscMsg::new("/level", 0.75).into());

        assert_eq!(first.join().unwrap().unwrap(), OscValue::Float(0.75));
        assert_eq!(second.join().unwrap().unwrap(), OscValue::Float(0.75));
    });
    assert_eq!(queries.pending(), 0);
}

#[test]
fn test_queries_for_different_addresses_are_independent() {
    let ctx = test_context();
    let input = ctx.declare::<ManualIn>("responses").unwrap();
    let output = ctx
        .declare::<OscOut>(find_available_udp_port().to_string())
        .unwrap();
    output.open();
    let queries = OscQueryMaker::new(input.clone(), output).unwrap();

    std::thread::scope(|s| {
        let answered = s.spawn(|| queries.query("/a", OscValue::Nil, DEFAULT_TIMEOUT));
        let ignored = s.spawn(|| queries.query("/b", OscValue::Nil, Duration::from_millis(500)));

        assert!(wait_for(
            || queries.pending() == 2,
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT
        ));
        input.deliver(OscMsg::new("/a", "yes").into());

        assert_eq!(
            answered.join().unwrap().unwrap(),
            OscValue::String("yes".to_string())
        );
        assert!(matches!(
            ignored.join().unwrap(),
            Err(BridgeError::QueryTimeout { .. })
        ));
    });
}

#[test]
fn test_malformed_response() {
    let ctx = test_context();
    let input = ctx.declare::<ManualIn>("responses").unwrap();
    let output = ctx
        .declare::<OscOut>(find_available_udp_port().to_string())
        .unwrap();
    output.open();
    let queries = OscQueryMaker::new(input.clone(), output).unwrap();

    std::thread::scope(|s| {
        let query = s.spawn(|| queries.query_as::<i64>("/name", OscValue::Nil, DEFAULT_TIMEOUT));

        assert!(wait_for(
            || queries.pending() == 1,
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT
        ));
        input.deliver(OscMsg::new("/name", "Bass").into());

        assert!(matches!(
            query.join().unwrap(),
            Err(BridgeError::MalformedResponse { .. })
        ));
    });
}

#[test]
fn test_failed_request_is_not_left_pending() {
    let ctx = test_context();
    let input = ctx.declare::<ManualIn>("responses").unwrap();
    let output = ctx
        .declare::<OscOut>(find_available_udp_port().to_string())
        .unwrap();
    let queries = OscQueryMaker::new(input, output.clone()).unwrap();

    assert!(!output.is_open());
    let result = queries.query("/tempo", OscValue::Nil, DEFAULT_TIMEOUT);
    assert!(matches!(result, Err(BridgeError::Router(_))));
    assert_eq!(queries.pending(), 0);
}

#[test]
fn test_default_timeout_comes_from_the_context() {
    let ctx = test_context();
    BridgeSettings {
        query_timeout_ms: 250,
        ..Default::default()
    }
    .apply(&ctx);

    let io = ctx
        .declare::<OscIo>((find_available_udp_port(), find_available_udp_port()))
        .unwrap();
    assert_eq!(io.queries().default_timeout(), Duration::from_millis(250));

    let other = test_context();
    let io = other
        .declare::<OscIo>((find_available_udp_port(), find_available_udp_port()))
        .unwrap();
    assert_eq!(io.queries().default_timeout(), Duration::from_secs(2));
}
