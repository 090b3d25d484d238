//! Common test helpers and utilities for patchbay tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - Free UDP port allocation for loopback tests
//! - Small app contexts for tests
//! - Message recorders for subscription testing

use patchbay_core::Msg;
use patchbay_router::{AppContext, RouterConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(5);

// ============================================================================
// Port Allocation
// ============================================================================

/// Find an available UDP port for testing
pub fn find_available_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub fn wait_for<F>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check() {
            return true;
        }
        std::thread::sleep(interval);
    }
    check()
}

/// Wait for an atomic counter to reach a target value
pub fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_for(
        || counter.load(Ordering::SeqCst) >= target,
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
}

// ============================================================================
// Test Context
// ============================================================================

/// App context with a small pool, enough for tests
pub fn test_context() -> AppContext {
    AppContext::new(RouterConfig {
        pool_size: 8,
        driver_threads: 1,
        ..RouterConfig::default()
    })
    .unwrap()
}

// ============================================================================
// Message Recorder - for verifying delivered messages
// ============================================================================

/// Records messages passed to its handlers
#[derive(Clone, Default)]
pub struct MsgRecorder {
    msgs: Arc<parking_lot::Mutex<Vec<Msg>>>,
    count: Arc<AtomicU32>,
}

impl MsgRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler function recording every message it receives
    pub fn handler(&self) -> impl Fn(Msg) + Send + Sync + 'static {
        let msgs = self.msgs.clone();
        let count = self.count.clone();

        move |msg| {
            msgs.lock().push(msg);
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Get the count of received messages
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait for at least n messages to be received
    pub fn wait_for_count(&self, n: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.count, n, max_wait)
    }

    /// Get all recorded messages
    pub fn msgs(&self) -> Vec<Msg> {
        self.msgs.lock().clone()
    }

    /// Get the last message received
    pub fn last(&self) -> Option<Msg> {
        self.msgs.lock().last().cloned()
    }

    /// Clear all recorded messages
    pub fn clear(&self) {
        self.msgs.lock().clear();
        self.count.store(0, Ordering::SeqCst);
    }
}
