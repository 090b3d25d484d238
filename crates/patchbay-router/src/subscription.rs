//! Subscription management and dispatch
//!
//! Every input owns an [`InputCore`]: a table of condition groups, each group
//! holding the calls registered under identical [`Conditions`]. Delivering a
//! message selects the calls of every matching group, falls back to the
//! `Unmatched` group when nothing matched, and submits each selected call to
//! the shared [`WorkerPool`] with its own copy of the message.

use parking_lot::{Mutex, RwLock};
use patchbay_core::{
    event_kind, AbletonPattern, EventMsg, EventPattern, MidiPattern, Msg, OscPattern, Pattern,
    PortId,
};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace};

use crate::config::RouterConfig;
use crate::pool::WorkerPool;

/// When a subscribed call runs
#[derive(Debug, Clone, PartialEq)]
pub enum Conditions {
    /// Every message
    Any,
    /// Once, after the input is opened for the first time
    OnPortOpen,
    /// Messages no other group matched
    Unmatched,
    /// Messages matching the pattern
    Match(Pattern),
}

impl Conditions {
    /// True for message-driven conditions that accept `msg`
    pub fn accepts(&self, msg: &Msg) -> bool {
        match self {
            Conditions::Any => true,
            Conditions::Match(pattern) => msg.matches(pattern),
            Conditions::OnPortOpen | Conditions::Unmatched => false,
        }
    }
}

impl From<Pattern> for Conditions {
    fn from(pattern: Pattern) -> Self {
        Conditions::Match(pattern)
    }
}

impl From<MidiPattern> for Conditions {
    fn from(pattern: MidiPattern) -> Self {
        Conditions::Match(pattern.into())
    }
}

impl From<OscPattern> for Conditions {
    fn from(pattern: OscPattern) -> Self {
        Conditions::Match(pattern.into())
    }
}

impl From<AbletonPattern> for Conditions {
    fn from(pattern: AbletonPattern) -> Self {
        Conditions::Match(pattern.into())
    }
}

impl From<EventPattern> for Conditions {
    fn from(pattern: EventPattern) -> Self {
        Conditions::Match(pattern.into())
    }
}

impl fmt::Display for Conditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conditions::Any => f.write_str("any"),
            Conditions::OnPortOpen => f.write_str("on port open"),
            Conditions::Unmatched => f.write_str("not matched by any call"),
            Conditions::Match(pattern) => pattern.fmt(f),
        }
    }
}

#[derive(Clone)]
enum Callable {
    WithMsg(Arc<dyn Fn(Msg) + Send + Sync>),
    NoArgs(Arc<dyn Fn() + Send + Sync>),
    Fallible(Arc<dyn Fn(Msg) -> anyhow::Result<()> + Send + Sync>),
}

/// A subscribed function with a display name.
///
/// Clones share the same function, so one handler can be registered on
/// several inputs.
#[derive(Clone)]
pub struct Handler {
    name: String,
    callable: Callable,
}

impl Handler {
    /// Handler taking the message
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Msg) + Send + Sync + 'static,
    {
        Self {
            name: std::any::type_name::<F>().to_string(),
            callable: Callable::WithMsg(Arc::new(f)),
        }
    }

    /// Handler ignoring the message
    pub fn no_args<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            name: std::any::type_name::<F>().to_string(),
            callable: Callable::NoArgs(Arc::new(f)),
        }
    }

    /// Handler whose errors are logged like panics
    pub fn fallible<F>(f: F) -> Self
    where
        F: Fn(Msg) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: std::any::type_name::<F>().to_string(),
            callable: Callable::Fallible(Arc::new(f)),
        }
    }

    /// Override the display name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, msg: Msg) -> anyhow::Result<()> {
        match &self.callable {
            Callable::WithMsg(f) => {
                f(msg);
                Ok(())
            }
            Callable::NoArgs(f) => {
                f();
                Ok(())
            }
            Callable::Fallible(f) => f(msg),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("name", &self.name).finish()
    }
}

/// Read-only snapshot of a subscribed call
#[derive(Debug, Clone, PartialEq)]
pub struct CallStats {
    pub name: String,
    pub port: PortId,
    pub conditions: String,
    /// Most recent latencies, oldest first
    pub latencies: Vec<Duration>,
    pub calls: u64,
    pub failures: u64,
}

impl CallStats {
    pub fn mean_latency(&self) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: Duration = self.latencies.iter().sum();
        Some(total / self.latencies.len() as u32)
    }
}

impl fmt::Display for CallStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {} [{}]", self.name, self.port, self.conditions)?;
        match self.mean_latency() {
            Some(mean) => write!(
                f,
                ": {} calls, {} failed, mean latency {:.3} ms",
                self.calls,
                self.failures,
                mean.as_secs_f64() * 1000.0
            ),
            None => f.write_str(": never called"),
        }
    }
}

/// A handler registered on an input with its conditions and statistics
pub struct SubscribedCall {
    conditions: Conditions,
    handler: Handler,
    owner: PortId,
    window: usize,
    latencies: Mutex<VecDeque<Duration>>,
    calls: AtomicU64,
    failures: AtomicU64,
}

impl SubscribedCall {
    pub fn new(owner: PortId, conditions: Conditions, handler: Handler, window: usize) -> Self {
        Self {
            conditions,
            handler,
            owner,
            window: window.max(1),
            latencies: Mutex::new(VecDeque::with_capacity(window.max(1))),
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        self.handler.name()
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    pub fn owner(&self) -> &PortId {
        &self.owner
    }

    /// Run the handler, containing panics and errors
    pub fn invoke(&self, msg: Msg) {
        let latency = msg.age();
        trace!("Calling {} for {} from {}", self.name(), msg, self.owner);

        let outcome = catch_unwind(AssertUnwindSafe(|| self.handler.call(msg.clone())));
        self.calls.fetch_add(1, Ordering::Relaxed);

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };

        if let Some(reason) = failure {
            self.failures.fetch_add(1, Ordering::Relaxed);
            error!(
                handler = %self.name(),
                port = %self.owner,
                msg = %msg,
                "Calling {} subscribed to {} failed: {}",
                self.name(),
                self.owner,
                reason
            );
        }

        let mut latencies = self.latencies.lock();
        if latencies.len() == self.window {
            latencies.pop_front();
        }
        latencies.push_back(latency);
    }

    pub fn stats(&self) -> CallStats {
        CallStats {
            name: self.name().to_string(),
            port: self.owner.clone(),
            conditions: self.conditions.to_string(),
            latencies: self.latencies.lock().iter().copied().collect(),
            calls: self.calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for SubscribedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribedCall")
            .field("name", &self.name())
            .field("owner", &self.owner)
            .field("conditions", &self.conditions)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

struct CallGroup {
    conditions: Conditions,
    calls: Vec<Arc<SubscribedCall>>,
}

/// Subscription table and dispatch state of one input
pub struct InputCore {
    id: PortId,
    groups: RwLock<Vec<CallGroup>>,
    pool: Arc<WorkerPool>,
    open: AtomicBool,
    init_called: AtomicBool,
    stats_window: usize,
    history_size: usize,
    history: Mutex<VecDeque<Msg>>,
}

impl InputCore {
    pub fn new(id: PortId, pool: Arc<WorkerPool>, config: &RouterConfig) -> Self {
        Self {
            id,
            groups: RwLock::new(Vec::new()),
            pool,
            open: AtomicBool::new(false),
            init_called: AtomicBool::new(false),
            stats_window: config.stats_window,
            history_size: config.history_size,
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn id(&self) -> &PortId {
        &self.id
    }

    /// Add a call to the group with identical conditions, creating it if needed
    pub fn register(&self, conditions: Conditions, handler: Handler) -> Arc<SubscribedCall> {
        let call = Arc::new(SubscribedCall::new(
            self.id.clone(),
            conditions.clone(),
            handler,
            self.stats_window,
        ));

        let mut groups = self.groups.write();
        match groups.iter_mut().find(|g| g.conditions == conditions) {
            Some(group) => group.calls.push(call.clone()),
            None => groups.push(CallGroup {
                conditions,
                calls: vec![call.clone()],
            }),
        }

        debug!("{} subscribed to {} [{}]", call.name(), self.id, call.conditions());
        call
    }

    /// Calls that should receive `msg`, in group then registration order
    pub fn select(&self, msg: &Msg) -> Vec<Arc<SubscribedCall>> {
        let groups = self.groups.read();

        let mut matched = Vec::new();
        let mut fallback: &[Arc<SubscribedCall>] = &[];
        for group in groups.iter() {
            if group.conditions == Conditions::Unmatched {
                fallback = group.calls.as_slice();
            } else if group.conditions.accepts(msg) {
                matched.extend(group.calls.iter().cloned());
            }
        }

        if matched.is_empty() {
            fallback.to_vec()
        } else {
            matched
        }
    }

    /// Dispatch an incoming message to the selected calls
    pub fn deliver(&self, mut msg: Msg) {
        if msg.source().is_none() {
            msg.set_source(Some(self.id.clone()));
        }

        debug!(port = %self.id, "Received {}", msg);
        self.remember(&msg);

        let calls = self.select(&msg);
        if calls.is_empty() {
            trace!("No calls for {} on {}", msg, self.id);
            return;
        }

        for call in calls {
            let copy = msg.clone();
            self.pool.submit(move || call.invoke(copy));
        }
    }

    fn remember(&self, msg: &Msg) {
        if self.history_size == 0 {
            return;
        }
        let mut history = self.history.lock();
        if history.len() == self.history_size {
            history.pop_front();
        }
        history.push_back(msg.clone());
    }

    /// Recently delivered messages, oldest first
    pub fn history(&self) -> Vec<Msg> {
        self.history.lock().iter().cloned().collect()
    }

    /// All calls in group then registration order
    pub fn calls(&self) -> Vec<Arc<SubscribedCall>> {
        self.groups
            .read()
            .iter()
            .flat_map(|g| g.calls.iter().cloned())
            .collect()
    }

    pub fn stats(&self) -> Vec<CallStats> {
        self.calls().iter().map(|c| c.stats()).collect()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Mark the input open; the first time, run the `OnPortOpen` calls
    pub fn opened(&self) {
        if self.open.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("{} opened", self.id);

        if self.init_called.swap(true, Ordering::SeqCst) {
            return;
        }

        let calls: Vec<Arc<SubscribedCall>> = self
            .groups
            .read()
            .iter()
            .filter(|g| g.conditions == Conditions::OnPortOpen)
            .flat_map(|g| g.calls.iter().cloned())
            .collect();

        for call in calls {
            let msg = Msg::from(EventMsg::new(event_kind::PORT_OPEN).with_source(self.id.clone()));
            self.pool.submit(move || call.invoke(msg));
        }
    }

    /// Mark the input closed
    pub fn closed(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            info!("{} closed", self.id);
        }
    }
}

impl fmt::Debug for InputCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputCore")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}
