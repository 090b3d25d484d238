//! Metronome input
//!
//! Emits a `Click` event at a fixed tempo while open. The timer runs on the
//! context's driver runtime.

use parking_lot::{Mutex, RwLock};
use patchbay_core::{event_kind, EventMsg, PortId};
use patchbay_router::{
    impl_input, AppContext, Declare, Input, InputCore, Output, Port, RouterError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Metronome name and tempo
#[derive(Debug, Clone, PartialEq)]
pub struct MetronomeArgs {
    pub name: String,
    pub bpm: f64,
}

impl MetronomeArgs {
    pub const DEFAULT_BPM: f64 = 60.0;
}

impl From<&str> for MetronomeArgs {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bpm: Self::DEFAULT_BPM,
        }
    }
}

impl From<(&str, f64)> for MetronomeArgs {
    fn from((name, bpm): (&str, f64)) -> Self {
        Self {
            name: name.to_string(),
            bpm,
        }
    }
}

/// Metronome named after its tempo
impl From<f64> for MetronomeArgs {
    fn from(bpm: f64) -> Self {
        Self {
            name: bpm.to_string(),
            bpm,
        }
    }
}

fn check_bpm(bpm: f64) -> patchbay_router::Result<()> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(())
    } else {
        Err(RouterError::Config(format!(
            "metronome tempo must be positive, got {} bpm",
            bpm
        )))
    }
}

fn beat(bpm_bits: &AtomicU64) -> Duration {
    Duration::from_secs_f64(60.0 / f64::from_bits(bpm_bits.load(Ordering::Relaxed)))
}

/// Input sending [`EventMsg`] `Click` messages at a set tempo
pub struct MetronomeIn {
    core: Arc<InputCore>,
    bpm: Arc<AtomicU64>,
    runtime: Handle,
    task: Mutex<Option<JoinHandle<()>>>,
    passthrough: Arc<RwLock<Vec<Arc<dyn Output>>>>,
}

impl MetronomeIn {
    pub fn bpm(&self) -> f64 {
        f64::from_bits(self.bpm.load(Ordering::Relaxed))
    }

    /// Change the tempo; takes effect from the next click
    pub fn set_bpm(&self, bpm: f64) -> patchbay_router::Result<()> {
        check_bpm(bpm)?;
        self.bpm.store(bpm.to_bits(), Ordering::Relaxed);
        info!("{} set to {} bpm", self.id(), bpm);
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        beat(&self.bpm)
    }

    /// Send every click through `output` before calls run
    pub fn passthrough_out(&self, output: Arc<dyn Output>) {
        let mut attached = self.passthrough.write();
        if attached.iter().any(|o| o.id() == output.id()) {
            return;
        }
        info!("{} input will pass through {}", self.id(), output.id());
        attached.push(output);
    }
}

async fn tick(
    core: Arc<InputCore>,
    bpm: Arc<AtomicU64>,
    passthrough: Arc<RwLock<Vec<Arc<dyn Output>>>>,
) {
    loop {
        tokio::time::sleep(beat(&bpm)).await;

        let click = EventMsg::new(event_kind::CLICK).with_source(core.id().clone());
        tokio::task::block_in_place(|| {
            for output in passthrough.read().iter() {
                if let Err(e) = output.send(&click.clone().into()) {
                    warn!(port = %core.id(), "Failed to pass click through {}: {}", output.id(), e);
                }
            }
            core.deliver(click.into());
        });
    }
}

impl Port for MetronomeIn {
    fn id(&self) -> &PortId {
        self.core.id()
    }

    fn is_open(&self) -> bool {
        self.core.is_open()
    }

    fn open(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        *task = Some(self.runtime.spawn(tick(
            self.core.clone(),
            self.bpm.clone(),
            self.passthrough.clone(),
        )));
        drop(task);

        info!("Started metronome at {} bpm", self.bpm());
        self.core.opened();
    }

    fn close(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
            info!("Stopped metronome at {} bpm", self.bpm());
        }
        self.core.closed();
    }
}

impl_input!(MetronomeIn, core);

impl Declare for MetronomeIn {
    const KIND: &'static str = "MetronomeIn";
    type Args = MetronomeArgs;

    fn uid(args: &Self::Args) -> String {
        args.name.clone()
    }

    fn build(ctx: &AppContext, id: PortId, args: &Self::Args) -> patchbay_router::Result<Self> {
        check_bpm(args.bpm)?;

        Ok(Self {
            core: Arc::new(ctx.input_core(id)),
            bpm: Arc::new(AtomicU64::new(args.bpm.to_bits())),
            runtime: ctx.runtime().clone(),
            task: Mutex::new(None),
            passthrough: Arc::new(RwLock::new(Vec::new())),
        })
    }

    fn as_input(self: Arc<Self>) -> Option<Arc<dyn Input>> {
        Some(self)
    }
}
