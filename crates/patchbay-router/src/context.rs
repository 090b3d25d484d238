//! Application context and port registry
//!
//! The [`AppContext`] owns everything shared between ports: the worker pool
//! running subscribed calls, the driver runtime running UDP listeners and
//! timers, and the registry holding one instance per port identity.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use patchbay_core::PortId;
use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::pool::WorkerPool;
use crate::port::{Declare, Input, Output, Port};
use crate::subscription::{CallStats, InputCore};
use crate::{Result, RouterError};

struct Registered {
    port: Arc<dyn Port>,
    concrete: Arc<dyn Any + Send + Sync>,
    input: Option<Arc<dyn Input>>,
    output: Option<Arc<dyn Output>>,
    args: Box<dyn Any + Send + Sync>,
    args_repr: String,
    seq: u64,
}

/// Identity-keyed table of declared ports
#[derive(Default)]
pub struct PortRegistry {
    ports: DashMap<PortId, Registered>,
    next_seq: AtomicU64,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn contains(&self, id: &PortId) -> bool {
        self.ports.contains_key(id)
    }

    fn existing<P: Declare>(entry: &Registered, id: &PortId, args: &P::Args) -> Result<Arc<P>> {
        let same_args = entry
            .args
            .downcast_ref::<P::Args>()
            .ok_or_else(|| RouterError::KindMismatch { id: id.clone() })?;
        if same_args != args {
            return Err(RouterError::ArgsMismatch {
                id: id.clone(),
                existing: entry.args_repr.clone(),
            });
        }

        entry
            .concrete
            .clone()
            .downcast::<P>()
            .map_err(|_| RouterError::KindMismatch { id: id.clone() })
    }

    /// Typed port for an identity
    pub fn get<P: Declare>(&self, id: &PortId) -> Option<Arc<P>> {
        self.ports
            .get(id)
            .and_then(|entry| entry.concrete.clone().downcast::<P>().ok())
    }

    pub fn port(&self, id: &PortId) -> Option<Arc<dyn Port>> {
        self.ports.get(id).map(|entry| entry.port.clone())
    }

    pub fn input(&self, id: &PortId) -> Option<Arc<dyn Input>> {
        self.ports.get(id).and_then(|entry| entry.input.clone())
    }

    pub fn output(&self, id: &PortId) -> Option<Arc<dyn Output>> {
        self.ports.get(id).and_then(|entry| entry.output.clone())
    }

    /// Ports in declaration order
    pub fn ports(&self) -> Vec<Arc<dyn Port>> {
        let mut ports: Vec<(u64, Arc<dyn Port>)> = self
            .ports
            .iter()
            .map(|entry| (entry.seq, entry.port.clone()))
            .collect();
        ports.sort_by_key(|(seq, _)| *seq);
        ports.into_iter().map(|(_, port)| port).collect()
    }

    /// Inputs in declaration order
    pub fn inputs(&self) -> Vec<Arc<dyn Input>> {
        let mut inputs: Vec<(u64, Arc<dyn Input>)> = self
            .ports
            .iter()
            .filter_map(|entry| entry.input.clone().map(|input| (entry.seq, input)))
            .collect();
        inputs.sort_by_key(|(seq, _)| *seq);
        inputs.into_iter().map(|(_, input)| input).collect()
    }
}

/// Shared state for a set of ports
pub struct AppContext {
    config: RouterConfig,
    pool: Arc<WorkerPool>,
    registry: PortRegistry,
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    extensions: DashMap<TypeId, Box<dyn Any + Send + Sync>>,
    shut_down: AtomicBool,
}

impl AppContext {
    /// Start the worker pool and the driver runtime
    pub fn new(config: RouterConfig) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(WorkerPool::new(config.pool_size)?);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.driver_threads)
            .thread_name("patchbay-driver")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        info!(
            "Patchbay context started ({} workers, {} driver threads)",
            config.pool_size, config.driver_threads
        );

        Ok(Self {
            config,
            pool,
            registry: PortRegistry::new(),
            runtime: Mutex::new(Some(runtime)),
            handle,
            extensions: DashMap::new(),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Attach a value to the context, replacing the previous value of that type
    ///
    /// Port crates keep their settings here so that each context carries its own.
    pub fn insert_extension<T: Any + Send + Sync>(&self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Copy of the value of type `T` attached with [`insert_extension`](Self::insert_extension)
    pub fn extension<T: Any + Send + Sync + Clone>(&self) -> Option<T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Driver runtime for listeners and timers
    pub fn runtime(&self) -> &Handle {
        &self.handle
    }

    pub fn registry(&self) -> &PortRegistry {
        &self.registry
    }

    /// Dispatch state for a new input
    pub fn input_core(&self, id: PortId) -> InputCore {
        InputCore::new(id, self.pool.clone(), &self.config)
    }

    /// Get or create the port for the identity implied by `args`.
    ///
    /// A known identity returns the existing instance when the arguments are
    /// equal and fails with [`RouterError::ArgsMismatch`] otherwise.
    pub fn declare<P: Declare>(&self, args: impl Into<P::Args>) -> Result<Arc<P>> {
        let args = args.into();
        let id = P::id_for(&args);

        if let Some(entry) = self.registry.ports.get(&id) {
            return PortRegistry::existing::<P>(&entry, &id, &args);
        }

        // Built outside the map lock: composite ports declare their parts here
        let port = Arc::new(P::build(self, id.clone(), &args)?);

        match self.registry.ports.entry(id.clone()) {
            Entry::Occupied(entry) => PortRegistry::existing::<P>(entry.get(), &id, &args),
            Entry::Vacant(slot) => {
                let seq = self.registry.next_seq.fetch_add(1, Ordering::SeqCst);
                slot.insert(Registered {
                    port: port.clone(),
                    concrete: port.clone(),
                    input: port.clone().as_input(),
                    output: port.clone().as_output(),
                    args_repr: format!("{:?}", args),
                    args: Box::new(args),
                    seq,
                });
                debug!("Declared {}", id);
                Ok(port)
            }
        }
    }

    /// Typed port by uid
    pub fn get<P: Declare>(&self, uid: &str) -> Option<Arc<P>> {
        self.registry.get::<P>(&PortId::new(P::KIND, uid))
    }

    pub fn input(&self, id: &PortId) -> Option<Arc<dyn Input>> {
        self.registry.input(id)
    }

    pub fn output(&self, id: &PortId) -> Option<Arc<dyn Output>> {
        self.registry.output(id)
    }

    /// Declared ports in declaration order
    pub fn ports(&self) -> Vec<Arc<dyn Port>> {
        self.registry.ports()
    }

    /// Open every declared port in declaration order
    pub fn open_all(&self) {
        for port in self.registry.ports() {
            if !port.is_open() {
                port.open();
            }
            if !port.is_open() {
                warn!("{} is not open", port.id());
            }
        }
    }

    /// Close every declared port in reverse declaration order
    pub fn close_all(&self) {
        for port in self.registry.ports().into_iter().rev() {
            if port.is_open() {
                port.close();
            }
        }
    }

    /// Statistics of every call subscribed to a declared input
    pub fn stats(&self) -> Vec<CallStats> {
        self.registry
            .inputs()
            .iter()
            .flat_map(|input| input.stats())
            .collect()
    }

    /// Close ports, then stop the worker pool and the driver runtime
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.close_all();
        self.pool.shutdown();
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_timeout(Duration::from_secs(1));
        }

        info!("Patchbay context stopped");
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("ports", &self.registry.len())
            .finish()
    }
}
