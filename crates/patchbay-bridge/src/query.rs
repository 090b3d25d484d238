//! Request/response correlation over OSC
//!
//! OSC has no request ids: a device answers a query by sending a message to
//! the address it was asked about. Each query waits on its own one-shot
//! channel registered under that address, and the input listener resolves
//! every waiter for the address of an incoming message.

use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use patchbay_core::{Msg, OscMsg, OscValue, PortId};
use patchbay_router::{Conditions, Handler, Input, Output};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::settings::BridgeSettings;
use crate::{BridgeError, Result};

type Waiters = Arc<Mutex<HashMap<String, Vec<Sender<OscValue>>>>>;

/// Sends requests through an output and waits for the responses on an input.
///
/// Create one per input/output pair and keep it; every instance subscribes a
/// listener to its input.
pub struct OscQueryMaker {
    input: PortId,
    output: Arc<dyn Output>,
    waiters: Waiters,
    default_timeout: Duration,
}

impl OscQueryMaker {
    pub fn new(input: Arc<dyn Input>, output: Arc<dyn Output>) -> Result<Self> {
        let waiters: Waiters = Arc::new(Mutex::new(HashMap::new()));

        let listener = waiters.clone();
        input.register(
            Conditions::Any,
            Handler::new(move |msg| resolve(&listener, msg)).named("OscQueryMaker"),
        )?;

        Ok(Self {
            input: input.id().clone(),
            output,
            waiters,
            default_timeout: BridgeSettings::default().query_timeout(),
        })
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Wait used by callers that don't pick one
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Send `payload` to `address` and wait for the data of the next message
    /// arriving from that address
    pub fn query(
        &self,
        address: &str,
        payload: impl Into<OscValue>,
        timeout: Duration,
    ) -> Result<OscValue> {
        let (tx, rx) = bounded(1);
        self.waiters
            .lock()
            .entry(address.to_string())
            .or_default()
            .push(tx.clone());

        info!("Requesting '{}' data from {}", address, self.input);
        if let Err(e) = self.output.send(&OscMsg::new(address, payload).into()) {
            self.forget(address, &tx);
            return Err(e.into());
        }

        match rx.recv_timeout(timeout) {
            Ok(value) => {
                debug!("Query '{}' answered with {}", address, value);
                Ok(value)
            }
            Err(_) => {
                self.forget(address, &tx);
                Err(BridgeError::QueryTimeout {
                    address: address.to_string(),
                    timeout,
                })
            }
        }
    }

    /// [`query`](Self::query) with the response converted to `T`
    pub fn query_as<T: TryFrom<OscValue>>(
        &self,
        address: &str,
        payload: impl Into<OscValue>,
        timeout: Duration,
    ) -> Result<T> {
        let value = self.query(address, payload, timeout)?;
        let got = value.to_string();
        T::try_from(value).map_err(|_| BridgeError::MalformedResponse {
            address: address.to_string(),
            expected: std::any::type_name::<T>(),
            got,
        })
    }

    /// Queries still waiting for a response
    pub fn pending(&self) -> usize {
        self.waiters.lock().values().map(Vec::len).sum()
    }

    fn forget(&self, address: &str, tx: &Sender<OscValue>) {
        let mut waiters = self.waiters.lock();
        if let Some(list) = waiters.get_mut(address) {
            list.retain(|waiter| !waiter.same_channel(tx));
            if list.is_empty() {
                waiters.remove(address);
            }
        }
    }
}

fn resolve(waiters: &Mutex<HashMap<String, Vec<Sender<OscValue>>>>, msg: Msg) {
    let Msg::Osc(osc) = msg else {
        return;
    };

    let resolved = waiters.lock().remove(&osc.address);
    for waiter in resolved.into_iter().flatten() {
        let _ = waiter.send(osc.data.clone());
    }
}
