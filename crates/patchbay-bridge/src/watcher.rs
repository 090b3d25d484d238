//! MIDI device change watcher
//!
//! Service input polling the MIDI device lists. Emits a
//! `MIDI Ports Changed` event whenever a device appears or disappears.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use patchbay_core::{event_kind, EventMsg, PortId};
use patchbay_router::{impl_input, AppContext, Declare, Input, InputCore, Port};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

use crate::midi::{input_names, output_names};
use crate::settings::BridgeSettings;

/// The watcher exists once per context regardless of arguments
pub const WATCHER_UID: &str = "MIDI Ports Watcher";

/// Input and output device names at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl DeviceSnapshot {
    pub fn take(client_name: &str) -> Self {
        Self {
            inputs: input_names(client_name).unwrap_or_else(|e| {
                debug!("Can't list MIDI inputs: {}", e);
                Vec::new()
            }),
            outputs: output_names(client_name).unwrap_or_else(|e| {
                debug!("Can't list MIDI outputs: {}", e);
                Vec::new()
            }),
        }
    }
}

pub struct MidiPortsWatcher {
    core: Arc<InputCore>,
    settings: BridgeSettings,
    poller: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
}

fn poll(core: Arc<InputCore>, settings: BridgeSettings, stop: crossbeam_channel::Receiver<()>) {
    let client_name = settings.midi_client_name.as_str();
    let interval = settings.watcher_interval();
    let mut last = DeviceSnapshot::take(client_name);

    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let current = DeviceSnapshot::take(client_name);
        if current != last {
            debug!("MIDI devices changed: {:?}", current);
            core.deliver(EventMsg::new(event_kind::MIDI_PORTS_CHANGED).into());
            last = current;
        }
    }
}

impl Port for MidiPortsWatcher {
    fn id(&self) -> &PortId {
        self.core.id()
    }

    fn is_open(&self) -> bool {
        self.core.is_open()
    }

    fn open(&self) {
        let mut poller = self.poller.lock();
        if poller.is_some() {
            return;
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let core = self.core.clone();
        let settings = self.settings.clone();
        let thread = std::thread::Builder::new()
            .name("patchbay-midi-watcher".to_string())
            .spawn(move || poll(core, settings, stop_rx));

        match thread {
            Ok(thread) => {
                *poller = Some((stop_tx, thread));
                drop(poller);
                info!("Started MIDI ports change watcher");
                self.core.opened();
            }
            Err(e) => warn!(port = %self.id(), "Failed to start watcher thread: {}", e),
        }
    }

    fn close(&self) {
        let taken = self.poller.lock().take();
        if let Some((stop, thread)) = taken {
            drop(stop);
            let _ = thread.join();
            info!("Stopped MIDI ports change watcher");
        }
        self.core.closed();
    }
}

impl_input!(MidiPortsWatcher, core);

impl Declare for MidiPortsWatcher {
    const KIND: &'static str = "MidiPortsWatcher";
    type Args = ();

    fn uid(_args: &Self::Args) -> String {
        WATCHER_UID.to_string()
    }

    fn build(ctx: &AppContext, id: PortId, _args: &Self::Args) -> patchbay_router::Result<Self> {
        Ok(Self {
            core: Arc::new(ctx.input_core(id)),
            settings: BridgeSettings::of(ctx),
            poller: Mutex::new(None),
        })
    }

    fn as_input(self: Arc<Self>) -> Option<Arc<dyn Input>> {
        Some(self)
    }
}
