//! MIDI device ports
//!
//! midir connections live on dedicated driver threads. An input's thread keeps
//! its connection alive until the port closes; the midir callback passes raw
//! bytes through to attached outputs, decodes them and delivers the result.
//! An output's thread drains a send queue into its connection.

use crossbeam_channel::{bounded, unbounded, Sender};
use midir::{Ignore, MidiIO, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::{Mutex, RwLock};
use patchbay_core::{midi, Msg, MidiMsg, PortId};
use patchbay_router::{
    impl_input, AppContext, Declare, Input, InputCore, MultiPort, Output, Port, RouterError,
};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::settings::BridgeSettings;
use crate::{BridgeError, Result};

/// How long `open` waits for a driver thread to connect
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Device name and whether to create it as a virtual port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MidiPortArgs {
    pub name: String,
    pub is_virtual: bool,
}

impl MidiPortArgs {
    pub fn device(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_virtual: false,
        }
    }

    /// Port created by patchbay for other applications to connect to
    pub fn new_virtual(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_virtual: true,
        }
    }
}

impl From<&str> for MidiPortArgs {
    fn from(name: &str) -> Self {
        Self::device(name)
    }
}

impl From<String> for MidiPortArgs {
    fn from(name: String) -> Self {
        Self::device(name)
    }
}

// ============================================================================
// Device discovery
// ============================================================================

fn port_names<T: MidiIO>(io: &T) -> Vec<String> {
    io.ports()
        .iter()
        .filter_map(|p| io.port_name(p).ok())
        .collect()
}

/// Names of the MIDI input devices currently present
pub fn input_names(client_name: &str) -> Result<Vec<String>> {
    let midi_in = MidiInput::new(client_name).map_err(|e| BridgeError::Protocol(e.to_string()))?;
    Ok(port_names(&midi_in))
}

/// Names of the MIDI output devices currently present
pub fn output_names(client_name: &str) -> Result<Vec<String>> {
    let midi_out =
        MidiOutput::new(client_name).map_err(|e| BridgeError::Protocol(e.to_string()))?;
    Ok(port_names(&midi_out))
}

/// Index of `wanted` in `names`: exact match first, then the first name it prefixes.
///
/// Backends append client and port numbers to device names, so `"Launchpad"`
/// finds `"Launchpad 20:0"`.
pub fn find_name(names: &[String], wanted: &str) -> Option<usize> {
    names
        .iter()
        .position(|n| n == wanted)
        .or_else(|| names.iter().position(|n| n.starts_with(wanted)))
}

fn find_port<T: MidiIO>(io: &T, wanted: &str) -> Option<T::Port> {
    let ports = io.ports();
    let names: Vec<String> = ports
        .iter()
        .map(|p| io.port_name(p).unwrap_or_default())
        .collect();
    find_name(&names, wanted).and_then(|i| ports.into_iter().nth(i))
}

fn device_present(device: &MidiPortArgs, names: Result<Vec<String>>) -> bool {
    if device.is_virtual {
        return true;
    }
    names
        .map(|names| find_name(&names, &device.name).is_some())
        .unwrap_or(false)
}

// ============================================================================
// Driver threads
// ============================================================================

type Ready = Sender<std::result::Result<String, String>>;

/// Start a driver thread and wait until it reports the device connected
fn start_driver<F>(id: &PortId, thread_name: &str, body: F) -> Option<JoinHandle<()>>
where
    F: FnOnce(Ready) + Send + 'static,
{
    let (ready_tx, ready_rx) = bounded(1);
    let thread = match std::thread::Builder::new()
        .name(thread_name.to_string())
        .spawn(move || body(ready_tx))
    {
        Ok(thread) => thread,
        Err(e) => {
            warn!(port = %id, "Failed to start MIDI driver thread: {}", e);
            return None;
        }
    };

    match ready_rx.recv_timeout(CONNECT_TIMEOUT) {
        Ok(Ok(device)) => {
            debug!(port = %id, "Connected to MIDI device '{}'", device);
            Some(thread)
        }
        Ok(Err(reason)) => {
            warn!(port = %id, "Can't open {}: {}", id, reason);
            let _ = thread.join();
            None
        }
        Err(_) => {
            warn!(port = %id, "Timed out opening {}", id);
            None
        }
    }
}

fn connect_input<F>(
    device: &MidiPortArgs,
    client_name: &str,
    callback: F,
) -> Result<(MidiInputConnection<()>, String)>
where
    F: FnMut(u64, &[u8], &mut ()) + Send + 'static,
{
    let mut midi_in =
        MidiInput::new(client_name).map_err(|e| BridgeError::Protocol(e.to_string()))?;
    midi_in.ignore(Ignore::None);

    if device.is_virtual {
        return connect_virtual_input(midi_in, &device.name, callback);
    }

    let port = find_port(&midi_in, &device.name)
        .ok_or_else(|| BridgeError::DeviceNotFound(device.name.clone()))?;
    let port_name = midi_in
        .port_name(&port)
        .unwrap_or_else(|_| device.name.clone());
    let connection = midi_in
        .connect(&port, "patchbay-in", callback, ())
        .map_err(|e| BridgeError::Protocol(e.to_string()))?;
    Ok((connection, port_name))
}

#[cfg(unix)]
fn connect_virtual_input<F>(
    midi_in: MidiInput,
    name: &str,
    callback: F,
) -> Result<(MidiInputConnection<()>, String)>
where
    F: FnMut(u64, &[u8], &mut ()) + Send + 'static,
{
    use midir::os::unix::VirtualInput;

    let connection = midi_in
        .create_virtual(name, callback, ())
        .map_err(|e| BridgeError::Protocol(e.to_string()))?;
    Ok((connection, name.to_string()))
}

#[cfg(not(unix))]
fn connect_virtual_input<F>(
    _midi_in: MidiInput,
    name: &str,
    _callback: F,
) -> Result<(MidiInputConnection<()>, String)>
where
    F: FnMut(u64, &[u8], &mut ()) + Send + 'static,
{
    Err(BridgeError::Protocol(format!(
        "can't create virtual port '{}': not supported on this platform",
        name
    )))
}

fn connect_output(
    device: &MidiPortArgs,
    client_name: &str,
) -> Result<(MidiOutputConnection, String)> {
    let midi_out =
        MidiOutput::new(client_name).map_err(|e| BridgeError::Protocol(e.to_string()))?;

    if device.is_virtual {
        return connect_virtual_output(midi_out, &device.name);
    }

    let port = find_port(&midi_out, &device.name)
        .ok_or_else(|| BridgeError::DeviceNotFound(device.name.clone()))?;
    let port_name = midi_out
        .port_name(&port)
        .unwrap_or_else(|_| device.name.clone());
    let connection = midi_out
        .connect(&port, "patchbay-out")
        .map_err(|e| BridgeError::Protocol(e.to_string()))?;
    Ok((connection, port_name))
}

#[cfg(unix)]
fn connect_virtual_output(midi_out: MidiOutput, name: &str) -> Result<(MidiOutputConnection, String)> {
    use midir::os::unix::VirtualOutput;

    let connection = midi_out
        .create_virtual(name)
        .map_err(|e| BridgeError::Protocol(e.to_string()))?;
    Ok((connection, name.to_string()))
}

#[cfg(not(unix))]
fn connect_virtual_output(_midi_out: MidiOutput, name: &str) -> Result<(MidiOutputConnection, String)> {
    Err(BridgeError::Protocol(format!(
        "can't create virtual port '{}': not supported on this platform",
        name
    )))
}

// ============================================================================
// Input
// ============================================================================

/// Converts decoded device data into the message an input delivers
pub(crate) type Translate = fn(MidiMsg) -> Option<Msg>;

fn plain_midi(msg: MidiMsg) -> Option<Msg> {
    Some(msg.into())
}

struct MidiReceiver {
    core: Arc<InputCore>,
    passthrough: RwLock<Vec<Arc<MidiOut>>>,
    translate: Translate,
}

impl MidiReceiver {
    fn receive(&self, bytes: &[u8]) {
        for output in self.passthrough.read().iter() {
            output.send_raw(bytes);
        }

        match midi::decode(bytes) {
            Ok(decoded) => match (self.translate)(decoded) {
                Some(msg) => self.core.deliver(msg),
                None => trace!(port = %self.core.id(), "Ignoring MIDI data {:02X?}", bytes),
            },
            Err(e) => warn!(
                port = %self.core.id(),
                "Dropping undecodable MIDI data {:02X?}: {}",
                bytes,
                e
            ),
        }
    }
}

/// MIDI input device. Produces [`MidiMsg`] messages.
pub struct MidiIn {
    core: Arc<InputCore>,
    device: MidiPortArgs,
    client_name: String,
    receiver: Arc<MidiReceiver>,
    driver: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
}

impl MidiIn {
    pub(crate) fn with_translate(
        ctx: &AppContext,
        id: PortId,
        device: MidiPortArgs,
        translate: Translate,
    ) -> Self {
        let core = Arc::new(ctx.input_core(id));
        let receiver = Arc::new(MidiReceiver {
            core: core.clone(),
            passthrough: RwLock::new(Vec::new()),
            translate,
        });

        Self {
            core,
            device,
            client_name: BridgeSettings::of(ctx).midi_client_name,
            receiver,
            driver: Mutex::new(None),
        }
    }

    pub(crate) fn core_handle(&self) -> Arc<InputCore> {
        self.core.clone()
    }

    pub fn device(&self) -> &MidiPortArgs {
        &self.device
    }

    /// Send every incoming message through `output` as soon as it arrives,
    /// before calls run
    pub fn passthrough_out(&self, output: Arc<MidiOut>) {
        let mut attached = self.receiver.passthrough.write();
        if attached.iter().any(|o| Arc::ptr_eq(o, &output)) {
            return;
        }
        info!("{} input will pass through {}", self.id(), output.id());
        attached.push(output);
    }

    /// Handle raw bytes as if the device had sent them
    pub fn receive_raw(&self, bytes: &[u8]) {
        self.receiver.receive(bytes);
    }
}

impl Port for MidiIn {
    fn id(&self) -> &PortId {
        self.core.id()
    }

    fn is_open(&self) -> bool {
        self.core.is_open()
    }

    fn is_available(&self) -> bool {
        device_present(&self.device, input_names(&self.client_name))
    }

    fn open(&self) {
        let mut driver = self.driver.lock();
        if driver.is_some() {
            return;
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let device = self.device.clone();
        let client_name = self.client_name.clone();
        let receiver = self.receiver.clone();
        let thread = start_driver(self.id(), "patchbay-midi-in", move |ready| {
            let callback = move |_stamp: u64, bytes: &[u8], _: &mut ()| {
                if receiver.core.is_open() {
                    receiver.receive(bytes);
                }
            };
            match connect_input(&device, &client_name, callback) {
                Ok((connection, port_name)) => {
                    let _ = ready.send(Ok(port_name));
                    // Blocks until the port drops the stop sender
                    let _ = stop_rx.recv();
                    drop(connection);
                }
                Err(e) => {
                    let _ = ready.send(Err(e.to_string()));
                }
            }
        });

        if let Some(thread) = thread {
            *driver = Some((stop_tx, thread));
            drop(driver);
            self.core.opened();
        }
    }

    fn close(&self) {
        let taken = self.driver.lock().take();
        if let Some((stop, thread)) = taken {
            drop(stop);
            let _ = thread.join();
        }
        self.core.closed();
    }
}

impl_input!(MidiIn, core);

impl Declare for MidiIn {
    const KIND: &'static str = "MidiIn";
    type Args = MidiPortArgs;

    fn uid(args: &Self::Args) -> String {
        args.name.clone()
    }

    fn build(ctx: &AppContext, id: PortId, args: &Self::Args) -> patchbay_router::Result<Self> {
        Ok(Self::with_translate(ctx, id, args.clone(), plain_midi))
    }

    fn as_input(self: Arc<Self>) -> Option<Arc<dyn Input>> {
        Some(self)
    }
}

// ============================================================================
// Output
// ============================================================================

/// MIDI output device. Sends [`MidiMsg`] messages.
pub struct MidiOut {
    id: PortId,
    device: MidiPortArgs,
    client_name: String,
    driver: Mutex<Option<(Sender<Vec<u8>>, JoinHandle<()>)>>,
}

impl MidiOut {
    pub(crate) fn for_device(id: PortId, device: MidiPortArgs, client_name: String) -> Self {
        Self {
            id,
            device,
            client_name,
            driver: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &MidiPortArgs {
        &self.device
    }

    fn enqueue(&self, bytes: Vec<u8>) -> patchbay_router::Result<()> {
        let driver = self.driver.lock();
        let (queue, _) = driver
            .as_ref()
            .ok_or_else(|| RouterError::NotOpen(self.id.clone()))?;
        queue.send(bytes).map_err(|e| RouterError::Send {
            port: self.id.clone(),
            reason: e.to_string(),
        })
    }

    /// Send bytes as they are, dropping them while closed
    pub fn send_raw(&self, bytes: &[u8]) {
        if !self.is_open() {
            return;
        }
        if let Err(e) = self.enqueue(bytes.to_vec()) {
            warn!(port = %self.id, "Failed to pass through {:02X?}: {}", bytes, e);
        }
    }
}

impl Port for MidiOut {
    fn id(&self) -> &PortId {
        &self.id
    }

    fn is_open(&self) -> bool {
        self.driver.lock().is_some()
    }

    fn is_available(&self) -> bool {
        device_present(&self.device, output_names(&self.client_name))
    }

    fn open(&self) {
        let mut driver = self.driver.lock();
        if driver.is_some() {
            return;
        }

        let (queue_tx, queue_rx) = unbounded::<Vec<u8>>();
        let device = self.device.clone();
        let client_name = self.client_name.clone();
        let id = self.id.clone();
        let thread = start_driver(&self.id, "patchbay-midi-out", move |ready| {
            let mut connection = match connect_output(&device, &client_name) {
                Ok((connection, port_name)) => {
                    let _ = ready.send(Ok(port_name));
                    connection
                }
                Err(e) => {
                    let _ = ready.send(Err(e.to_string()));
                    return;
                }
            };

            // Runs until the port drops the queue sender
            for bytes in queue_rx.iter() {
                if let Err(e) = connection.send(&bytes) {
                    warn!(port = %id, "Failed to send MIDI data {:02X?}: {}", bytes, e);
                }
            }
        });

        if let Some(thread) = thread {
            *driver = Some((queue_tx, thread));
            info!("Opened {}", self.id);
        }
    }

    fn close(&self) {
        let taken = self.driver.lock().take();
        if let Some((queue, thread)) = taken {
            drop(queue);
            let _ = thread.join();
            info!("Closed {}", self.id);
        }
    }
}

impl Output for MidiOut {
    fn send(&self, msg: &Msg) -> patchbay_router::Result<()> {
        let Msg::Midi(midi_msg) = msg else {
            return Err(RouterError::Unsupported {
                port: self.id.clone(),
                msg_type: msg.type_name(),
            });
        };
        if !self.is_open() {
            return Err(RouterError::NotOpen(self.id.clone()));
        }

        self.enqueue(midi_msg.to_bytes()?)?;
        debug!(port = %self.id, "Sent {}", msg);
        Ok(())
    }
}

impl Declare for MidiOut {
    const KIND: &'static str = "MidiOut";
    type Args = MidiPortArgs;

    fn uid(args: &Self::Args) -> String {
        args.name.clone()
    }

    fn build(ctx: &AppContext, id: PortId, args: &Self::Args) -> patchbay_router::Result<Self> {
        let client_name = BridgeSettings::of(ctx).midi_client_name;
        Ok(Self::for_device(id, args.clone(), client_name))
    }

    fn as_output(self: Arc<Self>) -> Option<Arc<dyn Output>> {
        Some(self)
    }
}

// ============================================================================
// Input + output
// ============================================================================

/// [`MidiIn`] and [`MidiOut`] of the same device behind one identity
pub struct MidiIo {
    inner: MultiPort,
    input: Arc<MidiIn>,
    output: Arc<MidiOut>,
}

impl MidiIo {
    pub fn input(&self) -> &Arc<MidiIn> {
        &self.input
    }

    pub fn output(&self) -> &Arc<MidiOut> {
        &self.output
    }
}

impl_composite!(MidiIo, inner);

impl Declare for MidiIo {
    const KIND: &'static str = "MidiIo";
    type Args = MidiPortArgs;

    fn uid(args: &Self::Args) -> String {
        args.name.clone()
    }

    fn build(ctx: &AppContext, id: PortId, args: &Self::Args) -> patchbay_router::Result<Self> {
        let input = ctx.declare::<MidiIn>(args.clone())?;
        let output = ctx.declare::<MidiOut>(args.clone())?;
        let inner = MultiPort::new(
            id,
            vec![input.clone() as Arc<dyn Input>],
            vec![output.clone() as Arc<dyn Output>],
        );

        Ok(Self {
            inner,
            input,
            output,
        })
    }

    fn as_output(self: Arc<Self>) -> Option<Arc<dyn Output>> {
        Some(self)
    }
}
