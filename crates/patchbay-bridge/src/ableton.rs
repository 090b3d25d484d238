//! Ableton Live remote script ports
//!
//! MIDI ports talking to the patchbay remote script through a proxy MIDI
//! device. Control changes on the remote channel are translated with the
//! global [`RemoteMap`].

use patchbay_core::{AbletonMsg, MidiMsg, Msg, PortId, RemoteMap};
use patchbay_router::{
    impl_input, AppContext, Declare, Input, InputCore, MultiPort, Output, Port, RouterError,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::midi::{MidiIn, MidiOut, MidiPortArgs};
use crate::settings::BridgeSettings;

fn remote_event(msg: MidiMsg) -> Option<Msg> {
    match msg {
        MidiMsg::Channel(cc) => Some(RemoteMap::global().decode(&cc).into()),
        MidiMsg::Sysex(_) => None,
    }
}

/// Receives from the remote script. Produces [`AbletonMsg`] messages.
pub struct AbletonIn {
    core: Arc<InputCore>,
    midi: MidiIn,
}

impl AbletonIn {
    /// Send incoming device data through `output` before calls run
    pub fn passthrough_out(&self, output: Arc<MidiOut>) {
        self.midi.passthrough_out(output);
    }

    /// Handle raw bytes as if the proxy device had sent them
    pub fn receive_raw(&self, bytes: &[u8]) {
        self.midi.receive_raw(bytes);
    }
}

impl Port for AbletonIn {
    fn id(&self) -> &PortId {
        self.core.id()
    }

    fn is_open(&self) -> bool {
        self.midi.is_open()
    }

    fn is_available(&self) -> bool {
        self.midi.is_available()
    }

    fn open(&self) {
        self.midi.open();
    }

    fn close(&self) {
        self.midi.close();
    }
}

impl_input!(AbletonIn, core);

impl Declare for AbletonIn {
    const KIND: &'static str = "AbletonIn";
    type Args = MidiPortArgs;

    fn uid(args: &Self::Args) -> String {
        args.name.clone()
    }

    fn build(ctx: &AppContext, id: PortId, args: &Self::Args) -> patchbay_router::Result<Self> {
        let midi = MidiIn::with_translate(ctx, id, args.clone(), remote_event);
        Ok(Self {
            core: midi.core_handle(),
            midi,
        })
    }

    fn as_input(self: Arc<Self>) -> Option<Arc<dyn Input>> {
        Some(self)
    }
}

/// Sends [`AbletonMsg`] messages to the remote script.
///
/// Plain channel messages go out unchanged.
pub struct AbletonOut {
    midi: MidiOut,
}

impl AbletonOut {
    /// Wire message for `msg`; `None` when it has no mapping
    fn to_midi(&self, msg: &Msg) -> patchbay_router::Result<Option<Msg>> {
        match msg {
            Msg::Midi(MidiMsg::Channel(_)) => Ok(Some(msg.clone())),
            Msg::Ableton(event) => Ok(self.encode(event).map(Msg::from)),
            other => Err(RouterError::Unsupported {
                port: self.id().clone(),
                msg_type: other.type_name(),
            }),
        }
    }

    fn encode(&self, event: &AbletonMsg) -> Option<patchbay_core::ChannelMsg> {
        match RemoteMap::global().encode(event) {
            Ok(cc) => Some(cc),
            Err(e) => {
                warn!(port = %self.id(), msg = %event, "Can't convert to MIDI: {}", e);
                None
            }
        }
    }
}

impl Port for AbletonOut {
    fn id(&self) -> &PortId {
        self.midi.id()
    }

    fn is_open(&self) -> bool {
        self.midi.is_open()
    }

    fn is_available(&self) -> bool {
        self.midi.is_available()
    }

    fn open(&self) {
        self.midi.open();
    }

    fn close(&self) {
        self.midi.close();
    }
}

impl Output for AbletonOut {
    /// Unmapped events are logged and dropped
    fn send(&self, msg: &Msg) -> patchbay_router::Result<()> {
        match self.to_midi(msg)? {
            Some(wire) => {
                self.midi.send(&wire)?;
                debug!(port = %self.id(), "Sent {}", msg);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Declare for AbletonOut {
    const KIND: &'static str = "AbletonOut";
    type Args = MidiPortArgs;

    fn uid(args: &Self::Args) -> String {
        args.name.clone()
    }

    fn build(ctx: &AppContext, id: PortId, args: &Self::Args) -> patchbay_router::Result<Self> {
        let client_name = BridgeSettings::of(ctx).midi_client_name;
        Ok(Self {
            midi: MidiOut::for_device(id, args.clone(), client_name),
        })
    }

    fn as_output(self: Arc<Self>) -> Option<Arc<dyn Output>> {
        Some(self)
    }
}

/// [`AbletonIn`] and [`AbletonOut`] of the same proxy device behind one identity
pub struct AbletonIo {
    inner: MultiPort,
    input: Arc<AbletonIn>,
    output: Arc<AbletonOut>,
}

impl AbletonIo {
    pub fn input(&self) -> &Arc<AbletonIn> {
        &self.input
    }

    pub fn output(&self) -> &Arc<AbletonOut> {
        &self.output
    }
}

impl_composite!(AbletonIo, inner);

impl Declare for AbletonIo {
    const KIND: &'static str = "AbletonIo";
    type Args = MidiPortArgs;

    fn uid(args: &Self::Args) -> String {
        args.name.clone()
    }

    fn build(ctx: &AppContext, id: PortId, args: &Self::Args) -> patchbay_router::Result<Self> {
        let input = ctx.declare::<AbletonIn>(args.clone())?;
        let output = ctx.declare::<AbletonOut>(args.clone())?;
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
