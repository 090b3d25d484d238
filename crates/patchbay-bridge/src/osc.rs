//! OSC (Open Sound Control) ports
//!
//! [`OscIn`] listens on a UDP socket driven by the context's runtime;
//! [`OscOut`] sends datagrams from a plain socket. Endpoints are given as
//! `"ip:port"` or a bare local port.

use parking_lot::Mutex;
use patchbay_core::osc::parse_endpoint;
use patchbay_core::{Msg, OscMsg, OscValue, PortId};
use patchbay_router::{
    impl_input, AppContext, Declare, Input, InputCore, MultiPort, Output, Port, RouterError,
};
use rosc::{OscArray, OscMessage, OscPacket, OscType};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::query::OscQueryMaker;
use crate::settings::BridgeSettings;
use crate::{BridgeError, Result};

/// Largest datagram the listener reads
const MAX_DATAGRAM: usize = 65536;

// ============================================================================
// Conversions
// ============================================================================

/// Convert an OSC argument to a value
pub fn arg_to_value(arg: OscType) -> OscValue {
    match arg {
        OscType::Int(i) => OscValue::Int(i as i64),
        OscType::Long(l) => OscValue::Int(l),
        OscType::Float(f) => OscValue::Float(f as f64),
        OscType::Double(d) => OscValue::Float(d),
        OscType::String(s) => OscValue::String(s),
        OscType::Blob(b) => OscValue::Blob(b),
        OscType::Bool(b) => OscValue::Bool(b),
        OscType::Char(c) => OscValue::String(c.to_string()),
        OscType::Nil => OscValue::Nil,
        OscType::Inf => OscValue::Float(f64::INFINITY),
        OscType::Array(array) => {
            OscValue::List(array.content.into_iter().map(arg_to_value).collect())
        }
        OscType::Time(time) => OscValue::Int(((time.seconds as i64) << 32) | time.fractional as i64),
        OscType::Midi(m) => OscValue::Blob(vec![m.port, m.status, m.data1, m.data2]),
        OscType::Color(c) => OscValue::Blob(vec![c.red, c.green, c.blue, c.alpha]),
    }
}

/// Convert a value to an OSC argument.
///
/// Integers fitting `i32` are sent as `i`, larger ones as `h`; floats as `f`.
pub fn value_to_arg(value: &OscValue) -> OscType {
    match value {
        OscValue::Nil => OscType::Nil,
        OscValue::Bool(b) => OscType::Bool(*b),
        OscValue::Int(i) => match i32::try_from(*i) {
            Ok(small) => OscType::Int(small),
            Err(_) => OscType::Long(*i),
        },
        OscValue::Float(f) => OscType::Float(*f as f32),
        OscValue::String(s) => OscType::String(s.clone()),
        OscValue::Blob(b) => OscType::Blob(b.clone()),
        OscValue::List(items) => OscType::Array(OscArray {
            content: items.iter().map(value_to_arg).collect(),
        }),
    }
}

/// Messages of a packet, bundles flattened in order
pub fn packet_to_msgs(packet: OscPacket) -> Vec<OscMsg> {
    match packet {
        OscPacket::Message(msg) => {
            let data = OscValue::from_args(msg.args.into_iter().map(arg_to_value).collect());
            vec![OscMsg::new(msg.addr, data)]
        }
        OscPacket::Bundle(bundle) => bundle
            .content
            .into_iter()
            .flat_map(packet_to_msgs)
            .collect(),
    }
}

pub fn msg_to_packet(msg: &OscMsg) -> OscPacket {
    OscPacket::Message(OscMessage {
        addr: msg.address.clone(),
        args: msg.data.to_args().iter().map(value_to_arg).collect(),
    })
}

/// Decode a UDP datagram
pub fn decode(bytes: &[u8]) -> Result<Vec<OscMsg>> {
    let (_, packet) = rosc::decoder::decode_udp(bytes)
        .map_err(|e| BridgeError::Protocol(format!("OSC decode error: {:?}", e)))?;
    Ok(packet_to_msgs(packet))
}

/// Encode a message as a UDP datagram
pub fn encode(msg: &OscMsg) -> Result<Vec<u8>> {
    rosc::encoder::encode(&msg_to_packet(msg))
        .map_err(|e| BridgeError::Protocol(format!("OSC encode error: {:?}", e)))
}

// ============================================================================
// Input
// ============================================================================

/// Listens for OSC datagrams. Produces [`OscMsg`] messages.
pub struct OscIn {
    core: Arc<InputCore>,
    listen: SocketAddr,
    runtime: Handle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl OscIn {
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen
    }

    fn bind(&self) -> std::io::Result<tokio::net::UdpSocket> {
        let socket = UdpSocket::bind(self.listen)?;
        socket.set_nonblocking(true)?;
        let _guard = self.runtime.enter();
        tokio::net::UdpSocket::from_std(socket)
    }
}

async fn listen(socket: tokio::net::UdpSocket, core: Arc<InputCore>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                trace!(port = %core.id(), "OSC received {} bytes from {}", len, from);
                match decode(&buf[..len]) {
                    // Dispatch may block on a saturated worker pool
                    Ok(msgs) => tokio::task::block_in_place(|| {
                        for msg in msgs.into_iter().take_while(|_| core.is_open()) {
                            core.deliver(msg.into());
                        }
                    }),
                    Err(e) => debug!(port = %core.id(), "Dropping datagram from {}: {}", from, e),
                }
            }
            Err(e) => {
                error!(port = %core.id(), "OSC receive error: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

impl Port for OscIn {
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

        let socket = match self.bind() {
            Ok(socket) => socket,
            Err(e) => {
                warn!(port = %self.id(), "Can't listen on {}: {}", self.listen, e);
                return;
            }
        };
        *task = Some(self.runtime.spawn(listen(socket, self.core.clone())));
        drop(task);

        debug!(port = %self.id(), "Listening on {}", self.listen);
        self.core.opened();
    }

    fn close(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
        }
        self.core.closed();
    }
}

impl_input!(OscIn, core);

impl Declare for OscIn {
    const KIND: &'static str = "OscIn";
    type Args = String;

    fn uid(args: &Self::Args) -> String {
        args.clone()
    }

    fn build(ctx: &AppContext, id: PortId, args: &Self::Args) -> patchbay_router::Result<Self> {
        Ok(Self {
            core: Arc::new(ctx.input_core(id)),
            listen: parse_endpoint(args)?,
            runtime: ctx.runtime().clone(),
            task: Mutex::new(None),
        })
    }

    fn as_input(self: Arc<Self>) -> Option<Arc<dyn Input>> {
        Some(self)
    }
}

// ============================================================================
// Output
// ============================================================================

/// Sends [`OscMsg`] messages to a UDP endpoint
pub struct OscOut {
    id: PortId,
    target: SocketAddr,
    socket: Mutex<Option<UdpSocket>>,
}

impl OscOut {
    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl Port for OscOut {
    fn id(&self) -> &PortId {
        &self.id
    }

    fn is_open(&self) -> bool {
        self.socket.lock().is_some()
    }

    fn open(&self) {
        let mut socket = self.socket.lock();
        if socket.is_some() {
            return;
        }

        let local: SocketAddr = if self.target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        match UdpSocket::bind(local) {
            Ok(bound) => {
                *socket = Some(bound);
                info!("Opened {} sending to {}", self.id, self.target);
            }
            Err(e) => warn!(port = %self.id, "Can't create OSC socket: {}", e),
        }
    }

    fn close(&self) {
        if self.socket.lock().take().is_some() {
            info!("Closed {}", self.id);
        }
    }
}

impl Output for OscOut {
    fn send(&self, msg: &Msg) -> patchbay_router::Result<()> {
        let Msg::Osc(osc) = msg else {
            return Err(RouterError::Unsupported {
                port: self.id.clone(),
                msg_type: msg.type_name(),
            });
        };

        let socket = self.socket.lock();
        let socket = socket
            .as_ref()
            .ok_or_else(|| RouterError::NotOpen(self.id.clone()))?;
        let bytes = encode(osc).map_err(|e| RouterError::Send {
            port: self.id.clone(),
            reason: e.to_string(),
        })?;
        socket.send_to(&bytes, self.target)?;

        debug!(port = %self.id, "Sent {} to {}", msg, self.target);
        Ok(())
    }
}

impl Declare for OscOut {
    const KIND: &'static str = "OscOut";
    type Args = String;

    fn uid(args: &Self::Args) -> String {
        args.clone()
    }

    fn build(_ctx: &AppContext, id: PortId, args: &Self::Args) -> patchbay_router::Result<Self> {
        Ok(Self {
            id,
            target: parse_endpoint(args)?,
            socket: Mutex::new(None),
        })
    }

    fn as_output(self: Arc<Self>) -> Option<Arc<dyn Output>> {
        Some(self)
    }
}

// ============================================================================
// Input + output
// ============================================================================

/// Listen and target endpoints of an [`OscIo`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OscIoArgs {
    pub listen: String,
    pub target: String,
}

impl From<(&str, &str)> for OscIoArgs {
    fn from((listen, target): (&str, &str)) -> Self {
        Self {
            listen: listen.to_string(),
            target: target.to_string(),
        }
    }
}

impl From<(u16, u16)> for OscIoArgs {
    fn from((listen, target): (u16, u16)) -> Self {
        Self {
            listen: listen.to_string(),
            target: target.to_string(),
        }
    }
}

/// [`OscIn`] and [`OscOut`] behind one identity, with request/response queries
pub struct OscIo {
    inner: MultiPort,
    input: Arc<OscIn>,
    output: Arc<OscOut>,
    queries: OscQueryMaker,
}

impl OscIo {
    pub fn input(&self) -> &Arc<OscIn> {
        &self.input
    }

    pub fn output(&self) -> &Arc<OscOut> {
        &self.output
    }

    pub fn queries(&self) -> &OscQueryMaker {
        &self.queries
    }

    /// Send a request to `address` and wait for the response from the same address
    pub fn query(
        &self,
        address: &str,
        payload: impl Into<OscValue>,
        timeout: Duration,
    ) -> Result<OscValue> {
        self.queries.query(address, payload, timeout)
    }

    /// [`query`](Self::query) with the response converted to `T`
    pub fn query_as<T: TryFrom<OscValue>>(
        &self,
        address: &str,
        payload: impl Into<OscValue>,
        timeout: Duration,
    ) -> Result<T> {
        self.queries.query_as(address, payload, timeout)
    }
}

impl_composite!(OscIo, inner);

impl Declare for OscIo {
    const KIND: &'static str = "OscIo";
    type Args = OscIoArgs;

    fn uid(args: &Self::Args) -> String {
        format!("{} > {}", args.listen, args.target)
    }

    fn build(ctx: &AppContext, id: PortId, args: &Self::Args) -> patchbay_router::Result<Self> {
        let input = ctx.declare::<OscIn>(args.listen.clone())?;
        let output = ctx.declare::<OscOut>(args.target.clone())?;
        let queries = OscQueryMaker::new(input.clone(), output.clone())?
            .with_default_timeout(BridgeSettings::of(ctx).query_timeout());
        let inner = MultiPort::new(
            id,
            vec![input.clone() as Arc<dyn Input>],
            vec![output.clone() as Arc<dyn Output>],
        );

        Ok(Self {
            inner,
            input,
            output,
            queries,
        })
    }

    fn as_output(self: Arc<Self>) -> Option<Arc<dyn Output>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{OscBundle, OscTime};

    fn message(addr: &str, args: Vec<OscType>) -> OscPacket {
        OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        })
    }

    #[test]
    fn test_argument_count_shapes_data() {
        let msgs = packet_to_msgs(message("/play", vec![]));
        assert_eq!(msgs[0].data, OscValue::Nil);

        let msgs = packet_to_msgs(message("/volume", vec![OscType::Float(0.5)]));
        assert_eq!(msgs[0].data, OscValue::Float(0.5));

        let msgs = packet_to_msgs(message(
            "/pos",
            vec![OscType::Int(1), OscType::String("a".to_string())],
        ));
        assert_eq!(
            msgs[0].data,
            OscValue::List(vec![OscValue::Int(1), OscValue::String("a".to_string())])
        );
    }

    #[test]
    fn test_bundles_are_flattened_in_order() {
        let inner = OscPacket::Bundle(OscBundle {
            timetag: OscTime {
                seconds: 0,
                fractional: 1,
            },
            content: vec![message("/b", vec![]), message("/c", vec![])],
        });
        let outer = OscPacket::Bundle(OscBundle {
            timetag: OscTime {
                seconds: 0,
                fractional: 1,
            },
            content: vec![message("/a", vec![]), inner, message("/d", vec![])],
        });

        let addresses: Vec<String> = packet_to_msgs(outer)
            .into_iter()
            .map(|m| m.address)
            .collect();
        assert_eq!(addresses, vec!["/a", "/b", "/c", "/d"]);
    }

    #[test]
    fn test_integer_width() {
        assert_eq!(value_to_arg(&OscValue::Int(7)), OscType::Int(7));
        assert_eq!(
            value_to_arg(&OscValue::Int(1 << 40)),
            OscType::Long(1 << 40)
        );
        assert_eq!(value_to_arg(&OscValue::Float(0.25)), OscType::Float(0.25));
    }

    #[test]
    fn test_lists_become_arguments() {
        let msg = OscMsg::new("/xy", vec![OscValue::Float(0.5), OscValue::Int(2)]);
        let OscPacket::Message(packet) = msg_to_packet(&msg) else {
            panic!("expected a message");
        };
        assert_eq!(packet.args, vec![OscType::Float(0.5), OscType::Int(2)]);

        let empty = OscMsg::empty("/ping");
        let OscPacket::Message(packet) = msg_to_packet(&empty) else {
            panic!("expected a message");
        };
        assert!(packet.args.is_empty());
    }

    #[test]
    fn test_datagram_decoding() {
        let bytes = encode(&OscMsg::new("/tempo", 120)).unwrap();
        let msgs = decode(&bytes).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0], OscMsg::new("/tempo", 120));

        assert!(matches!(decode(&[1, 2, 3]), Err(BridgeError::Protocol(_))));
    }
}
