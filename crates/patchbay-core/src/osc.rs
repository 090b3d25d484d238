//! OSC message model
//!
//! Arguments are held as a single [`OscValue`]: no arguments is `Nil`, one
//! argument is that value, several arguments are a `List`. The wire mapping
//! to `rosc` types lives in the bridge crate.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::cond::{describe_fields, Cond};
use crate::{Error, PortId, Result};

/// OSC argument value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OscValue {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Blob(Vec<u8>),
    List(Vec<OscValue>),
}

impl OscValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, OscValue::Nil)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OscValue::Int(i) => Some(*i),
            OscValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OscValue::Float(f) => Some(*f),
            OscValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OscValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Values as a flat argument list
    pub fn to_args(&self) -> Vec<OscValue> {
        match self {
            OscValue::Nil => Vec::new(),
            OscValue::List(items) => items.clone(),
            other => vec![other.clone()],
        }
    }

    /// Collapse an argument list back into a single value
    pub fn from_args(mut args: Vec<OscValue>) -> Self {
        match args.len() {
            0 => OscValue::Nil,
            1 => args.remove(0),
            _ => OscValue::List(args),
        }
    }
}

impl From<bool> for OscValue {
    fn from(v: bool) -> Self {
        OscValue::Bool(v)
    }
}

impl From<i32> for OscValue {
    fn from(v: i32) -> Self {
        OscValue::Int(v as i64)
    }
}

impl From<i64> for OscValue {
    fn from(v: i64) -> Self {
        OscValue::Int(v)
    }
}

impl From<f32> for OscValue {
    fn from(v: f32) -> Self {
        OscValue::Float(v as f64)
    }
}

impl From<f64> for OscValue {
    fn from(v: f64) -> Self {
        OscValue::Float(v)
    }
}

impl From<&str> for OscValue {
    fn from(v: &str) -> Self {
        OscValue::String(v.to_string())
    }
}

impl From<String> for OscValue {
    fn from(v: String) -> Self {
        OscValue::String(v)
    }
}

impl From<Vec<OscValue>> for OscValue {
    fn from(v: Vec<OscValue>) -> Self {
        OscValue::List(v)
    }
}

impl TryFrom<OscValue> for i64 {
    type Error = OscValue;

    fn try_from(value: OscValue) -> std::result::Result<Self, Self::Error> {
        value.as_i64().ok_or(value)
    }
}

impl TryFrom<OscValue> for f64 {
    type Error = OscValue;

    fn try_from(value: OscValue) -> std::result::Result<Self, Self::Error> {
        value.as_f64().ok_or(value)
    }
}

impl TryFrom<OscValue> for bool {
    type Error = OscValue;

    fn try_from(value: OscValue) -> std::result::Result<Self, Self::Error> {
        match value {
            OscValue::Bool(b) => Ok(b),
            other => Err(other),
        }
    }
}

impl TryFrom<OscValue> for String {
    type Error = OscValue;

    fn try_from(value: OscValue) -> std::result::Result<Self, Self::Error> {
        match value {
            OscValue::String(s) => Ok(s),
            other => Err(other),
        }
    }
}

impl TryFrom<OscValue> for Vec<OscValue> {
    type Error = OscValue;

    fn try_from(value: OscValue) -> std::result::Result<Self, Self::Error> {
        match value {
            OscValue::List(items) => Ok(items),
            other => Err(other),
        }
    }
}

impl fmt::Display for OscValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscValue::Nil => f.write_str("nil"),
            OscValue::Bool(b) => write!(f, "{}", b),
            OscValue::Int(i) => write!(f, "{}", i),
            OscValue::Float(v) => write!(f, "{}", v),
            OscValue::String(s) => write!(f, "{:?}", s),
            OscValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
            OscValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// OSC message
#[derive(Debug, Clone)]
pub struct OscMsg {
    /// Address pattern, e.g. `/mixer/fader/1`
    pub address: String,
    pub data: OscValue,
    /// Input port that produced the message
    pub source: Option<PortId>,
    pub(crate) created_at: Instant,
}

impl OscMsg {
    pub fn new(address: impl Into<String>, data: impl Into<OscValue>) -> Self {
        Self {
            address: address.into(),
            data: data.into(),
            source: None,
            created_at: Instant::now(),
        }
    }

    /// Message without arguments
    pub fn empty(address: impl Into<String>) -> Self {
        Self::new(address, OscValue::Nil)
    }

    pub fn with_source(mut self, source: PortId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn matches(&self, pattern: &OscPattern) -> bool {
        pattern.address.test(&self.address) && pattern.data.test(&self.data)
    }
}

impl PartialEq for OscMsg {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.data == other.data
    }
}

impl fmt::Display for OscMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.address, self.data)
    }
}

/// Conditions on OSC message fields
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OscPattern {
    pub address: Cond<String>,
    pub data: Cond<OscValue>,
}

impl OscPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Cond::Eq(address.into());
        self
    }

    pub fn addresses<S: Into<String>>(mut self, addresses: impl IntoIterator<Item = S>) -> Self {
        self.address = Cond::one_of(addresses.into_iter().map(Into::into));
        self
    }

    pub fn data(mut self, data: impl Into<OscValue>) -> Self {
        self.data = Cond::Eq(data.into());
        self
    }
}

impl fmt::Display for OscPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&describe_fields([
            self.address.describe("address"),
            self.data.describe("data"),
        ]))
    }
}

/// Parse an endpoint: `"ip:port"`, `"host:port"` or a bare local port
pub fn parse_endpoint(endpoint: &str) -> Result<SocketAddr> {
    let endpoint = endpoint.trim();

    if !endpoint.is_empty() && endpoint.bytes().all(|b| b.is_ascii_digit()) {
        let port: u16 = endpoint
            .parse()
            .map_err(|_| Error::InvalidAddress(endpoint.to_string()))?;
        return Ok(local_endpoint(port));
    }

    if let Ok(addr) = endpoint.parse::<SocketAddr>() {
        return Ok(addr);
    }

    endpoint
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.find(|a| a.is_ipv4()))
        .ok_or_else(|| Error::InvalidAddress(endpoint.to_string()))
}

/// `127.0.0.1:port`
pub fn local_endpoint(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(parse_endpoint("9000").unwrap(), local_endpoint(9000));
        assert_eq!(
            parse_endpoint("192.168.1.10:8000").unwrap(),
            "192.168.1.10:8000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(parse_endpoint("localhost:9000").unwrap(), local_endpoint(9000));
        assert!(parse_endpoint("99999").is_err());
        assert!(parse_endpoint("no port here").is_err());
        assert!(parse_endpoint("").is_err());
    }

    #[test]
    fn test_args_collapse() {
        assert_eq!(OscValue::from_args(vec![]), OscValue::Nil);
        assert_eq!(OscValue::from_args(vec![1.into()]), OscValue::Int(1));
        assert_eq!(
            OscValue::from_args(vec![1.into(), "a".into()]),
            OscValue::List(vec![OscValue::Int(1), OscValue::String("a".into())])
        );
        assert!(OscValue::Nil.to_args().is_empty());
    }

    #[test]
    fn test_try_from() {
        assert_eq!(i64::try_from(OscValue::Int(4)), Ok(4));
        assert_eq!(f64::try_from(OscValue::Int(4)), Ok(4.0));
        assert!(String::try_from(OscValue::Int(4)).is_err());
    }

    #[test]
    fn test_pattern() {
        let msg = OscMsg::new("/fader/1", 0.5);
        assert!(msg.matches(&OscPattern::new()));
        assert!(msg.matches(&OscPattern::new().address("/fader/1")));
        assert!(msg.matches(&OscPattern::new().addresses(["/fader/1", "/fader/2"])));
        assert!(!msg.matches(&OscPattern::new().address("/fader/2")));
        assert!(!msg.matches(&OscPattern::new().address("/fader/1").data(1.0)));
    }
}
