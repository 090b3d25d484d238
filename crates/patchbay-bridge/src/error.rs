//! Bridge error types

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("no response from {address} within {timeout:?}")]
    QueryTimeout { address: String, timeout: Duration },

    #[error("response from {address} is not {expected}: {got}")]
    MalformedResponse {
        address: String,
        expected: &'static str,
        got: String,
    },

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Router(#[from] patchbay_router::RouterError),

    #[error("core error: {0}")]
    Core(#[from] patchbay_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BridgeError> for patchbay_router::RouterError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Router(inner) => inner,
            BridgeError::Core(inner) => patchbay_router::RouterError::Core(inner),
            BridgeError::Io(inner) => patchbay_router::RouterError::Io(inner),
            other => patchbay_router::RouterError::Config(other.to_string()),
        }
    }
}
