//! Router error types

use patchbay_core::PortId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("declaration arguments for {id} must match the first declaration: {existing}")]
    ArgsMismatch { id: PortId, existing: String },

    #[error("{id} is already declared as a different port type")]
    KindMismatch { id: PortId },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("can't subscribe to {0}: it has no input ports")]
    NoInputs(PortId),

    #[error("can't send through {0}: port is closed")]
    NotOpen(PortId),

    #[error("{port} can't handle {msg_type}")]
    Unsupported { port: PortId, msg_type: &'static str },

    #[error("send failed on {port}: {reason}")]
    Send { port: PortId, reason: String },

    #[error("core error: {0}")]
    Core(#[from] patchbay_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
