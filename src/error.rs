//! Error types for the relay.
//!
//! Every variant is fatal for the invocation that raised it. The designed
//! end-of-session signals (end-of-stream, datagram idle timeout) and stray
//! datagrams are not errors and never show up here.

use std::io;
use std::net::{AddrParseError, SocketAddr};
use thiserror::Error;

use crate::request::AddressFamily;

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type for a single relay invocation
#[derive(Debug, Error)]
pub enum RelayError {
    // -------------------------------------------------------------------------
    // Establishment Errors
    // -------------------------------------------------------------------------
    #[error("invalid target address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: AddrParseError,
    },

    #[error("target address {address} does not belong to address family {family}")]
    FamilyMismatch {
        address: SocketAddr,
        family: AddressFamily,
    },

    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to open datagram socket: {0}")]
    Bind(#[source] io::Error),

    // -------------------------------------------------------------------------
    // Handshake Errors
    // -------------------------------------------------------------------------
    #[error("failed to send nonce after {written} byte(s): {source}")]
    Handshake {
        written: usize,
        #[source]
        source: io::Error,
    },

    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("failed to read from target: {0}")]
    Receive(#[source] io::Error),

    #[error("failed to write to target after {written} byte(s): {source}")]
    Transmit {
        written: usize,
        #[source]
        source: io::Error,
    },
}

impl RelayError {
    /// Short machine-friendly label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::InvalidAddress { .. } | RelayError::FamilyMismatch { .. } => "resolve",
            RelayError::Connect { .. } | RelayError::Bind(_) => "connect",
            RelayError::Handshake { .. } => "handshake",
            RelayError::Receive(_) => "receive",
            RelayError::Transmit { .. } => "transmit",
        }
    }
}
