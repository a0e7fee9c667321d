//! Error types for the hostlink client
//!
//! `TransportError` is the uniform failure taxonomy shared by every transport
//! implementation. `HostlinkError` wraps it together with the failures that can
//! happen above the transport (configuration, lifecycle receivers, scheduling).

use crate::types::RequestId;

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Failure branch of a transport call
///
/// Cloneable so a single read-loop failure can be delivered to every
/// outstanding call at once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("No transport available")]
    NotConnected,
    #[error("I/O failure: {0}")]
    Io(String),
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("Host rejected the credentials")]
    Unauthorized,
    #[error("Endpoint not found")]
    NotFound,
    #[error("Unexpected response status {status}")]
    Unknown { status: u16 },
    #[error("Request id {0} is already outstanding")]
    DuplicateRequestId(RequestId),
    #[error("Call cancelled while waiting for a response")]
    Cancelled,
    #[error("Host returned error {code}: {message}")]
    Remote { code: i64, message: String },
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::ProtocolViolation(err.to_string())
    }
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Errors surfaced by the client runtime
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostlinkError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Receiver error: {0}")]
    Receiver(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl HostlinkError {
    /// The underlying transport failure, if this error came from a call
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            HostlinkError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

pub type TransportResult<T> = core::result::Result<T, TransportError>;
pub type HostlinkResult<T> = core::result::Result<T, HostlinkError>;
