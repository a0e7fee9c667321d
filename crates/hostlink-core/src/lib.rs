//! hostlink core
//!
//! Shared building blocks for a client that keeps a live control session
//! against one remote host over JSON-RPC:
//!
//! - the wire codec and the uniform transport error taxonomy
//! - the [`Transport`] and [`HostLocator`] contracts
//! - [`Link`] unsubscribe tokens and the [`NotificationHub`] fan-out
//! - the single-threaded [`ExecutionContext`] that runs listener and
//!   lifecycle callbacks
//!
//! Transports live in `hostlink-http` and `hostlink-tcp`; the lifecycle
//! state machine lives in `hostlink-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod context;
pub mod errors;
pub mod link;
pub mod methods;
pub mod notification;
pub mod transport;
pub mod types;
pub mod wire;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{DuplexConfig, HostlinkConfig, HttpConfig, LifecycleConfig};
pub use context::{ErrorHandler, ExecutionContext};
pub use errors::{HostlinkError, HostlinkResult, TransportError, TransportResult};
pub use link::Link;
pub use notification::{Notification, NotificationCategory, NotificationHub, NotificationListener};
pub use transport::{HostLocator, RequestIdSequence, Transport};
pub use types::{Capabilities, Credentials, HostDescriptor, RequestId, TransportKind};
