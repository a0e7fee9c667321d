//! Transport contract
//!
//! A [`Transport`] performs JSON-RPC calls against one remote host and, when it
//! advertises [`Capabilities::NOTIFICATIONS`], delivers push notifications to
//! subscribed listeners. Concrete implementations live in their own crates:
//!
//! - `HttpTransport` in `hostlink-http` (poll only)
//! - `TcpTransport` in `hostlink-tcp` (duplex)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::TransportResult;
use crate::link::Link;
use crate::notification::{NotificationCategory, NotificationListener};
use crate::types::{Capabilities, HostDescriptor, RequestId};

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Request/response calls plus optional push notifications against one host
#[async_trait]
pub trait Transport: Send + Sync {
    /// What this instance supports
    fn capabilities(&self) -> Capabilities;

    /// The host this transport talks to
    fn host(&self) -> &HostDescriptor;

    /// Perform one call and wait for its reply
    ///
    /// Safe to run concurrently as long as every in-flight call uses a
    /// distinct `id`; reusing an outstanding id fails with
    /// `DuplicateRequestId`.
    async fn call(&self, method: &str, params: Value, id: RequestId) -> TransportResult<Value>;

    /// Register for push notifications in one category
    ///
    /// Transports without notification support return [`Link::noop`].
    fn subscribe(&self, category: NotificationCategory, listener: Arc<dyn NotificationListener>) -> Link;

    /// Release listeners, stop background work and close I/O. Idempotent.
    async fn dispose(&self);

    fn is_disposed(&self) -> bool;

    /// Whether calls can still reach the host
    ///
    /// A duplex transport also turns false once its read loop has ended.
    fn is_connected(&self) -> bool {
        !self.is_disposed()
    }
}

// ----------------------------------------------------------------------------
// Host Locator
// ----------------------------------------------------------------------------

/// Supplies hosts from configuration and opens transports to them
#[async_trait]
pub trait HostLocator: Send + Sync {
    /// Every configured host
    fn enumerate(&self) -> Vec<HostDescriptor>;

    /// Host to connect to, if any is configured
    fn preferred_host(&self) -> Option<HostDescriptor>;

    /// Open a transport of the host's configured kind
    async fn connect(&self, host: &HostDescriptor) -> TransportResult<Arc<dyn Transport>>;
}

// ----------------------------------------------------------------------------
// Request Id Sequence
// ----------------------------------------------------------------------------

/// Monotonic source of correlation ids
#[derive(Debug)]
pub struct RequestIdSequence {
    next: AtomicU64,
}

impl RequestIdSequence {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> RequestId {
        RequestId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RequestIdSequence {
    fn default() -> Self {
        Self::new()
    }
}
