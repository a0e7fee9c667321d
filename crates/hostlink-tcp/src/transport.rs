//! Duplex TCP transport
//!
//! One socket per host. Calls are written synchronously under a writer lock and
//! then wait on a one-shot result slot; a single background read loop decodes
//! the undelimited JSON stream, resolving replies through the correlation table
//! and handing push notifications to the [`NotificationHub`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hostlink_core::{
    wire::{self, Inbound, StreamDecoder},
    Capabilities, DuplexConfig, ExecutionContext, HostDescriptor, Link, NotificationCategory,
    NotificationHub, NotificationListener, RequestId, Transport, TransportError, TransportResult,
};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::correlation::CorrelationTable;

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

/// State shared between callers and the read loop
struct Shared {
    table: CorrelationTable,
    hub: NotificationHub,
    connected: AtomicBool,
    disposed: AtomicBool,
}

impl Shared {
    /// Route one decoded value to a waiting call or to the listeners
    fn route(&self, value: Value) {
        match wire::classify(value) {
            Ok(Inbound::Reply { id, outcome }) => {
                if self.table.resolve(id, outcome) {
                    debug!(%id, "Response matched");
                } else {
                    warn!(%id, "Dropping response with no pending request (possible duplicate)");
                }
            }
            Ok(Inbound::Notification { method, params }) => {
                debug!(%method, "Notification received");
                self.hub.dispatch_raw(method, params);
            }
            Err(err) => warn!(%err, "Dropping undecodable message"),
        }
    }
}

// ----------------------------------------------------------------------------
// TCP Transport
// ----------------------------------------------------------------------------

/// Persistent-socket transport with push notification support
pub struct TcpTransport {
    host: HostDescriptor,
    config: DuplexConfig,
    shared: Arc<Shared>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    /// Connect to the host and start the read loop on `runtime`
    ///
    /// Notification listeners and read-loop failures are delivered on
    /// `context`.
    pub async fn connect(
        host: HostDescriptor,
        config: DuplexConfig,
        context: ExecutionContext,
        runtime: &Handle,
    ) -> TransportResult<Self> {
        info!(host = %host, "Opening duplex transport");
        // Open the socket on `runtime` so its I/O is driven there
        let authority = host.authority();
        let connect_timeout = config.connect_timeout;
        let attempt = runtime
            .spawn(async move { timeout(connect_timeout, TcpStream::connect(authority)).await })
            .await
            .map_err(|err| TransportError::Io(format!("connect task failed: {}", err)))?;
        let stream = match attempt {
            Ok(stream) => stream?,
            Err(_) => {
                return Err(TransportError::Io(format!(
                    "connect to {} timed out after {:?}",
                    host.authority(),
                    config.connect_timeout
                )))
            }
        };
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let shared = Arc::new(Shared {
            table: CorrelationTable::new(),
            hub: NotificationHub::new(context),
            connected: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
        });

        let reader = runtime.spawn(read_loop(
            read_half,
            Arc::clone(&shared),
            config.clone(),
            host.name.clone(),
        ));

        Ok(Self {
            host,
            config,
            shared,
            writer: tokio::sync::Mutex::new(Some(write_half)),
            reader: Mutex::new(Some(reader)),
        })
    }

    /// Number of calls waiting for a response
    pub fn pending_calls(&self) -> usize {
        self.shared.table.len()
    }

    pub fn notifications(&self) -> &NotificationHub {
        &self.shared.hub
    }

    async fn write(&self, bytes: &[u8]) -> TransportResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
        match timeout(self.config.write_timeout, writer.write_all(bytes)).await {
            Ok(result) => result.map_err(TransportError::from),
            Err(_) => Err(TransportError::Io(format!(
                "write timed out after {:?}",
                self.config.write_timeout
            ))),
        }
    }

    fn take_reader(&self) -> Option<JoinHandle<()>> {
        match self.reader.lock() {
            Ok(mut reader) => reader.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn capabilities(&self) -> Capabilities {
        Capabilities::POLLING | Capabilities::NOTIFICATIONS
    }

    fn host(&self) -> &HostDescriptor {
        &self.host
    }

    async fn call(&self, method: &str, params: Value, id: RequestId) -> TransportResult<Value> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let bytes = wire::encode_request(id, method, &params)?;
        let slot = self.shared.table.register(id)?;
        debug!(%id, method, "Sending request");

        if let Err(err) = self.write(&bytes).await {
            self.shared.table.forget(id);
            return Err(err);
        }

        // A dropped slot means the transport was disposed while we waited.
        match slot.await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::Cancelled),
        }
    }

    fn subscribe(&self, category: NotificationCategory, listener: Arc<dyn NotificationListener>) -> Link {
        if self.is_disposed() {
            return Link::noop();
        }
        self.shared.hub.subscribe(category, listener)
    }

    async fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(host = %self.host.name, "Disposing duplex transport");

        self.shared.hub.clear();
        if let Some(reader) = self.take_reader() {
            reader.abort();
        }
        let cancelled = self.shared.table.clear();
        if cancelled > 0 {
            debug!(cancelled, "Cancelled outstanding calls");
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(err) = writer.shutdown().await {
                debug!(%err, "Socket shutdown failed");
            }
        }
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    /// False once the read loop has ended or the transport was disposed
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst) && !self.is_disposed()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.take_reader() {
            reader.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Read Loop
// ----------------------------------------------------------------------------

async fn read_loop(mut reader: OwnedReadHalf, shared: Arc<Shared>, config: DuplexConfig, host_name: String) {
    debug!(host = %host_name, "Read loop started");
    let err = read_until_failure(&mut reader, &shared, &config).await;

    shared.connected.store(false, Ordering::SeqCst);
    let failed = shared.table.fail_all(&err);

    if shared.disposed.load(Ordering::SeqCst) {
        debug!(host = %host_name, "Read loop stopped after dispose");
        return;
    }
    warn!(host = %host_name, %err, failed, "Read loop terminated");
    shared.hub.report_error(err);
}

async fn read_until_failure(reader: &mut OwnedReadHalf, shared: &Shared, config: &DuplexConfig) -> TransportError {
    let mut decoder = StreamDecoder::new();
    let mut buffer = vec![0u8; config.read_buffer_size];

    loop {
        let read = match timeout(config.read_timeout, reader.read(&mut buffer)).await {
            Ok(Ok(0)) => return TransportError::Io("connection closed by host".into()),
            Ok(Ok(read)) => read,
            Ok(Err(err)) => return err.into(),
            Err(_) => {
                return TransportError::Io(format!(
                    "no data from host for {:?}",
                    config.read_timeout
                ))
            }
        };
        decoder.extend(&buffer[..read]);

        loop {
            match decoder.next_value() {
                Ok(Some(value)) => shared.route(value),
                Ok(None) => break,
                Err(err) => return err,
            }
        }
    }
}
