//! Mock Transport for Testing
//!
//! Deterministic transport whose replies are scripted per method. Calls are
//! recorded so tests can assert on what the runtime asked for, and duplex
//! mocks can push notifications through a real [`NotificationHub`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use hostlink_core::{
    methods, Capabilities, ExecutionContext, HostDescriptor, Link, NotificationCategory, NotificationHub,
    NotificationListener, RequestId, Transport, TransportError, TransportKind, TransportResult,
};
use serde_json::{json, Value};
use tracing::debug;

/// One call the mock received
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
    pub id: RequestId,
}

#[derive(Default)]
struct Script {
    /// Consumed front to back before falling back to `sticky`
    once: HashMap<String, VecDeque<TransportResult<Value>>>,
    sticky: HashMap<String, TransportResult<Value>>,
    hanging: HashSet<String>,
    calls: Vec<RecordedCall>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ----------------------------------------------------------------------------
// Mock Transport
// ----------------------------------------------------------------------------

/// Scripted [`Transport`] double
pub struct MockTransport {
    host: HostDescriptor,
    hub: Option<NotificationHub>,
    script: Mutex<Script>,
    disposals: AtomicUsize,
    severed: AtomicBool,
}

impl MockTransport {
    /// A transport without push support
    pub fn polling(name: &str) -> Self {
        Self {
            host: HostDescriptor::new(name, "127.0.0.1", 8080, TransportKind::Http),
            hub: None,
            script: Mutex::new(Script::default()),
            disposals: AtomicUsize::new(0),
            severed: AtomicBool::new(false),
        }
    }

    /// A transport that pushes notifications, delivered on `context`
    pub fn duplex(name: &str, context: ExecutionContext) -> Self {
        Self {
            host: HostDescriptor::new(name, "127.0.0.1", 9090, TransportKind::Tcp),
            hub: Some(NotificationHub::new(context)),
            script: Mutex::new(Script::default()),
            disposals: AtomicUsize::new(0),
            severed: AtomicBool::new(false),
        }
    }

    /// Answer every call to `method` with `result` until rescripted
    pub fn respond(&self, method: &str, result: Value) -> &Self {
        lock(&self.script).sticky.insert(method.to_string(), Ok(result));
        self
    }

    /// Fail every call to `method` with `err` until rescripted
    pub fn fail(&self, method: &str, err: TransportError) -> &Self {
        lock(&self.script).sticky.insert(method.to_string(), Err(err));
        self
    }

    /// Answer the next call to `method` only
    pub fn respond_once(&self, method: &str, outcome: TransportResult<Value>) -> &Self {
        lock(&self.script)
            .once
            .entry(method.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Calls to `method` never complete
    pub fn hang(&self, method: &str) -> &Self {
        lock(&self.script).hanging.insert(method.to_string());
        self
    }

    /// Script the three refresh calls for a host with nothing playing
    pub fn script_idle(&self, volume: u32, muted: bool) -> &Self {
        self.respond(methods::APPLICATION_GET_PROPERTIES, json!({"volume": volume, "muted": muted}))
            .respond(methods::PLAYER_GET_ACTIVE_PLAYERS, json!([]))
    }

    /// Script the refresh calls for a host with one player at `speed`
    pub fn script_playing(&self, speed: i32, title: &str) -> &Self {
        self.respond(methods::APPLICATION_GET_PROPERTIES, json!({"volume": 80, "muted": false}))
            .respond(
                methods::PLAYER_GET_ACTIVE_PLAYERS,
                json!([{"playerid": 1, "type": "video"}]),
            )
            .respond(
                methods::PLAYER_GET_PROPERTIES,
                json!({
                    "speed": speed,
                    "percentage": 12.5,
                    "time": {"hours": 0, "minutes": 5, "seconds": 0, "milliseconds": 0},
                    "totaltime": {"hours": 0, "minutes": 40, "seconds": 0, "milliseconds": 0}
                }),
            )
            .respond(
                methods::PLAYER_GET_ITEM,
                json!({"item": {"id": 42, "label": title, "title": title, "type": "movie"}}),
            )
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.script).calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        lock(&self.script)
            .calls
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    /// How many times `dispose` ran, repeats included
    pub fn dispose_count(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    /// Push a notification to subscribed listeners
    ///
    /// Returns the number of listeners it was queued for; always zero for a
    /// polling mock.
    pub fn push(&self, method: &str, params: Value) -> usize {
        match &self.hub {
            Some(hub) if !self.is_disposed() => hub.dispatch_raw(method.to_string(), params),
            _ => 0,
        }
    }

    /// Simulate the host dropping the connection
    ///
    /// Later calls fail with `NotConnected`. A duplex mock also reports `err`
    /// on its context, the way a real read loop does when it ends.
    pub fn sever(&self, err: TransportError) {
        if self.severed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(host = %self.host.name, %err, "Mock connection severed");
        if let Some(hub) = &self.hub {
            hub.report_error(err);
        }
    }

    pub fn listener_count(&self, category: NotificationCategory) -> usize {
        self.hub
            .as_ref()
            .map(|hub| hub.listener_count(category))
            .unwrap_or(0)
    }

    fn next_outcome(&self, method: &str) -> Option<TransportResult<Value>> {
        let mut script = lock(&self.script);
        if script.hanging.contains(method) {
            return None;
        }
        if let Some(outcome) = script.once.get_mut(method).and_then(VecDeque::pop_front) {
            return Some(outcome);
        }
        Some(script.sticky.get(method).cloned().unwrap_or_else(|| {
            Err(TransportError::Remote {
                code: -32601,
                message: "Method not found.".into(),
            })
        }))
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn capabilities(&self) -> Capabilities {
        if self.hub.is_some() {
            Capabilities::POLLING | Capabilities::NOTIFICATIONS
        } else {
            Capabilities::POLLING
        }
    }

    fn host(&self) -> &HostDescriptor {
        &self.host
    }

    async fn call(&self, method: &str, params: Value, id: RequestId) -> TransportResult<Value> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        lock(&self.script).calls.push(RecordedCall {
            method: method.to_string(),
            params,
            id,
        });
        debug!(%id, method, "Mock call");

        match self.next_outcome(method) {
            Some(outcome) => outcome,
            None => std::future::pending().await,
        }
    }

    fn subscribe(&self, category: NotificationCategory, listener: Arc<dyn NotificationListener>) -> Link {
        match &self.hub {
            Some(hub) => hub.subscribe(category, listener),
            None => Link::noop(),
        }
    }

    async fn dispose(&self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
        if let Some(hub) = &self.hub {
            hub.clear();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposals.load(Ordering::SeqCst) > 0
    }

    fn is_connected(&self) -> bool {
        !self.severed.load(Ordering::SeqCst) && !self.is_disposed()
    }
}
