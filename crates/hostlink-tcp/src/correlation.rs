//! Correlation table for in-flight calls
//!
//! The only structure touched concurrently by callers (inserting) and the read
//! loop (removing). The lock is held for the map operation only, never while a
//! caller waits on its result slot.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use hostlink_core::{RequestId, TransportError, TransportResult};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

type ResultSlot = oneshot::Sender<TransportResult<Value>>;

#[derive(Debug, Default)]
struct Inner {
    pending: HashMap<RequestId, ResultSlot>,
    /// Set once the connection is gone; later registrations are refused
    closed: bool,
}

/// Pending requests keyed by correlation id
#[derive(Debug, Default)]
pub struct CorrelationTable {
    inner: Mutex<Inner>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a call and hand back the receiving end of its result slot
    ///
    /// Fails with `NotConnected` once the table has been closed by
    /// [`fail_all`](Self::fail_all) or [`clear`](Self::clear).
    pub fn register(&self, id: RequestId) -> TransportResult<oneshot::Receiver<TransportResult<Value>>> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(TransportError::NotConnected);
        }
        if inner.pending.contains_key(&id) {
            return Err(TransportError::DuplicateRequestId(id));
        }
        let (slot, receiver) = oneshot::channel();
        inner.pending.insert(id, slot);
        Ok(receiver)
    }

    /// Resolve the call registered under `id`
    ///
    /// Returns false when no call is waiting for this id.
    pub fn resolve(&self, id: RequestId, outcome: TransportResult<Value>) -> bool {
        let slot = self.lock().pending.remove(&id);
        match slot {
            Some(slot) => {
                if slot.send(outcome).is_err() {
                    debug!(%id, "Caller stopped waiting before its response arrived");
                }
                true
            }
            None => false,
        }
    }

    /// Remove a call whose request never made it onto the wire
    pub fn forget(&self, id: RequestId) {
        self.lock().pending.remove(&id);
    }

    /// Close the table and fail every outstanding call with the same error
    pub fn fail_all(&self, err: &TransportError) -> usize {
        let drained: Vec<ResultSlot> = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.pending.drain().map(|(_, slot)| slot).collect()
        };
        let count = drained.len();
        for slot in drained {
            let _ = slot.send(Err(err.clone()));
        }
        count
    }

    /// Close the table and drop every outstanding slot; waiting callers
    /// observe cancellation
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        inner.closed = true;
        let count = inner.pending.len();
        inner.pending.clear();
        count
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.lock().pending.contains_key(&id)
    }
}
