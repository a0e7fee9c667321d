//! One-shot handle to a background operation
//!
//! A [`Pending`] wraps a task spawned on the worker runtime. Clones share the
//! same task: exactly one holder can take the join handle to await it, and
//! any holder can cancel it.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hostlink_core::HostlinkResult;
use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinHandle};

struct PendingInner<T> {
    handle: Mutex<Option<JoinHandle<HostlinkResult<T>>>>,
    abort: AbortHandle,
}

/// Shared, cancellable handle to a value being produced in the background
pub struct Pending<T> {
    inner: Arc<PendingInner<T>>,
}

impl<T: Send + 'static> Pending<T> {
    /// Run `future` on the worker runtime
    pub fn spawn<F>(runtime: &Handle, future: F) -> Self
    where
        F: Future<Output = HostlinkResult<T>> + Send + 'static,
    {
        let handle = runtime.spawn(future);
        let abort = handle.abort_handle();
        Self {
            inner: Arc::new(PendingInner {
                handle: Mutex::new(Some(handle)),
                abort,
            }),
        }
    }

    /// Resolve to `value` once `delay` has elapsed
    pub fn delayed(runtime: &Handle, delay: Duration, value: T) -> Self {
        Self::spawn(runtime, async move {
            tokio::time::sleep(delay).await;
            Ok(value)
        })
    }
}

impl<T> Pending<T> {
    /// Take the join handle; `None` if another holder already took it
    pub fn take(&self) -> Option<JoinHandle<HostlinkResult<T>>> {
        match self.inner.handle.lock() {
            Ok(mut handle) => handle.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    pub fn is_taken(&self) -> bool {
        match self.inner.handle.lock() {
            Ok(handle) => handle.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    /// Abort the background task; repeated calls are harmless
    pub fn cancel(&self) {
        self.inner.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.inner.abort.is_finished()
    }

    /// Whether both handles refer to the same background task
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Pending<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("taken", &self.is_taken())
            .field("finished", &self.is_finished())
            .finish()
    }
}
