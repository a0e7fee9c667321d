//! Designated execution context
//!
//! All lifecycle state applications and notification listener callbacks run on
//! one `ExecutionContext`: a single tokio task draining a queue of jobs
//! strictly in posting order. Transport I/O never runs here.
//!
//! A job that returns an error, or panics, is routed to the context's error
//! handler and the loop carries on with the next job.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::errors::{HostlinkError, HostlinkResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Callback receiving errors raised on the context
pub type ErrorHandler = Arc<dyn Fn(HostlinkError) + Send + Sync + 'static>;

// ----------------------------------------------------------------------------
// Execution Context
// ----------------------------------------------------------------------------

/// Handle to a single-threaded, strictly ordered job queue
#[derive(Clone)]
pub struct ExecutionContext {
    name: Arc<str>,
    sender: mpsc::UnboundedSender<Job>,
    error_handler: Arc<RwLock<ErrorHandler>>,
}

impl ExecutionContext {
    /// Start a context loop on the given runtime
    ///
    /// The loop ends once every clone of the returned handle has been dropped.
    pub fn new(name: &str, runtime: &Handle) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let name: Arc<str> = Arc::from(name);
        let default_name = Arc::clone(&name);
        let default_handler: ErrorHandler = Arc::new(move |err: HostlinkError| {
            error!(context = %default_name, "Unhandled error: {}", err);
        });
        let error_handler = Arc::new(RwLock::new(default_handler));

        let loop_name = Arc::clone(&name);
        let loop_handler = Arc::clone(&error_handler);
        runtime.spawn(async move {
            debug!(context = %loop_name, "Execution context started");
            while let Some(job) = receiver.recv().await {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    let handler = read_handler(&loop_handler);
                    handler(HostlinkError::Receiver(format!(
                        "job panicked on context {}",
                        loop_name
                    )));
                }
            }
            debug!(context = %loop_name, "Execution context stopped");
        });

        Self {
            name,
            sender,
            error_handler,
        }
    }

    /// Start a context on the runtime the caller is currently inside
    pub fn current(name: &str) -> Self {
        Self::new(name, &Handle::current())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the handler that receives errors raised on this context
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(HostlinkError) + Send + Sync + 'static,
    {
        let handler: ErrorHandler = Arc::new(handler);
        match self.error_handler.write() {
            Ok(mut slot) => *slot = handler,
            Err(poisoned) => *poisoned.into_inner() = handler,
        }
    }

    /// Queue a job; returns false if the context loop has stopped
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender.send(Box::new(job)).is_ok()
    }

    /// Queue a job whose error goes to the error handler
    pub fn post_fallible<F>(&self, job: F) -> bool
    where
        F: FnOnce() -> HostlinkResult<()> + Send + 'static,
    {
        let handler = Arc::clone(&self.error_handler);
        self.post(move || {
            if let Err(err) = job() {
                read_handler(&handler)(err);
            }
        })
    }

    /// Deliver an error to the error handler on the context
    pub fn report(&self, err: HostlinkError) -> bool {
        self.post_fallible(move || Err(err))
    }

    /// Resolve once every job posted before this call has run
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.post(move || {
            let _ = done.send(());
        }) {
            let _ = wait.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

fn read_handler(slot: &RwLock<ErrorHandler>) -> ErrorHandler {
    match slot.read() {
        Ok(handler) => Arc::clone(&handler),
        Err(poisoned) => Arc::clone(&poisoned.into_inner()),
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
