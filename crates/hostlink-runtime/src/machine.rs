//! Generic async state machine
//!
//! Holds exactly one current state and applies it to an effect receiver on the
//! designated [`ExecutionContext`]. Background operations that will produce
//! the next state are tracked as jobs so [`StateMachine::stop`] can cancel
//! them and hand back the states that started them.
//!
//! The machine knows nothing about what a state means. A state only has to
//! implement [`State`] for the receiver type it is applied to.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use hostlink_core::{ExecutionContext, HostlinkError, HostlinkResult};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use crate::pending::Pending;

// ----------------------------------------------------------------------------
// State Trait
// ----------------------------------------------------------------------------

/// A value that knows how to apply itself to a receiver
pub trait State<R: ?Sized>: Clone + Send + 'static {
    fn apply(&self, receiver: &R) -> HostlinkResult<()>;
}

// ----------------------------------------------------------------------------
// Jobs
// ----------------------------------------------------------------------------

/// A tracked background wait
struct Job<S> {
    /// The state that was current when the wait started
    producer: S,
    waiter: AbortHandle,
    pending: Pending<S>,
}

struct Shared<S> {
    current: Mutex<Option<S>>,
    jobs: Mutex<BTreeMap<u64, Job<S>>>,
    next_job: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<S: Clone> Shared<S> {
    fn set_current(&self, state: S) {
        *lock(&self.current) = Some(state);
    }

    fn current(&self) -> Option<S> {
        lock(&self.current).clone()
    }

    fn finish(&self, id: u64) -> bool {
        lock(&self.jobs).remove(&id).is_some()
    }
}

// ----------------------------------------------------------------------------
// State Machine
// ----------------------------------------------------------------------------

/// Single-current-state scheduler with cancellable background waits
pub struct StateMachine<S> {
    context: ExecutionContext,
    runtime: Handle,
    shared: Arc<Shared<S>>,
}

impl<S: Clone + Send + 'static> StateMachine<S> {
    /// Applications run on `context`; background waits run on `runtime`
    pub fn new(context: ExecutionContext, runtime: Handle) -> Self {
        Self {
            context,
            runtime,
            shared: Arc::new(Shared {
                current: Mutex::new(None),
                jobs: Mutex::new(BTreeMap::new()),
                next_job: AtomicU64::new(1),
            }),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Snapshot of the current state
    pub fn current(&self) -> Option<S> {
        self.shared.current()
    }

    /// Number of background waits still tracked
    pub fn pending_jobs(&self) -> usize {
        lock(&self.shared.jobs).len()
    }

    /// Make `state` current and dispatch it
    pub fn apply<R>(&self, state: S, receiver: &Arc<R>)
    where
        R: ?Sized + Send + Sync + 'static,
        S: State<R>,
    {
        self.shared.set_current(state);
        self.dispatch(receiver);
    }

    /// Apply whatever is current when the job runs on the context
    ///
    /// Errors from the application go to the context's error handler. The
    /// receiver is held weakly; a receiver dropped before the job runs is
    /// skipped.
    pub fn dispatch<R>(&self, receiver: &Arc<R>)
    where
        R: ?Sized + Send + Sync + 'static,
        S: State<R>,
    {
        dispatch_on(&self.context, &self.shared, Arc::downgrade(receiver));
    }

    /// Wait for `pending` in the background, then apply its state
    ///
    /// The current state is recorded as the job's producer. A failed wait is
    /// handed to `on_error` on the context; a cancelled wait is dropped
    /// without a trace beyond a debug log.
    pub fn await_state<R, E>(&self, pending: Pending<S>, receiver: &Arc<R>, on_error: E) -> HostlinkResult<()>
    where
        R: ?Sized + Send + Sync + 'static,
        S: State<R>,
        E: FnOnce(HostlinkError) + Send + 'static,
    {
        let producer = self
            .shared
            .current()
            .ok_or_else(|| HostlinkError::Scheduler("await requires a current state".into()))?;
        let handle = pending
            .take()
            .ok_or_else(|| HostlinkError::Scheduler("pending state is already being awaited".into()))?;

        let id = self.shared.next_job.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let context = self.context.clone();
        let receiver = Arc::downgrade(receiver);

        // Hold the table while spawning so the waiter cannot finish before
        // its job is recorded.
        let mut jobs = lock(&self.shared.jobs);
        let waiter = self.runtime.spawn(async move {
            let outcome = handle.await;
            shared.finish(id);
            match outcome {
                Ok(Ok(next)) => {
                    trace!(job = id, "Job produced next state");
                    shared.set_current(next);
                    dispatch_on(&context, &shared, receiver);
                }
                Ok(Err(err)) => {
                    debug!(job = id, %err, "Job failed");
                    context.post(move || on_error(err));
                }
                Err(join) if join.is_cancelled() => {
                    debug!(job = id, "Job cancelled");
                }
                Err(join) => {
                    context.report(HostlinkError::Scheduler(format!("job {} panicked: {}", id, join)));
                }
            }
        });
        jobs.insert(
            id,
            Job {
                producer,
                waiter: waiter.abort_handle(),
                pending,
            },
        );
        trace!(job = id, "Job scheduled");
        Ok(())
    }

    /// Cancel every tracked wait and return the states that started them
    ///
    /// The backlog is ordered by when each wait was scheduled. No job remains
    /// tracked afterwards.
    pub fn stop(&self) -> VecDeque<S> {
        let jobs = std::mem::take(&mut *lock(&self.shared.jobs));
        let mut backlog = VecDeque::with_capacity(jobs.len());
        for (id, job) in jobs {
            job.waiter.abort();
            job.pending.cancel();
            debug!(job = id, "Job stopped");
            backlog.push_back(job.producer);
        }
        backlog
    }
}

fn dispatch_on<S, R>(context: &ExecutionContext, shared: &Arc<Shared<S>>, receiver: Weak<R>)
where
    R: ?Sized + Send + Sync + 'static,
    S: State<R>,
{
    let shared = Arc::clone(shared);
    context.post_fallible(move || {
        let Some(receiver) = receiver.upgrade() else {
            trace!("Receiver dropped before dispatch");
            return Ok(());
        };
        match shared.current() {
            Some(state) => state.apply(&receiver),
            None => Ok(()),
        }
    });
}

impl<S> fmt::Debug for StateMachine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("context", &self.context.name())
            .field("jobs", &lock(&self.shared.jobs).len())
            .finish()
    }
}
