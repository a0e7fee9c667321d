//! Live connection session
//!
//! [`Session`] is the lifecycle receiver that drives a single host connection
//! from `Disconnected` through to a synced idle status and keeps it fresh:
//!
//! - Disconnected: ask the controller to connect
//! - Connecting / Refreshing: await the pending status; failures retry after a
//!   delay through the state machine so `teardown` cancels the retry as well
//! - Connected: refresh
//! - PlayerIdle / PlayerActive: remember the status and sync once
//! - Synced: keep the link and immediately re-apply the remembered status
//!
//! Remote changes arriving while a refresh is in flight are folded into a
//! single follow-up refresh. A transport error reported on the context for a
//! transport that can no longer reach its host starts over from
//! `Disconnected`.
//!
//! Every applied status and every error is reported to a [`SessionObserver`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use hostlink_core::{HostlinkError, HostlinkResult, Link, TransportError};
use tracing::{debug, info, warn};

use crate::controller::{ChangeCallback, ConnectionController};
use crate::lifecycle::{ConnectionStatus, LifecycleReceiver, PlayerSnapshot, TransportHandle};
use crate::machine::StateMachine;
use crate::pending::Pending;

/// The UI seam: sees every status the session applies
pub trait SessionObserver: Send + Sync {
    fn on_status(&self, status: &ConnectionStatus);
    fn on_error(&self, error: &HostlinkError);
}

#[derive(Default)]
struct SessionState {
    transport: Option<TransportHandle>,
    link: Option<Link>,
    /// Last idle or active status, re-applied after sync
    idle_status: Option<ConnectionStatus>,
    /// A refresh has been applied and has not settled or failed yet
    refreshing: bool,
    /// A remote change arrived during the current refresh
    refresh_again: bool,
    closed: bool,
}

impl SessionState {
    fn forget_transport(&mut self) -> Option<Link> {
        self.transport = None;
        self.idle_status = None;
        self.refreshing = false;
        self.refresh_again = false;
        self.link.take()
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

pub struct Session {
    me: Weak<Session>,
    controller: ConnectionController,
    machine: StateMachine<ConnectionStatus>,
    observer: Arc<dyn SessionObserver>,
    state: Mutex<SessionState>,
}

impl Session {
    /// The machine shares the controller's execution context and runtime
    pub fn new(controller: ConnectionController, observer: Arc<dyn SessionObserver>) -> Arc<Self> {
        let machine = StateMachine::new(controller.context().clone(), controller.runtime().clone());
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            controller,
            machine,
            observer,
            state: Mutex::new(SessionState::default()),
        })
    }

    /// Route context errors to the session and enter `Disconnected`
    pub fn start(&self) -> HostlinkResult<()> {
        let weak = self.me.clone();
        self.machine.context().set_error_handler(move |err| match weak.upgrade() {
            Some(session) => session.context_error(err),
            None => warn!(%err, "Error after session was dropped"),
        });
        info!("Session started");
        self.apply(ConnectionStatus::Disconnected)
    }

    pub fn current(&self) -> Option<ConnectionStatus> {
        self.machine.current()
    }

    pub fn machine(&self) -> &StateMachine<ConnectionStatus> {
        &self.machine
    }

    pub fn controller(&self) -> &ConnectionController {
        &self.controller
    }

    pub fn transport(&self) -> Option<TransportHandle> {
        self.lock().transport.clone()
    }

    pub fn is_synced(&self) -> bool {
        self.lock().link.is_some()
    }

    /// Whether a refresh is in flight
    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    /// Unlink, cancel outstanding jobs and dispose the transport
    ///
    /// Returns the statuses whose background work was cancelled.
    pub async fn teardown(&self) -> VecDeque<ConnectionStatus> {
        let (link, transport) = {
            let mut state = self.lock();
            state.closed = true;
            state.idle_status = None;
            (state.link.take(), state.transport.take())
        };
        if let Some(link) = link {
            link.unlink();
        }
        let backlog = self.machine.stop();
        if let Some(transport) = transport {
            transport.dispose().await;
        }
        info!(cancelled = backlog.len(), "Session torn down");
        backlog
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn this(&self) -> HostlinkResult<Arc<Self>> {
        self.me
            .upgrade()
            .ok_or_else(|| HostlinkError::Receiver("session dropped".into()))
    }

    fn apply(&self, status: ConnectionStatus) -> HostlinkResult<()> {
        debug!(status = status.name(), "Applying");
        self.machine.apply(status, &self.this()?);
        Ok(())
    }

    fn await_status<E>(&self, pending: Pending<ConnectionStatus>, on_error: E) -> HostlinkResult<()>
    where
        E: FnOnce(Arc<Session>, HostlinkError) + Send + 'static,
    {
        let weak = self.me.clone();
        self.machine.await_state(pending, &self.this()?, move |err| {
            if let Some(session) = weak.upgrade() {
                on_error(session, err);
            }
        })
    }

    /// Re-enter `status` once `delay` has passed
    fn retry(&self, delay: std::time::Duration, status: ConnectionStatus) -> HostlinkResult<()> {
        let pending = self.controller.retry_after(delay, status);
        self.await_status(pending, |session, err| session.observer.on_error(&err))
    }

    fn connect_failed(&self, err: HostlinkError) {
        if self.is_closed() {
            return;
        }
        warn!(%err, "Connect failed");
        self.observer.on_error(&err);
        if let Err(err) = self.retry(self.controller.config().connect_retry_delay, ConnectionStatus::Disconnected) {
            self.observer.on_error(&err);
        }
    }

    /// `transport` is the one the failed refresh was started on
    fn refresh_failed(&self, transport: Option<TransportHandle>, err: HostlinkError) {
        if self.is_closed() {
            return;
        }
        warn!(%err, "Refresh failed");
        self.observer.on_error(&err);

        let Some(transport) = transport.filter(|transport| self.is_current(transport)) else {
            debug!("Refresh failure for a replaced transport ignored");
            return;
        };
        {
            let mut state = self.lock();
            state.refreshing = false;
            state.refresh_again = false;
        }
        let lost = !transport.is_connected() || matches!(err.transport(), Some(TransportError::NotConnected));
        let result = if lost {
            self.reconnect(transport)
        } else {
            self.retry(
                self.controller.config().refresh_retry_delay,
                ConnectionStatus::Connected { transport },
            )
        };
        if let Err(err) = result {
            self.observer.on_error(&err);
        }
    }

    /// Errors reported on the context outside any awaited status
    ///
    /// A transport error for a transport that can no longer reach its host
    /// means the connection is gone.
    fn context_error(&self, err: HostlinkError) {
        self.observer.on_error(&err);
        if self.is_closed() || err.transport().is_none() {
            return;
        }
        let Some(transport) = self.transport() else {
            return;
        };
        if transport.is_connected() {
            return;
        }
        warn!(host = %transport.host().name, %err, "Connection lost");
        if let Err(err) = self.reconnect(transport) {
            self.observer.on_error(&err);
        }
    }

    fn is_current(&self, transport: &TransportHandle) -> bool {
        matches!(&self.lock().transport, Some(current) if current.ptr_eq(transport))
    }

    /// Drop `transport` and connect again after the retry delay
    ///
    /// Does nothing when `transport` is no longer the session's transport.
    fn reconnect(&self, transport: TransportHandle) -> HostlinkResult<()> {
        let link = {
            let mut state = self.lock();
            let current = matches!(&state.transport, Some(current) if current.ptr_eq(&transport));
            if !current {
                return Ok(());
            }
            state.forget_transport()
        };
        if let Some(link) = link {
            link.unlink();
        }
        let status = self.controller.disconnect(transport);
        self.retry(self.controller.config().connect_retry_delay, status)
    }

    fn remote_changed(&self) {
        if self.is_closed() {
            return;
        }
        let Some(transport) = self.transport() else {
            return;
        };
        debug!("Remote change, refreshing");
        if let Err(err) = self.start_refresh(&transport) {
            self.observer.on_error(&err);
        }
    }

    /// Apply a refresh unless one is in flight, in which case queue one more
    fn start_refresh(&self, transport: &TransportHandle) -> HostlinkResult<()> {
        {
            let mut state = self.lock();
            if state.refreshing {
                state.refresh_again = true;
                return Ok(());
            }
            state.refreshing = true;
        }
        self.apply(self.controller.refresh(transport))
    }

    fn change_callback(&self) -> ChangeCallback {
        let weak = self.me.clone();
        Arc::new(move || {
            if let Some(session) = weak.upgrade() {
                session.remote_changed();
            }
        })
    }

    /// Remember an idle or active status, then sync if not yet synced or
    /// run the refresh queued during the one that just finished
    fn settle(&self, status: ConnectionStatus) -> HostlinkResult<()> {
        self.observer.on_status(&status);
        let (transport, synced, again) = {
            let mut state = self.lock();
            state.idle_status = Some(status);
            state.refreshing = false;
            let synced = state.link.is_some();
            // A queued refresh waits until the link is in place
            let again = synced && std::mem::take(&mut state.refresh_again);
            (state.transport.clone(), synced, again)
        };
        match transport {
            Some(transport) if !synced => self.apply(self.controller.sync(&transport, self.change_callback())),
            Some(transport) if again => self.start_refresh(&transport),
            _ => Ok(()),
        }
    }
}

impl LifecycleReceiver for Session {
    fn on_disconnected(&self) -> HostlinkResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.observer.on_status(&ConnectionStatus::Disconnected);
        self.apply(self.controller.connect())
    }

    fn on_no_hosts_configured(&self) -> HostlinkResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.observer.on_status(&ConnectionStatus::NoHostsConfigured);
        Ok(())
    }

    fn on_connecting(&self, host_name: &str, pending: &Pending<ConnectionStatus>) -> HostlinkResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        if pending.is_taken() {
            debug!(host = host_name, "Connect already awaited");
            return Ok(());
        }
        self.observer.on_status(&ConnectionStatus::Connecting {
            host_name: host_name.to_string(),
            pending: pending.clone(),
        });
        self.await_status(pending.clone(), |session, err| session.connect_failed(err))
    }

    fn on_connected(&self, transport: &TransportHandle) -> HostlinkResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.observer.on_status(&ConnectionStatus::Connected {
            transport: transport.clone(),
        });
        let replaced = {
            let mut state = self.lock();
            match state.transport.replace(transport.clone()) {
                Some(old) if !old.ptr_eq(transport) => {
                    state.refreshing = false;
                    state.refresh_again = false;
                    Some(old)
                }
                _ => None,
            }
        };
        if let Some(old) = replaced {
            self.controller.disconnect(old);
        }
        self.start_refresh(transport)
    }

    fn on_refreshing(&self, pending: &Pending<ConnectionStatus>) -> HostlinkResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        if pending.is_taken() {
            debug!("Refresh already awaited");
            return Ok(());
        }
        self.observer.on_status(&ConnectionStatus::Refreshing {
            pending: pending.clone(),
        });
        let transport = self.transport();
        self.await_status(pending.clone(), move |session, err| session.refresh_failed(transport, err))
    }

    fn on_player_idle(&self, volume: u32, muted: bool) -> HostlinkResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.settle(ConnectionStatus::PlayerIdle { volume, muted })
    }

    fn on_player_active(&self, snapshot: &PlayerSnapshot) -> HostlinkResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.settle(ConnectionStatus::PlayerActive(snapshot.clone()))
    }

    fn on_synced(&self, link: &Link) -> HostlinkResult<()> {
        if self.is_closed() {
            link.unlink();
            return Ok(());
        }
        self.observer.on_status(&ConnectionStatus::Synced { link: link.clone() });
        let (previous, idle_status) = {
            let mut state = self.lock();
            (state.link.replace(link.clone()), state.idle_status.clone())
        };
        if let Some(previous) = previous.filter(|previous| !previous.ptr_eq(link)) {
            previous.unlink();
        }

        // Synced must not stay current; put the idle status back in the same pass
        match idle_status {
            Some(status) => self.apply(status),
            None => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let link = match self.state.get_mut() {
            Ok(state) => state.link.take(),
            Err(poisoned) => poisoned.into_inner().link.take(),
        };
        if let Some(link) = link {
            link.unlink();
        }
    }
}
