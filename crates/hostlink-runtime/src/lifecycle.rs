//! Connection lifecycle states
//!
//! [`ConnectionStatus`] is the closed set of states a session moves through.
//! Each status applies itself to a [`LifecycleReceiver`] by calling the one
//! receiver method for its variant.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use hostlink_core::methods::{ActivePlayer, ItemInfo, PlayerProperties};
use hostlink_core::{HostlinkResult, Link, Transport};

use crate::machine::State;
use crate::pending::Pending;

// ----------------------------------------------------------------------------
// Transport Handle
// ----------------------------------------------------------------------------

/// Shared handle to the open transport
///
/// Whoever leaves the lifecycle for good disposes it; clones only share it.
#[derive(Clone)]
pub struct TransportHandle(Arc<dyn Transport>);

impl TransportHandle {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self(transport)
    }

    pub fn shared(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.0)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for TransportHandle {
    type Target = dyn Transport;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle")
            .field("host", &self.0.host().name)
            .field("capabilities", &self.0.capabilities())
            .field("disposed", &self.0.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Connection Status
// ----------------------------------------------------------------------------

/// Everything known about a host with an active player
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub volume: u32,
    pub muted: bool,
    /// Any non-zero playback speed
    pub playing: bool,
    pub player: ActivePlayer,
    pub properties: PlayerProperties,
    pub item: ItemInfo,
}

/// One lifecycle state; exactly one is current at a time
#[derive(Debug, Clone)]
pub enum ConnectionStatus {
    Disconnected,
    /// No host to connect to until one is configured
    NoHostsConfigured,
    Connecting {
        host_name: String,
        pending: Pending<ConnectionStatus>,
    },
    Connected {
        transport: TransportHandle,
    },
    Refreshing {
        pending: Pending<ConnectionStatus>,
    },
    PlayerIdle {
        volume: u32,
        muted: bool,
    },
    PlayerActive(PlayerSnapshot),
    /// Subscribed to remote changes; never current for longer than it takes
    /// to re-apply the preceding idle status
    Synced {
        link: Link,
    },
}

impl ConnectionStatus {
    /// Short variant name for logs
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::NoHostsConfigured => "no-hosts-configured",
            ConnectionStatus::Connecting { .. } => "connecting",
            ConnectionStatus::Connected { .. } => "connected",
            ConnectionStatus::Refreshing { .. } => "refreshing",
            ConnectionStatus::PlayerIdle { .. } => "player-idle",
            ConnectionStatus::PlayerActive(_) => "player-active",
            ConnectionStatus::Synced { .. } => "synced",
        }
    }

    /// Idle and active statuses are the ones a session rests in
    pub fn is_idle_status(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::PlayerIdle { .. } | ConnectionStatus::PlayerActive(_)
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting { host_name, .. } => write!(f, "connecting to {}", host_name),
            ConnectionStatus::Connected { transport } => write!(f, "connected to {}", transport.host().name),
            ConnectionStatus::PlayerIdle { volume, muted } => {
                write!(f, "idle (volume {}{})", volume, if *muted { ", muted" } else { "" })
            }
            ConnectionStatus::PlayerActive(snapshot) => write!(
                f,
                "{} {} (volume {}{})",
                if snapshot.playing { "playing" } else { "paused" },
                snapshot.item.display_title(),
                snapshot.volume,
                if snapshot.muted { ", muted" } else { "" }
            ),
            other => f.write_str(other.name()),
        }
    }
}

// ----------------------------------------------------------------------------
// Lifecycle Receiver
// ----------------------------------------------------------------------------

/// Effect receiver for connection statuses
///
/// Methods run on the designated execution context and must not block.
pub trait LifecycleReceiver: Send + Sync {
    fn on_disconnected(&self) -> HostlinkResult<()>;
    fn on_no_hosts_configured(&self) -> HostlinkResult<()>;
    fn on_connecting(&self, host_name: &str, pending: &Pending<ConnectionStatus>) -> HostlinkResult<()>;
    fn on_connected(&self, transport: &TransportHandle) -> HostlinkResult<()>;
    fn on_refreshing(&self, pending: &Pending<ConnectionStatus>) -> HostlinkResult<()>;
    fn on_player_idle(&self, volume: u32, muted: bool) -> HostlinkResult<()>;
    fn on_player_active(&self, snapshot: &PlayerSnapshot) -> HostlinkResult<()>;
    fn on_synced(&self, link: &Link) -> HostlinkResult<()>;
}

impl<R: LifecycleReceiver + ?Sized> State<R> for ConnectionStatus {
    fn apply(&self, receiver: &R) -> HostlinkResult<()> {
        match self {
            ConnectionStatus::Disconnected => receiver.on_disconnected(),
            ConnectionStatus::NoHostsConfigured => receiver.on_no_hosts_configured(),
            ConnectionStatus::Connecting { host_name, pending } => receiver.on_connecting(host_name, pending),
            ConnectionStatus::Connected { transport } => receiver.on_connected(transport),
            ConnectionStatus::Refreshing { pending } => receiver.on_refreshing(pending),
            ConnectionStatus::PlayerIdle { volume, muted } => receiver.on_player_idle(*volume, *muted),
            ConnectionStatus::PlayerActive(snapshot) => receiver.on_player_active(snapshot),
            ConnectionStatus::Synced { link } => receiver.on_synced(link),
        }
    }
}
