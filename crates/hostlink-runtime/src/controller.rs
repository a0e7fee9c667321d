//! Connection controller
//!
//! One operation per lifecycle transition. Operations that need I/O return a
//! `Connecting` or `Refreshing` status wrapping a [`Pending`] that does the
//! remote calls on the worker runtime; the rest return their status directly.

use std::sync::Arc;
use std::time::Duration;

use hostlink_core::methods::{self, ActivePlayer, ApplicationProperties, PlayerProperties};
use hostlink_core::{
    ExecutionContext, HostLocator, HostlinkResult, LifecycleConfig, Link, Notification, NotificationCategory,
    NotificationListener, RequestIdSequence, Transport,
};
use tokio::runtime::Handle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::lifecycle::{ConnectionStatus, PlayerSnapshot, TransportHandle};
use crate::pending::Pending;

/// Callback run on the execution context when the remote state may have changed
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Performs the remote work behind each lifecycle transition
pub struct ConnectionController {
    locator: Arc<dyn HostLocator>,
    runtime: Handle,
    context: ExecutionContext,
    config: LifecycleConfig,
    ids: Arc<RequestIdSequence>,
}

impl ConnectionController {
    pub fn new(
        locator: Arc<dyn HostLocator>,
        runtime: Handle,
        context: ExecutionContext,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            locator,
            runtime,
            context,
            config,
            ids: Arc::new(RequestIdSequence::new()),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn locator(&self) -> &Arc<dyn HostLocator> {
        &self.locator
    }

    /// Id source shared by every call this controller issues
    pub fn request_ids(&self) -> &Arc<RequestIdSequence> {
        &self.ids
    }

    /// Resolve the preferred host and start connecting to it
    pub fn connect(&self) -> ConnectionStatus {
        let Some(host) = self.locator.preferred_host() else {
            info!("No hosts configured");
            return ConnectionStatus::NoHostsConfigured;
        };

        info!(host = %host, "Connecting");
        let host_name = host.name.clone();
        let locator = Arc::clone(&self.locator);
        let pending = Pending::spawn(&self.runtime, async move {
            let transport = locator.connect(&host).await?;
            Ok(ConnectionStatus::Connected {
                transport: TransportHandle::new(transport),
            })
        });

        ConnectionStatus::Connecting { host_name, pending }
    }

    /// Fetch volume, active players and (if any) the first player's state
    pub fn refresh(&self, transport: &TransportHandle) -> ConnectionStatus {
        debug!(host = %transport.host().name, "Refreshing");
        let transport = transport.shared();
        let ids = Arc::clone(&self.ids);
        let config = self.config.clone();
        let pending = Pending::spawn(&self.runtime, async move {
            fetch_status(transport.as_ref(), &ids, &config).await
        });

        ConnectionStatus::Refreshing { pending }
    }

    /// Subscribe to remote changes
    ///
    /// Push-capable transports get one listener per category, composed into
    /// a single link. Otherwise `on_change` is posted every poll interval
    /// until the link is unlinked.
    pub fn sync(&self, transport: &TransportHandle, on_change: ChangeCallback) -> ConnectionStatus {
        let link = if transport.capabilities().supports_notifications() {
            debug!(host = %transport.host().name, "Subscribing to notifications");
            let listener: Arc<dyn NotificationListener> = Arc::new(move |notification: &Notification| {
                debug!(method = %notification.method, "Remote state changed");
                on_change();
            });
            Link::all(
                NotificationCategory::ALL
                    .iter()
                    .map(|category| transport.subscribe(*category, Arc::clone(&listener))),
            )
        } else {
            debug!(host = %transport.host().name, period = ?self.config.poll_interval, "Polling for changes");
            self.poll(on_change)
        };

        ConnectionStatus::Synced { link }
    }

    fn poll(&self, on_change: ChangeCallback) -> Link {
        let period = self.config.poll_interval;
        let context = self.context.clone();
        let task = self.runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let on_change = Arc::clone(&on_change);
                if !context.post(move || on_change()) {
                    break;
                }
            }
        });
        let abort = task.abort_handle();
        Link::new(move || {
            debug!("Polling stopped");
            abort.abort();
        })
    }

    /// Dispose the transport in the background
    pub fn disconnect(&self, transport: TransportHandle) -> ConnectionStatus {
        info!(host = %transport.host().name, "Disconnecting");
        self.runtime.spawn(async move { transport.dispose().await });
        ConnectionStatus::Disconnected
    }

    /// A pending that resolves to `status` after `delay`
    pub fn retry_after(&self, delay: Duration, status: ConnectionStatus) -> Pending<ConnectionStatus> {
        Pending::delayed(&self.runtime, delay, status)
    }
}

async fn fetch_status(
    transport: &dyn Transport,
    ids: &RequestIdSequence,
    config: &LifecycleConfig,
) -> HostlinkResult<ConnectionStatus> {
    let app: ApplicationProperties = methods::invoke(
        transport,
        methods::APPLICATION_GET_PROPERTIES,
        methods::application_properties_params(),
        ids.next_id(),
    )
    .await?;

    let players: Vec<ActivePlayer> = methods::invoke(
        transport,
        methods::PLAYER_GET_ACTIVE_PLAYERS,
        serde_json::Value::Null,
        ids.next_id(),
    )
    .await?;

    let Some(player) = players.into_iter().next() else {
        return Ok(ConnectionStatus::PlayerIdle {
            volume: app.volume,
            muted: app.muted,
        });
    };

    let properties: PlayerProperties = methods::invoke(
        transport,
        methods::PLAYER_GET_PROPERTIES,
        methods::player_properties_params(player.player_id, &config.player_properties),
        ids.next_id(),
    )
    .await?;
    let item = methods::player_item(transport, player.player_id, &config.item_properties, ids.next_id()).await?;

    Ok(ConnectionStatus::PlayerActive(PlayerSnapshot {
        volume: app.volume,
        muted: app.muted,
        playing: properties.is_playing(),
        player,
        properties,
        item,
    }))
}
