//! hostlink CLI application
//!
//! Wires the configured hosts into a [`HostLocator`] and exposes the
//! operations behind each subcommand.

use std::sync::Arc;

use async_trait::async_trait;
use hostlink_core::methods;
use hostlink_core::{
    ExecutionContext, HostDescriptor, HostLocator, HostlinkConfig, HostlinkError, RequestIdSequence,
    Transport, TransportError, TransportKind, TransportResult,
};
use hostlink_http::HttpTransport;
use hostlink_runtime::{ConnectionController, ConnectionStatus, Session, SessionObserver, TransportHandle};
use hostlink_tcp::TcpTransport;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Configured Locator
// ----------------------------------------------------------------------------

/// Host locator backed by the configuration file
pub struct ConfiguredLocator {
    hosts: Vec<HostDescriptor>,
    preferred: Option<String>,
    config: HostlinkConfig,
    context: ExecutionContext,
    runtime: Handle,
}

impl ConfiguredLocator {
    /// Duplex transports deliver notifications on `context` and run their
    /// I/O on `runtime`
    pub fn new(
        hosts: Vec<HostDescriptor>,
        preferred: Option<String>,
        config: HostlinkConfig,
        context: ExecutionContext,
        runtime: Handle,
    ) -> Self {
        Self {
            hosts,
            preferred,
            config,
            context,
            runtime,
        }
    }
}

#[async_trait]
impl HostLocator for ConfiguredLocator {
    fn enumerate(&self) -> Vec<HostDescriptor> {
        self.hosts.clone()
    }

    /// The named host when one is set, otherwise the first configured
    fn preferred_host(&self) -> Option<HostDescriptor> {
        match &self.preferred {
            Some(name) => self.hosts.iter().find(|host| &host.name == name).cloned(),
            None => self.hosts.first().cloned(),
        }
    }

    async fn connect(&self, host: &HostDescriptor) -> TransportResult<Arc<dyn Transport>> {
        match host.transport {
            TransportKind::Http => HttpTransport::shared(host.clone(), &self.config.http)
                .map_err(|err| TransportError::Io(err.to_string())),
            TransportKind::Tcp => {
                let transport = TcpTransport::connect(
                    host.clone(),
                    self.config.duplex.clone(),
                    self.context.clone(),
                    &self.runtime,
                )
                .await?;
                Ok(Arc::new(transport))
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Printing Observer
// ----------------------------------------------------------------------------

/// Prints each status change to stdout
pub struct PrintingObserver;

impl SessionObserver for PrintingObserver {
    fn on_status(&self, status: &ConnectionStatus) {
        match status {
            // Transitional; the following status says more
            ConnectionStatus::Refreshing { .. } | ConnectionStatus::Synced { .. } => {}
            other => println!("{}", other),
        }
    }

    fn on_error(&self, error: &HostlinkError) {
        warn!(%error, "Session error");
    }
}

// ----------------------------------------------------------------------------
// Application
// ----------------------------------------------------------------------------

pub struct HostlinkApp {
    config: AppConfig,
    client: HostlinkConfig,
    context: ExecutionContext,
    locator: Arc<ConfiguredLocator>,
    ids: RequestIdSequence,
}

impl HostlinkApp {
    /// Must be called inside a tokio runtime
    ///
    /// `host_override` replaces the configured preferred host.
    pub fn new(config: AppConfig, host_override: Option<String>) -> Result<Self> {
        let client = config.client_config()?;
        let preferred = host_override.or_else(|| config.preferred_host.clone());
        if let Some(name) = &preferred {
            if !config.hosts.iter().any(|host| &host.name == name) {
                return Err(CliError::NoHost(format!("'{}' is not configured", name)));
            }
        }

        let context = ExecutionContext::current("hostlink");
        let locator = Arc::new(ConfiguredLocator::new(
            config.host_descriptors(),
            preferred,
            client.clone(),
            context.clone(),
            Handle::current(),
        ));

        Ok(Self {
            config,
            client,
            context,
            locator,
            ids: RequestIdSequence::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn locator(&self) -> &Arc<ConfiguredLocator> {
        &self.locator
    }

    pub fn hosts(&self) -> Vec<HostDescriptor> {
        self.locator.enumerate()
    }

    async fn open(&self) -> Result<Arc<dyn Transport>> {
        let host = self
            .locator
            .preferred_host()
            .ok_or_else(|| CliError::NoHost("no hosts configured".into()))?;
        info!(host = %host, "Connecting");
        Ok(self.locator.connect(&host).await?)
    }

    /// Connect, ping and refresh once
    pub async fn status(&self) -> Result<ConnectionStatus> {
        let transport = self.open().await?;
        let result = self.refresh_once(Arc::clone(&transport)).await;
        transport.dispose().await;
        result
    }

    async fn refresh_once(&self, transport: Arc<dyn Transport>) -> Result<ConnectionStatus> {
        let controller = ConnectionController::new(
            self.locator.clone(),
            Handle::current(),
            self.context.clone(),
            self.client.lifecycle.clone(),
        );
        methods::ping(transport.as_ref(), controller.request_ids().next_id()).await?;

        match controller.refresh(&TransportHandle::new(transport)) {
            ConnectionStatus::Refreshing { pending } => {
                let task = pending
                    .take()
                    .ok_or_else(|| CliError::Task("refresh already awaited".into()))?;
                Ok(task.await??)
            }
            other => Ok(other),
        }
    }

    /// Perform one raw call against the preferred host
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let transport = self.open().await?;
        let result = transport.call(method, params, self.ids.next_id()).await;
        transport.dispose().await;
        Ok(result?)
    }

    /// Follow the preferred host until Ctrl-C
    pub async fn watch(&self) -> Result<()> {
        let controller = ConnectionController::new(
            self.locator.clone(),
            Handle::current(),
            self.context.clone(),
            self.client.lifecycle.clone(),
        );
        let session = Session::new(controller, Arc::new(PrintingObserver));
        session.start()?;

        tokio::signal::ctrl_c().await?;
        info!("Stopping session");
        let backlog = session.teardown().await;
        if !backlog.is_empty() {
            info!(abandoned = backlog.len(), "Cancelled in-flight transitions");
        }
        Ok(())
    }
}
