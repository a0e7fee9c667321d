//! Command handlers for the hostlink CLI

use hostlink_core::HostLocator;
use serde_json::Value;
use tracing::info;

use crate::app::HostlinkApp;
use crate::cli::{Cli, Commands};
use crate::error::Result;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, app: HostlinkApp) -> Result<()> {
        match cli.command {
            Commands::Hosts => Self::handle_hosts_command(&app),
            Commands::Status => Self::handle_status_command(&app).await,
            Commands::Watch => Self::handle_watch_command(&app).await,
            Commands::Call { method, params } => Self::handle_call_command(&app, method, params).await,
        }
    }

    fn handle_hosts_command(app: &HostlinkApp) -> Result<()> {
        let hosts = app.hosts();
        if hosts.is_empty() {
            println!("No hosts configured");
            return Ok(());
        }

        let preferred = app.locator().preferred_host().map(|host| host.name);
        for host in &hosts {
            let marker = if preferred.as_deref() == Some(host.name.as_str()) { "*" } else { " " };
            println!("{} {}", marker, host);
        }
        Ok(())
    }

    async fn handle_status_command(app: &HostlinkApp) -> Result<()> {
        let status = app.status().await?;
        println!("{}", status);
        Ok(())
    }

    async fn handle_watch_command(app: &HostlinkApp) -> Result<()> {
        info!("Watching host... Press Ctrl+C to stop");
        app.watch().await
    }

    async fn handle_call_command(app: &HostlinkApp, method: String, params: Option<String>) -> Result<()> {
        let params = Self::parse_params(params.as_deref())?;
        let result = app.call(&method, params).await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        Ok(())
    }

    /// Missing parameters are sent as JSON null
    fn parse_params(raw: Option<&str>) -> Result<Value> {
        match raw {
            Some(raw) => Ok(serde_json::from_str(raw)?),
            None => Ok(Value::Null),
        }
    }
}
