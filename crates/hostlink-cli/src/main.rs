//! hostlink CLI entry point

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hostlink_cli::{app::HostlinkApp, cli::Cli, commands::CommandDispatcher, config::AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref())?;
    let app = HostlinkApp::new(config, cli.host.clone())?;

    if let Err(e) = CommandDispatcher::execute(cli, app).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    info!("hostlink exited successfully");
    Ok(())
}

/// `RUST_LOG` wins; otherwise info, or debug with `--verbose`
fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
