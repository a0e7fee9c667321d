//! hostlink CLI library
//!
//! Configuration loading, the configured host locator and the subcommand
//! handlers behind the `hostlink` binary.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::{ConfiguredLocator, HostlinkApp, PrintingObserver};
pub use cli::{Cli, Commands};
pub use config::AppConfig;
pub use error::{CliError, Result};
