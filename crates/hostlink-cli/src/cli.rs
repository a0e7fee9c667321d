//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path (defaults to ./hostlink.toml when present)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Connect to this configured host instead of the preferred one
    #[arg(long)]
    pub host: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List configured hosts
    Hosts,
    /// Connect, refresh once and print what the host is doing
    Status,
    /// Follow the host until Ctrl-C, printing every status change
    Watch,
    /// Perform one raw JSON-RPC call and print the result
    Call {
        /// Method name, e.g. Player.GetActivePlayers
        method: String,
        /// Parameters as a JSON value
        params: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call_with_params() {
        let cli = Cli::parse_from([
            "hostlink",
            "--verbose",
            "call",
            "Player.GetProperties",
            r#"{"playerid": 1}"#,
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Call { method, params } => {
                assert_eq!(method, "Player.GetProperties");
                assert_eq!(params.as_deref(), Some(r#"{"playerid": 1}"#));
            }
            _ => panic!("expected call"),
        }
    }

    #[test]
    fn test_parse_host_override() {
        let cli = Cli::parse_from(["hostlink", "--host", "den", "-c", "alt.toml", "status"]);
        assert_eq!(cli.host.as_deref(), Some("den"));
        assert_eq!(cli.config.as_deref(), Some("alt.toml"));
        assert!(matches!(cli.command, Commands::Status));
    }
}
