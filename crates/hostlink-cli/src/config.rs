//! hostlink CLI Configuration Management
//!
//! Loads the host list and timing overrides from a TOML file:
//!
//! ```toml
//! preferred_host = "living-room"
//!
//! [[hosts]]
//! name = "living-room"
//! address = "192.168.1.20"
//! port = 9090
//! transport = "tcp"
//!
//! [timeouts]
//! poll_interval_secs = 5
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use hostlink_core::{HostDescriptor, HostlinkConfig, TransportKind};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CliError, Result};

/// File looked for in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "hostlink.toml";

// ----------------------------------------------------------------------------
// Configuration Types
// ----------------------------------------------------------------------------

/// One `[[hosts]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEntry {
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_transport() -> TransportKind {
    TransportKind::Http
}

impl HostEntry {
    pub fn descriptor(&self) -> HostDescriptor {
        let host = HostDescriptor::new(&self.name, &self.address, self.port, self.transport);
        match &self.username {
            Some(username) => host.with_credentials(username, self.password.clone()),
            None => host,
        }
    }
}

/// Second-granularity overrides for the client defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutOverrides {
    /// Connect timeout for both transports
    pub connect_secs: Option<u64>,
    /// Whole-request timeout of the HTTP transport
    pub request_secs: Option<u64>,
    /// Idle read timeout of the TCP transport
    pub read_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub connect_retry_secs: Option<u64>,
    pub refresh_retry_secs: Option<u64>,
}

/// Complete configuration for the CLI application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Name of the host to connect to; the first entry when absent
    pub preferred_host: Option<String>,
    pub hosts: Vec<HostEntry>,
    pub timeouts: TimeoutOverrides,
}

// ----------------------------------------------------------------------------
// Loading
// ----------------------------------------------------------------------------

impl AppConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Explicit path, else `./hostlink.toml` if present, else defaults
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => {
                info!("Loading configuration from: {}", path);
                Self::load_from_file(path)
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                info!("Loading configuration from: {}", DEFAULT_CONFIG_FILE);
                Self::load_from_file(DEFAULT_CONFIG_FILE)
            }
            None => {
                info!("Using default configuration");
                Ok(Self::default())
            }
        }
    }

    /// Host names must be unique and the preferred host must exist
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for host in &self.hosts {
            if host.name.is_empty() {
                return Err(CliError::Config("host entries need a name".into()));
            }
            if !names.insert(host.name.as_str()) {
                return Err(CliError::Config(format!("duplicate host name '{}'", host.name)));
            }
            if host.port == 0 {
                return Err(CliError::Config(format!("host '{}' has port 0", host.name)));
            }
        }
        if let Some(preferred) = &self.preferred_host {
            if !names.contains(preferred.as_str()) {
                return Err(CliError::Config(format!(
                    "preferred host '{}' is not configured",
                    preferred
                )));
            }
        }
        Ok(())
    }

    pub fn host_descriptors(&self) -> Vec<HostDescriptor> {
        self.hosts.iter().map(HostEntry::descriptor).collect()
    }

    /// Client defaults with this file's overrides applied and validated
    pub fn client_config(&self) -> Result<HostlinkConfig> {
        let mut config = HostlinkConfig::default();
        let t = &self.timeouts;

        if let Some(secs) = t.connect_secs {
            config.duplex.connect_timeout = Duration::from_secs(secs);
            config.http.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = t.request_secs {
            config.http.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = t.read_secs {
            config.duplex.read_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = t.poll_interval_secs {
            config.lifecycle.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = t.connect_retry_secs {
            config.lifecycle.connect_retry_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = t.refresh_retry_secs {
            config.lifecycle.refresh_retry_delay = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        preferred_host = "bedroom"

        [[hosts]]
        name = "living-room"
        address = "192.168.1.20"
        port = 8080

        [[hosts]]
        name = "bedroom"
        address = "192.168.1.21"
        port = 9090
        transport = "tcp"
        username = "kodi"
        password = "secret"

        [timeouts]
        poll_interval_secs = 10
        connect_secs = 2
    "#;

    #[test]
    fn test_parse_hosts_and_overrides() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.preferred_host.as_deref(), Some("bedroom"));

        let hosts = config.host_descriptors();
        assert_eq!(hosts[0].transport, TransportKind::Http);
        assert!(hosts[0].credentials.is_none());
        assert_eq!(hosts[1].transport, TransportKind::Tcp);
        assert_eq!(hosts[1].credentials.as_ref().unwrap().username, "kodi");

        let client = config.client_config().unwrap();
        assert_eq!(client.lifecycle.poll_interval, Duration::from_secs(10));
        assert_eq!(client.duplex.connect_timeout, Duration::from_secs(2));
        assert_eq!(client.http.connect_timeout, Duration::from_secs(2));
        assert_eq!(client.http.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert!(config.hosts.is_empty());
        assert_eq!(config.client_config().unwrap(), HostlinkConfig::default());
    }

    #[test]
    fn test_rejects_unknown_preferred_host() {
        let err = AppConfig::from_toml_str(
            r#"
            preferred_host = "attic"
            [[hosts]]
            name = "den"
            address = "10.0.0.2"
            port = 8080
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_rejects_duplicate_names_and_zero_interval() {
        let duplicate = r#"
            [[hosts]]
            name = "den"
            address = "10.0.0.2"
            port = 8080
            [[hosts]]
            name = "den"
            address = "10.0.0.3"
            port = 8080
        "#;
        assert!(AppConfig::from_toml_str(duplicate).is_err());

        let zero = AppConfig::from_toml_str("[timeouts]\npoll_interval_secs = 0\n").unwrap();
        assert!(matches!(zero.client_config(), Err(CliError::Hostlink(_))));
    }

    #[test]
    fn test_bad_transport_kind_is_parse_error() {
        let err = AppConfig::from_toml_str(
            r#"
            [[hosts]]
            name = "den"
            address = "10.0.0.2"
            port = 8080
            transport = "carrier-pigeon"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CliError::TomlParsing(_)));
    }
}
