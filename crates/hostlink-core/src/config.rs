//! Centralized Configuration Management
//!
//! Timeouts and intervals for both transports and the connection lifecycle.

use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::HostlinkError;
use crate::methods::{DEFAULT_ITEM_PROPERTIES, DEFAULT_PLAYER_PROPERTIES};

// ----------------------------------------------------------------------------
// Duplex Transport Configuration
// ----------------------------------------------------------------------------

/// Socket settings for the persistent TCP transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplexConfig {
    /// Maximum time to establish the connection
    pub connect_timeout: Duration,
    /// Maximum time for one request write
    pub write_timeout: Duration,
    /// Maximum silence on the socket before the read loop gives up
    pub read_timeout: Duration,
    /// Size of a single socket read
    pub read_buffer_size: usize,
}

impl Default for DuplexConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            // Hosts can stay silent for a long time between pushes
            read_timeout: Duration::from_secs(30 * 60),
            read_buffer_size: 8 * 1024,
        }
    }
}

// ----------------------------------------------------------------------------
// HTTP Transport Configuration
// ----------------------------------------------------------------------------

/// Request settings for the poll transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Whole-request timeout, body included
    pub request_timeout: Duration,
    /// Path of the JSON-RPC endpoint on the host
    pub endpoint_path: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            endpoint_path: "/jsonrpc".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Lifecycle Configuration
// ----------------------------------------------------------------------------

/// Timing and request shape for the connection lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Refresh period when the transport cannot push notifications
    pub poll_interval: Duration,
    /// Delay before reconnecting after a failed connect
    pub connect_retry_delay: Duration,
    /// Delay before retrying a failed refresh
    pub refresh_retry_delay: Duration,
    pub player_properties: Vec<String>,
    pub item_properties: Vec<String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            connect_retry_delay: Duration::from_secs(5),
            refresh_retry_delay: Duration::from_secs(3),
            player_properties: DEFAULT_PLAYER_PROPERTIES.iter().map(|p| p.to_string()).collect(),
            item_properties: DEFAULT_ITEM_PROPERTIES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

// ----------------------------------------------------------------------------
// Complete Configuration
// ----------------------------------------------------------------------------

/// Complete client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostlinkConfig {
    pub duplex: DuplexConfig,
    pub http: HttpConfig,
    pub lifecycle: LifecycleConfig,
}

impl HostlinkConfig {
    /// Short timeouts and delays for tests
    pub fn testing() -> Self {
        Self {
            duplex: DuplexConfig {
                connect_timeout: Duration::from_millis(500),
                write_timeout: Duration::from_millis(500),
                read_timeout: Duration::from_secs(5),
                read_buffer_size: 64,
            },
            http: HttpConfig {
                connect_timeout: Duration::from_millis(500),
                request_timeout: Duration::from_secs(2),
                ..HttpConfig::default()
            },
            lifecycle: LifecycleConfig {
                poll_interval: Duration::from_secs(3),
                connect_retry_delay: Duration::from_millis(50),
                refresh_retry_delay: Duration::from_millis(50),
                ..LifecycleConfig::default()
            },
        }
    }

    /// Reject settings that would make the client spin or hang
    pub fn validate(&self) -> Result<(), HostlinkError> {
        let invalid = |reason: &str| -> Result<(), HostlinkError> {
            Err(HostlinkError::Configuration {
                reason: reason.to_string(),
            })
        };

        if self.duplex.connect_timeout.is_zero() {
            return invalid("Duplex connect timeout cannot be zero");
        }
        if self.duplex.write_timeout.is_zero() {
            return invalid("Duplex write timeout cannot be zero");
        }
        if self.duplex.read_timeout.is_zero() {
            return invalid("Duplex read timeout cannot be zero");
        }
        if self.duplex.read_buffer_size == 0 {
            return invalid("Duplex read buffer size cannot be zero");
        }
        if self.http.connect_timeout.is_zero() || self.http.request_timeout.is_zero() {
            return invalid("HTTP timeouts cannot be zero");
        }
        if !self.http.endpoint_path.starts_with('/') {
            return invalid("HTTP endpoint path must start with '/'");
        }
        if self.lifecycle.poll_interval.is_zero() {
            return invalid("Poll interval cannot be zero");
        }
        if self.lifecycle.connect_retry_delay.is_zero() || self.lifecycle.refresh_retry_delay.is_zero() {
            return invalid("Retry delays cannot be zero");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_and_testing_configs_validate() {
        assert!(HostlinkConfig::default().validate().is_ok());
        assert!(HostlinkConfig::testing().validate().is_ok());
        assert_eq!(
            HostlinkConfig::default().lifecycle.poll_interval,
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = HostlinkConfig::default();
        config.duplex.read_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = HostlinkConfig::default();
        config.http.endpoint_path = "jsonrpc".into();
        assert!(config.validate().is_err());

        let mut config = HostlinkConfig::default();
        config.lifecycle.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
