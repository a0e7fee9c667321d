//! Core types shared across hostlink crates

use core::fmt;
use core::ops::BitOr;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Request Identifier
// ----------------------------------------------------------------------------

/// Caller-assigned correlation id linking a call to its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl RequestId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ----------------------------------------------------------------------------
// Host Descriptor
// ----------------------------------------------------------------------------

/// Which transport to open against a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Short-lived HTTP requests, no push notifications
    Http,
    /// Persistent TCP socket with push notifications
    Tcp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Http => write!(f, "http"),
            TransportKind::Tcp => write!(f, "tcp"),
        }
    }
}

/// Basic-auth credentials for a host
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Immutable description of a remote host, supplied by configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDescriptor {
    /// Display name, also used to pick the preferred host
    pub name: String,
    /// Hostname or IP address
    pub address: String,
    pub port: u16,
    pub transport: TransportKind,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl HostDescriptor {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16, transport: TransportKind) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            transport,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password,
        });
        self
    }

    /// `address:port`, suitable for socket connects
    pub fn authority(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl fmt::Display for HostDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}://{})", self.name, self.transport, self.authority())
    }
}

// ----------------------------------------------------------------------------
// Transport Capabilities
// ----------------------------------------------------------------------------

/// Bitset of what a transport instance supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Self = Self(0);
    /// Synchronous request/response
    pub const POLLING: Self = Self(1 << 0);
    /// Background push notifications
    pub const NOTIFICATIONS: Self = Self(1 << 1);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn supports_notifications(self) -> bool {
        self.contains(Self::NOTIFICATIONS)
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_bitset() {
        let duplex = Capabilities::POLLING | Capabilities::NOTIFICATIONS;
        assert!(duplex.supports_notifications());
        assert!(duplex.contains(Capabilities::POLLING));
        assert!(!Capabilities::POLLING.supports_notifications());
        assert!(Capabilities::NONE.contains(Capabilities::NONE));
    }

    #[test]
    fn test_host_descriptor_from_toml_like_json() {
        let host: HostDescriptor = serde_json::from_str(
            r#"{"name":"living-room","address":"10.0.0.5","port":9090,"transport":"tcp"}"#,
        )
        .unwrap();
        assert_eq!(host.transport, TransportKind::Tcp);
        assert_eq!(host.authority(), "10.0.0.5:9090");
        assert!(host.credentials.is_none());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let host = HostDescriptor::new("den", "den.local", 8080, TransportKind::Http)
            .with_credentials("kodi", Some("secret".into()));
        let rendered = format!("{:?}", host);
        assert!(rendered.contains("kodi"));
        assert!(!rendered.contains("secret"));
    }
}
