//! Duplex transport for hostlink
//!
//! Keeps one TCP connection open to the host, multiplexes concurrent calls over
//! it by correlation id and fans out push notifications.

mod correlation;
mod transport;

pub use correlation::CorrelationTable;
pub use transport::TcpTransport;
