//! Poll transport for hostlink
//!
//! JSON-RPC over plain HTTP `POST`, one request per call, no push notifications.

mod transport;

pub use transport::{check_status, HttpTransport, ReplyBody};
