//! HTTP poll transport
//!
//! Each call is an independent `POST` of one JSON-RPC request. The host never
//! pushes, so `subscribe` hands back a no-op link and the lifecycle falls back
//! to periodic polling.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use hostlink_core::{
    wire, Capabilities, HostDescriptor, HostlinkError, HostlinkResult, HttpConfig, Link,
    NotificationCategory, NotificationListener, RequestId, Transport, TransportError, TransportResult,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

/// What the body of a response should be read as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyBody {
    /// 200: the body carries a JSON-RPC reply
    Decode,
    /// 204: the call succeeded with no result
    Empty,
}

/// Map a response status onto the body handling or a transport error
pub fn check_status(status: StatusCode) -> TransportResult<ReplyBody> {
    match status {
        StatusCode::OK => Ok(ReplyBody::Decode),
        StatusCode::NO_CONTENT => Ok(ReplyBody::Empty),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TransportError::Unauthorized),
        StatusCode::NOT_FOUND => Err(TransportError::NotFound),
        other => Err(TransportError::Unknown {
            status: other.as_u16(),
        }),
    }
}

fn request_failure(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Io("request timed out".into())
    } else {
        TransportError::Io(err.to_string())
    }
}

// ----------------------------------------------------------------------------
// HTTP Transport
// ----------------------------------------------------------------------------

/// Request/response transport without push support
#[derive(Debug)]
pub struct HttpTransport {
    host: HostDescriptor,
    client: Client,
    endpoint: Url,
    /// Ids of calls still waiting for their response
    in_flight: Mutex<HashSet<RequestId>>,
    disposed: AtomicBool,
}

/// Holds an id in the in-flight set until the call finishes or is dropped
struct InFlight<'a> {
    ids: &'a Mutex<HashSet<RequestId>>,
    id: RequestId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock_ids(self.ids).remove(&self.id);
    }
}

fn lock_ids(ids: &Mutex<HashSet<RequestId>>) -> MutexGuard<'_, HashSet<RequestId>> {
    match ids.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl HttpTransport {
    pub fn new(host: HostDescriptor, config: &HttpConfig) -> HostlinkResult<Self> {
        let endpoint = Url::parse(&format!("http://{}", host.authority()))
            .and_then(|base| base.join(&config.endpoint_path))
            .map_err(|err| HostlinkError::Configuration {
                reason: format!("invalid endpoint for {}: {}", host, err),
            })?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| HostlinkError::Configuration {
                reason: format!("failed to build HTTP client: {}", err),
            })?;

        info!(host = %host, %endpoint, "Created poll transport");
        Ok(Self {
            host,
            client,
            endpoint,
            in_flight: Mutex::new(HashSet::new()),
            disposed: AtomicBool::new(false),
        })
    }

    /// Convenience for locators that hand out trait objects
    pub fn shared(host: HostDescriptor, config: &HttpConfig) -> HostlinkResult<Arc<dyn Transport>> {
        Ok(Arc::new(Self::new(host, config)?))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Number of calls waiting for a response
    pub fn pending_calls(&self) -> usize {
        lock_ids(&self.in_flight).len()
    }

    fn begin(&self, id: RequestId) -> TransportResult<InFlight<'_>> {
        if !lock_ids(&self.in_flight).insert(id) {
            return Err(TransportError::DuplicateRequestId(id));
        }
        Ok(InFlight {
            ids: &self.in_flight,
            id,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn capabilities(&self) -> Capabilities {
        Capabilities::POLLING
    }

    fn host(&self) -> &HostDescriptor {
        &self.host
    }

    async fn call(&self, method: &str, params: Value, id: RequestId) -> TransportResult<Value> {
        if self.is_disposed() {
            return Err(TransportError::NotConnected);
        }

        let body = wire::encode_request(id, method, &params)?;
        let _in_flight = self.begin(id)?;
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(credentials) = &self.host.credentials {
            request = request.basic_auth(&credentials.username, credentials.password.as_ref());
        }

        debug!(%id, method, "Posting request");
        let response = request.send().await.map_err(request_failure)?;
        let status = response.status();

        match check_status(status) {
            Ok(ReplyBody::Empty) => Ok(Value::Null),
            Ok(ReplyBody::Decode) => {
                let bytes = response.bytes().await.map_err(request_failure)?;
                wire::decode_reply(&bytes, id)
            }
            Err(err) => {
                warn!(%id, method, %status, "Request rejected by host");
                Err(err)
            }
        }
    }

    fn subscribe(&self, category: NotificationCategory, _listener: Arc<dyn NotificationListener>) -> Link {
        debug!(%category, "Poll transport has no notifications");
        Link::noop()
    }

    async fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            debug!(host = %self.host.name, "Poll transport disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
