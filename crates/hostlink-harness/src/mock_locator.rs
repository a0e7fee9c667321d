//! Mock host locator
//!
//! Hands out scripted connect outcomes in order. Once the script runs dry,
//! further connects never complete, which lets tests hold the lifecycle in
//! its connecting state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hostlink_core::{HostDescriptor, HostLocator, Transport, TransportError, TransportKind, TransportResult};
use tracing::debug;

/// Outcome of one `connect` call
pub enum ConnectScript {
    Succeed(Arc<dyn Transport>),
    Fail(TransportError),
    Hang,
}

/// Scripted [`HostLocator`] double
pub struct MockLocator {
    hosts: Vec<HostDescriptor>,
    preferred: Option<HostDescriptor>,
    script: Mutex<VecDeque<ConnectScript>>,
    connects: AtomicUsize,
}

impl MockLocator {
    /// One configured host, which is also the preferred one
    pub fn single(name: &str) -> Self {
        let host = HostDescriptor::new(name, "127.0.0.1", 8080, TransportKind::Http);
        Self {
            hosts: vec![host.clone()],
            preferred: Some(host),
            script: Mutex::new(VecDeque::new()),
            connects: AtomicUsize::new(0),
        }
    }

    /// No hosts configured at all
    pub fn empty() -> Self {
        Self {
            hosts: Vec::new(),
            preferred: None,
            script: Mutex::new(VecDeque::new()),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn then(&self, step: ConnectScript) -> &Self {
        match self.script.lock() {
            Ok(mut script) => script.push_back(step),
            Err(poisoned) => poisoned.into_inner().push_back(step),
        }
        self
    }

    pub fn then_succeed(&self, transport: Arc<dyn Transport>) -> &Self {
        self.then(ConnectScript::Succeed(transport))
    }

    pub fn then_fail(&self, err: TransportError) -> &Self {
        self.then(ConnectScript::Fail(err))
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> ConnectScript {
        let step = match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        step.unwrap_or(ConnectScript::Hang)
    }
}

#[async_trait]
impl HostLocator for MockLocator {
    fn enumerate(&self) -> Vec<HostDescriptor> {
        self.hosts.clone()
    }

    fn preferred_host(&self) -> Option<HostDescriptor> {
        self.preferred.clone()
    }

    async fn connect(&self, host: &HostDescriptor) -> TransportResult<Arc<dyn Transport>> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(host = %host.name, attempt, "Mock connect");
        match self.next_step() {
            ConnectScript::Succeed(transport) => Ok(transport),
            ConnectScript::Fail(err) => Err(err),
            ConnectScript::Hang => std::future::pending().await,
        }
    }
}
