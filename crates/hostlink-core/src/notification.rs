//! Push notifications and listener fan-out
//!
//! Notifications are routed by the namespace of their method name
//! (`Player.OnPlay` belongs to [`NotificationCategory::Player`]). The
//! [`NotificationHub`] keeps one listener set per category and always invokes
//! listeners on its [`ExecutionContext`], never on the caller's task.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::errors::TransportError;
use crate::link::Link;

// ----------------------------------------------------------------------------
// Notification Types
// ----------------------------------------------------------------------------

/// Listener category a notification is delivered to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationCategory {
    Player,
    System,
    Input,
    Application,
}

impl NotificationCategory {
    pub const ALL: [NotificationCategory; 4] = [
        NotificationCategory::Player,
        NotificationCategory::System,
        NotificationCategory::Input,
        NotificationCategory::Application,
    ];

    /// Method-name namespace for this category
    pub const fn namespace(self) -> &'static str {
        match self {
            NotificationCategory::Player => "Player",
            NotificationCategory::System => "System",
            NotificationCategory::Input => "Input",
            NotificationCategory::Application => "Application",
        }
    }

    /// Category for a notification method name, if recognised
    pub fn from_method(method: &str) -> Option<Self> {
        let (namespace, event) = method.split_once('.')?;
        if event.is_empty() {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|category| category.namespace() == namespace)
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

/// A decoded push notification
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub category: NotificationCategory,
    pub method: String,
    pub params: Value,
}

impl Notification {
    /// Decode a `{method, params}` message; `None` for unrecognised methods
    pub fn decode(method: String, params: Value) -> Option<Self> {
        let category = NotificationCategory::from_method(&method)?;
        Some(Self {
            category,
            method,
            params,
        })
    }

    /// Event part of the method name, e.g. `OnPlay`
    pub fn event(&self) -> &str {
        self.method
            .split_once('.')
            .map(|(_, event)| event)
            .unwrap_or(&self.method)
    }

    /// The `params.data` payload hosts attach to notifications
    pub fn data(&self) -> &Value {
        &self.params["data"]
    }
}

/// Receives notifications for the categories it is subscribed to
pub trait NotificationListener: Send + Sync {
    fn on_notification(&self, notification: &Notification);
}

impl<F> NotificationListener for F
where
    F: Fn(&Notification) + Send + Sync,
{
    fn on_notification(&self, notification: &Notification) {
        self(notification)
    }
}

// ----------------------------------------------------------------------------
// Notification Hub
// ----------------------------------------------------------------------------

type ListenerSet = HashMap<u64, Arc<dyn NotificationListener>>;

struct HubInner {
    context: ExecutionContext,
    listeners: Mutex<HashMap<NotificationCategory, ListenerSet>>,
    next_listener: AtomicU64,
}

impl HubInner {
    fn listeners(&self) -> MutexGuard<'_, HashMap<NotificationCategory, ListenerSet>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Per-category listener sets with delivery on a designated context
#[derive(Clone)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

impl NotificationHub {
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            inner: Arc::new(HubInner {
                context,
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.inner.context
    }

    /// Add a listener to one category's set
    ///
    /// The returned link removes it again; the link holds the hub weakly so a
    /// forgotten link never keeps the hub alive.
    pub fn subscribe(&self, category: NotificationCategory, listener: Arc<dyn NotificationListener>) -> Link {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners()
            .entry(category)
            .or_default()
            .insert(id, listener);
        debug!(%category, listener = id, "Listener subscribed");

        let hub: Weak<HubInner> = Arc::downgrade(&self.inner);
        Link::new(move || {
            if let Some(hub) = hub.upgrade() {
                if let Some(set) = hub.listeners().get_mut(&category) {
                    set.remove(&id);
                }
                debug!(%category, listener = id, "Listener unlinked");
            }
        })
    }

    pub fn listener_count(&self, category: NotificationCategory) -> usize {
        self.inner
            .listeners()
            .get(&category)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Schedule delivery of a notification to its category's listeners
    ///
    /// Returns the number of listeners the notification was queued for.
    pub fn dispatch(&self, notification: Notification) -> usize {
        let targets: Vec<Arc<dyn NotificationListener>> = self
            .inner
            .listeners()
            .get(&notification.category)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default();

        if targets.is_empty() {
            debug!(method = %notification.method, "No listeners for notification");
            return 0;
        }

        let count = targets.len();
        self.inner.context.post(move || {
            for listener in targets {
                listener.on_notification(&notification);
            }
        });
        count
    }

    /// Decode and dispatch a raw `{method, params}` message
    ///
    /// Unrecognised method names are logged and dropped.
    pub fn dispatch_raw(&self, method: String, params: Value) -> usize {
        if NotificationCategory::from_method(&method).is_none() {
            warn!(%method, "Dropping notification with unrecognised method");
            return 0;
        }
        Notification::decode(method, params)
            .map(|notification| self.dispatch(notification))
            .unwrap_or(0)
    }

    /// Hand a transport failure to the context's error handler
    pub fn report_error(&self, err: TransportError) {
        self.inner.context.report(err.into());
    }

    /// Drop every listener in every category
    pub fn clear(&self) {
        self.inner.listeners().clear();
    }
}

impl fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<(NotificationCategory, usize)> = NotificationCategory::ALL
            .into_iter()
            .map(|category| (category, self.listener_count(category)))
            .collect();
        f.debug_struct("NotificationHub")
            .field("context", &self.inner.context.name())
            .field("listeners", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::{self, ThreadId};

    #[test]
    fn test_category_from_method() {
        assert_eq!(
            NotificationCategory::from_method("Player.OnPlay"),
            Some(NotificationCategory::Player)
        );
        assert_eq!(
            NotificationCategory::from_method("Application.OnVolumeChanged"),
            Some(NotificationCategory::Application)
        );
        assert_eq!(NotificationCategory::from_method("VideoLibrary.OnScanStarted"), None);
        assert_eq!(NotificationCategory::from_method("Player"), None);
        assert_eq!(NotificationCategory::from_method("Player."), None);
    }

    #[test]
    fn test_notification_accessors() {
        let n = Notification::decode(
            "Input.OnInputRequested".into(),
            json!({"data": {"title": "Search"}, "sender": "xbmc"}),
        )
        .unwrap();
        assert_eq!(n.event(), "OnInputRequested");
        assert_eq!(n.data()["title"], "Search");
    }

    #[tokio::test]
    async fn test_dispatch_reaches_only_subscribed_category() {
        let hub = NotificationHub::new(ExecutionContext::current("notifications"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _link = hub.subscribe(
            NotificationCategory::Player,
            Arc::new(move |n: &Notification| sink.lock().unwrap().push(n.method.clone())),
        );

        assert_eq!(hub.dispatch_raw("Player.OnPause".into(), json!({})), 1);
        assert_eq!(hub.dispatch_raw("System.OnQuit".into(), json!({})), 0);
        assert_eq!(hub.dispatch_raw("Bogus".into(), json!({})), 0);
        hub.context().flush().await;

        assert_eq!(*seen.lock().unwrap(), vec!["Player.OnPause".to_string()]);
    }

    #[tokio::test]
    async fn test_unlink_twice_removes_listener_once() {
        let hub = NotificationHub::new(ExecutionContext::current("notifications"));
        let listener: Arc<dyn NotificationListener> = Arc::new(|_: &Notification| {});
        let link = hub.subscribe(NotificationCategory::System, Arc::clone(&listener));
        let other = hub.subscribe(NotificationCategory::System, listener);
        assert_eq!(hub.listener_count(NotificationCategory::System), 2);

        link.unlink();
        assert_eq!(hub.listener_count(NotificationCategory::System), 1);
        link.unlink();
        assert_eq!(hub.listener_count(NotificationCategory::System), 1);

        other.unlink();
        assert_eq!(hub.listener_count(NotificationCategory::System), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_listeners_run_on_context_not_dispatcher() {
        let hub = NotificationHub::new(ExecutionContext::current("notifications"));
        let seen: Arc<Mutex<Option<ThreadId>>> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let _link = hub.subscribe(
            NotificationCategory::Application,
            Arc::new(move |_: &Notification| *sink.lock().unwrap() = Some(thread::current().id())),
        );

        // Dispatch from a plain OS thread standing in for the read loop.
        let dispatcher = hub.clone();
        let reader_thread = thread::spawn(move || {
            dispatcher.dispatch_raw("Application.OnVolumeChanged".into(), json!({}));
            thread::current().id()
        })
        .join()
        .unwrap();
        hub.context().flush().await;

        let listener_thread = seen.lock().unwrap().expect("listener should have run");
        assert_ne!(listener_thread, reader_thread);
    }
}
