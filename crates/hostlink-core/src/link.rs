//! Unsubscribe capability tokens
//!
//! A [`Link`] is returned by every subscription. Its only operation is
//! [`Link::unlink`], which runs the removal exactly once no matter how many
//! clones of the link call it.

use std::fmt;
use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

type Unlinker = Box<dyn FnOnce() + Send + 'static>;

/// Idempotent, composable unsubscribe handle
#[derive(Clone, Default)]
pub struct Link {
    inner: Option<Arc<Mutex<Option<Unlinker>>>>,
}

impl Link {
    /// Link whose unlink runs `unlink` the first time it is called
    pub fn new<F>(unlink: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            inner: Some(Arc::new(Mutex::new(Some(Box::new(unlink))))),
        }
    }

    /// Link with nothing to release (transports without notifications)
    pub fn noop() -> Self {
        Self { inner: None }
    }

    /// Compose several links into one that unlinks all of them
    pub fn all<I>(links: I) -> Self
    where
        I: IntoIterator<Item = Link>,
    {
        let links: SmallVec<[Link; 4]> = links.into_iter().collect();
        Self::new(move || {
            for link in links {
                link.unlink();
            }
        })
    }

    pub fn is_noop(&self) -> bool {
        self.inner.is_none()
    }

    /// Whether both handles release the same subscription
    pub fn ptr_eq(&self, other: &Link) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Whether `unlink` has already run
    pub fn is_unlinked(&self) -> bool {
        match &self.inner {
            None => true,
            Some(slot) => slot.lock().map(|slot| slot.is_none()).unwrap_or(true),
        }
    }

    /// Release the subscription; later calls do nothing
    pub fn unlink(&self) {
        let Some(slot) = &self.inner else {
            return;
        };
        // Take under the lock, run outside it so the unlinker may touch other links.
        let unlinker = match slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(unlinker) = unlinker {
            unlinker();
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("noop", &self.is_noop())
            .field("unlinked", &self.is_unlinked())
            .finish()
    }
}
