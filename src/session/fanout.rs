//! Listener fan-out
//!
//! Ordered multicast with copy-on-dispatch snapshots. Listeners may add or
//! remove listeners (themselves included) from inside a callback; the round in
//! progress is unaffected.

use parking_lot::RwLock;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, trace};

use crate::session::traits::{
    ContentListener, MediaAvailabilityListener, NavigationListener, ProgressListener,
    SessionChangeListener, TextInputListener, ThumbnailListener,
};

/// Identity comparison for listener references, ignoring vtables
pub(crate) fn same_listener<L: ?Sized>(a: &Arc<L>, b: &Arc<L>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

/// One listener category
pub struct ListenerSet<L: ?Sized> {
    category: &'static str,
    listeners: RwLock<Vec<Arc<L>>>,
}

impl<L: ?Sized> std::fmt::Debug for ListenerSet<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("category", &self.category)
            .field("len", &self.listeners.read().len())
            .finish()
    }
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn new(category: &'static str) -> Self {
        Self {
            category,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn category(&self) -> &'static str {
        self.category
    }

    /// Append a listener; returns false if it was already registered
    pub fn add(&self, listener: Arc<L>) -> bool {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Remove a listener; returns false if it was not registered
    pub fn remove(&self, listener: &Arc<L>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    pub fn contains(&self, listener: &Arc<L>) -> bool {
        self.listeners.read().iter().any(|l| same_listener(l, listener))
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Current listeners in insertion order
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.listeners.read().clone()
    }

    /// Call `f` on every listener registered when dispatch starts
    ///
    /// Returns the number of listeners that panicked.
    pub fn dispatch<F>(&self, f: F) -> usize
    where
        F: Fn(&L),
    {
        let snapshot = self.snapshot();
        trace!("Dispatching to {} {} listeners", snapshot.len(), self.category);

        snapshot
            .iter()
            .filter(|listener| !self.notify(listener, &f))
            .count()
    }

    /// Map every listener of the snapshot through `f`, skipping those that panic
    pub fn collect<T, F>(&self, f: F) -> Vec<T>
    where
        F: Fn(&L) -> T,
    {
        self.snapshot()
            .iter()
            .filter_map(|listener| match catch_unwind(AssertUnwindSafe(|| f(&**listener))) {
                Ok(value) => Some(value),
                Err(payload) => {
                    error!(
                        "{} listener panicked during dispatch: {}",
                        self.category,
                        panic_message(payload.as_ref())
                    );
                    None
                }
            })
            .collect()
    }

    /// Call `f` on a single listener with panic isolation; returns false if it panicked
    pub fn notify<F>(&self, listener: &Arc<L>, f: F) -> bool
    where
        F: Fn(&L),
    {
        match catch_unwind(AssertUnwindSafe(|| f(&**listener))) {
            Ok(()) => true,
            Err(payload) => {
                error!(
                    "{} listener panicked during dispatch: {}",
                    self.category,
                    panic_message(payload.as_ref())
                );
                false
            }
        }
    }
}

/// Every listener category of one session
pub struct SessionListeners {
    pub navigation: ListenerSet<dyn NavigationListener>,
    pub progress: ListenerSet<dyn ProgressListener>,
    pub content: ListenerSet<dyn ContentListener>,
    pub text_input: ListenerSet<dyn TextInputListener>,
    pub media_availability: ListenerSet<dyn MediaAvailabilityListener>,
    pub session_change: ListenerSet<dyn SessionChangeListener>,
    pub thumbnail: ListenerSet<dyn ThumbnailListener>,
}

impl SessionListeners {
    pub fn new() -> Self {
        Self {
            navigation: ListenerSet::new("navigation"),
            progress: ListenerSet::new("progress"),
            content: ListenerSet::new("content"),
            text_input: ListenerSet::new("text_input"),
            media_availability: ListenerSet::new("media_availability"),
            session_change: ListenerSet::new("session_change"),
            thumbnail: ListenerSet::new("thumbnail"),
        }
    }

    pub fn clear_all(&self) {
        self.navigation.clear();
        self.progress.clear();
        self.content.clear();
        self.text_input.clear();
        self.media_availability.clear();
        self.session_change.clear();
        self.thumbnail.clear();
    }

    pub fn total(&self) -> usize {
        self.navigation.len()
            + self.progress.len()
            + self.content.len()
            + self.text_input.len()
            + self.media_availability.len()
            + self.session_change.len()
            + self.thumbnail.len()
    }
}

impl Default for SessionListeners {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionListeners")
            .field("total", &self.total())
            .finish()
    }
}
