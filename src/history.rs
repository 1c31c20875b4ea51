//! History visit recording
//!
//! `VisitRecorder` is the history delegate windows install on their sessions.
//! Storage lives behind `HistoryStore`.

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::engine::VisitFlags;
use crate::session::traits::HistoryDelegate;
use crate::session::Session;
use crate::Result;

/// How a page was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitType {
    Link,
    Reload,
    RedirectPermanent,
    RedirectTemporary,
}

/// Visit type for an engine-reported visit, `None` when it must not be recorded
pub fn classify_visit(url: &str, last_visited_url: Option<&str>, flags: VisitFlags) -> Option<VisitType> {
    if !flags.contains(VisitFlags::TOP_LEVEL) || flags.contains(VisitFlags::UNRECOVERABLE_ERROR) {
        return None;
    }

    let visit = if last_visited_url == Some(url) {
        VisitType::Reload
    } else if flags.contains(VisitFlags::REDIRECT_SOURCE_PERMANENT) {
        VisitType::RedirectPermanent
    } else if flags.contains(VisitFlags::REDIRECT_SOURCE) {
        VisitType::RedirectTemporary
    } else {
        VisitType::Link
    };
    Some(visit)
}

/// History storage backend
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record_visit(&self, url: &str, visit: VisitType) -> Result<()>;

    async fn delete_visits_for(&self, url: &str) -> Result<()>;

    async fn delete_visits_between(&self, start: SystemTime, end: SystemTime) -> Result<()>;

    /// Whether each url was visited, in order
    async fn get_visited(&self, urls: &[String]) -> Result<Vec<bool>>;
}

/// One stored visit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    pub visit: VisitType,
    pub at: SystemTime,
}

/// In-memory history store
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    visits: RwLock<HashMap<String, Vec<Visit>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visits_for(&self, url: &str) -> Vec<Visit> {
        self.visits.read().get(url).cloned().unwrap_or_default()
    }

    /// Number of urls with at least one visit
    pub fn len(&self) -> usize {
        self.visits.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.read().is_empty()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn record_visit(&self, url: &str, visit: VisitType) -> Result<()> {
        self.visits.write().entry(url.to_string()).or_default().push(Visit {
            visit,
            at: SystemTime::now(),
        });
        Ok(())
    }

    async fn delete_visits_for(&self, url: &str) -> Result<()> {
        self.visits.write().remove(url);
        Ok(())
    }

    async fn delete_visits_between(&self, start: SystemTime, end: SystemTime) -> Result<()> {
        let mut visits = self.visits.write();
        for entries in visits.values_mut() {
            entries.retain(|v| v.at < start || v.at > end);
        }
        visits.retain(|_, entries| !entries.is_empty());
        Ok(())
    }

    async fn get_visited(&self, urls: &[String]) -> Result<Vec<bool>> {
        let visits = self.visits.read();
        Ok(urls.iter().map(|url| visits.contains_key(url)).collect())
    }
}

/// History delegate recording visits into a `HistoryStore`
///
/// Private sessions never record and never report visits.
pub struct VisitRecorder {
    store: Arc<dyn HistoryStore>,
}

impl VisitRecorder {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }
}

impl HistoryDelegate for VisitRecorder {
    fn on_visited(
        &self,
        session: &Session,
        url: &str,
        last_visited_url: Option<&str>,
        flags: VisitFlags,
    ) -> BoxFuture<'static, bool> {
        if session.is_private_mode() {
            return future::ready(false).boxed();
        }
        let Some(visit) = classify_visit(url, last_visited_url, flags) else {
            return future::ready(false).boxed();
        };

        let store = self.store.clone();
        let url = url.to_string();
        async move {
            // Keep a single entry per url
            if let Err(e) = store.delete_visits_for(&url).await {
                warn!("Failed to clear visits for {}: {}", url, e);
            }
            match store.record_visit(&url, visit).await {
                Ok(()) => {
                    debug!("Recorded {:?} visit to {}", visit, url);
                    true
                }
                Err(e) => {
                    warn!("Failed to record visit to {}: {}", url, e);
                    false
                }
            }
        }
        .boxed()
    }

    fn get_visited(&self, session: &Session, urls: Vec<String>) -> BoxFuture<'static, Vec<bool>> {
        if session.is_private_mode() {
            return future::ready(Vec::new()).boxed();
        }

        let store = self.store.clone();
        async move {
            store.get_visited(&urls).await.unwrap_or_else(|e| {
                warn!("History lookup failed: {}", e);
                Vec::new()
            })
        }
        .boxed()
    }
}
