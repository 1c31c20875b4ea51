//! Session registry
//!
//! Owns every live session, the active-session pointer and the event funnel
//! that carries engine callbacks onto the control context.

use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tracing::{debug, info, instrument, warn};

use crate::config::ShellConfig;
use crate::engine::{EngineEvent, EngineEventKind, EngineRuntime, EventSink, HandleId, SessionEvent};
use crate::pages;
use crate::session::browsing::Session;
use crate::session::settings::SessionSettings;
use crate::session::state::{PersistedSession, SessionId};
use crate::{Error, Result};

/// Session registry
pub struct SessionRegistry {
    runtime: Arc<dyn EngineRuntime>,
    config: Arc<ShellConfig>,
    sessions: RwLock<Vec<Arc<Session>>>,
    active: RwLock<Option<SessionId>>,
    region: RwLock<Option<String>>,
    /// Settings new non-private sessions start from
    defaults: RwLock<SessionSettings>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Mutex<mpsc::UnboundedReceiver<SessionEvent>>,
    closed: AtomicBool,
    shutdown: Notify,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.session_count())
            .field("active", &*self.active.read())
            .finish()
    }
}

impl SessionRegistry {
    /// Create a new registry
    pub fn new(runtime: Arc<dyn EngineRuntime>, config: ShellConfig) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let region = config.region.as_deref().map(|r| pages::normalize_region(Some(r)));
        let defaults = config.default_settings();

        Arc::new(Self {
            runtime,
            config: Arc::new(config),
            sessions: RwLock::new(Vec::new()),
            active: RwLock::new(None),
            region: RwLock::new(region),
            defaults: RwLock::new(defaults),
            events_tx,
            events_rx: Mutex::new(events_rx),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        })
    }

    /// Create a registry over the mock engine
    pub fn mock() -> Arc<Self> {
        Self::new(
            Arc::new(crate::engine::MockEngineRuntime::new()),
            ShellConfig::default(),
        )
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Arc<dyn EngineRuntime> {
        &self.runtime
    }

    /// Create and register a session; it does not become active
    #[instrument(skip(self, settings))]
    pub async fn create_session(
        &self,
        private_mode: bool,
        settings: Option<SessionSettings>,
    ) -> Result<Arc<Session>> {
        self.open_session(private_mode, settings, true).await
    }

    async fn open_session(
        &self,
        private_mode: bool,
        settings: Option<SessionSettings>,
        load_start_page: bool,
    ) -> Result<Arc<Session>> {
        self.ensure_open()?;

        let mut settings = settings.unwrap_or_else(|| self.defaults.read().clone());
        settings.private_mode = private_mode;

        let sink = EventSink::new(SessionId::new(), self.events_tx.clone());
        let region = self.region.read().clone();

        let session = if load_start_page {
            Session::create(self.runtime.clone(), self.config.clone(), settings, region, sink).await?
        } else {
            Session::open(self.runtime.clone(), self.config.clone(), settings, region, sink).await?
        };

        self.sessions.write().push(session.clone());
        info!("Registered session {} ({} live)", session.id(), self.session_count());
        Ok(session)
    }

    /// Restore a persisted session and register it
    #[instrument(skip(self, persisted))]
    pub async fn restore_session(&self, persisted: PersistedSession) -> Result<Arc<Session>> {
        self.ensure_open()?;

        let id = persisted
            .id
            .filter(|id| self.session(*id).is_none())
            .unwrap_or_default();
        let sink = EventSink::new(id, self.events_tx.clone());
        let region = self.region.read().clone();

        let session =
            Session::restore(self.runtime.clone(), self.config.clone(), persisted, region, sink).await?;

        self.sessions.write().push(session.clone());
        Ok(session)
    }

    /// Shut a session down and forget it
    ///
    /// # Panics
    ///
    /// Panics if the session is active or still bound to a window.
    pub fn destroy_session(&self, session: &Arc<Session>) {
        let id = session.id();
        assert!(
            *self.active.read() != Some(id),
            "session {} destroyed while active",
            id
        );
        assert!(
            session.bound_window().is_none(),
            "session {} destroyed while bound to {:?}",
            id,
            session.bound_window()
        );

        session.shutdown();
        self.sessions.write().retain(|s| s.id() != id);
        info!("Destroyed session {} ({} live)", id, self.session_count());
    }

    /// Mark a registered session as the one the user is looking at
    pub fn set_active_session(&self, id: SessionId) -> Result<()> {
        if self.session(id).is_none() {
            return Err(Error::session_not_found(id.to_string()));
        }
        *self.active.write() = Some(id);
        debug!("Active session is now {}", id);
        Ok(())
    }

    pub fn clear_active_session(&self) {
        *self.active.write() = None;
    }

    pub fn active_session(&self) -> Option<Arc<Session>> {
        let id = (*self.active.read())?;
        self.session(id)
    }

    pub fn session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().iter().find(|s| s.id() == id).cloned()
    }

    /// Session currently running on `handle`
    pub fn session_for_handle(&self, handle: HandleId) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .iter()
            .find(|s| s.current_handle_id() == Some(handle))
            .cloned()
    }

    /// Sessions in creation order
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().clone()
    }

    /// Sessions, most recently attached first; never-attached sessions last
    pub fn sessions_by_last_use(&self) -> Vec<Arc<Session>> {
        let mut sessions = self.sessions();
        sessions.sort_by(|a, b| b.last_use().cmp(&a.last_use()));
        sessions
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Snapshots of every non-private session
    pub fn persistable_sessions(&self) -> Vec<PersistedSession> {
        self.sessions
            .read()
            .iter()
            .filter(|s| !s.is_private_mode() && !s.is_closed())
            .map(|s| s.persist())
            .collect()
    }

    // Settings broadcast

    pub fn region(&self) -> Option<String> {
        self.region.read().clone()
    }

    pub fn set_region(&self, region: Option<&str>) {
        *self.region.write() = Some(pages::normalize_region(region));
        for session in self.sessions() {
            session.set_region(region);
        }
    }

    pub async fn set_multiprocess(&self, enabled: bool) {
        self.defaults.write().multiprocess = enabled;
        for session in self.sessions() {
            if let Err(e) = session.set_multiprocess(enabled).await {
                warn!("Session {} kept multiprocess setting: {}", session.id(), e);
            }
        }
    }

    pub async fn set_tracking_protection(&self, enabled: bool) {
        self.defaults.write().tracking_protection = enabled;
        for session in self.sessions() {
            if let Err(e) = session.set_tracking_protection(enabled).await {
                warn!("Session {} kept tracking protection setting: {}", session.id(), e);
            }
        }
    }

    pub async fn set_alternate_engine(&self, enabled: bool) {
        self.defaults.write().alternate_engine = enabled;
        for session in self.sessions() {
            if !session.set_alternate_engine(enabled).await {
                debug!("Session {} stays on its current engine", session.id());
            }
        }
    }

    // Event funnel

    /// Dispatch every queued engine event on the calling task
    ///
    /// Events raised while processing are handled in the same call.
    pub async fn process_pending_events(&self) -> usize {
        let mut rx = self.events_rx.lock().await;
        let mut processed = 0;

        while let Ok(event) = rx.try_recv() {
            self.dispatch_event(event).await;
            processed += 1;
        }

        processed
    }

    /// Dispatch engine events until the registry shuts down
    pub async fn run(&self) {
        let shutdown = self.shutdown.notified();
        self.run_until(shutdown).await;
    }

    /// Dispatch engine events until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut rx = self.events_rx.lock().await;

        loop {
            if self.closed.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    debug!("Event loop stopping");
                    break;
                }
                event = rx.recv() => match event {
                    Some(event) => self.dispatch_event(event).await,
                    None => break,
                },
            }
        }
    }

    async fn dispatch_event(&self, event: SessionEvent) {
        let SessionEvent { session, event } = event;

        let Some(target) = self.session(session) else {
            debug!("Dropping {} for unknown session {}", event.kind.name(), session);
            event.kind.respond_default();
            return;
        };

        match event.kind {
            EngineEventKind::NewSession { uri, responder }
                if target.current_handle_id() == Some(event.handle) =>
            {
                self.open_child_session(&target, &uri, responder).await
            }
            kind => target.handle_event(EngineEvent::new(event.handle, kind)).await,
        }
    }

    /// Back a `window.open` from `opener` with a fresh session
    async fn open_child_session(
        &self,
        opener: &Arc<Session>,
        uri: &str,
        responder: oneshot::Sender<Option<HandleId>>,
    ) {
        debug!("Session {} opening a new session for {}", opener.id(), uri);

        match self
            .open_session(opener.is_private_mode(), Some(opener.settings()), false)
            .await
        {
            Ok(child) => {
                let _ = responder.send(child.current_handle_id());
                opener.notify_new_session(&child);
            }
            Err(e) => {
                warn!("Could not open a session for {}: {}", uri, e);
                let _ = responder.send(None);
            }
        }
    }

    /// Shut every session down; the registry refuses new sessions afterwards
    pub fn shutdown_all(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let sessions = std::mem::take(&mut *self.sessions.write());
        for session in &sessions {
            session.shutdown();
        }
        *self.active.write() = None;
        self.shutdown.notify_waiters();

        info!("Registry shut down {} sessions", sessions.len());
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(Error::internal("session registry is shut down"));
        }
        Ok(())
    }
}
