//! Browsing session
//!
//! A `Session` is the durable wrapper around one browsing context. It owns one
//! engine handle at a time and survives handle replacement.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::ShellConfig;
use crate::engine::{
    ClearDataFlags, EngineHandle, EngineRuntime, EngineStateBlob, EventSink, HandleId, LoadFlags,
};
use crate::overrides::UserAgentOverrides;
use crate::pages::{self, ABOUT_BLANK};
use crate::session::fanout::SessionListeners;
use crate::session::settings::{BackPolicy, SessionSettings, UserAgentMode, ViewportMode};
use crate::session::state::{
    HandleState, Media, NavigationState, PersistedSession, SessionId, SessionState, Thumbnail,
};
use crate::session::traits::*;
use crate::window::WindowId;
use crate::{Error, Result};

/// Browsing session
pub struct Session {
    id: SessionId,
    private_mode: bool,
    runtime: Arc<dyn EngineRuntime>,
    config: Arc<ShellConfig>,
    sink: EventSink,
    private_page: String,
    pub(crate) user_agent_overrides: UserAgentOverrides,
    pub(crate) state: RwLock<SessionState>,
    pub(crate) listeners: SessionListeners,
    pub(crate) prompt_delegate: RwLock<Option<Arc<dyn PromptDelegate>>>,
    pub(crate) permission_delegate: RwLock<Option<Arc<dyn PermissionDelegate>>>,
    pub(crate) history_delegate: RwLock<Option<Arc<dyn HistoryDelegate>>>,
    bound_window: Mutex<Option<WindowId>>,
    /// Held while a replacement handle is being built
    pub(crate) replacing: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("private_mode", &self.private_mode)
            .field("handle", &state.handle_id())
            .field("handle_state", &state.handle_state)
            .field("uri", &state.navigation.uri)
            .finish()
    }
}

/// What a rebuilt handle starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rebuild {
    RestoreState,
    StartPage,
}

impl Session {
    /// Open a session and load its start page
    ///
    /// Fails with `Error::EngineUnavailable` when the engine cannot open a handle.
    pub async fn create(
        runtime: Arc<dyn EngineRuntime>,
        config: Arc<ShellConfig>,
        settings: SessionSettings,
        region: Option<String>,
        sink: EventSink,
    ) -> Result<Arc<Session>> {
        let session = Self::open(runtime, config, settings, region, sink).await?;
        session.load_uri(None);
        Ok(session)
    }

    /// Rebuild a session from a persisted snapshot
    ///
    /// Unusable engine state falls back to the start page instead of failing.
    pub async fn restore(
        runtime: Arc<dyn EngineRuntime>,
        config: Arc<ShellConfig>,
        persisted: PersistedSession,
        region: Option<String>,
        sink: EventSink,
    ) -> Result<Arc<Session>> {
        let region = persisted.region.clone().or(region);
        let session = Self::open(runtime, config, persisted.settings.clone(), region, sink).await?;

        {
            let mut state = session.state.write();
            state.navigation.uri = persisted.uri.clone();
            state.navigation.title = persisted.title.clone();
        }

        let restored = match (&persisted.engine_state, session.current_handle()) {
            (Some(blob), Some(handle)) if !blob.is_empty() && persisted.uri != ABOUT_BLANK => {
                match handle.restore_state(blob) {
                    Ok(()) => {
                        session.state.write().navigation.engine_state = Some(blob.clone());
                        true
                    }
                    Err(e) => {
                        warn!("Session {} restore data unusable, loading start page: {}", session.id, e);
                        false
                    }
                }
            }
            _ => {
                debug!("Session {} has no engine state to restore", session.id);
                false
            }
        };

        if session.private_mode {
            session.load_private_browsing_page();
        } else if !restored {
            session.load_home_page();
        }

        session.dump_all_state();
        info!("Session {} restored ({})", session.id, persisted.uri);
        Ok(session)
    }

    /// Open a session without loading anything into it
    pub(crate) async fn open(
        runtime: Arc<dyn EngineRuntime>,
        config: Arc<ShellConfig>,
        mut settings: SessionSettings,
        region: Option<String>,
        sink: EventSink,
    ) -> Result<Arc<Session>> {
        let id = sink.session_id();

        if settings.alternate_engine && !runtime.alternate_engine_available() {
            warn!("Alternate engine unavailable, session {} uses the default engine", id);
            settings.alternate_engine = false;
        }

        let handle = open_engine_handle(runtime.as_ref(), &settings, &sink).await?;

        let user_agent_overrides = UserAgentOverrides::new(&config.user_agent_overrides);

        let mut state = SessionState::new(settings, region);
        state.handle = Some(handle.clone());
        state.handle_state = HandleState::Open;

        let session = Arc::new(Session {
            id,
            private_mode: state.settings.private_mode,
            runtime,
            config,
            sink,
            private_page: pages::private_page_uri(),
            user_agent_overrides,
            state: RwLock::new(state),
            listeners: SessionListeners::new(),
            prompt_delegate: RwLock::new(None),
            permission_delegate: RwLock::new(None),
            history_delegate: RwLock::new(None),
            bound_window: Mutex::new(None),
            replacing: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        });

        info!(
            "Session {} opened on {} (private={})",
            session.id,
            handle.id(),
            session.private_mode
        );
        Ok(session)
    }

    /// Close the engine handle and drop every listener. Safe to call repeatedly.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let handle = {
            let mut state = self.state.write();
            state.handle_state = HandleState::Closed;
            state.active = false;
            state.media.clear();
            state.handle.take()
        };

        if let Some(handle) = handle {
            if handle.is_open() {
                handle.set_active(false);
                handle.stop();
                handle.close();
            }
        }

        self.listeners.clear_all();
        *self.prompt_delegate.write() = None;
        *self.permission_delegate.write() = None;
        *self.history_delegate.write() = None;

        info!("Session {} shut down", self.id);
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_private_mode(&self) -> bool {
        self.private_mode
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub(crate) fn sink(&self) -> &EventSink {
        &self.sink
    }

    pub fn current_handle(&self) -> Option<Arc<dyn EngineHandle>> {
        self.state.read().handle.clone()
    }

    pub fn current_handle_id(&self) -> Option<HandleId> {
        self.state.read().handle_id()
    }

    pub fn handle_state(&self) -> HandleState {
        self.state.read().handle_state
    }

    /// Clone of the current settings
    pub fn settings(&self) -> SessionSettings {
        self.state.read().settings.clone()
    }

    pub fn navigation_state(&self) -> NavigationState {
        self.state.read().navigation.clone()
    }

    pub fn current_uri(&self) -> String {
        self.state.read().navigation.uri.clone()
    }

    pub fn current_title(&self) -> Option<String> {
        self.state.read().navigation.title.clone()
    }

    pub fn is_secure(&self) -> bool {
        self.state.read().navigation.security.is_secure
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().navigation.loading
    }

    pub fn is_in_full_screen(&self) -> bool {
        self.state.read().navigation.full_screen
    }

    pub fn is_input_active(&self) -> bool {
        self.state.read().navigation.input_active
    }

    pub fn is_active(&self) -> bool {
        self.state.read().active
    }

    pub fn region(&self) -> Option<String> {
        self.state.read().region.clone()
    }

    /// Media element currently shown full-screen
    pub fn full_screen_video(&self) -> Option<Media> {
        self.state.read().media.iter().find(|m| m.full_screen).copied()
    }

    pub fn is_media_playing(&self) -> bool {
        self.state.read().media.iter().any(|m| m.playing)
    }

    pub fn has_media(&self) -> bool {
        !self.state.read().media.is_empty()
    }

    pub fn media(&self) -> Vec<Media> {
        self.state.read().media.clone()
    }

    pub fn thumbnail(&self) -> Option<Arc<Thumbnail>> {
        self.state.read().thumbnail.clone()
    }

    pub fn last_use(&self) -> Option<Instant> {
        self.state.read().last_use
    }

    pub fn update_last_use(&self) {
        self.state.write().last_use = Some(Instant::now());
    }

    /// Window the session is rendered in, if any
    pub fn bound_window(&self) -> Option<WindowId> {
        *self.bound_window.lock()
    }

    /// Claim the session for `window`; returns the other window holding it on conflict
    pub(crate) fn bind_window(&self, window: WindowId) -> std::result::Result<(), WindowId> {
        let mut bound = self.bound_window.lock();
        match *bound {
            Some(other) if other != window => Err(other),
            _ => {
                *bound = Some(window);
                Ok(())
            }
        }
    }

    pub(crate) fn unbind_window(&self, window: WindowId) {
        let mut bound = self.bound_window.lock();
        if *bound == Some(window) {
            *bound = None;
        }
    }

    /// Snapshot for persistence
    pub fn persist(&self) -> PersistedSession {
        let state = self.state.read();
        PersistedSession {
            id: Some(self.id),
            settings: state.settings.clone(),
            uri: state.navigation.uri.clone(),
            title: state.navigation.title.clone(),
            region: state.region.clone(),
            engine_state: state.navigation.engine_state.clone(),
        }
    }

    // Navigation

    /// Load `uri`, or the start page when `None`
    pub fn load_uri(&self, uri: Option<&str>) {
        let uri = match uri {
            Some(uri) => uri.to_string(),
            None => self.start_uri(),
        };
        self.load_with_flags(&uri, LoadFlags::NONE);
    }

    /// Private placeholder page in private mode, home uri otherwise
    fn start_uri(&self) -> String {
        if self.private_mode {
            self.private_page.clone()
        } else {
            self.home_uri()
        }
    }

    pub fn load_home_page(&self) {
        let home = self.home_uri();
        self.load_with_flags(&home, LoadFlags::NONE);
    }

    pub fn load_private_browsing_page(&self) {
        self.load_with_flags(&self.private_page, LoadFlags::NONE);
    }

    fn load_with_flags(&self, uri: &str, flags: LoadFlags) {
        match self.current_handle() {
            Some(handle) => {
                debug!("Session {} loading {}", self.id, uri);
                handle.load_uri(uri, flags);
            }
            None => debug!("Session {} has no handle, dropping load of {}", self.id, uri),
        }
    }

    /// Data uri of the private placeholder page
    pub fn private_page_uri(&self) -> &str {
        &self.private_page
    }

    /// Whether the back action would do anything
    pub fn can_go_back(&self) -> bool {
        let state = self.state.read();
        state.navigation.can_go_back
            || (state.navigation.full_screen && state.settings.back_policy == BackPolicy::ExitFullScreenFirst)
    }

    pub fn can_go_forward(&self) -> bool {
        self.state.read().navigation.can_go_forward
    }

    /// Go back, or leave full-screen first when the back policy says so
    pub fn go_back(&self) {
        let (handle, exit_full_screen) = {
            let state = self.state.read();
            (
                state.handle.clone(),
                state.navigation.full_screen
                    && state.settings.back_policy == BackPolicy::ExitFullScreenFirst,
            )
        };

        if let Some(handle) = handle {
            if exit_full_screen {
                debug!("Session {} leaving full-screen instead of going back", self.id);
                handle.exit_full_screen();
            } else {
                handle.go_back();
            }
        }
    }

    pub fn go_forward(&self) {
        if let Some(handle) = self.current_handle() {
            handle.go_forward();
        }
    }

    pub fn reload(&self) {
        if let Some(handle) = self.current_handle() {
            handle.reload();
        }
    }

    pub fn stop(&self) {
        if let Some(handle) = self.current_handle() {
            handle.stop();
        }
    }

    pub fn exit_full_screen(&self) {
        if let Some(handle) = self.current_handle() {
            handle.exit_full_screen();
        }
    }

    pub fn purge_history(&self) {
        if let Some(handle) = self.current_handle() {
            handle.purge_history();
        }
    }

    pub fn set_active(&self, active: bool) {
        let handle = {
            let mut state = self.state.write();
            state.active = active;
            state.handle.clone()
        };
        if let Some(handle) = handle {
            handle.set_active(active);
        }
    }

    // Home page and region

    /// Start page, decorated with the region for the shipped homepage
    pub fn home_uri(&self) -> String {
        let region = self.state.read().region.clone();
        pages::home_uri(
            &self.config.homepage,
            self.config.uses_default_homepage(),
            region.as_deref(),
        )
    }

    pub fn is_home_uri(&self, uri: &str) -> bool {
        pages::is_home_uri(&self.config.homepage, uri)
    }

    /// Update the region; a showing homepage is redirected in place
    pub fn set_region(&self, region: Option<&str>) {
        let region = pages::normalize_region(region);
        debug!("Session {} region set to {}", self.id, region);

        let (handle, uri) = {
            let mut state = self.state.write();
            state.region = Some(region);
            (state.handle.clone(), state.navigation.uri.clone())
        };

        if let Some(handle) = handle {
            if self.is_home_uri(&uri) {
                handle.load_uri(&pages::redirect_script(&self.home_uri()), LoadFlags::NONE);
            }
        }
    }

    // Settings

    /// Switch user agent; desktop mode drops `m.`/`mobile.` hosts
    pub fn set_user_agent_mode(&self, mode: UserAgentMode) {
        let viewport = match mode {
            UserAgentMode::Desktop => ViewportMode::Desktop,
            _ => ViewportMode::Mobile,
        };

        let (handle, uri) = {
            let mut state = self.state.write();
            if state.handle.is_none() {
                return;
            }
            state.settings.user_agent_mode = mode;
            state.settings.viewport_mode = viewport;
            (state.handle.clone(), state.navigation.uri.clone())
        };

        if let Some(handle) = handle {
            handle.set_user_agent_mode(mode);
            handle.set_viewport_mode(viewport);

            let target = match mode {
                UserAgentMode::Desktop => pages::strip_mobile_subdomain(&uri).unwrap_or(uri),
                _ => uri,
            };
            handle.load_uri(&target, LoadFlags::BYPASS_CACHE | LoadFlags::REPLACE_HISTORY);
        }
    }

    pub fn set_user_agent_override(&self, user_agent: Option<&str>) {
        let handle = {
            let mut state = self.state.write();
            state.settings.user_agent_override = user_agent.map(String::from);
            state.handle.clone()
        };
        if let Some(handle) = handle {
            handle.set_user_agent_override(user_agent);
        }
    }

    /// Toggle multiprocess; rebuilds the handle when the value changes
    pub async fn set_multiprocess(&self, enabled: bool) -> Result<()> {
        self.update_and_recreate(|s| &mut s.multiprocess, enabled, "multiprocess").await
    }

    /// Toggle tracking protection; rebuilds the handle when the value changes
    pub async fn set_tracking_protection(&self, enabled: bool) -> Result<()> {
        self.update_and_recreate(|s| &mut s.tracking_protection, enabled, "tracking protection")
            .await
    }

    async fn update_and_recreate<F>(&self, field: F, value: bool, name: &str) -> Result<()>
    where
        F: Fn(&mut SessionSettings) -> &mut bool,
    {
        let previous = {
            let mut state = self.state.write();
            let slot = field(&mut state.settings);
            if *slot == value {
                return Ok(());
            }
            std::mem::replace(slot, value)
        };

        debug!("Session {} {} -> {}", self.id, name, value);
        if let Err(e) = self.recreate().await {
            *field(&mut self.state.write().settings) = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Enable or disable the alternate engine; returns whether the session now matches
    pub async fn set_alternate_engine(&self, enabled: bool) -> bool {
        if self.settings().alternate_engine == enabled {
            return true;
        }
        self.toggle_alternate_engine().await
    }

    // Handle replacement

    /// Rebuild the engine handle from the current settings and state
    ///
    /// The old handle is closed only once the replacement is open; on failure
    /// the old handle stays live.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn recreate(&self) -> Result<()> {
        self.rebuild(Rebuild::RestoreState).await
    }

    async fn rebuild(&self, mode: Rebuild) -> Result<()> {
        let _replacing = self.replacing.lock().await;

        let (old, settings, uri, blob) = {
            let state = self.state.read();
            let old = state
                .handle
                .clone()
                .ok_or_else(|| Error::session_closed(self.id.to_string()))?;
            (
                old,
                state.settings.clone(),
                state.navigation.uri.clone(),
                state.navigation.engine_state.clone(),
            )
        };

        let new = open_engine_handle(self.runtime.as_ref(), &settings, &self.sink).await?;

        match mode {
            Rebuild::RestoreState => self.restore_into(&new, blob, &uri),
            Rebuild::StartPage => new.load_uri(&self.start_uri(), LoadFlags::NONE),
        }

        if !self.swap_handle(settings, &old, new, mode == Rebuild::StartPage) {
            return Err(Error::session_closed(self.id.to_string()));
        }
        Ok(())
    }

    /// Flip the alternate engine flag; returns false and keeps the old handle on failure
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn toggle_alternate_engine(&self) -> bool {
        let _replacing = self.replacing.lock().await;

        let (old, mut settings, uri) = {
            let state = self.state.read();
            let Some(old) = state.handle.clone() else {
                return false;
            };
            (old, state.settings.clone(), state.navigation.uri.clone())
        };

        settings.alternate_engine = !settings.alternate_engine;
        if settings.alternate_engine && !self.runtime.alternate_engine_available() {
            warn!("Alternate engine unavailable, session {} unchanged", self.id);
            return false;
        }

        let new = match open_engine_handle(self.runtime.as_ref(), &settings, &self.sink).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Engine toggle failed for session {}: {}", self.id, e);
                return false;
            }
        };

        self.load_into(&new, &uri);
        self.swap_handle(settings, &old, new, false)
    }

    /// Wipe runtime storage, then rebuild the handle
    ///
    /// The handle is closed before the wipe, otherwise it could collect the
    /// cleared data again. If no replacement can be opened the session is left
    /// without a handle and the error is returned.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn clear_cache(&self, flags: ClearDataFlags) -> Result<()> {
        let _replacing = self.replacing.lock().await;

        let (old, settings, uri, blob) = {
            let mut state = self.state.write();
            if self.is_closed() {
                return Err(Error::session_closed(self.id.to_string()));
            }
            let old = state
                .handle
                .take()
                .ok_or_else(|| Error::session_closed(self.id.to_string()))?;
            state.handle_state = HandleState::Unopened;
            (
                old,
                state.settings.clone(),
                state.navigation.uri.clone(),
                state.navigation.engine_state.clone(),
            )
        };

        old.set_active(false);
        old.stop();
        old.close();

        let cleared = self.runtime.clear_data(flags).await;
        if let Err(e) = &cleared {
            warn!("Session {} storage clear failed: {}", self.id, e);
        }

        let new = match open_engine_handle(self.runtime.as_ref(), &settings, &self.sink).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Session {} has no handle after clearing data: {}", self.id, e);
                return Err(e);
            }
        };

        self.restore_into(&new, blob, &uri);
        if !self.swap_handle(settings, &old, new, false) {
            return Err(Error::session_closed(self.id.to_string()));
        }
        cleared
    }

    /// Bring `handle` to the saved engine state, or load `uri` when it cannot be restored
    fn restore_into(&self, handle: &Arc<dyn EngineHandle>, blob: Option<EngineStateBlob>, uri: &str) {
        match blob {
            Some(blob) if !blob.is_empty() => {
                if let Err(e) = handle.restore_state(&blob) {
                    warn!("Session {} state not restorable on {}: {}", self.id, handle.id(), e);
                    self.load_into(handle, uri);
                }
            }
            _ => self.load_into(handle, uri),
        }
    }

    fn load_into(&self, handle: &Arc<dyn EngineHandle>, uri: &str) {
        if uri == ABOUT_BLANK {
            handle.load_uri(&self.start_uri(), LoadFlags::NONE);
        } else {
            handle.load_uri(uri, LoadFlags::NONE);
        }
    }

    /// Commit a replacement handle, announce it once, then retire the old one
    ///
    /// Returns false and closes `new` when the session was shut down while the
    /// replacement was being built.
    fn swap_handle(
        &self,
        settings: SessionSettings,
        old: &Arc<dyn EngineHandle>,
        new: Arc<dyn EngineHandle>,
        reset_engine_state: bool,
    ) -> bool {
        let committed = {
            let mut state = self.state.write();
            if self.is_closed() {
                None
            } else {
                state.settings = settings;
                state.handle = Some(new.clone());
                state.handle_state = HandleState::Open;
                if reset_engine_state {
                    state.navigation.engine_state = None;
                }
                let had_media = !state.media.is_empty();
                state.media.clear();
                Some((state.active, had_media))
            }
        };

        let Some((active, had_media)) = committed else {
            info!("Session {} shut down during replacement, closing {}", self.id, new.id());
            new.stop();
            new.close();
            return false;
        };

        if active {
            new.set_active(true);
        }

        info!("Session {} replaced {} with {}", self.id, old.id(), new.id());
        self.listeners
            .session_change
            .dispatch(|l| l.on_session_replaced(self, old.id(), new.id()));

        if had_media {
            self.listeners
                .media_availability
                .dispatch(|l| l.on_media_availability_change(self, false));
        }

        if old.is_open() {
            old.set_active(false);
            old.stop();
            old.close();
        }
        true
    }

    /// Crash recovery: fresh handle on the start page
    ///
    /// The crashed page is not restored into the replacement.
    pub(crate) async fn recover_from_crash(&self) {
        warn!("Engine crashed under session {}, recovering", self.id);
        self.listeners.content.dispatch(|l| l.on_crash(self));

        if let Err(e) = self.rebuild(Rebuild::StartPage).await {
            warn!("Session {} crash recovery failed: {}", self.id, e);
        }
    }

    // Thumbnails

    /// Store a capture taken from `handle`; ignored when the handle is no longer current
    pub(crate) fn set_thumbnail(&self, thumbnail: Thumbnail) -> bool {
        let thumbnail = {
            let mut state = self.state.write();
            if state.handle_id() != Some(thumbnail.handle) {
                return false;
            }
            let thumbnail = Arc::new(thumbnail);
            state.thumbnail = Some(thumbnail.clone());
            thumbnail
        };

        self.listeners
            .thumbnail
            .dispatch(|l| l.on_thumbnail_change(self, &thumbnail));
        true
    }

    // Listener registration

    pub fn add_navigation_listener(&self, listener: Arc<dyn NavigationListener>) {
        if self.listeners.navigation.add(listener.clone()) {
            self.dump_navigation_state(&listener);
        }
    }

    pub fn remove_navigation_listener(&self, listener: &Arc<dyn NavigationListener>) {
        self.listeners.navigation.remove(listener);
    }

    pub fn add_progress_listener(&self, listener: Arc<dyn ProgressListener>) {
        if self.listeners.progress.add(listener.clone()) {
            self.dump_progress_state(&listener);
        }
    }

    /// Register without replaying the current progress state
    pub(crate) fn add_progress_listener_without_replay(&self, listener: Arc<dyn ProgressListener>) {
        self.listeners.progress.add(listener);
    }

    pub fn remove_progress_listener(&self, listener: &Arc<dyn ProgressListener>) {
        self.listeners.progress.remove(listener);
    }

    pub fn add_content_listener(&self, listener: Arc<dyn ContentListener>) {
        if self.listeners.content.add(listener.clone()) {
            self.dump_content_state(&listener);
        }
    }

    pub fn remove_content_listener(&self, listener: &Arc<dyn ContentListener>) {
        self.listeners.content.remove(listener);
    }

    pub fn add_text_input_listener(&self, listener: Arc<dyn TextInputListener>) {
        self.listeners.text_input.add(listener);
    }

    pub fn remove_text_input_listener(&self, listener: &Arc<dyn TextInputListener>) {
        self.listeners.text_input.remove(listener);
    }

    pub fn add_media_availability_listener(&self, listener: Arc<dyn MediaAvailabilityListener>) {
        if self.listeners.media_availability.add(listener.clone()) && self.has_media() {
            self.listeners
                .media_availability
                .notify(&listener, |l| l.on_media_availability_change(self, true));
        }
    }

    pub fn remove_media_availability_listener(&self, listener: &Arc<dyn MediaAvailabilityListener>) {
        self.listeners.media_availability.remove(listener);
    }

    pub fn add_session_change_listener(&self, listener: Arc<dyn SessionChangeListener>) {
        self.listeners.session_change.add(listener);
    }

    pub fn remove_session_change_listener(&self, listener: &Arc<dyn SessionChangeListener>) {
        self.listeners.session_change.remove(listener);
    }

    pub fn add_thumbnail_listener(&self, listener: Arc<dyn ThumbnailListener>) {
        self.listeners.thumbnail.add(listener);
    }

    pub fn remove_thumbnail_listener(&self, listener: &Arc<dyn ThumbnailListener>) {
        self.listeners.thumbnail.remove(listener);
    }

    pub fn set_prompt_delegate(&self, delegate: Option<Arc<dyn PromptDelegate>>) {
        *self.prompt_delegate.write() = delegate;
    }

    pub fn set_permission_delegate(&self, delegate: Option<Arc<dyn PermissionDelegate>>) {
        *self.permission_delegate.write() = delegate;
    }

    pub fn set_history_delegate(&self, delegate: Option<Arc<dyn HistoryDelegate>>) {
        *self.history_delegate.write() = delegate;
    }

    // State replay

    /// Replay current state to every navigation, progress and content listener
    pub fn dump_all_state(&self) {
        for listener in self.listeners.navigation.snapshot() {
            self.dump_navigation_state(&listener);
        }
        for listener in self.listeners.progress.snapshot() {
            self.dump_progress_state(&listener);
        }
        for listener in self.listeners.content.snapshot() {
            self.dump_content_state(&listener);
        }
    }

    fn dump_navigation_state(&self, listener: &Arc<dyn NavigationListener>) {
        let navigation = {
            let state = self.state.read();
            if state.handle.is_none() {
                return;
            }
            state.navigation.clone()
        };

        self.listeners.navigation.notify(listener, |l| {
            l.on_can_go_back(self, navigation.can_go_back);
            l.on_can_go_forward(self, navigation.can_go_forward);
            l.on_location_change(self, &navigation.uri);
        });
    }

    fn dump_progress_state(&self, listener: &Arc<dyn ProgressListener>) {
        let navigation = self.navigation_state();

        self.listeners.progress.notify(listener, |l| {
            if navigation.loading {
                l.on_page_start(self, &navigation.uri);
            } else {
                l.on_page_stop(self, true);
            }
            l.on_security_change(self, &navigation.security);
        });
    }

    fn dump_content_state(&self, listener: &Arc<dyn ContentListener>) {
        let navigation = self.navigation_state();

        self.listeners.content.notify(listener, |l| {
            l.on_title_change(self, navigation.title.as_deref());
            if navigation.full_screen {
                l.on_full_screen(self, true);
            }
        });
    }
}

/// Open a handle, reporting any engine failure as `EngineUnavailable`
async fn open_engine_handle(
    runtime: &dyn EngineRuntime,
    settings: &SessionSettings,
    sink: &EventSink,
) -> Result<Arc<dyn EngineHandle>> {
    runtime
        .open_handle(&settings.engine_settings(), sink.clone())
        .await
        .map_err(|e| match e {
            Error::EngineUnavailable(_) => e,
            other => Error::engine_unavailable(other.to_string()),
        })
}
