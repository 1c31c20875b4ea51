//! Mock engine implementation for testing
//!
//! This module provides an in-process engine that records every command and,
//! optionally, answers loads with the callback sequence a real engine raises.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::engine::traits::*;
use crate::engine::types::*;
use crate::session::settings::{UserAgentMode, ViewportMode};
use crate::Error;

const REDIRECT_PREFIX: &str = "javascript:window.location.replace('";
const REDIRECT_SUFFIX: &str = "');";

/// Command issued to a mock handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleCall {
    LoadUri { uri: String, flags: LoadFlags },
    GoBack,
    GoForward,
    Reload,
    Stop,
    ExitFullScreen,
    PurgeHistory,
    SetActive(bool),
    SetUserAgentMode(UserAgentMode),
    SetUserAgentOverride(Option<String>),
    SetViewportMode(ViewportMode),
    RestoreState(usize),
    Close,
}

/// Display acquisition order across every handle of a runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    Acquired(HandleId),
    Released(HandleId),
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct MockHistory {
    entries: Vec<String>,
    index: usize,
}

impl MockHistory {
    fn current(&self) -> Option<&String> {
        self.entries.get(self.index)
    }

    fn push(&mut self, uri: &str, replace: bool) {
        if replace && !self.entries.is_empty() {
            self.entries[self.index] = uri.to_string();
            return;
        }
        if !self.entries.is_empty() {
            self.entries.truncate(self.index + 1);
        }
        self.entries.push(uri.to_string());
        self.index = self.entries.len() - 1;
    }

    fn can_go_back(&self) -> bool {
        self.index > 0
    }

    fn can_go_forward(&self) -> bool {
        self.index + 1 < self.entries.len()
    }
}

#[derive(Debug)]
struct MockEngineShared {
    auto_navigate: AtomicBool,
    reject_restore: AtomicBool,
    capture_image: Mutex<Option<Image>>,
    display_log: Mutex<Vec<DisplayEvent>>,
}

/// Mock display
#[derive(Debug)]
pub struct MockDisplay {
    handle: HandleId,
    shared: Arc<MockEngineShared>,
    surface: Mutex<Option<SurfaceRect>>,
    captures: AtomicUsize,
}

impl MockDisplay {
    /// Region the engine was last told to composite into
    pub fn surface(&self) -> Option<SurfaceRect> {
        *self.surface.lock()
    }

    /// Number of pixel captures served
    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Display for MockDisplay {
    fn handle_id(&self) -> HandleId {
        self.handle
    }

    fn surface_changed(&self, rect: SurfaceRect) {
        *self.surface.lock() = Some(rect);
    }

    fn surface_destroyed(&self) {
        *self.surface.lock() = None;
    }

    async fn capture_pixels(&self) -> Option<Image> {
        self.captures.fetch_add(1, Ordering::Relaxed);
        tokio::task::yield_now().await;
        self.shared.capture_image.lock().clone()
    }
}

/// Mock engine handle
#[derive(Debug)]
pub struct MockEngineHandle {
    id: HandleId,
    alternate: bool,
    settings: Mutex<EngineSettings>,
    is_open: AtomicBool,
    sink: EventSink,
    calls: Mutex<Vec<HandleCall>>,
    display: Mutex<Option<Arc<MockDisplay>>>,
    history: Mutex<MockHistory>,
    shared: Arc<MockEngineShared>,
}

impl MockEngineHandle {
    fn new(settings: EngineSettings, alternate: bool, sink: EventSink, shared: Arc<MockEngineShared>) -> Self {
        Self {
            id: HandleId::next(),
            alternate,
            settings: Mutex::new(settings),
            is_open: AtomicBool::new(true),
            sink,
            calls: Mutex::new(Vec::new()),
            display: Mutex::new(None),
            history: Mutex::new(MockHistory::default()),
            shared,
        }
    }

    /// Raise an engine callback as if it came from this handle
    pub fn emit(&self, kind: EngineEventKind) -> bool {
        self.sink.emit(self.id, kind)
    }

    /// Commands received so far
    pub fn calls(&self) -> Vec<HandleCall> {
        self.calls.lock().clone()
    }

    /// URIs passed to `load_uri`, in order
    pub fn loaded_uris(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HandleCall::LoadUri { uri, .. } => Some(uri.clone()),
                _ => None,
            })
            .collect()
    }

    /// Settings the handle currently runs with
    pub fn settings(&self) -> EngineSettings {
        self.settings.lock().clone()
    }

    /// Display currently acquired from this handle
    pub fn display(&self) -> Option<Arc<MockDisplay>> {
        self.display.lock().clone()
    }

    fn record(&self, call: HandleCall) {
        self.calls.lock().push(call);
    }

    fn auto_navigate(&self) -> bool {
        self.shared.auto_navigate.load(Ordering::Relaxed)
    }

    fn navigate(&self, uri: &str, replace: bool) {
        let history = {
            let mut history = self.history.lock();
            history.push(uri, replace);
            history.clone()
        };
        self.emit_navigation(uri, &history);
    }

    fn emit_navigation(&self, uri: &str, history: &MockHistory) {
        let blob = serde_json::to_vec(history).unwrap_or_default();

        self.emit(EngineEventKind::PageStart { uri: uri.to_string() });
        self.emit(EngineEventKind::LocationChange { uri: uri.to_string() });
        self.emit(EngineEventKind::CanGoBack(history.can_go_back()));
        self.emit(EngineEventKind::CanGoForward(history.can_go_forward()));
        self.emit(EngineEventKind::TitleChange(Some(title_for(uri))));
        self.emit(EngineEventKind::SessionStateChange(EngineStateBlob::new(blob)));
        self.emit(EngineEventKind::PageStop { success: true });
    }

    fn step_history(&self, forward: bool) {
        let history = {
            let mut history = self.history.lock();
            let moved = if forward && history.can_go_forward() {
                history.index += 1;
                true
            } else if !forward && history.can_go_back() {
                history.index -= 1;
                true
            } else {
                false
            };
            if !moved {
                return;
            }
            history.clone()
        };
        if let Some(uri) = history.current() {
            self.emit_navigation(uri, &history);
        }
    }
}

fn title_for(uri: &str) -> String {
    url::Url::parse(uri)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| uri.chars().take(32).collect())
}

impl EngineHandle for MockEngineHandle {
    fn id(&self) -> HandleId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Relaxed)
    }

    fn is_alternate(&self) -> bool {
        self.alternate
    }

    fn load_uri(&self, uri: &str, flags: LoadFlags) {
        self.record(HandleCall::LoadUri {
            uri: uri.to_string(),
            flags,
        });

        if !self.is_open() || !self.auto_navigate() {
            return;
        }

        if let Some(script) = uri.strip_prefix("javascript:") {
            // Only client-side redirects are understood
            let target = uri
                .strip_prefix(REDIRECT_PREFIX)
                .and_then(|rest| rest.strip_suffix(REDIRECT_SUFFIX));
            match target {
                Some(target) => self.navigate(target, true),
                None => tracing::debug!("Mock: ignoring script {}", script),
            }
            return;
        }

        self.navigate(uri, flags.contains(LoadFlags::REPLACE_HISTORY));
    }

    fn go_back(&self) {
        self.record(HandleCall::GoBack);
        if self.is_open() && self.auto_navigate() {
            self.step_history(false);
        }
    }

    fn go_forward(&self) {
        self.record(HandleCall::GoForward);
        if self.is_open() && self.auto_navigate() {
            self.step_history(true);
        }
    }

    fn reload(&self) {
        self.record(HandleCall::Reload);
        if self.is_open() && self.auto_navigate() {
            let current = self.history.lock().current().cloned();
            if let Some(uri) = current {
                self.emit(EngineEventKind::PageStart { uri });
                self.emit(EngineEventKind::PageStop { success: true });
            }
        }
    }

    fn stop(&self) {
        self.record(HandleCall::Stop);
    }

    fn exit_full_screen(&self) {
        self.record(HandleCall::ExitFullScreen);
        if self.is_open() && self.auto_navigate() {
            self.emit(EngineEventKind::FullScreen(false));
        }
    }

    fn purge_history(&self) {
        self.record(HandleCall::PurgeHistory);
        let mut history = self.history.lock();
        let current = history.current().cloned();
        history.entries = current.into_iter().collect();
        history.index = 0;
    }

    fn set_active(&self, active: bool) {
        self.record(HandleCall::SetActive(active));
    }

    fn set_user_agent_mode(&self, mode: UserAgentMode) {
        self.record(HandleCall::SetUserAgentMode(mode));
        self.settings.lock().user_agent_mode = mode;
    }

    fn set_user_agent_override(&self, user_agent: Option<&str>) {
        self.record(HandleCall::SetUserAgentOverride(user_agent.map(String::from)));
        self.settings.lock().user_agent_override = user_agent.map(String::from);
    }

    fn set_viewport_mode(&self, mode: ViewportMode) {
        self.record(HandleCall::SetViewportMode(mode));
        self.settings.lock().viewport_mode = mode;
    }

    fn restore_state(&self, state: &EngineStateBlob) -> Result<(), Error> {
        self.record(HandleCall::RestoreState(state.len()));

        if self.shared.reject_restore.load(Ordering::Relaxed) {
            return Err(Error::restore_data_corrupt("engine rejected state"));
        }

        let restored: MockHistory = serde_json::from_slice(state.as_bytes())
            .map_err(|e| Error::restore_data_corrupt(e.to_string()))?;

        *self.history.lock() = restored.clone();

        if self.auto_navigate() {
            if let Some(uri) = restored.current() {
                self.emit_navigation(uri, &restored);
            }
        }

        Ok(())
    }

    fn acquire_display(&self) -> Result<Arc<dyn Display>, Error> {
        if !self.is_open() {
            return Err(Error::internal(format!("{} is closed", self.id)));
        }

        let mut slot = self.display.lock();
        if slot.is_some() {
            return Err(Error::DisplayAlreadyAcquired(self.id));
        }

        let display = Arc::new(MockDisplay {
            handle: self.id,
            shared: self.shared.clone(),
            surface: Mutex::new(None),
            captures: AtomicUsize::new(0),
        });
        *slot = Some(display.clone());
        self.shared.display_log.lock().push(DisplayEvent::Acquired(self.id));

        Ok(display)
    }

    fn release_display(&self, display: &Arc<dyn Display>) {
        let mut slot = self.display.lock();
        if display.handle_id() == self.id && slot.take().is_some() {
            self.shared.display_log.lock().push(DisplayEvent::Released(self.id));
        }
    }

    fn close(&self) {
        self.record(HandleCall::Close);
        self.is_open.store(false, Ordering::Relaxed);
    }
}

/// Mock engine runtime
#[derive(Debug)]
pub struct MockEngineRuntime {
    shared: Arc<MockEngineShared>,
    handles: Mutex<Vec<Arc<MockEngineHandle>>>,
    failing_opens: AtomicUsize,
    alternate_available: AtomicBool,
    fail_clear: AtomicBool,
    cleared: Mutex<Vec<(ClearDataFlags, usize)>>,
}

impl MockEngineRuntime {
    /// Create a new mock runtime that answers loads with navigation callbacks
    pub fn new() -> Self {
        Self {
            shared: Arc::new(MockEngineShared {
                auto_navigate: AtomicBool::new(true),
                reject_restore: AtomicBool::new(false),
                capture_image: Mutex::new(Some(Image {
                    width: 1,
                    height: 1,
                    pixels: Bytes::from_static(&[0xff, 0xff, 0xff, 0xff]),
                })),
                display_log: Mutex::new(Vec::new()),
            }),
            handles: Mutex::new(Vec::new()),
            failing_opens: AtomicUsize::new(0),
            alternate_available: AtomicBool::new(true),
            fail_clear: AtomicBool::new(false),
            cleared: Mutex::new(Vec::new()),
        }
    }

    /// Answer loads with navigation callbacks, or only record them
    pub fn set_auto_navigate(&self, enabled: bool) {
        self.shared.auto_navigate.store(enabled, Ordering::Relaxed);
    }

    /// Fail the next `count` calls to `open_handle`
    pub fn fail_next_opens(&self, count: usize) {
        self.failing_opens.store(count, Ordering::Relaxed);
    }

    pub fn set_alternate_available(&self, available: bool) {
        self.alternate_available.store(available, Ordering::Relaxed);
    }

    /// Make every `restore_state` fail as corrupt
    pub fn set_reject_restore(&self, reject: bool) {
        self.shared.reject_restore.store(reject, Ordering::Relaxed);
    }

    /// Image served by display captures, `None` to make captures come back empty
    pub fn set_capture_image(&self, image: Option<Image>) {
        *self.shared.capture_image.lock() = image;
    }

    /// Make `clear_data` fail
    pub fn set_fail_clear(&self, fail: bool) {
        self.fail_clear.store(fail, Ordering::Relaxed);
    }

    /// Every successful `clear_data` with the number of handles open at the time
    pub fn cleared_data(&self) -> Vec<(ClearDataFlags, usize)> {
        self.cleared.lock().clone()
    }

    /// Every handle opened so far
    pub fn handles(&self) -> Vec<Arc<MockEngineHandle>> {
        self.handles.lock().clone()
    }

    /// Look up an opened handle
    pub fn handle(&self, id: HandleId) -> Option<Arc<MockEngineHandle>> {
        self.handles.lock().iter().find(|h| h.id == id).cloned()
    }

    /// Display acquire/release order
    pub fn display_log(&self) -> Vec<DisplayEvent> {
        self.shared.display_log.lock().clone()
    }

    pub fn open_count(&self) -> usize {
        self.handles.lock().len()
    }
}

impl Default for MockEngineRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineRuntime for MockEngineRuntime {
    async fn open_handle(
        &self,
        settings: &EngineSettings,
        sink: EventSink,
    ) -> Result<Arc<dyn EngineHandle>, Error> {
        let failing = self.failing_opens.load(Ordering::Relaxed);
        if failing > 0 {
            self.failing_opens.store(failing - 1, Ordering::Relaxed);
            return Err(Error::engine_unavailable("mock engine refused to open a handle"));
        }

        let alternate = settings.alternate_engine && self.alternate_engine_available();
        let handle = Arc::new(MockEngineHandle::new(
            settings.clone(),
            alternate,
            sink,
            self.shared.clone(),
        ));
        tracing::debug!("Mock: opened {} (alternate={})", handle.id, alternate);

        self.handles.lock().push(handle.clone());
        Ok(handle)
    }

    fn alternate_engine_available(&self) -> bool {
        self.alternate_available.load(Ordering::Relaxed)
    }

    async fn clear_data(&self, flags: ClearDataFlags) -> Result<(), Error> {
        if self.fail_clear.load(Ordering::Relaxed) {
            return Err(Error::internal("mock storage clear failed"));
        }
        let open = self.handles.lock().iter().filter(|h| h.is_open()).count();
        tracing::debug!("Mock: cleared {:?} with {} handles open", flags, open);
        self.cleared.lock().push((flags, open));
        Ok(())
    }
}
