//! Window surface binding
//!
//! Connects one window's surface to one session's engine display at a time.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ShellConfig;
use crate::engine::{Display, EngineHandle, HandleId};
use crate::session::state::Thumbnail;
use crate::session::traits::{ProgressListener, SessionChangeListener};
use crate::session::Session;
use crate::window::{CaptureOutcome, SurfaceGeometry, WindowId};
use crate::{Error, Result};

struct BindingState {
    geometry: SurfaceGeometry,
    session: Option<Arc<Session>>,
    /// Handle the held display belongs to
    handle: Option<Arc<dyn EngineHandle>>,
    display: Option<Arc<dyn Display>>,
    observer: Option<Arc<BindingObserver>>,
}

impl BindingState {
    fn release_display(&mut self) {
        if let Some(display) = self.display.take() {
            let released = display.handle_id();
            display.surface_destroyed();
            if let Some(handle) = self.handle.as_ref() {
                handle.release_display(&display);
            }
            debug!("Released display of {}", released);
        }
        self.handle = None;
    }
}

struct BindingInner {
    window: WindowId,
    capture_on_page_stop: bool,
    state: Mutex<BindingState>,
}

impl BindingInner {
    /// Move the display over to the session's replacement handle
    fn rebind(&self, session: &Session, old: HandleId, new: HandleId) {
        let mut state = self.state.lock();

        let bound = state.session.as_ref().map(|s| s.id());
        if bound != Some(session.id()) {
            return;
        }
        debug!("{} following {} from {} to {}", self.window, session.id(), old, new);

        state.release_display();

        let Some(handle) = session.current_handle() else {
            return;
        };
        match handle.acquire_display() {
            Ok(display) => {
                display.surface_changed(state.geometry.content_rect());
                state.display = Some(display);
                state.handle = Some(handle);
            }
            Err(Error::DisplayAlreadyAcquired(id)) => {
                panic!("display of {} acquired twice ({})", id, self.window)
            }
            Err(e) => warn!("{} lost its display after replacement: {}", self.window, e),
        }
    }

    async fn capture(&self) -> CaptureOutcome {
        let (session, handle, display) = {
            let state = self.state.lock();
            match (&state.session, &state.handle, &state.display) {
                (Some(session), Some(handle), Some(display)) => {
                    (session.clone(), handle.clone(), display.clone())
                }
                _ => return CaptureOutcome::Skipped,
            }
        };

        if !handle.is_open() {
            return CaptureOutcome::Skipped;
        }

        let Some(image) = display.capture_pixels().await else {
            debug!("{} capture produced no image", self.window);
            return CaptureOutcome::NoImage;
        };

        let thumbnail = Thumbnail {
            image,
            handle: handle.id(),
            captured_at: Instant::now(),
        };
        if session.set_thumbnail(thumbnail) {
            CaptureOutcome::Captured
        } else {
            debug!("{} discarding capture from stale {}", self.window, handle.id());
            CaptureOutcome::Stale
        }
    }
}

/// Listens on the bound session on behalf of the binding
struct BindingObserver {
    inner: Weak<BindingInner>,
}

impl SessionChangeListener for BindingObserver {
    fn on_session_replaced(&self, session: &Session, old: HandleId, new: HandleId) {
        if let Some(inner) = self.inner.upgrade() {
            inner.rebind(session, old, new);
        }
    }
}

impl ProgressListener for BindingObserver {
    fn on_page_stop(&self, _session: &Session, success: bool) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if !success || !inner.capture_on_page_stop {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    inner.capture().await;
                });
            }
            Err(_) => debug!("No runtime, skipping capture for {}", inner.window),
        }
    }
}

/// Window surface binding
pub struct WindowSurfaceBinding {
    inner: Arc<BindingInner>,
}

impl std::fmt::Debug for WindowSurfaceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("WindowSurfaceBinding")
            .field("window", &self.inner.window)
            .field("session", &state.session.as_ref().map(|s| s.id()))
            .field("display", &state.display.as_ref().map(|d| d.handle_id()))
            .finish()
    }
}

impl WindowSurfaceBinding {
    pub fn new(window: WindowId, geometry: SurfaceGeometry, config: &ShellConfig) -> Self {
        Self {
            inner: Arc::new(BindingInner {
                window,
                capture_on_page_stop: config.capture_on_page_stop,
                state: Mutex::new(BindingState {
                    geometry,
                    session: None,
                    handle: None,
                    display: None,
                    observer: None,
                }),
            }),
        }
    }

    pub fn window_id(&self) -> WindowId {
        self.inner.window
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.inner.state.lock().session.clone()
    }

    pub fn geometry(&self) -> SurfaceGeometry {
        self.inner.state.lock().geometry
    }

    /// Handle whose display is currently held
    pub fn display_handle(&self) -> Option<HandleId> {
        self.inner.state.lock().display.as_ref().map(|d| d.handle_id())
    }

    pub fn has_display(&self) -> bool {
        self.inner.state.lock().display.is_some()
    }

    /// Render `session` in this window
    ///
    /// The previously attached session's display is released before the new
    /// one is acquired.
    ///
    /// # Panics
    ///
    /// Panics if the session is rendered by another window, or its display is
    /// already held elsewhere.
    pub fn attach(&self, session: &Arc<Session>) -> Result<()> {
        let window = self.inner.window;

        if session.is_closed() {
            return Err(Error::session_closed(session.id().to_string()));
        }
        let handle = session
            .current_handle()
            .ok_or_else(|| Error::session_closed(session.id().to_string()))?;

        let already_attached = self
            .inner
            .state
            .lock()
            .session
            .as_ref()
            .map_or(false, |s| s.id() == session.id());
        if already_attached {
            let state = self.inner.state.lock();
            if let Some(display) = state.display.as_ref() {
                display.surface_changed(state.geometry.content_rect());
            }
            session.update_last_use();
            return Ok(());
        }

        if let Err(other) = session.bind_window(window) {
            panic!("session {} is already rendered by {}", session.id(), other);
        }

        self.detach();

        let display = match handle.acquire_display() {
            Ok(display) => display,
            Err(Error::DisplayAlreadyAcquired(id)) => {
                session.unbind_window(window);
                panic!("display of {} acquired twice ({})", id, window);
            }
            Err(e) => {
                session.unbind_window(window);
                return Err(e);
            }
        };

        let observer = Arc::new(BindingObserver {
            inner: Arc::downgrade(&self.inner),
        });
        session.add_session_change_listener(observer.clone());
        // A replayed page stop would trigger a capture
        session.add_progress_listener_without_replay(observer.clone());

        {
            let mut state = self.inner.state.lock();
            display.surface_changed(state.geometry.content_rect());
            state.session = Some(session.clone());
            state.handle = Some(handle.clone());
            state.display = Some(display);
            state.observer = Some(observer);
        }

        session.update_last_use();
        info!("{} attached session {} on {}", window, session.id(), handle.id());
        Ok(())
    }

    /// Release the display and forget the session
    pub fn detach(&self) {
        let window = self.inner.window;

        let (session, observer) = {
            let mut state = self.inner.state.lock();
            state.release_display();
            (state.session.take(), state.observer.take())
        };

        if let Some(session) = session {
            if let Some(observer) = observer {
                let change: Arc<dyn SessionChangeListener> = observer.clone();
                let progress: Arc<dyn ProgressListener> = observer;
                session.remove_session_change_listener(&change);
                session.remove_progress_listener(&progress);
            }
            session.unbind_window(window);
            debug!("{} detached session {}", window, session.id());
        }
    }

    /// Change the surface size; the engine is told right away
    pub fn resize(&self, geometry: SurfaceGeometry) {
        let mut state = self.inner.state.lock();
        state.geometry = geometry;
        if let Some(display) = state.display.as_ref() {
            display.surface_changed(geometry.content_rect());
        }
    }

    /// Capture the page into the session's thumbnail
    ///
    /// Skipped without a display or an open handle; discarded if the session
    /// moved to another handle while the capture ran.
    pub async fn capture_thumbnail(&self) -> CaptureOutcome {
        self.inner.capture().await
    }
}

impl Drop for WindowSurfaceBinding {
    fn drop(&mut self) {
        self.detach();
    }
}
