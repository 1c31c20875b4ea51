//! Engine layer traits
//!
//! This module defines the abstract interfaces the session layer consumes from
//! the embedded browser engine.

use async_trait::async_trait;
use std::sync::Arc;

use crate::engine::types::{
    ClearDataFlags, EngineSettings, EngineStateBlob, EventSink, HandleId, Image, LoadFlags, SurfaceRect,
};
use crate::session::settings::{UserAgentMode, ViewportMode};

/// Engine runtime trait
///
/// Produces engine handles. One runtime serves every session.
#[async_trait]
pub trait EngineRuntime: Send + Sync + std::fmt::Debug {
    /// Open a new handle; callbacks for it are delivered through `sink`
    async fn open_handle(
        &self,
        settings: &EngineSettings,
        sink: EventSink,
    ) -> Result<Arc<dyn EngineHandle>, crate::Error>;

    /// Whether the alternate engine can be used at all
    fn alternate_engine_available(&self) -> bool;

    /// Wipe runtime storage. Open handles may collect cleared data again.
    async fn clear_data(&self, flags: ClearDataFlags) -> Result<(), crate::Error>;
}

/// Engine handle trait
///
/// One live browsing context. Commands are fire-and-forget; results come back
/// as events through the handle's sink.
pub trait EngineHandle: Send + Sync + std::fmt::Debug {
    /// Get handle ID
    fn id(&self) -> HandleId;

    /// Check if the handle is open
    fn is_open(&self) -> bool;

    /// Whether this handle runs on the alternate engine
    fn is_alternate(&self) -> bool;

    /// Load a URI
    fn load_uri(&self, uri: &str, flags: LoadFlags);

    /// Go back in history
    fn go_back(&self);

    /// Go forward in history
    fn go_forward(&self);

    /// Reload page
    fn reload(&self);

    /// Stop loading
    fn stop(&self);

    /// Leave page full-screen mode
    fn exit_full_screen(&self);

    /// Drop the handle's session history
    fn purge_history(&self);

    /// Mark the handle active or in the background
    fn set_active(&self, active: bool);

    /// Update user agent mode
    fn set_user_agent_mode(&self, mode: UserAgentMode);

    /// Update user agent override
    fn set_user_agent_override(&self, user_agent: Option<&str>);

    /// Update viewport mode
    fn set_viewport_mode(&self, mode: ViewportMode);

    /// Apply previously serialized state
    fn restore_state(&self, state: &EngineStateBlob) -> Result<(), crate::Error>;

    /// Acquire the handle's display. At most one consumer may hold it.
    fn acquire_display(&self) -> Result<Arc<dyn Display>, crate::Error>;

    /// Release a display acquired from this handle
    fn release_display(&self, display: &Arc<dyn Display>);

    /// Close the handle
    fn close(&self);
}

/// Display trait
///
/// The engine's per-handle render target binding.
#[async_trait]
pub trait Display: Send + Sync + std::fmt::Debug {
    /// Handle the display belongs to
    fn handle_id(&self) -> HandleId;

    /// Start compositing into the given region of the bound surface
    fn surface_changed(&self, rect: SurfaceRect);

    /// Stop compositing
    fn surface_destroyed(&self);

    /// Capture the current pixels, `None` when nothing could be captured
    async fn capture_pixels(&self) -> Option<Image>;
}
