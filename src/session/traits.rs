//! Session listener and delegate traits
//!
//! One narrow trait per callback category. Every method has a no-op default so
//! implementors only override what they observe. Listeners run on the control
//! context and must not block; anything that needs an answer returns a
//! `'static` future instead.

use futures::future::{self, BoxFuture, FutureExt};
use std::sync::Arc;

use crate::engine::{
    AllowOrDeny, ContextElement, HandleId, HistoryEntry, LoadRequest, MediaElementId,
    PermissionRequest, PermissionResponse, PromptRequest, PromptResponse, RestartReason,
    SecurityInfo, Selection, VisitFlags,
};
use crate::session::browsing::Session;
use crate::session::state::Thumbnail;

/// Navigation listener
pub trait NavigationListener: Send + Sync {
    fn on_location_change(&self, _session: &Session, _uri: &str) {}

    fn on_can_go_back(&self, _session: &Session, _can_go_back: bool) {}

    fn on_can_go_forward(&self, _session: &Session, _can_go_forward: bool) {}

    /// Vote on a navigation. The load is allowed unless every listener denies.
    fn on_load_request(&self, _session: &Session, _request: &LoadRequest) -> BoxFuture<'static, AllowOrDeny> {
        future::ready(AllowOrDeny::Allow).boxed()
    }

    /// Page content opened a new window backed by `opened`
    fn on_new_session(&self, _session: &Session, _opened: &Arc<Session>) {}
}

/// Progress listener
pub trait ProgressListener: Send + Sync {
    fn on_page_start(&self, _session: &Session, _uri: &str) {}

    fn on_page_stop(&self, _session: &Session, _success: bool) {}

    fn on_security_change(&self, _session: &Session, _security: &SecurityInfo) {}
}

/// Content listener
pub trait ContentListener: Send + Sync {
    fn on_title_change(&self, _session: &Session, _title: Option<&str>) {}

    fn on_full_screen(&self, _session: &Session, _full_screen: bool) {}

    fn on_context_menu(&self, _session: &Session, _x: i32, _y: i32, _element: &ContextElement) {}

    /// The engine process died; recovery is already under way
    fn on_crash(&self, _session: &Session) {}

    fn on_first_composite(&self, _session: &Session) {}

    fn on_first_contentful_paint(&self, _session: &Session) {}
}

/// Text input listener
pub trait TextInputListener: Send + Sync {
    fn on_restart_input(&self, _session: &Session, _reason: RestartReason) {}

    fn on_show_soft_input(&self, _session: &Session) {}

    fn on_hide_soft_input(&self, _session: &Session) {}

    fn on_update_selection(&self, _session: &Session, _selection: &Selection) {}
}

/// Media availability listener
pub trait MediaAvailabilityListener: Send + Sync {
    /// `true` when the first media element appears, `false` after the last one goes
    fn on_media_availability_change(&self, _session: &Session, _available: bool) {}

    fn on_media_full_screen(&self, _session: &Session, _element: MediaElementId, _full_screen: bool) {}

    fn on_media_playback(&self, _session: &Session, _element: MediaElementId, _playing: bool) {}
}

/// Session change listener
pub trait SessionChangeListener: Send + Sync {
    /// The session now runs on `new`; `old` is about to be closed
    fn on_session_replaced(&self, _session: &Session, _old: HandleId, _new: HandleId) {}
}

/// Thumbnail listener
pub trait ThumbnailListener: Send + Sync {
    fn on_thumbnail_change(&self, _session: &Session, _thumbnail: &Arc<Thumbnail>) {}
}

/// Answers modal prompts raised by page content
///
/// At most one per session. Without a delegate prompts are dismissed.
pub trait PromptDelegate: Send + Sync {
    fn on_prompt(&self, session: &Session, request: PromptRequest) -> BoxFuture<'static, PromptResponse>;
}

/// Answers permission requests. Without a delegate requests are denied.
pub trait PermissionDelegate: Send + Sync {
    fn on_permission_request(
        &self,
        session: &Session,
        request: PermissionRequest,
    ) -> BoxFuture<'static, PermissionResponse>;
}

/// Backs engine history queries
pub trait HistoryDelegate: Send + Sync {
    /// Record a visit; resolves to whether it was recorded
    fn on_visited(
        &self,
        session: &Session,
        url: &str,
        last_visited_url: Option<&str>,
        flags: VisitFlags,
    ) -> BoxFuture<'static, bool>;

    /// Resolve which of `urls` were visited, in order
    fn get_visited(&self, session: &Session, urls: Vec<String>) -> BoxFuture<'static, Vec<bool>>;

    fn on_history_state_change(&self, _session: &Session, _entries: &[HistoryEntry]) {}
}
