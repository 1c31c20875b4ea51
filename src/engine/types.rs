//! Engine-facing data types
//!
//! Everything that crosses the boundary between the session layer and the
//! embedded browser engine: identities, settings, load flags, callback payloads
//! and the event envelope engine threads use to reach the control context.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::session::settings::{UserAgentMode, ViewportMode};
use crate::session::state::SessionId;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one engine handle. Distinct from the session that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(u64);

impl HandleId {
    /// Allocate a process-unique handle id
    pub fn next() -> Self {
        HandleId(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

/// Settings an engine handle is opened with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub multiprocess: bool,
    pub private_mode: bool,
    pub tracking_protection: bool,
    pub alternate_engine: bool,
    pub user_agent_mode: UserAgentMode,
    pub user_agent_override: Option<String>,
    pub viewport_mode: ViewportMode,
    pub suspend_media_when_inactive: bool,
}

/// Flags accompanying a load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadFlags(u32);

impl LoadFlags {
    pub const NONE: LoadFlags = LoadFlags(0);
    pub const BYPASS_CACHE: LoadFlags = LoadFlags(1 << 0);
    pub const REPLACE_HISTORY: LoadFlags = LoadFlags(1 << 1);

    pub fn contains(&self, other: LoadFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for LoadFlags {
    type Output = LoadFlags;

    fn bitor(self, rhs: LoadFlags) -> LoadFlags {
        LoadFlags(self.0 | rhs.0)
    }
}

/// Kinds of runtime storage a clear wipes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearDataFlags(u32);

impl ClearDataFlags {
    pub const COOKIES: ClearDataFlags = ClearDataFlags(1 << 0);
    pub const NETWORK_CACHE: ClearDataFlags = ClearDataFlags(1 << 1);
    pub const IMAGE_CACHE: ClearDataFlags = ClearDataFlags(1 << 2);
    pub const DOM_STORAGES: ClearDataFlags = ClearDataFlags(1 << 3);
    pub const SITE_SETTINGS: ClearDataFlags = ClearDataFlags(1 << 4);
    pub const ALL_CACHES: ClearDataFlags = ClearDataFlags((1 << 1) | (1 << 2));
    pub const ALL: ClearDataFlags = ClearDataFlags(0x1f);

    pub fn contains(&self, other: ClearDataFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ClearDataFlags {
    type Output = ClearDataFlags;

    fn bitor(self, rhs: ClearDataFlags) -> ClearDataFlags {
        ClearDataFlags(self.0 | rhs.0)
    }
}

/// Opaque serialized engine state, used to restore a handle
///
/// Serialized as base64 so persisted sessions stay plain JSON.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineStateBlob(Vec<u8>);

impl EngineStateBlob {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        EngineStateBlob(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Serialize for EngineStateBlob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for EngineStateBlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(EngineStateBlob)
            .map_err(serde::de::Error::custom)
    }
}

/// Captured page pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    /// RGBA8 pixels, row major
    pub pixels: Bytes,
}

/// Region of the bound surface the engine composites into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Security state of the current page
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityInfo {
    pub is_secure: bool,
    pub host: Option<String>,
    pub organization: Option<String>,
    pub issuer: Option<String>,
}

/// Where a load request wants to go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadTarget {
    #[default]
    Current,
    New,
}

/// A navigation the engine asks permission for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub uri: String,
    pub trigger_uri: Option<String>,
    pub target: LoadTarget,
    pub is_redirect: bool,
    pub has_user_gesture: bool,
}

impl LoadRequest {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            trigger_uri: None,
            target: LoadTarget::Current,
            is_redirect: false,
            has_user_gesture: false,
        }
    }
}

/// Verdict on a load request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowOrDeny {
    Allow,
    Deny,
}

/// Category of a failed load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorCategory {
    Unknown,
    Security,
    Network,
    Content,
    Uri,
    Proxy,
    SafeBrowsing,
}

impl LoadErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadErrorCategory::Unknown => "unknown",
            LoadErrorCategory::Security => "security",
            LoadErrorCategory::Network => "network",
            LoadErrorCategory::Content => "content",
            LoadErrorCategory::Uri => "uri",
            LoadErrorCategory::Proxy => "proxy",
            LoadErrorCategory::SafeBrowsing => "safebrowsing",
        }
    }
}

/// A failed load reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    pub category: LoadErrorCategory,
    pub code: i32,
}

/// Anti-tracking categories of a blocked resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockCategories(u32);

impl BlockCategories {
    pub const AD: BlockCategories = BlockCategories(1 << 0);
    pub const ANALYTIC: BlockCategories = BlockCategories(1 << 1);
    pub const SOCIAL: BlockCategories = BlockCategories(1 << 2);
    pub const CONTENT: BlockCategories = BlockCategories(1 << 3);

    pub fn contains(&self, other: BlockCategories) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for BlockCategories {
    type Output = BlockCategories;

    fn bitor(self, rhs: BlockCategories) -> BlockCategories {
        BlockCategories(self.0 | rhs.0)
    }
}

/// A resource blocked by content blocking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlockEvent {
    pub uri: String,
    pub categories: BlockCategories,
}

/// Identity of a media element on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaElementId(pub u64);

/// Kind of element under a context-menu press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextElementKind {
    #[default]
    None,
    Image,
    Video,
    Audio,
}

/// Element a context menu was requested for
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextElement {
    pub kind: ContextElementKind,
    pub link_uri: Option<String>,
    pub src_uri: Option<String>,
    pub title: Option<String>,
    pub alt_text: Option<String>,
}

/// Why the engine restarted text input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    Focus,
    Blur,
    ContentChange,
}

/// Text selection and composition range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub start: i32,
    pub end: i32,
    pub composition_start: i32,
    pub composition_end: i32,
}

/// One option in a choice prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptChoice {
    pub id: String,
    pub label: String,
    pub selected: bool,
}

/// Modal prompt requested by page content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptRequest {
    Alert {
        title: Option<String>,
        message: Option<String>,
    },
    Button {
        title: Option<String>,
        message: Option<String>,
    },
    Text {
        title: Option<String>,
        message: Option<String>,
        default_value: Option<String>,
    },
    Auth {
        title: Option<String>,
        message: Option<String>,
        uri: String,
        username: Option<String>,
    },
    Choice {
        title: Option<String>,
        choices: Vec<PromptChoice>,
        multiple: bool,
    },
    Color {
        title: Option<String>,
        default_value: Option<String>,
    },
    DateTime {
        title: Option<String>,
        default_value: Option<String>,
        min: Option<String>,
        max: Option<String>,
    },
    File {
        title: Option<String>,
        mime_types: Vec<String>,
        multiple: bool,
    },
}

impl PromptRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            PromptRequest::Alert { .. } => "alert",
            PromptRequest::Button { .. } => "button",
            PromptRequest::Text { .. } => "text",
            PromptRequest::Auth { .. } => "auth",
            PromptRequest::Choice { .. } => "choice",
            PromptRequest::Color { .. } => "color",
            PromptRequest::DateTime { .. } => "datetime",
            PromptRequest::File { .. } => "file",
        }
    }
}

/// Answer to a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptResponse {
    Dismiss,
    Confirm,
    Button { positive: bool },
    Text(String),
    Credentials { username: String, password: String },
    Choices(Vec<String>),
    Color(String),
    DateTime(String),
    Files(Vec<String>),
}

/// Content permission kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentPermission {
    Geolocation,
    DesktopNotification,
    Persistent,
    Xr,
    Autoplay,
}

/// Permission requested by page content or the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionRequest {
    Content {
        uri: Option<String>,
        permission: ContentPermission,
    },
    Media {
        uri: String,
        video_sources: Vec<String>,
        audio_sources: Vec<String>,
    },
    Platform {
        permissions: Vec<String>,
    },
}

/// Answer to a permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionResponse {
    Grant,
    Deny,
}

/// Visit flags reported with a history visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisitFlags(u32);

impl VisitFlags {
    pub const TOP_LEVEL: VisitFlags = VisitFlags(1 << 0);
    pub const REDIRECT_TEMPORARY: VisitFlags = VisitFlags(1 << 1);
    pub const REDIRECT_PERMANENT: VisitFlags = VisitFlags(1 << 2);
    pub const REDIRECT_SOURCE: VisitFlags = VisitFlags(1 << 3);
    pub const REDIRECT_SOURCE_PERMANENT: VisitFlags = VisitFlags(1 << 4);
    pub const UNRECOVERABLE_ERROR: VisitFlags = VisitFlags(1 << 5);

    pub fn contains(&self, other: VisitFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for VisitFlags {
    type Output = VisitFlags;

    fn bitor(self, rhs: VisitFlags) -> VisitFlags {
        VisitFlags(self.0 | rhs.0)
    }
}

/// One entry of the engine's session history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub uri: String,
    pub title: Option<String>,
}

/// Engine callback payloads
///
/// Variants carrying a `oneshot` responder must be answered exactly once.
#[derive(Debug)]
pub enum EngineEventKind {
    LocationChange { uri: String },
    CanGoBack(bool),
    CanGoForward(bool),
    LoadRequest {
        request: LoadRequest,
        responder: oneshot::Sender<AllowOrDeny>,
    },
    LoadError {
        uri: String,
        error: LoadError,
        responder: oneshot::Sender<Option<String>>,
    },
    NewSession {
        uri: String,
        responder: oneshot::Sender<Option<HandleId>>,
    },
    PageStart { uri: String },
    PageStop { success: bool },
    SecurityChange(SecurityInfo),
    SessionStateChange(EngineStateBlob),
    TitleChange(Option<String>),
    FullScreen(bool),
    ContextMenu {
        x: i32,
        y: i32,
        element: ContextElement,
    },
    Crash,
    FirstComposite,
    FirstContentfulPaint,
    RestartInput(RestartReason),
    ShowSoftInput,
    HideSoftInput,
    UpdateSelection(Selection),
    ContentBlocked(ContentBlockEvent),
    Prompt {
        request: PromptRequest,
        responder: oneshot::Sender<PromptResponse>,
    },
    Permission {
        request: PermissionRequest,
        responder: oneshot::Sender<PermissionResponse>,
    },
    MediaAdd(MediaElementId),
    MediaRemove(MediaElementId),
    MediaFullScreen {
        element: MediaElementId,
        full_screen: bool,
    },
    MediaPlayback {
        element: MediaElementId,
        playing: bool,
    },
    HistoryStateChange(Vec<HistoryEntry>),
    Visited {
        url: String,
        last_visited_url: Option<String>,
        flags: VisitFlags,
        responder: oneshot::Sender<bool>,
    },
    GetVisited {
        urls: Vec<String>,
        responder: oneshot::Sender<Vec<bool>>,
    },
}

impl EngineEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEventKind::LocationChange { .. } => "location_change",
            EngineEventKind::CanGoBack(_) => "can_go_back",
            EngineEventKind::CanGoForward(_) => "can_go_forward",
            EngineEventKind::LoadRequest { .. } => "load_request",
            EngineEventKind::LoadError { .. } => "load_error",
            EngineEventKind::NewSession { .. } => "new_session",
            EngineEventKind::PageStart { .. } => "page_start",
            EngineEventKind::PageStop { .. } => "page_stop",
            EngineEventKind::SecurityChange(_) => "security_change",
            EngineEventKind::SessionStateChange(_) => "session_state_change",
            EngineEventKind::TitleChange(_) => "title_change",
            EngineEventKind::FullScreen(_) => "full_screen",
            EngineEventKind::ContextMenu { .. } => "context_menu",
            EngineEventKind::Crash => "crash",
            EngineEventKind::FirstComposite => "first_composite",
            EngineEventKind::FirstContentfulPaint => "first_contentful_paint",
            EngineEventKind::RestartInput(_) => "restart_input",
            EngineEventKind::ShowSoftInput => "show_soft_input",
            EngineEventKind::HideSoftInput => "hide_soft_input",
            EngineEventKind::UpdateSelection(_) => "update_selection",
            EngineEventKind::ContentBlocked(_) => "content_blocked",
            EngineEventKind::Prompt { .. } => "prompt",
            EngineEventKind::Permission { .. } => "permission",
            EngineEventKind::MediaAdd(_) => "media_add",
            EngineEventKind::MediaRemove(_) => "media_remove",
            EngineEventKind::MediaFullScreen { .. } => "media_full_screen",
            EngineEventKind::MediaPlayback { .. } => "media_playback",
            EngineEventKind::HistoryStateChange(_) => "history_state_change",
            EngineEventKind::Visited { .. } => "visited",
            EngineEventKind::GetVisited { .. } => "get_visited",
        }
    }

    /// Answer any pending responder with its fail-safe value and drop the event
    pub fn respond_default(self) {
        match self {
            EngineEventKind::LoadRequest { responder, .. } => {
                let _ = responder.send(AllowOrDeny::Deny);
            }
            EngineEventKind::LoadError { responder, .. } => {
                let _ = responder.send(None);
            }
            EngineEventKind::NewSession { responder, .. } => {
                let _ = responder.send(None);
            }
            EngineEventKind::Prompt { responder, .. } => {
                let _ = responder.send(PromptResponse::Dismiss);
            }
            EngineEventKind::Permission { responder, .. } => {
                let _ = responder.send(PermissionResponse::Deny);
            }
            EngineEventKind::Visited { responder, .. } => {
                let _ = responder.send(false);
            }
            EngineEventKind::GetVisited { responder, .. } => {
                let _ = responder.send(Vec::new());
            }
            _ => {}
        }
    }
}

/// Engine callback tagged with the handle that raised it
#[derive(Debug)]
pub struct EngineEvent {
    pub handle: HandleId,
    pub kind: EngineEventKind,
}

impl EngineEvent {
    pub fn new(handle: HandleId, kind: EngineEventKind) -> Self {
        Self { handle, kind }
    }
}

/// Engine event addressed to a session
#[derive(Debug)]
pub struct SessionEvent {
    pub session: SessionId,
    pub event: EngineEvent,
}

/// Where an engine handle delivers its callbacks
///
/// Cloneable and `Send`, so engine-internal threads can hold it. Events are
/// queued and processed later on the control context.
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// Queue an event; returns false once the control context is gone
    pub fn emit(&self, handle: HandleId, kind: EngineEventKind) -> bool {
        let event = SessionEvent {
            session: self.session,
            event: EngineEvent::new(handle, kind),
        };

        match self.tx.send(event) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                debug!(
                    "Event sink for session {} closed, dropping {}",
                    self.session,
                    event.event.kind.name()
                );
                event.event.kind.respond_default();
                false
            }
        }
    }
}
