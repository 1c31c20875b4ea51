//! Durable session state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::engine::{EngineHandle, EngineStateBlob, HandleId, Image, MediaElementId, SecurityInfo};
use crate::pages::ABOUT_BLANK;
use crate::session::settings::SessionSettings;

/// Stable session identity, survives handle replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine handle lifecycle as seen from the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Unopened,
    Open,
    Closed,
}

/// Navigation state mirrored from engine callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationState {
    pub uri: String,
    pub previous_uri: Option<String>,
    pub title: Option<String>,
    pub can_go_back: bool,
    pub can_go_forward: bool,
    pub security: SecurityInfo,
    pub loading: bool,
    pub full_screen: bool,
    pub input_active: bool,
    pub engine_state: Option<EngineStateBlob>,
}

impl Default for NavigationState {
    fn default() -> Self {
        Self {
            uri: ABOUT_BLANK.to_string(),
            previous_uri: None,
            title: None,
            can_go_back: false,
            can_go_forward: false,
            security: SecurityInfo::default(),
            loading: false,
            full_screen: false,
            input_active: false,
            engine_state: None,
        }
    }
}

/// Media element on the current page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Media {
    pub element: MediaElementId,
    pub full_screen: bool,
    pub playing: bool,
}

impl Media {
    pub fn new(element: MediaElementId) -> Self {
        Self {
            element,
            full_screen: false,
            playing: false,
        }
    }
}

/// Last captured page image
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub image: Image,
    /// Handle the pixels were captured from
    pub handle: HandleId,
    pub captured_at: Instant,
}

pub(crate) struct SessionState {
    pub settings: SessionSettings,
    pub handle: Option<Arc<dyn EngineHandle>>,
    pub handle_state: HandleState,
    pub active: bool,
    pub navigation: NavigationState,
    pub media: Vec<Media>,
    pub last_use: Option<Instant>,
    pub thumbnail: Option<Arc<Thumbnail>>,
    pub region: Option<String>,
}

impl SessionState {
    pub fn new(settings: SessionSettings, region: Option<String>) -> Self {
        Self {
            settings,
            handle: None,
            handle_state: HandleState::Unopened,
            active: false,
            navigation: NavigationState::default(),
            media: Vec::new(),
            last_use: None,
            thumbnail: None,
            region,
        }
    }

    pub fn handle_id(&self) -> Option<HandleId> {
        self.handle.as_ref().map(|h| h.id())
    }

    pub fn media_mut(&mut self, element: MediaElementId) -> Option<&mut Media> {
        self.media.iter_mut().find(|m| m.element == element)
    }
}

/// Serializable snapshot used to restore a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(default)]
    pub id: Option<SessionId>,
    pub settings: SessionSettings,
    pub uri: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub engine_state: Option<EngineStateBlob>,
}

impl PersistedSession {
    /// Parse a persisted session from JSON
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether there is engine state worth restoring
    pub fn has_engine_state(&self) -> bool {
        self.engine_state.as_ref().map_or(false, |blob| !blob.is_empty())
    }
}
