//! Per-session settings
//!
//! Settings are cloned, never shared, when a handle is rebuilt.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::engine::EngineSettings;
use crate::Error;

/// User agent the engine presents to pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAgentMode {
    Mobile,
    Desktop,
    #[default]
    Vr,
}

/// Viewport the engine lays pages out for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewportMode {
    #[default]
    Mobile,
    Desktop,
}

/// What the back action does while the page is full-screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackPolicy {
    /// Leave full-screen first, navigate on the next back
    #[default]
    ExitFullScreenFirst,
    /// Always navigate history; full-screen is left to the page
    HistoryOnly,
}

impl FromStr for BackPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exit_full_screen_first" | "exit-full-screen-first" => Ok(BackPolicy::ExitFullScreenFirst),
            "history_only" | "history-only" => Ok(BackPolicy::HistoryOnly),
            other => Err(Error::configuration(format!("Unknown back policy: {}", other))),
        }
    }
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub multiprocess: bool,
    pub tracking_protection: bool,
    /// Fixed for the lifetime of a session
    pub private_mode: bool,
    pub user_agent_mode: UserAgentMode,
    pub user_agent_override: Option<String>,
    pub alternate_engine: bool,
    pub viewport_mode: ViewportMode,
    pub suspend_media_when_inactive: bool,
    #[serde(default)]
    pub back_policy: BackPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            multiprocess: true,
            tracking_protection: true,
            private_mode: false,
            user_agent_mode: UserAgentMode::Vr,
            user_agent_override: None,
            alternate_engine: false,
            viewport_mode: ViewportMode::Mobile,
            suspend_media_when_inactive: true,
            back_policy: BackPolicy::ExitFullScreenFirst,
        }
    }
}

impl SessionSettings {
    /// Engine-level settings derived from these session settings
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            multiprocess: self.multiprocess,
            private_mode: self.private_mode,
            tracking_protection: self.tracking_protection,
            alternate_engine: self.alternate_engine,
            user_agent_mode: self.user_agent_mode,
            user_agent_override: self.user_agent_override.clone(),
            viewport_mode: self.viewport_mode,
            suspend_media_when_inactive: self.suspend_media_when_inactive,
        }
    }
}
