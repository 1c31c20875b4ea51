//! Configuration management for the session layer

use crate::session::settings::{BackPolicy, SessionSettings, UserAgentMode, ViewportMode};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;

/// Homepage shipped with the shell. Only this homepage is region-decorated.
pub const DEFAULT_HOMEPAGE: &str = "https://webxr.today/";

/// Shell configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Homepage loaded by new sessions and after crash recovery
    pub homepage: String,

    /// Region used to decorate the default homepage
    pub region: Option<String>,

    /// Run web content out of process
    pub multiprocess: bool,

    /// Enable tracking protection for new sessions
    pub tracking_protection: bool,

    /// Use the alternate engine for new sessions
    pub alternate_engine: bool,

    /// Default user agent mode
    pub user_agent_mode: UserAgentMode,

    /// Back button behaviour while a page is full-screen
    pub back_policy: BackPolicy,

    /// Capture a thumbnail whenever a bound page stops loading
    pub capture_on_page_stop: bool,

    /// User agent presented per domain, keyed by domain
    pub user_agent_overrides: BTreeMap<String, String>,

    /// Log level
    pub log_level: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            homepage: DEFAULT_HOMEPAGE.to_string(),
            region: None,
            multiprocess: true,
            tracking_protection: true,
            alternate_engine: false,
            user_agent_mode: UserAgentMode::Vr,
            back_policy: BackPolicy::ExitFullScreenFirst,
            capture_on_page_stop: true,
            user_agent_overrides: BTreeMap::new(),
            log_level: "info".to_string(),
        }
    }
}

impl ShellConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = ShellConfig::default();

        if let Ok(homepage) = env::var("VRSHELL_HOMEPAGE") {
            config.homepage = homepage;
        }

        if let Ok(region) = env::var("VRSHELL_REGION") {
            config.region = Some(region);
        }

        if let Ok(multiprocess) = env::var("VRSHELL_MULTIPROCESS") {
            config.multiprocess = multiprocess
                .parse()
                .map_err(|_| Error::configuration("Invalid VRSHELL_MULTIPROCESS"))?;
        }

        if let Ok(tracking) = env::var("VRSHELL_TRACKING_PROTECTION") {
            config.tracking_protection = tracking
                .parse()
                .map_err(|_| Error::configuration("Invalid VRSHELL_TRACKING_PROTECTION"))?;
        }

        if let Ok(alternate) = env::var("VRSHELL_ALTERNATE_ENGINE") {
            config.alternate_engine = alternate
                .parse()
                .map_err(|_| Error::configuration("Invalid VRSHELL_ALTERNATE_ENGINE"))?;
        }

        if let Ok(policy) = env::var("VRSHELL_BACK_POLICY") {
            config.back_policy = policy.parse()?;
        }

        if let Ok(capture) = env::var("VRSHELL_CAPTURE_ON_PAGE_STOP") {
            config.capture_on_page_stop = capture
                .parse()
                .map_err(|_| Error::configuration("Invalid VRSHELL_CAPTURE_ON_PAGE_STOP"))?;
        }

        if let Ok(log_level) = env::var("VRSHELL_LOG_LEVEL") {
            config.log_level = log_level;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ShellConfig = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        if config.homepage.trim().is_empty() {
            return Err(Error::configuration("homepage must not be empty"));
        }

        Ok(config)
    }

    /// Session settings new non-private sessions start from
    pub fn default_settings(&self) -> SessionSettings {
        SessionSettings {
            multiprocess: self.multiprocess,
            tracking_protection: self.tracking_protection,
            private_mode: false,
            user_agent_mode: self.user_agent_mode,
            user_agent_override: None,
            alternate_engine: self.alternate_engine,
            viewport_mode: match self.user_agent_mode {
                UserAgentMode::Desktop => ViewportMode::Desktop,
                _ => ViewportMode::Mobile,
            },
            suspend_media_when_inactive: true,
            back_policy: self.back_policy,
        }
    }

    /// Whether the configured homepage is the one shipped with the shell
    pub fn uses_default_homepage(&self) -> bool {
        self.homepage == DEFAULT_HOMEPAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ShellConfig::default();
        assert!(config.uses_default_homepage());
        assert!(config.multiprocess);
        assert_eq!(config.back_policy, BackPolicy::ExitFullScreenFirst);
    }

    #[test]
    fn test_partial_toml() {
        let config = ShellConfig::from_toml(
            r#"
            homepage = "https://start.example.org/"
            back_policy = "history_only"
            "#,
        )
        .unwrap();

        assert_eq!(config.homepage, "https://start.example.org/");
        assert_eq!(config.back_policy, BackPolicy::HistoryOnly);
        assert!(config.tracking_protection);
        assert!(!config.uses_default_homepage());
    }

    #[test]
    fn test_user_agent_overrides_table() {
        let config = ShellConfig::from_toml(
            r#"
            [user_agent_overrides]
            "example.com" = "Desktop/1.0"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.user_agent_overrides.get("example.com").map(String::as_str),
            Some("Desktop/1.0")
        );
        assert!(ShellConfig::default().user_agent_overrides.is_empty());
    }

    #[test]
    fn test_empty_homepage_rejected() {
        let result = ShellConfig::from_toml(r#"homepage = "  ""#);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_default_settings_follow_ua_mode() {
        let config = ShellConfig {
            user_agent_mode: UserAgentMode::Desktop,
            ..Default::default()
        };
        let settings = config.default_settings();
        assert_eq!(settings.viewport_mode, ViewportMode::Desktop);
        assert!(!settings.private_mode);
    }
}
