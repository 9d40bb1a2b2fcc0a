//! Client configuration management.
//!
//! This module handles loading and saving the client configuration: backend
//! base URL, auth endpoint paths, request timeout and the last used username.
//!
//! Configuration is stored at `~/.config/tokenrelay/config.json`. The
//! `TOKENRELAY_BASE_URL` environment variable overrides the stored base URL.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "tokenrelay";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Environment variable overriding `base_url`
pub const BASE_URL_ENV: &str = "TOKENRELAY_BASE_URL";

const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";
const DEFAULT_LOGIN_PATH: &str = "/auth/login";
const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";
const DEFAULT_LOGIN_ROUTE: &str = "/login";

/// HTTP request timeout in seconds.
/// Exceeding it is reported exactly like a dropped connection.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub login_path: String,
    pub refresh_path: String,
    /// Where observers should send the user once the session is invalidated
    pub login_route: String,
    pub timeout_secs: u64,
    /// Serialize concurrent refreshes so one 401 storm costs one refresh call
    pub dedupe_refresh: bool,
    pub last_username: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            dedupe_refresh: false,
            last_username: None,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = url;
            }
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn session_path(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(SESSION_FILE))
    }

    /// Login and refresh calls must never trigger session recovery.
    pub fn is_auth_endpoint(&self, route: &str) -> bool {
        let route = route.trim_end_matches('/');
        [&self.login_path, &self.refresh_path]
            .iter()
            .map(|p| p.trim_end_matches('/'))
            // A blank path would match every route and disable recovery
            .filter(|p| !p.is_empty())
            .any(|p| route.ends_with(p))
    }

    /// Join a request path onto the base URL. Absolute URLs pass through.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url":"https://api.example.com","dedupe_refresh":true}"#)
                .unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert!(config.dedupe_refresh);
        assert_eq!(config.login_path, "/auth/login");
        assert_eq!(config.refresh_path, "/auth/refresh");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_is_auth_endpoint() {
        let config = ClientConfig::new("https://api.example.com");
        assert!(config.is_auth_endpoint("/auth/login"));
        assert!(config.is_auth_endpoint("/auth/refresh/"));
        assert!(config.is_auth_endpoint("/v1/auth/refresh"));
        assert!(!config.is_auth_endpoint("/auth/logout"));
        assert!(!config.is_auth_endpoint("/users/me"));
    }

    #[test]
    fn test_blank_auth_paths_match_nothing() {
        let mut config = ClientConfig::new("https://api.example.com");
        config.login_path = String::new();
        config.refresh_path = "/".to_string();
        assert!(!config.is_auth_endpoint("/users/me"));
        assert!(!config.is_auth_endpoint("/"));
        assert!(!config.is_auth_endpoint("/auth/login"));
    }

    #[test]
    fn test_url_for() {
        let config = ClientConfig::new("https://api.example.com/v1/");
        assert_eq!(config.url_for("/users"), "https://api.example.com/v1/users");
        assert_eq!(config.url_for("users"), "https://api.example.com/v1/users");
        assert_eq!(config.url_for("https://cdn.example.com/x"), "https://cdn.example.com/x");
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("tokenrelay-config-test-missing.json");
        let _ = std::fs::remove_file(&path);
        let config = ClientConfig::load_from(&path).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let path = std::env::temp_dir()
            .join(format!("tokenrelay-config-test-{}", std::process::id()))
            .join(CONFIG_FILE);
        let mut config = ClientConfig::new("https://api.example.com");
        config.last_username = Some("ada".to_string());
        config.save_to(&path).unwrap();

        let loaded = ClientConfig::load_from(&path).unwrap();
        assert_eq!(loaded.last_username.as_deref(), Some("ada"));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
