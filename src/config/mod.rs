//! Configuration and credential storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{StoredToken, TokenStore};

const DEFAULT_BACKEND_URL: &str = "https://backend-production-d019d.up.railway.app/api";
const DEFAULT_SOCKET_URL: &str = "wss://backend-production-d019d.up.railway.app";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Application configuration
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST base, e.g. `https://host/api`
    pub backend_url: String,
    /// WebSocket base, e.g. `wss://host`
    pub socket_url: String,
    /// Web API key of the Firebase project (identity provider)
    pub firebase_api_key: Option<String>,
    /// Signed-in user's Firebase uid
    pub user_id: Option<String>,
    pub email: Option<String>,
    /// Firebase ID token
    pub id_token: Option<StoredToken>,
    pub refresh_token: Option<String>,
    /// Put the sender id in `?token=` on the socket URL (old server contract)
    pub legacy_token_query: bool,
    /// Applies to REST calls and the WebSocket handshake
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            firebase_api_key: None,
            user_id: None,
            email: None,
            id_token: None,
            refresh_token: None,
            legacy_token_query: false,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("kz", "umit", "umit-chat")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk, then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path).context("Failed to read config file")?;
            Self::parse(&content)?
        } else {
            Self::default()
        };

        config.apply_overrides(
            std::env::var("UMIT_BACKEND_URL").ok(),
            std::env::var("UMIT_SOCKET_URL").ok(),
        );
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    fn apply_overrides(&mut self, backend_url: Option<String>, socket_url: Option<String>) {
        if let Some(url) = backend_url.filter(|u| !u.is_empty()) {
            tracing::debug!("Backend URL overridden: {}", url);
            self.backend_url = url;
        }
        if let Some(url) = socket_url.filter(|u| !u.is_empty()) {
            tracing::debug!("Socket URL overridden: {}", url);
            self.socket_url = url;
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Signed-in user id, or an error telling the user to log in.
    pub fn require_user_id(&self) -> Result<String> {
        self.user_id
            .clone()
            .context("Not logged in. Run 'umit-chat login' first.")
    }
}

impl TokenStore for Config {
    fn get_id_token(&self) -> Option<StoredToken> {
        self.id_token.clone()
    }

    fn set_id_token(&mut self, token: String, expires_in: Option<u64>) {
        self.id_token = Some(StoredToken::new(token, expires_in));
    }

    fn get_refresh_token(&self) -> Option<String> {
        self.refresh_token.clone()
    }

    fn set_refresh_token(&mut self, token: String) {
        self.refresh_token = Some(token);
    }

    fn clear_tokens(&mut self) {
        self.id_token = None;
        self.refresh_token = None;
        self.user_id = None;
        self.email = None;
    }
}
