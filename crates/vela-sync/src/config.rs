//! # Terminal Configuration
//!
//! Configuration for the sync engine, loaded from a TOML file.
//!
//! ## Configuration File Format
//! ```toml
//! # terminal.toml
//! [server]
//! url = "https://admin.example.com"
//!
//! [register]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! code = "SAA-AAA"
//!
//! [store]
//! id = 3
//!
//! [sync]
//! poll_interval_secs = 30
//! max_attempts = 10
//!
//! [realtime]
//! ping_interval_secs = 30
//! backoff_base_secs = 1
//! backoff_cap_secs = 60
//! max_reconnect_attempts = 10
//! ```
//!
//! Default location:
//! `~/.config/vela-pos/terminal.toml` (Linux),
//! `~/Library/Application Support/com.vela.pos/terminal.toml` (macOS).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// URL Normalisation
// =============================================================================

/// Normalises the admin server URL:
/// - strips trailing slashes
/// - strips a trailing `/api` segment
/// - ensures a scheme is present (https, or http for localhost)
pub fn normalize_server_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

// =============================================================================
// Sections
// =============================================================================

/// Admin server endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Base URL of the admin server.
    pub url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            url: String::new(),
        }
    }
}

/// Identity of this register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSettings {
    /// Server-issued register id, also the realtime channel key.
    pub id: String,

    /// Short code embedded in document numbers (e.g. `SAA-AAA`).
    pub code: String,
}

impl Default for RegisterSettings {
    fn default() -> Self {
        RegisterSettings {
            id: String::new(),
            code: String::new(),
        }
    }
}

/// The store this terminal belongs to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Server store id; scopes settings, tables and prefixes on pull.
    pub id: i64,
}

/// Timer-loop and retry settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Seconds between background sync cycles.
    pub poll_interval_secs: u64,

    /// Outbox items at or over this retry count are skipped with a warning.
    pub max_attempts: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            poll_interval_secs: 30,
            max_attempts: 10,
        }
    }
}

/// Realtime channel settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RealtimeSettings {
    /// Seconds between keepalive pings.
    pub ping_interval_secs: u64,

    /// First reconnect delay.
    pub backoff_base_secs: u64,

    /// Ceiling for the exponential reconnect delay.
    pub backoff_cap_secs: u64,

    /// Reconnect attempts before giving up until an explicit trigger.
    pub max_reconnect_attempts: u32,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        RealtimeSettings {
            ping_interval_secs: 30,
            backoff_base_secs: 1,
            backoff_cap_secs: 60,
            max_reconnect_attempts: 10,
        }
    }
}

// =============================================================================
// Terminal Config
// =============================================================================

/// Complete sync engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub server: ServerSettings,
    pub register: RegisterSettings,
    pub store: StoreSettings,
    pub sync: SyncSettings,
    pub realtime: RealtimeSettings,
}

impl TerminalConfig {
    /// Loads configuration from a TOML file, normalising the server URL.
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let path = config_path
            .or_else(Self::default_path)
            .ok_or_else(|| SyncError::ConfigLoadFailed("no config directory".into()))?;

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {e}", path.display())))?;

        let mut config: TerminalConfig = toml::from_str(&contents)?;
        config.server.url = normalize_server_url(&config.server.url);

        info!(path = %path.display(), "loaded terminal config");
        Ok(config)
    }

    /// Loads configuration, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        match Self::load(config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "using default terminal config");
                TerminalConfig::default()
            }
        }
    }

    /// Saves configuration to a TOML file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("no config directory".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .map_err(|e| SyncError::ConfigSaveFailed(format!("{}: {e}", path.display())))?;

        info!(path = %path.display(), "saved terminal config");
        Ok(())
    }

    /// Validates that the configuration is usable for sync.
    pub fn validate(&self) -> SyncResult<()> {
        if self.server.url.is_empty() {
            return Err(SyncError::InvalidConfig("server.url is empty".into()));
        }
        url::Url::parse(&self.server.url)
            .map_err(|e| SyncError::InvalidConfig(format!("server.url: {e}")))?;

        if self.register.id.is_empty() {
            return Err(SyncError::InvalidConfig("register.id is empty".into()));
        }
        if self.register.code.is_empty() {
            return Err(SyncError::InvalidConfig("register.code is empty".into()));
        }
        if self.sync.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.poll_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Default config file location (platform-specific).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "vela", "pos")
            .map(|dirs| dirs.config_dir().join("terminal.toml"))
    }

    /// The background cycle interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_interval_secs)
    }

    /// The realtime keepalive interval.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.realtime.ping_interval_secs)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
