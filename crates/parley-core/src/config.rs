use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};

/// Top-level configuration for parley.
///
/// Loaded from `~/.parley/config.toml` by default. Each section corresponds
/// to one component of the conversation widget.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ParleyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the local SQLite record store.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.parley/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Conversation service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL; `/api/chat/...` paths are appended to it.
    pub base_url: String,
    /// Per-request timeout in seconds. 0 disables the client-side timeout.
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Message exchange and history behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Contextual tag string sent with every message to steer the reply.
    pub tags_text: Option<String>,
    /// Start an ephemeral conversation without loading history.
    pub skip_history: bool,
    /// Opening assistant message seeded when history is skipped.
    pub opening_message: Option<String>,
    /// Status texts rotated while a send is in flight.
    pub status_messages: Vec<String>,
    /// Rotation period of the status ticker in milliseconds.
    pub status_interval_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            tags_text: None,
            skip_history: false,
            opening_message: None,
            status_messages: vec![
                "Thinking...".to_string(),
                "Looking through your data...".to_string(),
                "Putting an answer together...".to_string(),
            ],
            status_interval_ms: 1500,
        }
    }
}

/// Where the durable local user record lives.
///
/// Both lists are tried in order and the first hit wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Record keys holding the serialized user profile.
    pub record_keys: Vec<String>,
    /// Field names carrying the identifier inside the profile.
    pub id_fields: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            record_keys: vec!["user".to_string(), "currentUser".to_string()],
            id_fields: vec!["id".to_string(), "_id".to_string()],
        }
    }
}

/// Speech-to-text input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Whether voice input may be activated at all.
    pub enabled: bool,
    /// Recognition locale, fixed to the conversation's working language.
    pub locale: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            locale: "en-US".to_string(),
        }
    }
}

/// Local persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Prefix of the per-identity session record key.
    pub session_key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            session_key_prefix: "chatId_".to_string(),
        }
    }
}
