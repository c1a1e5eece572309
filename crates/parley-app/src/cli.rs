//! CLI argument definitions for the parley terminal client.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use parley_core::config::ParleyConfig;

/// Parley - talk to a conversation service from the terminal.
#[derive(Parser, Debug, Default)]
#[command(name = "parley", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Explicit user identity. Overrides the stored user record.
    #[arg(short = 'i', long = "identity")]
    pub identity: Option<String>,

    /// Base URL of the conversation service.
    #[arg(short = 'u', long = "base-url")]
    pub base_url: Option<String>,

    /// Contextual tag string sent with every message.
    #[arg(short = 't', long = "tags")]
    pub tags: Option<String>,

    /// Start a fresh conversation without loading history.
    #[arg(long = "skip-history")]
    pub skip_history: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PARLEY_CONFIG env var > ~/.parley/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("PARLEY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the service base URL.
    ///
    /// Priority: --base-url flag > PARLEY_BASE_URL env var > config file value.
    pub fn resolve_base_url(&self, config_url: &str) -> String {
        if let Some(ref url) = self.base_url {
            return url.clone();
        }
        if let Ok(url) = std::env::var("PARLEY_BASE_URL") {
            if !url.trim().is_empty() {
                return url;
            }
        }
        config_url.to_string()
    }

    /// Fold command-line overrides into the loaded configuration.
    pub fn apply(&self, config: &mut ParleyConfig) {
        config.service.base_url = self.resolve_base_url(&config.service.base_url);
        if let Some(ref tags) = self.tags {
            config.chat.tags_text = Some(tags.clone());
        }
        if self.skip_history {
            config.chat.skip_history = true;
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    PathBuf::from("config.toml")
}
