//! TOML configuration file loading
//!
//! Supports `~/.config/chat-relay/config.toml` (or `RELAY_CONFIG`) as a
//! persistent config source. All fields are optional; the file is a partial
//! overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct RelayConfigFile {
    /// Completion service configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// `GroupMe` bot and polling configuration
    #[serde(default)]
    pub groupme: GroupMeFileConfig,

    /// Conversation memory configuration
    #[serde(default)]
    pub memory: MemoryFileConfig,

    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Completion-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Model identifier (e.g. "gpt-4")
    pub model: Option<String>,
}

/// `GroupMe` configuration
#[derive(Debug, Default, Deserialize)]
pub struct GroupMeFileConfig {
    pub bot_id: Option<String>,
    pub access_token: Option<String>,
    pub group_id: Option<String>,
    /// Seconds between poll cycles
    pub poll_interval: Option<u64>,
    /// Messages requested per fetch
    pub fetch_limit: Option<usize>,
}

/// Memory configuration
#[derive(Debug, Default, Deserialize)]
pub struct MemoryFileConfig {
    pub system_prompt: Option<String>,
    pub max_history: Option<usize>,
    pub short_term_window: Option<usize>,
    pub keywords: Option<Vec<String>>,
    pub max_context_tokens: Option<usize>,
    pub memory_token_budget: Option<usize>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// HTTP port
    pub port: Option<u16>,
    /// `SQLite` database path
    pub db_path: Option<String>,
    /// Message ids remembered for deduplication
    pub dedup_capacity: Option<usize>,
}

/// Load the TOML config file from `RELAY_CONFIG` or the standard path
///
/// Returns `RelayConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> RelayConfigFile {
    let path = std::env::var("RELAY_CONFIG")
        .ok()
        .map(PathBuf::from)
        .or_else(config_file_path);

    let Some(path) = path else {
        return RelayConfigFile::default();
    };

    load_config_file_from(&path)
}

/// Load a TOML config file from an explicit path
pub fn load_config_file_from(path: &Path) -> RelayConfigFile {
    if !path.exists() {
        return RelayConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                RelayConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            RelayConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/chat-relay/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("chat-relay").join("config.toml"))
}
