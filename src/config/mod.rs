//! Configuration management for the relay

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::llm::DEFAULT_BASE_URL;
use crate::memory::MemoryConfig;
use crate::reconciler::DEFAULT_FETCH_LIMIT;
use crate::reconciler::dedup::DEFAULT_CAPACITY;
use crate::{Error, Result};

use self::file::RelayConfigFile;

/// Default completion model
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5000;

/// Relay configuration
#[derive(Debug)]
pub struct Config {
    /// Completion service
    pub llm: LlmConfig,

    /// `GroupMe` bot and polling
    pub groupme: GroupMeConfig,

    /// Context building and compaction
    pub memory: MemoryConfig,

    /// HTTP server and storage
    pub server: ServerConfig,
}

/// Completion service configuration
#[derive(Debug)]
pub struct LlmConfig {
    /// Without a key every completion fails and the fallback reply is sent
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
}

/// `GroupMe` configuration
#[derive(Debug)]
pub struct GroupMeConfig {
    /// Needed to post replies
    pub bot_id: Option<SecretString>,
    /// Needed to poll
    pub access_token: Option<SecretString>,
    /// Needed to poll
    pub group_id: Option<String>,
    pub poll_interval: Duration,
    pub fetch_limit: usize,
}

impl GroupMeConfig {
    /// Whether both polling credentials are present
    #[must_use]
    pub const fn can_poll(&self) -> bool {
        self.access_token.is_some() && self.group_id.is_some()
    }
}

/// HTTP server and storage configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub dedup_capacity: usize,
}

/// Default database location (`~/.local/share/chat-relay/relay.db` on Linux)
#[must_use]
pub fn default_db_path() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("chat-relay"))
        .join("relay.db")
}

/// Split a comma-separated list, dropping blanks
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a setting is out of range
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(|key| std::env::var(key).ok(), fc)
    }

    /// Build configuration from an environment lookup and a parsed file
    ///
    /// # Errors
    ///
    /// Returns error if a setting is out of range
    pub fn from_sources<F>(env: F, fc: RelayConfigFile) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_parse = |key: &str| env(key).and_then(|s| s.trim().parse::<u64>().ok());
        let env_usize = |key: &str| env(key).and_then(|s| s.trim().parse::<usize>().ok());

        // Completion (env > toml > default)
        let llm = LlmConfig {
            api_key: env("OPENAI_API_KEY")
                .or(fc.llm.api_key)
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            base_url: env("OPENAI_BASE_URL")
                .or(fc.llm.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: env("RELAY_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };

        // GroupMe (env > toml > None)
        let poll_secs = env_parse("RELAY_POLL_INTERVAL")
            .or(fc.groupme.poll_interval)
            .unwrap_or(10);
        if poll_secs == 0 {
            return Err(Error::Config(
                "poll interval must be at least 1 second".to_string(),
            ));
        }

        let groupme = GroupMeConfig {
            bot_id: env("GROUPME_BOT_ID")
                .or(fc.groupme.bot_id)
                .filter(|v| !v.is_empty())
                .map(SecretString::from),
            access_token: env("GROUPME_ACCESS_TOKEN")
                .or(fc.groupme.access_token)
                .filter(|v| !v.is_empty())
                .map(SecretString::from),
            group_id: env("GROUPME_GROUP_ID")
                .or(fc.groupme.group_id)
                .filter(|v| !v.is_empty()),
            poll_interval: Duration::from_secs(poll_secs),
            fetch_limit: fc.groupme.fetch_limit.unwrap_or(DEFAULT_FETCH_LIMIT),
        };

        // Memory (env > toml > default)
        let defaults = MemoryConfig::default();
        let memory = MemoryConfig {
            system_prompt: fc.memory.system_prompt.unwrap_or(defaults.system_prompt),
            max_history: env_usize("RELAY_MAX_HISTORY")
                .or(fc.memory.max_history)
                .unwrap_or(defaults.max_history),
            short_term_window: env_usize("RELAY_SHORT_TERM_WINDOW")
                .or(fc.memory.short_term_window)
                .unwrap_or(defaults.short_term_window),
            memory_keywords: env("RELAY_MEMORY_KEYWORDS")
                .map(|raw| parse_list(&raw))
                .or(fc.memory.keywords)
                .unwrap_or(defaults.memory_keywords),
            memory_token_budget: fc
                .memory
                .memory_token_budget
                .unwrap_or(defaults.memory_token_budget),
            max_context_tokens: env_usize("RELAY_MAX_CONTEXT_TOKENS")
                .or(fc.memory.max_context_tokens)
                .unwrap_or(defaults.max_context_tokens),
            summary_source_turns: defaults.summary_source_turns,
        };

        if memory.max_history == 0 {
            return Err(Error::Config("max history must be at least 1".to_string()));
        }

        // Server (env > toml > default)
        let server = ServerConfig {
            port: env("RELAY_PORT")
                .or_else(|| env("PORT"))
                .and_then(|s| s.trim().parse().ok())
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            db_path: env("RELAY_DB_PATH")
                .or(fc.server.db_path)
                .map_or_else(default_db_path, PathBuf::from),
            dedup_capacity: env_usize("RELAY_DEDUP_CAPACITY")
                .or(fc.server.dedup_capacity)
                .unwrap_or(DEFAULT_CAPACITY),
        };

        if !groupme.can_poll() {
            tracing::debug!("GroupMe polling credentials incomplete");
        }

        Ok(Self {
            llm,
            groupme,
            memory,
            server,
        })
    }
}
