//! Conversation memory: bounded context assembly and history compaction
//!
//! Combines:
//! - Recent raw turns (short-term memory)
//! - The rolling summary (long-term memory), included when the message
//!   asks for it or on a periodic schedule
//! - Compaction that folds aged turns into the summary

mod builder;
mod compaction;
mod extract;

use std::sync::Arc;

pub use builder::BuiltContext;
pub use compaction::{COMPACTION_PROMPT, Compaction};
pub use extract::{condense, estimate_tokens, truncate_to_budget};

use crate::llm::CompletionClient;

/// Default system prompt for the relay persona
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant responding in a GroupMe chat.";

/// Keywords that pull the summary into context by default
pub const DEFAULT_MEMORY_KEYWORDS: &[&str] = &[
    "remember",
    "recall",
    "earlier",
    "last time",
    "you said",
    "i told you",
    "my name",
    "about me",
    "prefer",
];

/// Configuration for context building and compaction
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Leading system turn inserted when a conversation has none
    pub system_prompt: String,
    /// Compact once history grows past this many turns
    pub max_history: usize,
    /// Raw turns sent alongside a memory turn; one more pair without it
    pub short_term_window: usize,
    /// Lowercase substrings that mark a message as needing long-term memory
    pub memory_keywords: Vec<String>,
    /// Token budget for the memory extract
    pub memory_token_budget: usize,
    /// Context size that triggers a warning (never enforced)
    pub max_context_tokens: usize,
    /// Most recent non-system turns fed to the summarizer
    pub summary_source_turns: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_history: 20,
            short_term_window: 4,
            memory_keywords: DEFAULT_MEMORY_KEYWORDS
                .iter()
                .map(ToString::to_string)
                .collect(),
            memory_token_budget: 200,
            max_context_tokens: 3000,
            summary_source_turns: 10,
        }
    }
}

/// Builds bounded context and compacts history into the summary
pub struct MemoryCompactor {
    config: MemoryConfig,
    completion: Arc<dyn CompletionClient>,
}

impl MemoryCompactor {
    /// Create a new compactor
    #[must_use]
    pub fn new(config: MemoryConfig, completion: Arc<dyn CompletionClient>) -> Self {
        let memory_keywords = config
            .memory_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        Self {
            config: MemoryConfig {
                memory_keywords,
                ..config
            },
            completion,
        }
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Whether the message mentions a memory trigger keyword
    #[must_use]
    pub fn needs_memory(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.config
            .memory_keywords
            .iter()
            .any(|k| lower.contains(k.as_str()))
    }

    /// Check if compaction is needed based on history length
    #[must_use]
    pub const fn needs_compaction(&self, history_len: usize) -> bool {
        history_len > self.config.max_history
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::StubCompletion;
    use super::*;

    fn compactor() -> MemoryCompactor {
        MemoryCompactor::new(
            MemoryConfig::default(),
            Arc::new(StubCompletion::replying("ok")),
        )
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let c = compactor();
        assert!(c.needs_memory("Do you REMEMBER my dog?"));
        assert!(c.needs_memory("what did You Said before"));
        assert!(!c.needs_memory("what's the weather"));
    }

    #[test]
    fn configured_keywords_are_normalized() {
        let c = MemoryCompactor::new(
            MemoryConfig {
                memory_keywords: vec!["  Birthday ".to_string(), String::new()],
                ..MemoryConfig::default()
            },
            Arc::new(StubCompletion::replying("ok")),
        );
        assert!(c.needs_memory("when is my birthday?"));
        assert!(!c.needs_memory("remember this"));
    }

    #[test]
    fn compaction_threshold_is_exclusive() {
        let c = compactor();
        assert!(!c.needs_compaction(20));
        assert!(c.needs_compaction(21));
    }
}
