//! Context assembly for a single completion request

use super::MemoryCompactor;
use super::extract::estimate_tokens;
use crate::db::Turn;

/// Prefix of the synthetic system turn carrying long-term memory
pub const MEMORY_TURN_PREFIX: &str = "Context about user: ";

/// Early conversations always get memory up to this many user turns
const EARLY_TURNS: usize = 3;

/// Memory is also included on every turn that is a multiple of this
const PERIODIC_EVERY: usize = 5;

/// Extra raw turns sent when no memory turn is present
const NO_MEMORY_BONUS: usize = 2;

/// Messages ready for a completion request
#[derive(Debug, Clone)]
pub struct BuiltContext {
    /// System turn, optional memory turn, raw window, then the new message
    pub messages: Vec<Turn>,
    /// Whether a memory turn was included
    pub used_memory: bool,
    /// Approximate token count
    pub estimated_tokens: usize,
}

impl MemoryCompactor {
    /// Whether the summary should ride along with this message
    ///
    /// `user_turns` counts the new message.
    #[must_use]
    pub fn should_include_memory(&self, summary: &str, message: &str, user_turns: usize) -> bool {
        if summary.trim().is_empty() {
            return false;
        }
        self.needs_memory(message) || user_turns <= EARLY_TURNS || user_turns % PERIODIC_EVERY == 0
    }

    /// Build the message list for a reply to `new_message`
    ///
    /// The history is read, never modified. Exceeding the token ceiling
    /// only logs.
    #[must_use]
    pub fn build_context(
        &self,
        history: &[Turn],
        summary: &str,
        new_message: &str,
    ) -> BuiltContext {
        let system = history
            .first()
            .filter(|t| t.is_system())
            .cloned()
            .unwrap_or_else(|| Turn::system(self.config.system_prompt.clone()));

        let mut messages = vec![system];

        let user_turns = history.iter().filter(|t| t.is_user()).count() + 1;
        let mut used_memory = false;
        if self.should_include_memory(summary, new_message, user_turns) {
            let extract =
                self.extract_relevant_memory(summary, new_message, self.config.memory_token_budget);
            if !extract.is_empty() {
                messages.push(Turn::system(format!("{MEMORY_TURN_PREFIX}{extract}")));
                used_memory = true;
            }
        }

        let window = if used_memory {
            self.config.short_term_window
        } else {
            self.config.short_term_window + NO_MEMORY_BONUS
        };

        let recent: Vec<&Turn> = history.iter().filter(|t| !t.is_system()).collect();
        let start = recent.len().saturating_sub(window);
        messages.extend(recent[start..].iter().map(|t| (*t).clone()));
        messages.push(Turn::user(new_message));

        let estimated_tokens = messages.iter().map(|t| estimate_tokens(&t.content)).sum();
        if estimated_tokens > self.config.max_context_tokens {
            tracing::warn!(
                estimated_tokens,
                ceiling = self.config.max_context_tokens,
                "context exceeds token ceiling"
            );
        }

        tracing::debug!(
            messages = messages.len(),
            used_memory,
            estimated_tokens,
            "built context"
        );

        BuiltContext {
            messages,
            used_memory,
            estimated_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::TurnRole;
    use crate::memory::MemoryConfig;
    use crate::memory::test_support::StubCompletion;

    fn compactor() -> MemoryCompactor {
        MemoryCompactor::new(
            MemoryConfig::default(),
            Arc::new(StubCompletion::replying("unused")),
        )
    }

    /// System turn followed by `pairs` user/assistant exchanges
    fn history(pairs: usize) -> Vec<Turn> {
        let mut h = vec![Turn::system("sys")];
        for i in 0..pairs {
            h.push(Turn::user(format!("question {i}")));
            h.push(Turn::assistant(format!("answer {i}")));
        }
        h
    }

    #[test]
    fn first_message_without_summary_has_no_memory() {
        let built = compactor().build_context(&[], "", "hello");

        assert!(!built.used_memory);
        assert_eq!(built.messages.len(), 2);
        assert_eq!(built.messages[0].role, TurnRole::System);
        assert_eq!(built.messages[0].content, crate::memory::DEFAULT_SYSTEM_PROMPT);
        assert_eq!(built.messages[1], Turn::user("hello"));
    }

    #[test]
    fn existing_system_turn_is_reused() {
        let built = compactor().build_context(&history(1), "", "next");
        assert_eq!(built.messages[0].content, "sys");
    }

    #[test]
    fn trigger_keyword_adds_memory_and_shrinks_window() {
        let built = compactor().build_context(
            &history(5),
            "prefers concise answers",
            "remember what I told you?",
        );

        assert!(built.used_memory);
        assert_eq!(built.messages[1].role, TurnRole::System);
        assert_eq!(
            built.messages[1].content,
            "Context about user: prefers concise answers"
        );
        // system + memory + 4 raw + new message
        assert_eq!(built.messages.len(), 7);
        assert_eq!(built.messages[2].content, "question 3");
    }

    #[test]
    fn without_memory_window_is_wider() {
        // 7th user turn: not early, not periodic, no keyword
        let built = compactor().build_context(&history(6), "likes tea", "what's new");

        assert!(!built.used_memory);
        // system + 6 raw + new message
        assert_eq!(built.messages.len(), 8);
        assert_eq!(built.messages[1].content, "question 3");
    }

    #[test]
    fn early_turns_include_memory() {
        let built = compactor().build_context(&history(2), "likes tea", "hi again");
        assert!(built.used_memory);
    }

    #[test]
    fn periodic_turns_include_memory() {
        // 4 prior user turns + new message = 5th
        let built = compactor().build_context(&history(4), "likes tea", "hi");
        assert!(built.used_memory);

        let built = compactor().build_context(&history(5), "likes tea", "hi");
        assert!(!built.used_memory);
    }

    #[test]
    fn empty_summary_never_adds_memory() {
        let built = compactor().build_context(&history(4), "", "remember me?");
        assert!(!built.used_memory);
        assert!(
            built
                .messages
                .iter()
                .all(|t| !t.content.starts_with(MEMORY_TURN_PREFIX))
        );
    }

    #[test]
    fn history_is_not_modified() {
        let h = history(3);
        let before = h.clone();
        let _ = compactor().build_context(&h, "s", "remember");
        assert_eq!(h, before);
    }

    #[test]
    fn oversized_context_is_still_returned() {
        let c = MemoryCompactor::new(
            MemoryConfig {
                max_context_tokens: 1,
                ..MemoryConfig::default()
            },
            Arc::new(StubCompletion::replying("unused")),
        );
        let built = c.build_context(&history(3), "", &"long ".repeat(100));

        assert!(built.estimated_tokens > 1);
        assert_eq!(built.messages.len(), 8);
    }
}
