//! History compaction into the rolling summary
//!
//! When a history grows past the threshold, the most recent non-system
//! turns are summarized by the completion service and appended to the
//! summary. The history is then cut back to its leading system turn(s).

use super::MemoryCompactor;
use crate::db::Turn;

/// Instruction sent to the summarizer
pub const COMPACTION_PROMPT: &str = "Create a bullet-point summary of the conversation below. \
Capture user preferences, facts about the user, and important context. \
Keep it under 150 words.";

const SUMMARY_TEMPERATURE: f32 = 0.3;
const SUMMARY_MAX_TOKENS: u32 = 250;

/// Result of a compaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compaction {
    /// Leading system turn(s) of the original history
    pub history: Vec<Turn>,
    /// Previous summary, extended when summarization succeeded
    pub summary: String,
    /// Number of turns removed from the history
    pub turns_removed: usize,
    /// Whether the summarizer produced new text
    pub summarized: bool,
}

impl MemoryCompactor {
    /// Fold aged history into the summary
    ///
    /// The history is always truncated, even when summarization fails; in
    /// that case the summary comes back unchanged.
    pub async fn compact(&self, history: &[Turn], summary: &str) -> Compaction {
        let kept: Vec<Turn> = history.iter().take_while(|t| t.is_system()).cloned().collect();

        let non_system: Vec<&Turn> = history.iter().filter(|t| !t.is_system()).collect();
        let start = non_system
            .len()
            .saturating_sub(self.config.summary_source_turns);
        let recent = &non_system[start..];

        let new_summary = if recent.is_empty() {
            None
        } else {
            self.summarize(recent).await
        };

        let turns_removed = history.len() - kept.len();
        let summarized = new_summary.is_some();
        let summary = match new_summary {
            Some(text) if summary.trim().is_empty() => text,
            Some(text) => format!("{summary}\n\n{text}"),
            None => summary.to_string(),
        };

        tracing::info!(
            turns_removed,
            summarized,
            summary_tokens = super::estimate_tokens(&summary),
            "compacted conversation"
        );

        Compaction {
            history: kept,
            summary,
            turns_removed,
            summarized,
        }
    }

    async fn summarize(&self, turns: &[&Turn]) -> Option<String> {
        let transcript = turns
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n");

        let request = [Turn::system(COMPACTION_PROMPT), Turn::user(transcript)];

        match self
            .completion
            .complete(&request, SUMMARY_TEMPERATURE, SUMMARY_MAX_TOKENS)
            .await
        {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                tracing::warn!("summarizer returned empty text");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "summarization failed, keeping previous summary");
                None
            }
        }
    }
}
