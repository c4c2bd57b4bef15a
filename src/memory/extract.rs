//! Memory extraction helpers

/// Marker appended when words were cut to fit a budget
const TRUNCATION_MARKER: &str = " ...";

/// Rough token estimate (~4 chars per token)
#[must_use]
pub const fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// First two sentences of `text`, split on `". "`
#[must_use]
pub fn condense(text: &str) -> String {
    text.split(". ").take(2).collect::<Vec<_>>().join(". ")
}

/// Greedily keep whole words while the estimate stays within `max_tokens`
///
/// Returns `text` unchanged when it already fits. Otherwise the text is cut
/// after the last word that fits, keeping the input's separators, and the
/// marker is appended, so the result may exceed the budget by at most the
/// marker's single token.
#[must_use]
pub fn truncate_to_budget(text: &str, max_tokens: usize) -> String {
    if estimate_tokens(text) <= max_tokens {
        return text.to_string();
    }

    // Byte offset just past the last word that fits
    let mut cut = 0;
    let mut in_word = false;
    for (idx, c) in text.char_indices() {
        if !c.is_whitespace() {
            in_word = true;
            continue;
        }
        if in_word {
            if estimate_tokens(&text[..idx]) > max_tokens {
                break;
            }
            cut = idx;
        }
        in_word = false;
    }

    if cut == 0 {
        return String::new();
    }
    format!("{}{TRUNCATION_MARKER}", &text[..cut])
}

impl super::MemoryCompactor {
    /// Pick the part of the summary worth sending with `message`
    ///
    /// Without a trigger keyword the first two sentences are preferred when
    /// they fit. Otherwise the whole summary is used, cut word by word to
    /// the budget.
    #[must_use]
    pub fn extract_relevant_memory(
        &self,
        summary: &str,
        message: &str,
        max_tokens: usize,
    ) -> String {
        let summary = summary.trim();
        if summary.is_empty() {
            return String::new();
        }

        if !self.needs_memory(message) {
            let condensed = condense(summary);
            if estimate_tokens(&condensed) <= max_tokens {
                return condensed;
            }
            return truncate_to_budget(&condensed, max_tokens);
        }

        truncate_to_budget(summary, max_tokens)
    }
}
