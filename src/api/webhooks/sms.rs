//! SMS webhook (SignalWire/LaML)
//!
//! Inbound texts arrive form-encoded. The reply goes back inline as LaML,
//! which the carrier sends as the outbound SMS.

use std::sync::Arc;

use axum::{
    Form,
    extract::{State, rejection::FormRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::api::ApiState;
use crate::reconciler::ReplyStyle;

/// Reply to the `STOP` keyword
pub const OPT_OUT_NOTICE: &str = "You’re opted out. Reply START to opt back in.";

/// Reply to the `HELP` and `INFO` keywords
pub const HELP_NOTICE: &str = "AI SMS bot. Text questions to chat. Reply STOP to opt out.";

/// Replies are cut to this many characters
pub const MAX_REPLY_CHARS: usize = 600;

/// System prompt for SMS conversations
pub const SMS_SYSTEM_PROMPT: &str =
    "You are a concise, helpful SMS assistant. Keep replies under 600 characters.";

/// Reply sent when the completion service fails
pub const SMS_FALLBACK_REPLY: &str = "Sorry—had an issue generating a reply. Try again.";

const SMS_STYLE: ReplyStyle<'static> = ReplyStyle {
    system_prompt: SMS_SYSTEM_PROMPT,
    fallback: SMS_FALLBACK_REPLY,
};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Form fields posted by the carrier
#[derive(Debug, Default, Deserialize)]
pub struct SmsForm {
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "MessageSid", default)]
    pub message_sid: Option<String>,
}

/// Compliance keyword carried by an inbound text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Stop,
    Help,
}

impl Keyword {
    /// Match a whole message against the compliance keywords
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        match body.trim().to_uppercase().as_str() {
            "STOP" => Some(Self::Stop),
            "HELP" | "INFO" => Some(Self::Help),
            _ => None,
        }
    }

    #[must_use]
    pub const fn notice(self) -> &'static str {
        match self {
            Self::Stop => OPT_OUT_NOTICE,
            Self::Help => HELP_NOTICE,
        }
    }
}

/// Escape text for an XML element body
#[must_use]
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// LaML document that sends `text` as the reply
#[must_use]
pub fn message_document(text: &str) -> String {
    format!(
        "{XML_DECLARATION}<Response><Message>{}</Message></Response>",
        escape_xml(text)
    )
}

/// LaML document that sends nothing
#[must_use]
pub fn empty_document() -> String {
    format!("{XML_DECLARATION}<Response/>")
}

fn xml(document: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        document,
    )
        .into_response()
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Handle an inbound SMS
pub async fn handle_sms(
    State(state): State<Arc<ApiState>>,
    form: std::result::Result<Form<SmsForm>, FormRejection>,
) -> Response {
    let form = match form {
        Ok(Form(form)) => form,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable SMS webhook");
            return xml(empty_document());
        }
    };

    let body = form.body.trim();

    if let Some(keyword) = Keyword::parse(body) {
        tracing::info!(from = %form.from, ?keyword, "SMS compliance keyword");
        return xml(message_document(keyword.notice()));
    }

    if let Some(sid) = form.message_sid.as_deref() {
        if !state.sms_dedup.insert(sid) {
            tracing::debug!(message_sid = sid, "duplicate SMS");
            return xml(empty_document());
        }
    }

    if body.is_empty() {
        return xml(empty_document());
    }

    let user_id = format!("sms:{}", form.from);
    let reply = state
        .reconciler
        .generate_reply_as(&user_id, body, SMS_STYLE)
        .await;

    xml(message_document(truncate_chars(&reply.text, MAX_REPLY_CHARS)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_match_whole_message_only() {
        assert_eq!(Keyword::parse("stop"), Some(Keyword::Stop));
        assert_eq!(Keyword::parse("  Help "), Some(Keyword::Help));
        assert_eq!(Keyword::parse("info"), Some(Keyword::Help));
        assert_eq!(Keyword::parse("please stop"), None);
        assert_eq!(Keyword::parse(""), None);
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_xml(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &apos;Jerry&apos;&lt;/b&gt;"
        );
    }

    #[test]
    fn document_wraps_message() {
        assert_eq!(
            message_document("a<b"),
            format!("{XML_DECLARATION}<Response><Message>a&lt;b</Message></Response>")
        );
        assert!(empty_document().ends_with("<Response/>"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
