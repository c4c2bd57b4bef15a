//! `GroupMe` bot callback handler
//!
//! The platform only needs an acknowledgment, so every request gets
//! `200 OK` and the message is processed in a background task.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::StatusCode};

use crate::api::ApiState;
use crate::channels::GroupMePush;

/// Body returned for messages the relay will not answer
pub const IGNORED_BOT_BODY: &str = "Ignoring bot message";

/// Body returned for everything else
pub const ACK_BODY: &str = "OK";

/// Handle a bot callback
#[allow(clippy::unused_async)]
pub async fn handle_push(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let push: GroupMePush = match serde_json::from_slice(&body) {
        Ok(push) => push,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable GroupMe callback");
            return (StatusCode::OK, ACK_BODY);
        }
    };

    if push.is_bot() {
        return (StatusCode::OK, IGNORED_BOT_BODY);
    }

    tracing::debug!(
        message_id = ?push.id,
        group_id = ?push.group_id,
        sender = ?push.name,
        "received GroupMe callback"
    );

    let reconciler = state.reconciler.clone();
    tokio::spawn(async move {
        let outcome = reconciler.on_push(&push).await;
        tracing::debug!(message_id = ?push.id, ?outcome, "push handled");
    });

    (StatusCode::OK, ACK_BODY)
}
