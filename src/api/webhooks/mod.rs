//! Webhook endpoints for inbound messages

use std::sync::Arc;

use axum::{Router, routing::post};

use super::ApiState;

pub mod groupme;
pub mod sms;

/// Build webhooks router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/groupme", post(groupme::handle_push))
        .route("/sms", post(sms::handle_sms))
        .with_state(state)
}
