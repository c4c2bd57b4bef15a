//! API endpoint integration tests

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use chat_relay::DedupCache;
use chat_relay::api::webhooks::sms::{
    HELP_NOTICE, SMS_FALLBACK_REPLY, SMS_SYSTEM_PROMPT, escape_xml,
};
use chat_relay::api::{self, ApiState};
use chat_relay::db::{ConversationRepo, Turn};
use tower::ServiceExt;

mod common;
use common::{MockCompletion, MockGateway, reconciler, setup_test_db};

struct Harness {
    router: axum::Router,
    completion: Arc<MockCompletion>,
    gateway: Arc<MockGateway>,
    db: chat_relay::DbPool,
}

/// Build a test API router
fn harness(reply: &str) -> Harness {
    harness_with(MockCompletion::replying(reply))
}

fn harness_with(completion: Arc<MockCompletion>) -> Harness {
    let db = setup_test_db();
    let gateway = MockGateway::new();

    let state = Arc::new(ApiState {
        db: db.clone(),
        reconciler: Arc::new(reconciler(&db, completion.clone(), gateway.clone())),
        sms_dedup: Arc::new(DedupCache::new(100)),
    });

    Harness {
        router: api::router(state),
        completion,
        gateway,
        db,
    }
}

async fn body_string(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn post_form(form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/sms")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

async fn wait_for_posts(gateway: &MockGateway, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while gateway.posts().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for background reply");
}

#[tokio::test]
async fn test_root_endpoint() {
    let h = harness("unused");

    let response = h
        .router
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "OK");
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = harness("unused");

    let response = h
        .router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_ready_endpoint() {
    let h = harness("unused");

    let response = h
        .router
        .oneshot(
            Request::builder()
                .uri("/ready")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["checks"]["database"]["status"], "ok");
}

#[tokio::test]
async fn test_groupme_push_acknowledged_and_answered() {
    let h = harness("hello back");

    let response = h
        .router
        .oneshot(post_json(
            "/groupme",
            r#"{"id":"11","group_id":"g","user_id":"u1","name":"Ann","text":"hello"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "OK");

    wait_for_posts(&h.gateway, 1).await;
    assert_eq!(h.gateway.posts(), vec!["hello back".to_string()]);
}

#[tokio::test]
async fn test_groupme_bot_message_ignored() {
    let h = harness("unused");

    let response = h
        .router
        .oneshot(post_json(
            "/groupme",
            r#"{"id":"12","group_id":"g","sender_type":"bot","text":"hello back"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "Ignoring bot message");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.completion.call_count(), 0);
}

#[tokio::test]
async fn test_groupme_malformed_payload_still_ok() {
    let h = harness("unused");

    let response = h
        .router
        .oneshot(post_json("/groupme", "this is not json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_groupme_webhook_under_api_prefix() {
    let h = harness("prefixed");

    let response = h
        .router
        .oneshot(post_json(
            "/api/webhooks/groupme",
            r#"{"id":"13","group_id":"g","user_id":"u1","text":"hi"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    wait_for_posts(&h.gateway, 1).await;
}

#[tokio::test]
async fn test_sms_stop_keyword() {
    let h = harness("unused");

    let response = h
        .router
        .oneshot(post_form("Body=%20Stop%20&From=%2B15550001&MessageSid=SM1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/xml"
    );
    let body = body_string(response).await;
    assert!(body.contains("opted out"));
    assert!(body.contains("<Response><Message>"));
    assert_eq!(h.completion.call_count(), 0);
}

#[tokio::test]
async fn test_sms_help_keyword() {
    let h = harness("unused");

    let response = h
        .router
        .oneshot(post_form("Body=info&From=%2B15550001"))
        .await
        .unwrap();

    let body = body_string(response).await;
    assert!(body.contains(&escape_xml(HELP_NOTICE)));
    assert_eq!(h.completion.call_count(), 0);
}

#[tokio::test]
async fn test_sms_reply_is_escaped_and_remembered() {
    let h = harness("use a < b & \"c\"");

    let response = h
        .router
        .oneshot(post_form("Body=compare+these&From=%2B15550001&MessageSid=SM2"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("<Message>use a &lt; b &amp; &quot;c&quot;</Message>"));

    let stored = ConversationRepo::new(h.db.clone())
        .load("sms:+15550001")
        .await;
    assert_eq!(stored.user_turns(), 1);
}

#[tokio::test]
async fn test_sms_duplicate_sid_gets_empty_response() {
    let h = harness("answer");

    let first = h
        .router
        .clone()
        .oneshot(post_form("Body=hello&From=%2B15550001&MessageSid=SM3"))
        .await
        .unwrap();
    assert!(body_string(first).await.contains("answer"));

    let second = h
        .router
        .oneshot(post_form("Body=hello&From=%2B15550001&MessageSid=SM3"))
        .await
        .unwrap();

    assert_eq!(second.status(), StatusCode::OK);
    assert!(body_string(second).await.ends_with("<Response/>"));
    assert_eq!(h.completion.call_count(), 1);
}

#[tokio::test]
async fn test_sms_uses_sms_persona() {
    let h = harness("hi there");

    let response = h
        .router
        .oneshot(post_form("Body=hello&From=%2B15551234&MessageSid=S1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let calls = h.completion.calls();
    assert_eq!(calls[0][0], Turn::system(SMS_SYSTEM_PROMPT));

    let stored = ConversationRepo::new(h.db.clone())
        .load("sms:+15551234")
        .await;
    assert_eq!(stored.history[0], Turn::system(SMS_SYSTEM_PROMPT));
}

#[tokio::test]
async fn test_sms_completion_failure_uses_sms_fallback() {
    let h = harness_with(MockCompletion::failing());

    let response = h
        .router
        .oneshot(post_form("Body=hello&From=%2B15551234&MessageSid=S2"))
        .await
        .unwrap();

    let body = body_string(response).await;
    assert!(body.contains(&escape_xml(SMS_FALLBACK_REPLY)));
}
