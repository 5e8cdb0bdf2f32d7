//! POST /api/webhooks/psp tests

#[path = "../common/mod.rs"]
mod common;
use common::*;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt;

const BODY: &str = r#"{"type":"invoice.confirmed","invoiceId":"inv_42"}"#;

fn webhook_request(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/webhooks/psp")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("psp-signature", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_valid_webhook_is_stored() {
    let state = test_state(InboxStore::in_memory(10), UNREACHABLE_URL);
    let app = test_app(state.clone());

    let signature = sign_body(BODY, TEST_SECRET, &now_timestamp());
    let response = app
        .oneshot(webhook_request(BODY, Some(&signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["backend"], "fallback");

    let id = json["id"].as_str().unwrap();
    assert!(id.starts_with("wh_"));

    let stored = state.inbox.get_by_id(id).await.expect("stored webhook");
    assert_eq!(stored.raw_body, BODY);
    assert_eq!(stored.content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn test_valid_webhook_reports_durable_backend() {
    let (store, kv) = durable_store(10).await;
    let app = test_app(test_state(store, UNREACHABLE_URL));

    let signature = sign_body(BODY, TEST_SECRET, &now_timestamp());
    let response = app
        .oneshot(webhook_request(BODY, Some(&signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["backend"], "durable");
    assert_eq!(kv.lock().unwrap().lists["test:webhooks:ids"].len(), 1);
}

#[tokio::test]
async fn test_durable_outage_still_accepts_webhook() {
    let state = test_state(broken_durable_store(10), UNREACHABLE_URL);
    let app = test_app(state.clone());

    let signature = sign_body(BODY, TEST_SECRET, &now_timestamp());
    let response = app
        .oneshot(webhook_request(BODY, Some(&signature)))
        .await
        .unwrap();

    // Storage trouble is not an auth failure.
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["backend"], "fallback");
    assert!(state.inbox.get_by_id(json["id"].as_str().unwrap()).await.is_some());
}

#[tokio::test]
async fn test_missing_signature_rejected() {
    let state = test_state(InboxStore::in_memory(10), UNREACHABLE_URL);
    let app = test_app(state.clone());

    let response = app.oneshot(webhook_request(BODY, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"], "missing psp-signature");
    assert!(state.inbox.list(10).await.is_empty());
}

#[tokio::test]
async fn test_invalid_signature_rejected_and_not_stored() {
    let state = test_state(InboxStore::in_memory(10), UNREACHABLE_URL);
    let app = test_app(state.clone());

    let signature = sign_body(BODY, "wrong_secret", &now_timestamp());
    let response = app
        .oneshot(webhook_request(BODY, Some(&signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid signature");
    assert!(state.inbox.list(10).await.is_empty());
}

#[tokio::test]
async fn test_signature_for_other_body_rejected() {
    let state = test_state(InboxStore::in_memory(10), UNREACHABLE_URL);
    let app = test_app(state.clone());

    let signature = sign_body(r#"{"type":"invoice.expired"}"#, TEST_SECRET, &now_timestamp());
    let response = app
        .oneshot(webhook_request(BODY, Some(&signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(state.inbox.list(10).await.is_empty());
}

#[tokio::test]
async fn test_garbage_signature_header_rejected() {
    let app = test_app(test_state(InboxStore::in_memory(10), UNREACHABLE_URL));

    let response = app
        .oneshot(webhook_request(BODY, Some("not-a-signature")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid signature");
}

#[tokio::test]
async fn test_unconfigured_secret_is_server_error() {
    let mut state = test_state(InboxStore::in_memory(10), UNREACHABLE_URL);
    state.webhook_secret = None;
    let app = test_app(state.clone());

    let signature = sign_body(BODY, TEST_SECRET, &now_timestamp());
    let response = app
        .oneshot(webhook_request(BODY, Some(&signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "webhook secret not configured");
    assert!(state.inbox.list(10).await.is_empty());
}

#[tokio::test]
async fn test_tolerance_window_when_configured() {
    let mut state = test_state(InboxStore::in_memory(10), UNREACHABLE_URL);
    state.webhook_tolerance_secs = Some(300);
    let app = test_app(state);

    let stale = (chrono::Utc::now().timestamp() - 3600).to_string();
    let response = app
        .clone()
        .oneshot(webhook_request(BODY, Some(&sign_body(BODY, TEST_SECRET, &stale))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(webhook_request(
            BODY,
            Some(&sign_body(BODY, TEST_SECRET, &now_timestamp())),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_old_timestamp_accepted_without_window() {
    let app = test_app(test_state(InboxStore::in_memory(10), UNREACHABLE_URL));

    let response = app
        .oneshot(webhook_request(BODY, Some(&sign_body(BODY, TEST_SECRET, "1600000000"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_non_utf8_body_rejected() {
    let state = test_state(InboxStore::in_memory(10), UNREACHABLE_URL);
    let app = test_app(state.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/psp")
        .header("psp-signature", sign_body("", TEST_SECRET, &now_timestamp()))
        .body(Body::from(vec![0xff, 0xfe, 0xfd]))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(state.inbox.list(10).await.is_empty());
}
