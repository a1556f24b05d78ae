mod common;

use axum::http::StatusCode;
use common::{body_json, entry_count, post_update, register_user, shared_state, users_state};
use futures_util::FutureExt;
use serde_json::json;
use std::time::Duration;
use tower::ServiceExt;
use worklog_server::{app, ingest};

#[tokio::test]
async fn missing_token_is_rejected_without_writing() {
    let state = users_state();
    register_user(&state, "alice");
    let router = app(state.clone());

    let response = router
        .oneshot(post_update(None, r#"{"message":"hello"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await["error"],
        "authentication token required"
    );
    assert_eq!(entry_count(&state), 0);
}

#[tokio::test]
async fn unknown_token_is_rejected_without_writing() {
    let state = users_state();
    register_user(&state, "alice");
    let router = app(state.clone());

    let response = router
        .oneshot(post_update(Some("not-a-token"), r#"{"message":"hello"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid token");
    assert_eq!(entry_count(&state), 0);
}

#[tokio::test]
async fn empty_message_is_rejected_regardless_of_tags() {
    let state = users_state();
    let token = register_user(&state, "alice").token.unwrap();
    let router = app(state.clone());

    for body in [
        r#"{"message":""}"#,
        r#"{"message":"","tags":["release"]}"#,
        r#"{"tags":["release"]}"#,
    ] {
        let response = router
            .clone()
            .oneshot(post_update(Some(&token), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(body_json(response).await["error"], "empty message");
    }
    assert_eq!(entry_count(&state), 0);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let state = users_state();
    let token = register_user(&state, "alice").token.unwrap();
    let router = app(state.clone());

    let response = router
        .oneshot(post_update(Some(&token), "{not json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad request");
    assert_eq!(entry_count(&state), 0);
}

#[tokio::test]
async fn auth_is_checked_before_body() {
    let state = users_state();
    let router = app(state);

    let response = router
        .oneshot(post_update(None, "{not json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn accepted_updates_get_increasing_ids() {
    let state = users_state();
    let token = register_user(&state, "alice").token.unwrap();
    let router = app(state.clone());

    let mut ids = Vec::new();
    for i in 0..5 {
        let body = json!({ "message": format!("update {i}") }).to_string();
        let response = router
            .clone()
            .oneshot(post_update(Some(&token), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let entry = body_json(response).await;
        assert_eq!(entry["username"], "ALICE");
        assert_eq!(entry["message"], format!("update {i}"));
        assert!(entry.get("tags").is_none(), "absent tags are omitted");
        ids.push(entry["id"].as_i64().unwrap());
    }

    assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids: {ids:?}");
    assert_eq!(entry_count(&state), 5);
}

#[tokio::test]
async fn tags_are_normalized_in_users_mode() {
    let state = users_state();
    let token = register_user(&state, "alice").token.unwrap();
    let router = app(state);

    let body = json!({ "message": "deploy", "tags": ["  foo bar ", "BAZ"] }).to_string();
    let response = router
        .oneshot(post_update(Some(&token), &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let entry = body_json(response).await;
    assert_eq!(entry["tags"], json!(["FOO_BAR", "BAZ"]));
}

#[tokio::test]
async fn shared_mode_accepts_the_secret_and_stores_ownerless_entries() {
    let state = shared_state("s3cret", true);
    let router = app(state.clone());

    let wrong = router
        .clone()
        .oneshot(post_update(Some("guess"), r#"{"message":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let response = router
        .oneshot(post_update(
            Some("s3cret"),
            r#"{"message":"hi","tags":["on call"]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let entry = body_json(response).await;
    assert!(entry.get("username").is_none());
    assert_eq!(entry["tags"], json!(["ON_CALL"]));
    assert_eq!(entry_count(&state), 1);
}

#[tokio::test]
async fn shared_mode_can_keep_tags_verbatim() {
    let state = shared_state("s3cret", false);
    let router = app(state);

    let response = router
        .oneshot(post_update(
            Some("s3cret"),
            r#"{"message":"hi","tags":["on call"]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["tags"], json!(["on call"]));
}

#[tokio::test]
async fn accepted_update_is_published_to_viewers() {
    let state = users_state();
    let token = register_user(&state, "alice").token.unwrap();
    let mut viewer = state.registry.register();
    let router = app(state);

    let response = router
        .oneshot(post_update(Some(&token), r#"{"message":"live"}"#))
        .await
        .unwrap();
    let posted = body_json(response).await;

    let received = tokio::time::timeout(Duration::from_secs(2), viewer.recv())
        .await
        .expect("viewer should receive the entry")
        .unwrap();
    assert_eq!(received.id, posted["id"].as_i64().unwrap());
    assert_eq!(received.message, "live");
}

#[tokio::test]
async fn abandoned_request_still_publishes_its_entry() {
    let state = shared_state("s3cret", true);
    let mut viewer = state.registry.register();

    // Polled once and dropped, as axum does when the peer goes away.
    let _ = ingest::submit(&state, Some("s3cret"), br#"{"message":"abandoned"}"#).now_or_never();

    let received = tokio::time::timeout(Duration::from_secs(2), viewer.recv())
        .await
        .expect("committed entry should still reach viewers")
        .unwrap();
    assert_eq!(received.message, "abandoned");
    assert_eq!(entry_count(&state), 1);
}

#[tokio::test]
async fn storage_failure_is_500_and_writes_nothing() {
    let state = shared_state("s3cret", true);
    let mut viewer = state.registry.register();
    state
        .pool
        .get()
        .unwrap()
        .execute_batch("ALTER TABLE log_entries RENAME TO log_entries_offline;")
        .unwrap();

    let response = app(state.clone())
        .oneshot(post_update(Some("s3cret"), r#"{"message":"hello"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "failed to insert update");

    state
        .pool
        .get()
        .unwrap()
        .execute_batch("ALTER TABLE log_entries_offline RENAME TO log_entries;")
        .unwrap();
    assert_eq!(entry_count(&state), 0);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), viewer.recv())
            .await
            .is_err(),
        "nothing is published for a failed append"
    );
}
