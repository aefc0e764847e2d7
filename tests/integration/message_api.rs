//! Integration tests for the HTTP message and account API.
//!
//! Covers validation, caller identification, history fetch, and the rule
//! that a persistence failure is reported to the caller with no push.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use livechat_proto::{ChatMessage, User, UserId};
use livechat_server::identity::InMemoryIdentityStore;
use livechat_server::server::{self, AppState, HttpOptions};
use livechat_server::store::{MessageStore, NewMessage, StoreError};
use reqwest::StatusCode;
use serde_json::json;

async fn start_with(state: AppState) -> (std::net::SocketAddr, String) {
    let (addr, _handle) =
        server::start_server_with_state("127.0.0.1:0", Arc::new(state), &HttpOptions::default())
            .await
            .expect("failed to start server");
    (addr, format!("http://{addr}"))
}

async fn create_user(http: &reqwest::Client, base: &str, name: &str) -> User {
    http.post(format!("{base}/api/users"))
        .json(&json!({ "fullName": name, "email": format!("{name}@example.com") }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// A store whose writes always fail.
struct BrokenStore;

#[async_trait]
impl MessageStore for BrokenStore {
    async fn create(&self, _message: NewMessage) -> Result<ChatMessage, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }

    async fn find_between(&self, _a: &UserId, _b: &UserId) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let (_addr, base) = start_with(AppState::in_memory()).await;
    let http = reqwest::Client::new();
    let alice = create_user(&http, &base, "alice").await;
    let bob = create_user(&http, &base, "bob").await;

    for body in [json!({}), json!({ "text": "" }), json!({ "text": "", "image": "" })] {
        let res = http
            .post(format!("{base}/api/messages/send/{}", bob.id))
            .header("x-user-id", alice.id.as_str())
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let err: serde_json::Value = res.json().await.unwrap();
        assert_eq!(err["message"], "Message cannot be empty");
    }
}

#[tokio::test]
async fn image_only_message_is_accepted() {
    let (_addr, base) = start_with(AppState::in_memory()).await;
    let http = reqwest::Client::new();
    let alice = create_user(&http, &base, "alice").await;
    let bob = create_user(&http, &base, "bob").await;

    let res = http
        .post(format!("{base}/api/messages/send/{}", bob.id))
        .header("x-user-id", alice.id.as_str())
        .json(&json!({ "image": "/uploads/1700000000-cat.png" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let msg: ChatMessage = res.json().await.unwrap();
    assert_eq!(msg.body.image(), Some("/uploads/1700000000-cat.png"));
    assert_eq!(msg.body.text(), None);
    assert_eq!(msg.sender_id, alice.id);
}

#[tokio::test]
async fn missing_or_unknown_caller_is_unauthorized() {
    let (_addr, base) = start_with(AppState::in_memory()).await;
    let http = reqwest::Client::new();
    let bob = create_user(&http, &base, "bob").await;

    let no_header = http
        .post(format!("{base}/api/messages/send/{}", bob.id))
        .json(&json!({ "text": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(no_header.status(), StatusCode::UNAUTHORIZED);

    let stranger = http
        .get(format!("{base}/api/messages/users"))
        .header("x-user-id", "not-a-user")
        .send()
        .await
        .unwrap();
    assert_eq!(stranger.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_receiver_is_not_found() {
    let (_addr, base) = start_with(AppState::in_memory()).await;
    let http = reqwest::Client::new();
    let alice = create_user(&http, &base, "alice").await;

    let res = http
        .post(format!("{base}/api/messages/send/nobody"))
        .header("x-user-id", alice.id.as_str())
        .json(&json!({ "text": "hello?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn persistence_failure_is_reported_and_not_pushed() {
    let identities = Arc::new(InMemoryIdentityStore::new());
    let state = AppState::new(Arc::new(BrokenStore), identities);
    let (addr, base) = start_with(state).await;
    let http = reqwest::Client::new();
    let alice = create_user(&http, &base, "alice").await;
    let bob = create_user(&http, &base, "bob").await;

    let url = format!("ws://{addr}/ws?userId={}", bob.id);
    let (mut ws_bob, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    // Own presence broadcast.
    ws_bob.next().await.unwrap().unwrap();

    let res = http
        .post(format!("{base}/api/messages/send/{}", bob.id))
        .header("x-user-id", alice.id.as_str())
        .json(&json!({ "text": "lost" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["message"], "Failed to send message");

    let next = tokio::time::timeout(Duration::from_millis(200), ws_bob.next()).await;
    assert!(next.is_err(), "no push expected after failed persistence");
}

#[tokio::test]
async fn sidebar_excludes_caller() {
    let (_addr, base) = start_with(AppState::in_memory()).await;
    let http = reqwest::Client::new();
    let alice = create_user(&http, &base, "alice").await;
    let bob = create_user(&http, &base, "bob").await;

    let users: Vec<User> = http
        .get(format!("{base}/api/messages/users"))
        .header("x-user-id", alice.id.as_str())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(users, vec![bob]);
}

#[tokio::test]
async fn history_is_chronological_in_both_directions() {
    let (_addr, base) = start_with(AppState::in_memory()).await;
    let http = reqwest::Client::new();
    let alice = create_user(&http, &base, "alice").await;
    let bob = create_user(&http, &base, "bob").await;

    for (from, to, text) in [
        (&alice, &bob, "one"),
        (&bob, &alice, "two"),
        (&alice, &bob, "three"),
    ] {
        let res = http
            .post(format!("{base}/api/messages/send/{}", to.id))
            .header("x-user-id", from.id.as_str())
            .json(&json!({ "text": text }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let history: Vec<ChatMessage> = http
        .get(format!("{base}/api/messages/{}", bob.id))
        .header("x-user-id", alice.id.as_str())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let texts: Vec<_> = history.iter().filter_map(|m| m.body.text()).collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn account_creation_and_profile_update() {
    let (_addr, base) = start_with(AppState::in_memory()).await;
    let http = reqwest::Client::new();

    let missing = http
        .post(format!("{base}/api/users"))
        .json(&json!({ "fullName": "", "email": "x@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let ada = create_user(&http, &base, "ada").await;
    let duplicate = http
        .post(format!("{base}/api/users"))
        .json(&json!({ "fullName": "Ada Again", "email": "ADA@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let updated: User = http
        .put(format!("{base}/api/users/profile"))
        .header("x-user-id", ada.id.as_str())
        .json(&json!({ "profilePic": "https://cdn.example/ada.png" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated.profile_pic, "https://cdn.example/ada.png");
}
