//! Room webhook integration tests.
//!
//! Covers authentication, size limits and the start/stop lifecycle through
//! the real router, with mock recording jobs.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use recording_server::auth::{BACKEND_HEADER, CHECKSUM_HEADER, RANDOM_HEADER};
use recording_server::config::Config;
use recording_server::jobs::{JobKey, MockBehavior, MockJobFactory};
use recording_server::models::{Actor, RecordingMode};
use recording_test_utils::{
    random_hex, start_request, start_request_with_status, stop_request, test_config_toml,
    TestRecordingServer, WebhookSigner, TEST_BACKEND_SECRET, TEST_BACKEND_URL,
};
use std::sync::Arc;
use std::time::Duration;

fn signer() -> WebhookSigner {
    WebhookSigner::new(TEST_BACKEND_URL, TEST_BACKEND_SECRET)
}

async fn spawn_with_behavior(
    behavior: MockBehavior,
) -> Result<TestRecordingServer, anyhow::Error> {
    let config = Config::from_toml_str(&test_config_toml())?;
    TestRecordingServer::spawn_with(config, Arc::new(MockJobFactory::new(behavior))).await
}

async fn wait_for_background_work(server: &TestRecordingServer) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.registry().background_tasks() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("background work should finish");
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_missing_headers_are_forbidden() -> Result<(), anyhow::Error> {
    let server = TestRecordingServer::spawn().await?;
    let body = start_request("admin", "users", "admin");

    let response = reqwest::Client::new()
        .post(server.room_url("abc"))
        .body(body.clone())
        .send()
        .await?;
    assert_eq!(response.status(), 403);

    // Backend header only
    let response = reqwest::Client::new()
        .post(server.room_url("abc"))
        .header(BACKEND_HEADER, TEST_BACKEND_URL)
        .body(body)
        .send()
        .await?;
    assert_eq!(response.status(), 403);

    assert_eq!(server.factory().created(), 0);

    Ok(())
}

#[tokio::test]
async fn test_unknown_backend_is_forbidden() -> Result<(), anyhow::Error> {
    let server = TestRecordingServer::spawn().await?;
    let signer = WebhookSigner::new("https://unknown.example.com", TEST_BACKEND_SECRET);

    let response = signer
        .post(&server.room_url("abc"), &start_request("admin", "users", "admin"))
        .await?;

    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "FORBIDDEN");
    assert_eq!(body["error"]["message"], "Forbidden");

    Ok(())
}

#[tokio::test]
async fn test_wrong_secret_is_forbidden() -> Result<(), anyhow::Error> {
    let server = TestRecordingServer::spawn().await?;
    let signer = WebhookSigner::new(TEST_BACKEND_URL, "not-the-secret");

    let response = signer
        .post(&server.room_url("abc"), &start_request("admin", "users", "admin"))
        .await?;

    assert_eq!(response.status(), 403);
    assert_eq!(server.factory().created(), 0);

    Ok(())
}

#[tokio::test]
async fn test_tampered_body_is_forbidden() -> Result<(), anyhow::Error> {
    let server = TestRecordingServer::spawn().await?;
    let signed_body = start_request("admin", "users", "admin");
    let sent_body = start_request("mallory", "users", "admin");

    let headers = signer().headers(&signed_body);
    let request = headers.into_iter().fold(
        reqwest::Client::new()
            .post(server.room_url("abc"))
            .body(sent_body),
        |request, (name, value)| request.header(name, value),
    );

    let response = request.send().await?;
    assert_eq!(response.status(), 403);

    Ok(())
}

#[tokio::test]
async fn test_backend_url_with_trailing_slash_is_accepted() -> Result<(), anyhow::Error> {
    let server = TestRecordingServer::spawn().await?;
    let signer = WebhookSigner::new(format!("{TEST_BACKEND_URL}/"), TEST_BACKEND_SECRET);

    let response = signer
        .post(&server.room_url("abc"), &start_request("admin", "users", "admin"))
        .await?;

    assert_eq!(response.status(), 200);

    Ok(())
}

// ============================================================================
// Body validation
// ============================================================================

#[tokio::test]
async fn test_oversized_body_is_bad_request() -> Result<(), anyhow::Error> {
    let server = TestRecordingServer::spawn().await?;
    let body = format!(
        r#"{{"type":"stop","stop":{{}},"padding":"{}"}}"#,
        "x".repeat(1100)
    );

    let response = signer().post(&server.room_url("abc"), &body).await?;

    assert_eq!(response.status(), 400);

    Ok(())
}

#[tokio::test]
async fn test_empty_body_is_bad_request() -> Result<(), anyhow::Error> {
    let server = TestRecordingServer::spawn().await?;

    let response = signer().post(&server.room_url("abc"), "").await?;

    assert_eq!(response.status(), 400);

    Ok(())
}

#[tokio::test]
async fn test_signed_invalid_json_is_bad_request() -> Result<(), anyhow::Error> {
    let server = TestRecordingServer::spawn().await?;

    for body in [
        "not json",
        r#"{"type":"pause"}"#,
        r#"{"type":"start","start":{"owner":"admin"}}"#,
    ] {
        let response = signer().post(&server.room_url("abc"), body).await?;
        assert_eq!(response.status(), 400, "body {body:?}");
    }

    assert_eq!(server.factory().created(), 0);

    Ok(())
}

#[tokio::test]
async fn test_unknown_status_is_bad_request() -> Result<(), anyhow::Error> {
    let server = TestRecordingServer::spawn().await?;

    let response = signer()
        .post(&server.room_url("abc"), &start_request_with_status("admin", 3))
        .await?;

    assert_eq!(response.status(), 400);
    assert_eq!(server.factory().created(), 0);

    Ok(())
}

#[tokio::test]
async fn test_wrong_checksum_is_forbidden() -> Result<(), anyhow::Error> {
    let server = TestRecordingServer::spawn().await?;
    let random = random_hex();
    let body = stop_request(None);

    let response = reqwest::Client::new()
        .post(server.room_url("abc"))
        .header(BACKEND_HEADER, TEST_BACKEND_URL)
        .header(RANDOM_HEADER, random)
        .header(CHECKSUM_HEADER, "0".repeat(64))
        .body(body)
        .send()
        .await?;

    assert_eq!(response.status(), 403);

    Ok(())
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_runs_job_once() -> Result<(), anyhow::Error> {
    let server = TestRecordingServer::spawn().await?;
    let body = start_request("admin", "users", "alice");

    let response = signer().post(&server.room_url("abc"), &body).await?;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await?, "{}");

    // Repeated start for the same room is a no-op.
    let response = signer().post(&server.room_url("abc"), &body).await?;
    assert_eq!(response.status(), 200);

    wait_for_background_work(&server).await;

    assert_eq!(server.factory().created(), 1);
    let job = server.factory().last().expect("job should be created");
    assert_eq!(job.start_calls(), 1);
    assert_eq!(job.start_actor(), Some(Actor::new("users", "alice")));
    assert_eq!(job.spec().owner, "admin");
    assert_eq!(job.spec().mode, RecordingMode::AudioAndVideo);
    assert!(
        server
            .registry()
            .is_running(&JobKey::new(TEST_BACKEND_URL, "abc"))
            .await
    );

    Ok(())
}

#[tokio::test]
async fn test_audio_only_start() -> Result<(), anyhow::Error> {
    let server = TestRecordingServer::spawn().await?;

    let response = signer()
        .post(&server.room_url("abc"), &start_request_with_status("admin", 2))
        .await?;
    assert_eq!(response.status(), 200);

    let job = server.factory().last().expect("job should be created");
    assert_eq!(job.spec().mode, RecordingMode::AudioOnly);

    Ok(())
}

#[tokio::test]
async fn test_start_then_stop_removes_job() -> Result<(), anyhow::Error> {
    let server = TestRecordingServer::spawn().await?;
    let key = JobKey::new(TEST_BACKEND_URL, "abc");

    let response = signer()
        .post(&server.room_url("abc"), &start_request("admin", "users", "alice"))
        .await?;
    assert_eq!(response.status(), 200);

    let response = signer()
        .post(&server.room_url("abc"), &stop_request(Some(("users", "bob"))))
        .await?;
    assert_eq!(response.status(), 200);

    wait_for_background_work(&server).await;

    assert!(!server.registry().is_running(&key).await);
    assert!(!server.registry().is_stopping(&key).await);

    let job = server.factory().last().expect("job should be created");
    assert_eq!(job.stop_calls(), 1);
    assert_eq!(job.stop_actor(), Some(Actor::new("users", "bob")));

    // The room can be recorded again afterwards.
    let response = signer()
        .post(&server.room_url("abc"), &start_request("admin", "users", "alice"))
        .await?;
    assert_eq!(response.status(), 200);
    assert_eq!(server.factory().created(), 2);

    Ok(())
}

#[tokio::test]
async fn test_stop_unknown_room_is_not_found() -> Result<(), anyhow::Error> {
    let server = TestRecordingServer::spawn().await?;

    let response = signer()
        .post(&server.room_url("never-started"), &stop_request(None))
        .await?;

    assert_eq!(response.status(), 404);

    Ok(())
}

#[tokio::test]
async fn test_requests_while_stopping_are_noops() -> Result<(), anyhow::Error> {
    let server = spawn_with_behavior(MockBehavior {
        hold_stop: true,
        ..MockBehavior::default()
    })
    .await?;
    let key = JobKey::new(TEST_BACKEND_URL, "abc");

    signer()
        .post(&server.room_url("abc"), &start_request("admin", "users", "alice"))
        .await?;
    let response = signer()
        .post(&server.room_url("abc"), &stop_request(None))
        .await?;
    assert_eq!(response.status(), 200);

    let job = server.factory().last().expect("job should be created");
    tokio::time::timeout(Duration::from_secs(5), job.wait_until_stopped()).await?;
    assert!(server.registry().is_stopping(&key).await);

    // Second stop and a new start are both accepted without effect.
    let response = signer()
        .post(&server.room_url("abc"), &stop_request(None))
        .await?;
    assert_eq!(response.status(), 200);
    let response = signer()
        .post(&server.room_url("abc"), &start_request("admin", "users", "alice"))
        .await?;
    assert_eq!(response.status(), 200);

    assert_eq!(server.factory().created(), 1);
    assert_eq!(job.stop_calls(), 1);

    job.release_stop();
    wait_for_background_work(&server).await;
    assert!(!server.registry().is_stopping(&key).await);

    Ok(())
}

#[tokio::test]
async fn test_stop_racing_held_start() -> Result<(), anyhow::Error> {
    let server = spawn_with_behavior(MockBehavior::held()).await?;
    let key = JobKey::new(TEST_BACKEND_URL, "abc");

    signer()
        .post(&server.room_url("abc"), &start_request("admin", "users", "alice"))
        .await?;
    let job = server.factory().last().expect("job should be created");
    tokio::time::timeout(Duration::from_secs(5), job.wait_until_started()).await?;

    let response = signer()
        .post(&server.room_url("abc"), &stop_request(None))
        .await?;
    assert_eq!(response.status(), 200);

    wait_for_background_work(&server).await;

    assert!(!server.registry().is_running(&key).await);
    assert!(!server.registry().is_stopping(&key).await);
    assert_eq!(job.start_calls(), 1);
    assert_eq!(job.stop_calls(), 1);

    Ok(())
}

#[tokio::test]
async fn test_failed_start_allows_new_start() -> Result<(), anyhow::Error> {
    let server = spawn_with_behavior(MockBehavior::failing_start()).await?;
    let key = JobKey::new(TEST_BACKEND_URL, "abc");

    let response = signer()
        .post(&server.room_url("abc"), &start_request("admin", "users", "alice"))
        .await?;
    // The failure happens in the background, after the response.
    assert_eq!(response.status(), 200);

    wait_for_background_work(&server).await;
    assert!(!server.registry().is_running(&key).await);

    server.factory().set_behavior(MockBehavior::succeeding());
    signer()
        .post(&server.room_url("abc"), &start_request("admin", "users", "alice"))
        .await?;
    assert!(server.registry().is_running(&key).await);
    assert_eq!(server.factory().created(), 2);

    Ok(())
}

#[tokio::test]
async fn test_rooms_are_independent() -> Result<(), anyhow::Error> {
    let server = TestRecordingServer::spawn().await?;

    for token in ["room1", "room2"] {
        let response = signer()
            .post(&server.room_url(token), &start_request("admin", "users", "alice"))
            .await?;
        assert_eq!(response.status(), 200);
    }

    let response = signer()
        .post(&server.room_url("room1"), &stop_request(None))
        .await?;
    assert_eq!(response.status(), 200);

    wait_for_background_work(&server).await;

    assert!(
        !server
            .registry()
            .is_running(&JobKey::new(TEST_BACKEND_URL, "room1"))
            .await
    );
    assert!(
        server
            .registry()
            .is_running(&JobKey::new(TEST_BACKEND_URL, "room2"))
            .await
    );

    Ok(())
}
