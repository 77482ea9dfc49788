// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Read API client against a local stub of the remote service
//!
//! The stub accepts submissions on the analyze path and serves a scripted
//! sequence of operation statuses on the results path.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use fabstir_ocr_node::vision::read_api::{
    ANALYZE_PATH, OPERATION_LOCATION_HEADER, SUBSCRIPTION_KEY_HEADER,
};
use fabstir_ocr_node::vision::{OcrError, ReadApiClient, ReadApiConfig, TextRecognizer};
use image::{DynamicImage, Rgb, RgbImage};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const API_KEY: &str = "stub-key";

struct Stub {
    base_url: String,
    failing_submits: usize,
    failing_polls: usize,
    submits: AtomicUsize,
    polls: AtomicUsize,
    script: Vec<Value>,
}

fn running() -> Value {
    json!({ "status": "running" })
}

fn succeeded() -> Value {
    json!({
        "status": "succeeded",
        "analyzeResult": {
            "readResults": [
                { "page": 2, "lines": [{ "text": "second page" }] },
                { "page": 1, "lines": [{ "text": "Dear Sir," }, { "text": "thank you" }] }
            ]
        }
    })
}

async fn analyze(State(stub): State<Arc<Stub>>, headers: HeaderMap) -> Response {
    let attempt = stub.submits.fetch_add(1, Ordering::SeqCst);

    if headers.get(SUBSCRIPTION_KEY_HEADER).map(|v| v.as_bytes()) != Some(API_KEY.as_bytes()) {
        return (StatusCode::UNAUTHORIZED, "bad key").into_response();
    }
    if attempt < stub.failing_submits {
        return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response();
    }

    let location = format!("{}/vision/v3.2/read/analyzeResults/op-1", stub.base_url);
    (
        StatusCode::ACCEPTED,
        [(OPERATION_LOCATION_HEADER, location)],
    )
        .into_response()
}

async fn results(State(stub): State<Arc<Stub>>) -> Response {
    let n = stub.polls.fetch_add(1, Ordering::SeqCst);
    if n < stub.failing_polls {
        return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
    }
    let idx = (n - stub.failing_polls).min(stub.script.len() - 1);
    Json(stub.script[idx].clone()).into_response()
}

async fn spawn_stub(failing_submits: usize, script: Vec<Value>) -> Arc<Stub> {
    spawn_stub_with(failing_submits, 0, script).await
}

async fn spawn_stub_with(
    failing_submits: usize,
    failing_polls: usize,
    script: Vec<Value>,
) -> Arc<Stub> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let stub = Arc::new(Stub {
        base_url: format!("http://{}", addr),
        failing_submits,
        failing_polls,
        submits: AtomicUsize::new(0),
        polls: AtomicUsize::new(0),
        script,
    });

    let app = Router::new()
        .route(ANALYZE_PATH, post(analyze))
        .route("/vision/v3.2/read/analyzeResults/op-1", get(results))
        .with_state(stub.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    stub
}

fn client_for(stub: &Stub, api_key: &str, max_polls: u32) -> ReadApiClient {
    ReadApiClient::new(ReadApiConfig {
        endpoint: format!("{}/", stub.base_url),
        api_key: api_key.to_string(),
        poll_interval: Duration::from_millis(10),
        max_polls,
        submit_retries: 2,
        retry_backoff_ms: 10,
    })
    .unwrap()
}

fn page() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([255, 255, 255])))
}

#[tokio::test]
async fn test_polls_until_succeeded() {
    let stub = spawn_stub(0, vec![running(), running(), succeeded()]).await;
    let client = client_for(&stub, API_KEY, 10);

    let text = client.recognize(page()).await.unwrap();

    assert_eq!(text, "Dear Sir,\nthank you\nsecond page");
    assert_eq!(stub.submits.load(Ordering::SeqCst), 1);
    assert_eq!(stub.polls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_not_started_counts_as_pending() {
    let stub = spawn_stub(0, vec![json!({ "status": "notStarted" }), succeeded()]).await;
    let client = client_for(&stub, API_KEY, 10);

    let text = client.read_text(page()).await.unwrap();

    assert!(text.starts_with("Dear Sir,"));
    assert_eq!(stub.polls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_operation_is_remote_error() {
    let stub = spawn_stub(0, vec![running(), json!({ "status": "failed" })]).await;
    let client = client_for(&stub, API_KEY, 10);

    let err = client.read_text(page()).await.unwrap_err();

    assert!(matches!(err, OcrError::RemoteService(_)), "got {:?}", err);
    assert_eq!(stub.polls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_poll_bound_is_timeout() {
    let stub = spawn_stub(0, vec![running()]).await;
    let client = client_for(&stub, API_KEY, 3);

    let err = client.read_text(page()).await.unwrap_err();

    assert!(matches!(err, OcrError::Timeout(_)), "got {:?}", err);
    assert_eq!(stub.polls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_throttled_polls_keep_polling() {
    let stub = spawn_stub_with(0, 2, vec![running(), succeeded()]).await;
    let client = client_for(&stub, API_KEY, 10);

    let text = client.read_text(page()).await.unwrap();

    assert_eq!(text, "Dear Sir,\nthank you\nsecond page");
    assert_eq!(stub.polls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_throttled_polls_still_bounded() {
    let stub = spawn_stub_with(0, 100, vec![succeeded()]).await;
    let client = client_for(&stub, API_KEY, 3);

    let err = client.read_text(page()).await.unwrap_err();

    assert!(matches!(err, OcrError::Timeout(_)), "got {:?}", err);
    assert!(err.to_string().contains("429"));
    assert_eq!(stub.polls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_transient_submit_failures_are_retried() {
    let stub = spawn_stub(2, vec![succeeded()]).await;
    let client = client_for(&stub, API_KEY, 5);

    let text = client.read_text(page()).await.unwrap();

    assert!(text.ends_with("second page"));
    assert_eq!(stub.submits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retries_exhausted_is_remote_error() {
    let stub = spawn_stub(10, vec![succeeded()]).await;
    let client = client_for(&stub, API_KEY, 5);

    let err = client.read_text(page()).await.unwrap_err();

    assert!(matches!(err, OcrError::RemoteService(_)), "got {:?}", err);
    // one attempt plus two retries
    assert_eq!(stub.submits.load(Ordering::SeqCst), 3);
    assert_eq!(stub.polls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rejected_key_is_not_retried() {
    let stub = spawn_stub(0, vec![succeeded()]).await;
    let client = client_for(&stub, "wrong-key", 5);

    let err = client.read_text(page()).await.unwrap_err();

    assert!(matches!(err, OcrError::RemoteService(_)), "got {:?}", err);
    assert_eq!(stub.submits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_remote_error() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ReadApiClient::new(ReadApiConfig {
        endpoint: format!("http://{}", addr),
        api_key: API_KEY.to_string(),
        poll_interval: Duration::from_millis(10),
        max_polls: 2,
        submit_retries: 1,
        retry_backoff_ms: 5,
    })
    .unwrap();

    let err = client.read_text(page()).await.unwrap_err();
    assert!(matches!(err, OcrError::RemoteService(_)), "got {:?}", err);
}
