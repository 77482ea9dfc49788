// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Route registration, health and CORS

use super::support::*;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use fabstir_ocr_node::api::http_server::{create_app, AppState};
use std::sync::Arc;
use tower::util::ServiceExt;

fn app() -> axum::Router {
    create_app(AppState::new_for_test(Arc::new(CountingRecognizer::new("x"))))
}

#[tokio::test]
async fn test_health_reports_recognizer() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["recognizer"], "counting");
    assert_eq!(json["version"], fabstir_ocr_node::version::VERSION_NUMBER);
    assert!(json.get("device").is_none());
}

#[tokio::test]
async fn test_version_lists_content_types() {
    let request = Request::builder()
        .uri("/version")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["version"], fabstir_ocr_node::version::VERSION_NUMBER);
    assert!(json["contentTypes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|t| t == "application/pdf"));
}

#[tokio::test]
async fn test_ocr_rejects_get() {
    let request = Request::builder()
        .method(Method::GET)
        .uri("/ocr")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_unknown_route_not_found() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/ocr")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_preflight_allows_configured_origin() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/ocr")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:3000"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_cors_never_echoes_other_origins() {
    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "http://evil.example")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let allowed = response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN);
    assert_ne!(allowed.map(|v| v.as_bytes()), Some(&b"http://evil.example"[..]));
}
