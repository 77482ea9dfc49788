// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::{DefaultBodyLimit, State},
    http::HeaderValue,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::ocr::ocr_handler;
use crate::config::AppConfig;
use crate::version::{get_version_info, VERSION_NUMBER};
use crate::vision::{ModelManager, OcrPipeline, PdfConfig, RecognizerInfo, TextRecognizer};

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Shared, read-only request context
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<OcrPipeline>,
    pub recognizer: RecognizerInfo,
    pub request_timeout: Duration,
    pub cors_origin: HeaderValue,
    pub max_upload_bytes: usize,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("pipeline", &self.pipeline)
            .field("recognizer", &self.recognizer)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(manager: &ModelManager, config: &AppConfig) -> Self {
        let pipeline = OcrPipeline::new(manager.recognizer(), config.preprocess, config.pdf);
        Self {
            pipeline: Arc::new(pipeline),
            recognizer: manager.info().clone(),
            request_timeout: config.request_timeout,
            cors_origin: config.cors_origin.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// State around an arbitrary recognizer with default limits
    pub fn new_for_test(recognizer: Arc<dyn TextRecognizer>) -> Self {
        let manager = ModelManager::from_recognizer(recognizer);
        Self {
            pipeline: Arc::new(OcrPipeline::new(
                manager.recognizer(),
                None,
                PdfConfig::default(),
            )),
            recognizer: manager.info().clone(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cors_origin: HeaderValue::from_static(DEFAULT_CORS_ORIGIN),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub recognizer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Build the router with CORS, tracing and the upload limit applied
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(state.cors_origin.clone())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/ocr", post(ocr_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: VERSION_NUMBER,
        recognizer: state.recognizer.name.clone(),
        device: state.recognizer.device.map(|d| d.to_string()),
    })
}

async fn version_handler() -> impl IntoResponse {
    Json(get_version_info())
}

/// Serve until Ctrl+C or SIGTERM
pub async fn start_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("OCR server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("OCR server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}
