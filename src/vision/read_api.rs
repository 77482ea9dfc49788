// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Remote OCR through an asynchronous Read API (submit, then poll)
//!
//! Submission retries transient failures with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`). Polling runs at a fixed interval
//! for at most `max_polls` rounds. Every await point is cancellable, so
//! dropping the future stops the loop.

use async_trait::async_trait;
use image::DynamicImage;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::error::OcrError;
use super::image_utils::encode_png;
use super::recognizer::TextRecognizer;

/// Path of the analyze operation, relative to the resource endpoint
pub const ANALYZE_PATH: &str = "/vision/v3.2/read/analyze";

pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
pub const OPERATION_LOCATION_HEADER: &str = "Operation-Location";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_MAX_POLLS: u32 = 60;
pub const DEFAULT_SUBMIT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Per-HTTP-call timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote recognizer settings
#[derive(Clone, PartialEq)]
pub struct ReadApiConfig {
    /// Resource endpoint, e.g. `https://<name>.cognitiveservices.azure.com`
    pub endpoint: String,
    pub api_key: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub submit_retries: u32,
    pub retry_backoff_ms: u64,
}

impl std::fmt::Debug for ReadApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadApiConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("poll_interval", &self.poll_interval)
            .field("max_polls", &self.max_polls)
            .field("submit_retries", &self.submit_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish()
    }
}

// --- Read API serde structs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOperationResult {
    pub status: OperationStatus,
    #[serde(default)]
    pub analyze_result: Option<AnalyzeResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    #[serde(default)]
    pub read_results: Vec<ReadPage>,
}

#[derive(Debug, Deserialize)]
pub struct ReadPage {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub lines: Vec<ReadLine>,
}

#[derive(Debug, Deserialize)]
pub struct ReadLine {
    pub text: String,
}

impl AnalyzeResult {
    /// Line texts in page order, then line order, joined with `\n`
    pub fn joined_text(&self) -> String {
        let mut pages: Vec<&ReadPage> = self.read_results.iter().collect();
        pages.sort_by_key(|p| p.page);
        pages
            .iter()
            .flat_map(|p| p.lines.iter().map(|l| l.text.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Outcome of one submission attempt
enum SubmitError {
    /// Connection failure, 429 or 5xx
    Transient(String),
    Fatal(OcrError),
}

/// Delay before retry `attempt` (1-based): `base_ms * 2^(attempt - 1)`, saturating
fn retry_backoff(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor))
}

fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Client for the remote Read API
pub struct ReadApiClient {
    client: Client,
    config: ReadApiConfig,
    analyze_url: String,
}

impl std::fmt::Debug for ReadApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadApiClient")
            .field("analyze_url", &self.analyze_url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReadApiClient {
    pub fn new(config: ReadApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;

        let analyze_url = format!("{}{}", config.endpoint.trim_end_matches('/'), ANALYZE_PATH);
        info!(
            "Read API client configured: {} (poll every {:?}, max {} polls)",
            analyze_url, config.poll_interval, config.max_polls
        );

        Ok(Self {
            client,
            config,
            analyze_url,
        })
    }

    /// Submit PNG bytes and return the operation location
    pub async fn submit(&self, png: &[u8]) -> Result<String, OcrError> {
        let mut last_err = String::new();

        for attempt in 0..=self.config.submit_retries {
            if attempt > 0 {
                let backoff = retry_backoff(self.config.retry_backoff_ms, attempt);
                warn!(
                    "Read API submit retry {}/{} after {:?}",
                    attempt, self.config.submit_retries, backoff
                );
                sleep(backoff).await;
            }

            match self.submit_once(png).await {
                Ok(location) => {
                    debug!("Read API operation accepted: {}", location);
                    return Ok(location);
                }
                Err(SubmitError::Fatal(e)) => return Err(e),
                Err(SubmitError::Transient(msg)) => {
                    warn!("Read API submit attempt {} failed: {}", attempt + 1, msg);
                    last_err = msg;
                }
            }
        }

        Err(OcrError::RemoteService(format!(
            "submit failed after {} attempts: {}",
            self.config.submit_retries + 1,
            last_err
        )))
    }

    async fn submit_once(&self, png: &[u8]) -> Result<String, SubmitError> {
        let response = self
            .client
            .post(&self.analyze_url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.config.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(png.to_vec())
            .send()
            .await
            .map_err(|e| {
                if is_transient_error(&e) {
                    SubmitError::Transient(e.to_string())
                } else {
                    SubmitError::Fatal(OcrError::RemoteService(e.to_string()))
                }
            })?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return response
                .headers()
                .get(OPERATION_LOCATION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    SubmitError::Fatal(OcrError::RemoteService(format!(
                        "response is missing the {} header",
                        OPERATION_LOCATION_HEADER
                    )))
                });
        }

        let body = response.text().await.unwrap_or_default();
        let msg = format!("submit returned {}: {}", status, body);
        if is_transient_status(status) {
            Err(SubmitError::Transient(msg))
        } else {
            Err(SubmitError::Fatal(OcrError::RemoteService(msg)))
        }
    }

    /// Poll an operation until it reaches a terminal status
    ///
    /// Connection failures, 429 and 5xx answers use up a poll round and
    /// polling continues; the `max_polls` bound still applies.
    pub async fn poll(&self, location: &str) -> Result<String, OcrError> {
        let mut last_transient: Option<String> = None;

        for round in 1..=self.config.max_polls {
            sleep(self.config.poll_interval).await;

            let response = match self
                .client
                .get(location)
                .header(SUBSCRIPTION_KEY_HEADER, &self.config.api_key)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if is_transient_error(&e) => {
                    warn!("Read API poll {} failed, will retry: {}", round, e);
                    last_transient = Some(e.to_string());
                    continue;
                }
                Err(e) => {
                    return Err(OcrError::RemoteService(format!(
                        "poll request failed: {}",
                        e
                    )))
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let msg = format!("poll returned {}: {}", status, body);
                if is_transient_status(status) {
                    warn!("Read API poll {} failed, will retry: {}", round, msg);
                    last_transient = Some(msg);
                    continue;
                }
                return Err(OcrError::RemoteService(msg));
            }

            let result: ReadOperationResult = response.json().await.map_err(|e| {
                OcrError::RemoteService(format!("malformed operation result: {}", e))
            })?;

            debug!("Read API poll {}: {:?}", round, result.status);

            match result.status {
                OperationStatus::NotStarted | OperationStatus::Running => continue,
                OperationStatus::Succeeded => {
                    return result
                        .analyze_result
                        .map(|r| r.joined_text())
                        .ok_or_else(|| {
                            OcrError::RemoteService(
                                "operation succeeded without an analyzeResult".to_string(),
                            )
                        });
                }
                OperationStatus::Failed => {
                    return Err(OcrError::RemoteService(
                        "read operation failed".to_string(),
                    ));
                }
                OperationStatus::Unknown => {
                    return Err(OcrError::RemoteService(
                        "read operation ended with an unknown status".to_string(),
                    ));
                }
            }
        }

        Err(OcrError::Timeout(match last_transient {
            Some(last) => format!(
                "read operation not finished after {} polls (last error: {})",
                self.config.max_polls, last
            ),
            None => format!(
                "read operation not finished after {} polls",
                self.config.max_polls
            ),
        }))
    }

    /// Submit an image and wait for its text
    pub async fn read_text(&self, image: DynamicImage) -> Result<String, OcrError> {
        let start = Instant::now();

        let png = tokio::task::spawn_blocking(move || encode_png(&image))
            .await
            .map_err(|e| OcrError::Inference(format!("encode task panicked: {}", e)))??;

        let location = self.submit(&png).await?;
        let text = self.poll(&location).await?;

        info!(
            "Read API returned {} chars in {}ms",
            text.len(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}

#[async_trait]
impl TextRecognizer for ReadApiClient {
    async fn recognize(&self, image: DynamicImage) -> Result<String, OcrError> {
        self.read_text(image).await
    }

    fn name(&self) -> &str {
        "read-api"
    }
}
