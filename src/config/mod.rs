// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration from flags, environment and `.env`
//!
//! `ServiceConfig` holds raw values as clap parsed them; `validate` turns
//! them into the typed settings each component consumes. Credentials are
//! only ever read from here, never from literals.

use axum::http::HeaderValue;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::vision::pdf::{PdfConfig, PdfPagePolicy, DEFAULT_MAX_EDGE_PX};
use crate::vision::preprocessing::{PreprocessConfig, PreprocessConfigError};
use crate::vision::read_api::ReadApiConfig;
use crate::vision::trocr::{DevicePreference, TrOcrConfig};
use crate::vision::RecognizerBackend;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("{0} must be set when the read-api backend is selected")]
    MissingCredential(&'static str),

    #[error("invalid preprocessing parameters: {0}")]
    Preprocess(#[from] PreprocessConfigError),
}

/// Upper bound on remote submit retries
const MAX_SUBMIT_RETRIES: u32 = 10;

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

/// Fabstir OCR node
#[derive(Parser, Debug, Clone)]
#[command(name = "fabstir-ocr-node")]
#[command(about = "HTTP OCR service for handwritten and printed documents", long_about = None)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to
    #[arg(long, env = "OCR_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Browser origin allowed by CORS
    #[arg(long, env = "OCR_CORS_ORIGIN", default_value = "http://localhost:3000")]
    pub cors_origin: String,

    /// Recognizer backend (trocr | read-api)
    #[arg(long, env = "OCR_BACKEND", default_value = "trocr")]
    pub backend: String,

    /// Execution device for local models (auto | cpu | cuda)
    #[arg(long, env = "OCR_DEVICE", default_value = "auto")]
    pub device: String,

    /// Maximum accepted request body in bytes
    #[arg(long, env = "OCR_MAX_UPLOAD_BYTES", default_value_t = 20 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Deadline for one recognition request, in seconds
    #[arg(long, env = "OCR_REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    pub request_timeout_secs: u64,

    /// Apply handwriting normalization before recognition
    #[arg(long, env = "OCR_PREPROCESS", default_value_t = false, action = clap::ArgAction::Set)]
    pub preprocess: bool,

    /// Side of the normalized square image
    #[arg(long, env = "OCR_TARGET_SIZE", default_value_t = 384)]
    pub target_size: u32,

    /// Adaptive threshold window (odd, >= 3)
    #[arg(long, env = "OCR_THRESHOLD_BLOCK_SIZE", default_value_t = 11)]
    pub threshold_block_size: u32,

    /// Constant subtracted from the local mean
    #[arg(long, env = "OCR_THRESHOLD_C", default_value_t = 2, allow_hyphen_values = true)]
    pub threshold_c: i32,

    /// PDF pages to recognize (all | first)
    #[arg(long, env = "OCR_PDF_PAGES", default_value = "all")]
    pub pdf_pages: String,

    /// PDF rendering resolution
    #[arg(long, env = "OCR_PDF_DPI", default_value_t = 300)]
    pub pdf_dpi: u32,

    /// Most PDF pages rendered for one upload
    #[arg(long, env = "OCR_PDF_MAX_PAGES", default_value_t = 50)]
    pub pdf_max_pages: u16,

    /// Directory holding encoder_model.onnx, decoder_model.onnx and tokenizer.json
    #[arg(long, env = "TROCR_MODEL_DIR", default_value = "./models/trocr-base-handwritten-onnx")]
    pub trocr_model_dir: PathBuf,

    /// Beam width
    #[arg(long, env = "TROCR_NUM_BEAMS", default_value_t = 5)]
    pub trocr_num_beams: usize,

    /// Maximum generated tokens per page
    #[arg(long, env = "TROCR_MAX_NEW_TOKENS", default_value_t = 64)]
    pub trocr_max_new_tokens: usize,

    /// Read API resource endpoint
    #[arg(long, env = "READ_API_ENDPOINT")]
    pub read_api_endpoint: Option<String>,

    /// Read API subscription key
    #[arg(long, env = "READ_API_KEY", hide_env_values = true)]
    pub read_api_key: Option<String>,

    /// Delay between operation polls, in milliseconds
    #[arg(long, env = "READ_API_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub read_api_poll_interval_ms: u64,

    /// Polls before giving up with a timeout
    #[arg(long, env = "READ_API_MAX_POLLS", default_value_t = 60)]
    pub read_api_max_polls: u32,

    /// Retries for transient submit failures
    #[arg(long, env = "READ_API_SUBMIT_RETRIES", default_value_t = 3)]
    pub read_api_submit_retries: u32,

    /// Base backoff between submit retries, in milliseconds
    #[arg(long, env = "READ_API_RETRY_BACKOFF_MS", default_value_t = 500)]
    pub read_api_retry_backoff_ms: u64,
}

/// Validated settings for the whole service
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub cors_origin: HeaderValue,
    pub max_upload_bytes: usize,
    pub request_timeout: Duration,
    /// `None` when handwriting normalization is off
    pub preprocess: Option<PreprocessConfig>,
    pub pdf: PdfConfig,
    pub backend: RecognizerBackend,
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<AppConfig, ConfigError> {
        let listen_addr = self
            .listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| invalid("OCR_LISTEN_ADDR", e.to_string()))?;

        let cors_origin = HeaderValue::from_str(&self.cors_origin)
            .map_err(|e| invalid("OCR_CORS_ORIGIN", e.to_string()))?;

        if self.max_upload_bytes == 0 {
            return Err(invalid("OCR_MAX_UPLOAD_BYTES", "must be greater than zero"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("OCR_REQUEST_TIMEOUT_SECS", "must be greater than zero"));
        }

        // Validated even when disabled so a bad value never lies dormant
        let preprocess_config = PreprocessConfig::new(
            self.target_size,
            self.threshold_block_size,
            self.threshold_c,
        )?;

        let page_policy = self
            .pdf_pages
            .parse::<PdfPagePolicy>()
            .map_err(|e| invalid("OCR_PDF_PAGES", e))?;
        if self.pdf_dpi == 0 {
            return Err(invalid("OCR_PDF_DPI", "must be greater than zero"));
        }
        if self.pdf_max_pages == 0 {
            return Err(invalid("OCR_PDF_MAX_PAGES", "must be greater than zero"));
        }

        Ok(AppConfig {
            listen_addr,
            cors_origin,
            max_upload_bytes: self.max_upload_bytes,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            preprocess: self.preprocess.then_some(preprocess_config),
            pdf: PdfConfig {
                page_policy,
                dpi: self.pdf_dpi,
                max_edge_px: DEFAULT_MAX_EDGE_PX,
                max_pages: self.pdf_max_pages,
            },
            backend: self.backend()?,
        })
    }

    fn backend(&self) -> Result<RecognizerBackend, ConfigError> {
        match self.backend.trim().to_ascii_lowercase().as_str() {
            "trocr" | "local" => {
                let device = self
                    .device
                    .parse::<DevicePreference>()
                    .map_err(|e| invalid("OCR_DEVICE", e))?;
                if self.trocr_num_beams == 0 {
                    return Err(invalid("TROCR_NUM_BEAMS", "must be at least 1"));
                }
                if self.trocr_max_new_tokens == 0 {
                    return Err(invalid("TROCR_MAX_NEW_TOKENS", "must be at least 1"));
                }
                Ok(RecognizerBackend::TrOcr(TrOcrConfig {
                    model_dir: self.trocr_model_dir.clone(),
                    num_beams: self.trocr_num_beams,
                    max_new_tokens: self.trocr_max_new_tokens,
                    device,
                }))
            }
            "read-api" | "read_api" | "azure" => {
                let endpoint = non_empty(&self.read_api_endpoint)
                    .ok_or(ConfigError::MissingCredential("READ_API_ENDPOINT"))?;
                let api_key = non_empty(&self.read_api_key)
                    .ok_or(ConfigError::MissingCredential("READ_API_KEY"))?;
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    return Err(invalid("READ_API_ENDPOINT", "must be an http(s) URL"));
                }
                if self.read_api_max_polls == 0 {
                    return Err(invalid("READ_API_MAX_POLLS", "must be at least 1"));
                }
                if self.read_api_submit_retries > MAX_SUBMIT_RETRIES {
                    return Err(invalid(
                        "READ_API_SUBMIT_RETRIES",
                        format!("must be at most {}", MAX_SUBMIT_RETRIES),
                    ));
                }
                Ok(RecognizerBackend::ReadApi(ReadApiConfig {
                    endpoint,
                    api_key,
                    poll_interval: Duration::from_millis(self.read_api_poll_interval_ms),
                    max_polls: self.read_api_max_polls,
                    submit_retries: self.read_api_submit_retries,
                    retry_backoff_ms: self.read_api_retry_backoff_ms,
                }))
            }
            other => Err(invalid(
                "OCR_BACKEND",
                format!("unknown backend '{}', expected trocr or read-api", other),
            )),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
