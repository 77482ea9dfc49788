// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error taxonomy for the OCR pipeline

use thiserror::Error;

use super::image_utils::ImageError;

/// Failure raised anywhere between the upload and the recognized text.
///
/// Every variant is terminal for the request; only remote submission
/// retries internally (see `read_api`), decode and inference never do.
#[derive(Debug, Error)]
pub enum OcrError {
    /// Unsupported or empty upload, malformed multipart body
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Image or PDF bytes could not be turned into rasters
    #[error("decode error: {0}")]
    Decode(String),

    /// Model execution or token decoding failed
    #[error("inference error: {0}")]
    Inference(String),

    /// Remote OCR call failed or finished with a non-success status
    #[error("remote service error: {0}")]
    RemoteService(String),

    /// Polling bound or request deadline exceeded
    #[error("timed out: {0}")]
    Timeout(String),

    /// A server-side component the request needs is not installed
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl OcrError {
    /// Short machine-readable classification used in error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            OcrError::InvalidInput(_) => "invalid_input",
            OcrError::Decode(_) => "decode_error",
            OcrError::Inference(_) => "inference_error",
            OcrError::RemoteService(_) => "remote_service_error",
            OcrError::Timeout(_) => "timeout",
            OcrError::Unavailable(_) => "service_unavailable",
        }
    }
}

impl From<ImageError> for OcrError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::EmptyData => OcrError::InvalidInput(err.to_string()),
            _ => OcrError::Decode(err.to_string()),
        }
    }
}
