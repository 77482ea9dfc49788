// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::multipart::{MultipartError, MultipartRejection};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, warn};
use uuid::Uuid;

use crate::vision::OcrError;

/// JSON body of every failed request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Machine-readable classification
    pub error: String,
    /// Human-readable message
    pub detail: String,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// Failure inside the OCR pipeline
    Ocr(OcrError),
    PayloadTooLarge(String),
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        ApiError::Ocr(OcrError::InvalidInput(msg.into()))
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::Ocr(e) => e.kind(),
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Ocr(OcrError::InvalidInput(_)) | ApiError::Ocr(OcrError::Decode(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Ocr(OcrError::Inference(_)) | ApiError::Ocr(OcrError::RemoteService(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Ocr(OcrError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Ocr(OcrError::Unavailable(_)) | ApiError::ServiceUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    pub fn to_response(&self, request_id: &str) -> ErrorResponse {
        let detail = match self {
            ApiError::Ocr(e) => e.to_string(),
            ApiError::PayloadTooLarge(msg) | ApiError::ServiceUnavailable(msg) => msg.clone(),
        };

        ErrorResponse {
            error: self.error_type().to_string(),
            detail,
            request_id: request_id.to_string(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Ocr(e) => write!(f, "{}", e),
            ApiError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<OcrError> for ApiError {
    fn from(err: OcrError) -> Self {
        match err {
            OcrError::Unavailable(msg) => ApiError::ServiceUnavailable(msg),
            other => ApiError::Ocr(other),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::invalid_input(format!("malformed multipart body: {}", err.body_text()))
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(err: MultipartRejection) -> Self {
        ApiError::invalid_input(err.body_text())
    }
}

/// An `ApiError` bound to the id of the request it failed
#[derive(Debug)]
pub struct ApiErrorResponse {
    pub error: ApiError,
    pub request_id: String,
}

impl ApiErrorResponse {
    pub fn new(error: impl Into<ApiError>, request_id: &str) -> Self {
        Self {
            error: error.into(),
            request_id: request_id.to_string(),
        }
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        if status.is_server_error() {
            error!(request_id = %self.request_id, "Request failed: {}", self.error);
        } else {
            warn!(request_id = %self.request_id, "Request rejected: {}", self.error);
        }

        (status, Json(self.error.to_response(&self.request_id))).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        ApiErrorResponse::new(self, &Uuid::new_v4().to_string()).into_response()
    }
}
