// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! OCR endpoint handler

use axum::{extract::State, Json};
use axum_extra::extract::multipart::{Multipart, MultipartRejection};
use tracing::{debug, info};
use uuid::Uuid;

use super::request::read_upload;
use super::response::OcrResponse;
use crate::api::errors::{ApiError, ApiErrorResponse};
use crate::api::http_server::AppState;
use crate::vision::OcrError;

/// POST /ocr - Extract text from an uploaded image or PDF
///
/// # Request
/// `multipart/form-data` with one file part (the first part with a filename,
/// or the part named `file`). Its declared content type must be one of
/// `image/jpeg`, `image/jpg`, `image/png`, `application/pdf`.
///
/// # Response
/// - `text`: Extracted text; PDF pages are separated by a blank line
/// - `pages`: Number of pages recognized
/// - `model`: Recognizer backend
/// - `processingTimeMs`: Processing time in milliseconds
///
/// # Errors
/// - 400 Bad Request: unsupported type, empty or undecodable upload
/// - 413 Payload Too Large: body over the configured limit
/// - 500 Internal Server Error: inference or remote service failure
/// - 504 Gateway Timeout: request deadline or polling bound exceeded
pub async fn ocr_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<OcrResponse>, ApiErrorResponse> {
    let request_id = Uuid::new_v4().to_string();
    let fail = |e: ApiError| ApiErrorResponse::new(e, &request_id);

    let mut multipart = multipart.map_err(|e| fail(e.into()))?;
    let upload = read_upload(&mut multipart).await.map_err(fail)?;
    let kind = upload.validate().map_err(fail)?;

    info!(
        request_id = %request_id,
        "OCR request: {:?} ({}), {} bytes",
        upload.filename.as_deref().unwrap_or("<unnamed>"),
        upload.content_type,
        upload.bytes.len()
    );

    let result = tokio::time::timeout(state.request_timeout, state.pipeline.run(upload.bytes, kind))
        .await
        .map_err(|_| {
            fail(
                OcrError::Timeout(format!(
                    "recognition exceeded {}s deadline",
                    state.request_timeout.as_secs()
                ))
                .into(),
            )
        })?
        .map_err(|e| fail(e.into()))?;

    debug!(request_id = %request_id, "OCR response: {} chars", result.text.len());

    Ok(Json(OcrResponse::from(result)))
}
