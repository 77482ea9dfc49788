// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multipart upload extraction and validation

use axum_extra::extract::Multipart;
use tracing::debug;

use crate::api::errors::ApiError;
use crate::vision::DocumentKind;

/// Form field name of the upload when the client sends no filename
pub const FILE_FIELD: &str = "file";

/// One uploaded file, alive for a single request
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub bytes: Vec<u8>,
    /// Declared MIME type, empty when the part carried none
    pub content_type: String,
    pub filename: Option<String>,
}

impl UploadedFile {
    /// Validate the upload and resolve its declared type
    pub fn validate(&self) -> Result<DocumentKind, ApiError> {
        if self.bytes.is_empty() {
            return Err(ApiError::invalid_input("uploaded file is empty"));
        }

        DocumentKind::from_content_type(&self.content_type).ok_or_else(|| {
            ApiError::invalid_input(format!(
                "unsupported content type '{}', expected image/jpeg, image/png or application/pdf",
                self.content_type
            ))
        })
    }
}

/// Pull the upload out of a multipart body.
///
/// The first part that carries a filename, or is named `file`, wins.
/// Remaining parts are ignored.
pub async fn read_upload(multipart: &mut Multipart) -> Result<UploadedFile, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        let is_upload = field.file_name().is_some() || field.name() == Some(FILE_FIELD);
        if !is_upload {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?.to_vec();

        return Ok(UploadedFile {
            bytes,
            content_type,
            filename,
        });
    }

    Err(ApiError::invalid_input(
        "multipart body contains no file part",
    ))
}
