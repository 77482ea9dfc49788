// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! OCR response types

use serde::{Deserialize, Serialize};

use crate::vision::RecognitionResult;

/// Response from OCR processing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OcrResponse {
    /// Extracted text, pages separated by a blank line
    pub text: String,
    /// Number of pages recognized
    pub pages: usize,
    /// Recognizer backend
    pub model: String,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

impl From<RecognitionResult> for OcrResponse {
    fn from(result: RecognitionResult) -> Self {
        Self {
            text: result.text,
            pages: result.pages,
            model: result.model,
            processing_time_ms: result.processing_time_ms,
        }
    }
}
