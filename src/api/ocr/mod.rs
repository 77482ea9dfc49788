// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! OCR API endpoint
//!
//! Provides multipart upload OCR backed by the configured recognizer.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::ocr_handler;
pub use request::{read_upload, UploadedFile};
pub use response::OcrResponse;
