// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Recognizer abstraction shared by the local and remote backends

use async_trait::async_trait;
use image::DynamicImage;

use super::error::OcrError;

/// Turns one page raster into text.
///
/// Implementations are built once at startup, shared behind an `Arc` and
/// never mutated afterwards. CPU-bound work must be moved off the async
/// executor by the implementation itself.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognize the text in a single image
    async fn recognize(&self, image: DynamicImage) -> Result<String, OcrError>;

    /// Backend label reported in responses and on `/health`
    fn name(&self) -> &str;
}
