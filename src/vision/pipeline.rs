// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Upload-to-text pipeline: rasterize, optionally normalize, recognize, join

use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::error::OcrError;
use super::image_utils::decode_image_bytes;
use super::pdf::{rasterize_pdf, PdfConfig};
use super::preprocessing::{normalize, PreprocessConfig};
use super::recognizer::TextRecognizer;

/// Separator between the texts of consecutive pages
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Accepted upload kinds, resolved from the declared content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Jpeg,
    Png,
    Pdf,
}

impl DocumentKind {
    /// Resolve a declared MIME type.
    ///
    /// Parameters (`; charset=...`) are ignored and matching is
    /// case-insensitive. `image/jpg` is accepted as an alias.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(DocumentKind::Jpeg),
            "image/png" => Some(DocumentKind::Png),
            "application/pdf" => Some(DocumentKind::Pdf),
            _ => None,
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, DocumentKind::Pdf)
    }
}

/// Outcome of one recognition request
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub text: String,
    pub pages: usize,
    pub model: String,
    pub processing_time_ms: u64,
}

/// Sequential glue between converter, preprocessor and recognizer
#[derive(Clone)]
pub struct OcrPipeline {
    recognizer: Arc<dyn TextRecognizer>,
    preprocess: Option<PreprocessConfig>,
    pdf: PdfConfig,
}

impl std::fmt::Debug for OcrPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrPipeline")
            .field("recognizer", &self.recognizer.name())
            .field("preprocess", &self.preprocess)
            .field("pdf", &self.pdf)
            .finish()
    }
}

impl OcrPipeline {
    pub fn new(
        recognizer: Arc<dyn TextRecognizer>,
        preprocess: Option<PreprocessConfig>,
        pdf: PdfConfig,
    ) -> Self {
        Self {
            recognizer,
            preprocess,
            pdf,
        }
    }

    /// Run the full pipeline over one upload
    pub async fn run(&self, bytes: Vec<u8>, kind: DocumentKind) -> Result<RecognitionResult, OcrError> {
        let start = Instant::now();

        if bytes.is_empty() {
            return Err(OcrError::InvalidInput("uploaded file is empty".to_string()));
        }

        let pages = self.rasterize(bytes, kind).await?;
        let page_count = pages.len();
        let text = self.recognize_pages(pages).await?;

        let result = RecognitionResult {
            text,
            pages: page_count,
            model: self.recognizer.name().to_string(),
            processing_time_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Recognized {} page(s), {} chars in {}ms",
            result.pages,
            result.text.len(),
            result.processing_time_ms
        );

        Ok(result)
    }

    /// Recognize pages one at a time and join their texts in page order
    pub async fn recognize_pages(&self, pages: Vec<DynamicImage>) -> Result<String, OcrError> {
        let page_count = pages.len();
        let mut texts = Vec::with_capacity(page_count);

        for (idx, page) in pages.into_iter().enumerate() {
            let page = match self.preprocess {
                Some(config) => preprocess_page(page, config).await?,
                None => page,
            };
            let text = self.recognizer.recognize(page).await?;
            debug!("Page {}/{}: {} chars", idx + 1, page_count, text.len());
            texts.push(text);
        }

        Ok(texts.join(PAGE_SEPARATOR))
    }

    async fn rasterize(&self, bytes: Vec<u8>, kind: DocumentKind) -> Result<Vec<DynamicImage>, OcrError> {
        if kind.is_pdf() {
            return rasterize_pdf(bytes, &self.pdf).await;
        }

        let (image, info) = tokio::task::spawn_blocking(move || decode_image_bytes(&bytes))
            .await
            .map_err(|e| OcrError::Inference(format!("decode task panicked: {}", e)))??;

        debug!(
            "Decoded {:?} image {}x{} ({} bytes)",
            info.format, info.width, info.height, info.size_bytes
        );
        Ok(vec![image])
    }
}

async fn preprocess_page(page: DynamicImage, config: PreprocessConfig) -> Result<DynamicImage, OcrError> {
    tokio::task::spawn_blocking(move || normalize(&page, &config).into_dynamic())
        .await
        .map_err(|e| OcrError::Inference(format!("preprocessing task panicked: {}", e)))
}
