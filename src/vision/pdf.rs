// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! PDF rasterization via pdfium
//!
//! pdfium is a C library with internal global state, so all rendering runs
//! on the blocking pool. A document either converts completely or fails:
//! callers never see a partial page set.

use std::str::FromStr;

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, error, info, warn};

use super::error::OcrError;

/// Default rendering resolution
pub const DEFAULT_PDF_DPI: u32 = 300;

/// Longest rendered edge, whatever the physical page size
pub const DEFAULT_MAX_EDGE_PX: u32 = 4096;

/// Most pages rendered for one upload
pub const DEFAULT_PDF_MAX_PAGES: u16 = 50;

/// PDF user-space units per inch
const POINTS_PER_INCH: f32 = 72.0;

/// Which pages of an uploaded PDF are recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PdfPagePolicy {
    /// Every page, in document order
    #[default]
    All,
    /// Page one only
    First,
}

impl FromStr for PdfPagePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(PdfPagePolicy::All),
            "first" => Ok(PdfPagePolicy::First),
            other => Err(format!(
                "unknown PDF page policy '{}', expected 'all' or 'first'",
                other
            )),
        }
    }
}

impl PdfPagePolicy {
    /// Zero-based page indices to render for a document of `page_count` pages
    pub fn select(&self, page_count: u16) -> Vec<u16> {
        match self {
            PdfPagePolicy::All => (0..page_count).collect(),
            PdfPagePolicy::First => (0..page_count.min(1)).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfConfig {
    pub page_policy: PdfPagePolicy,
    pub dpi: u32,
    pub max_edge_px: u32,
    /// Uploads needing more rendered pages than this are rejected up front
    pub max_pages: u16,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            page_policy: PdfPagePolicy::All,
            dpi: DEFAULT_PDF_DPI,
            max_edge_px: DEFAULT_MAX_EDGE_PX,
            max_pages: DEFAULT_PDF_MAX_PAGES,
        }
    }
}

impl PdfConfig {
    fn scale_factor(&self) -> f32 {
        self.dpi as f32 / POINTS_PER_INCH
    }
}

/// Render the selected pages of a PDF to RGB images, in page order
pub async fn rasterize_pdf(
    bytes: Vec<u8>,
    config: &PdfConfig,
) -> Result<Vec<DynamicImage>, OcrError> {
    let config = *config;

    tokio::task::spawn_blocking(move || rasterize_blocking(&bytes, &config))
        .await
        .map_err(|e| OcrError::Inference(format!("PDF render task panicked: {}", e)))?
}

/// Check once whether the pdfium library can be bound, logging the outcome
pub fn pdfium_available() -> bool {
    match bind_pdfium() {
        Ok(_) => {
            info!("pdfium library loaded, PDF uploads enabled");
            true
        }
        Err(e) => {
            warn!("{}; PDF uploads will answer 503", e);
            false
        }
    }
}

fn bind_pdfium() -> Result<Pdfium, OcrError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| {
            OcrError::Unavailable(format!(
                "PDF rasterizer unavailable (pdfium library not found): {:?}",
                e
            ))
        })?;

    Ok(Pdfium::new(bindings))
}

fn rasterize_blocking(bytes: &[u8], config: &PdfConfig) -> Result<Vec<DynamicImage>, OcrError> {
    let pdfium = bind_pdfium().inspect_err(|e| error!("{}", e))?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| OcrError::Decode(format!("unreadable PDF: {:?}", e)))?;

    let pages = document.pages();
    let page_count = pages.len();
    if page_count == 0 {
        return Err(OcrError::Decode("PDF has no pages".to_string()));
    }

    let selected = config.page_policy.select(page_count);
    if selected.len() > config.max_pages as usize {
        return Err(OcrError::InvalidInput(format!(
            "PDF has {} pages, at most {} are accepted",
            page_count, config.max_pages
        )));
    }
    info!(
        "PDF loaded: {} pages, rendering {} at {} dpi",
        page_count,
        selected.len(),
        config.dpi
    );

    let max_edge = config.max_edge_px as i32;
    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(config.scale_factor())
        .set_maximum_width(max_edge)
        .set_maximum_height(max_edge);

    let mut images = Vec::with_capacity(selected.len());
    for idx in selected {
        let page = pages.get(idx).map_err(|e| {
            OcrError::Decode(format!("failed to open page {}: {:?}", idx + 1, e))
        })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            OcrError::Decode(format!("failed to render page {}: {:?}", idx + 1, e))
        })?;

        let image = DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8());
        debug!(
            "Rendered page {} -> {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}
