// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! End-to-end pipeline over real image encodings

use async_trait::async_trait;
use fabstir_ocr_node::vision::{
    DocumentKind, ModelManager, OcrError, OcrPipeline, PdfConfig, PreprocessConfig,
    TextRecognizer,
};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;

struct SizeRecognizer;

#[async_trait]
impl TextRecognizer for SizeRecognizer {
    async fn recognize(&self, image: DynamicImage) -> Result<String, OcrError> {
        let (w, h) = image.dimensions();
        Ok(format!("{}x{}", w, h))
    }

    fn name(&self) -> &str {
        "size"
    }
}

fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([230, 230, 230])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

fn pipeline(preprocess: Option<PreprocessConfig>) -> OcrPipeline {
    let manager = ModelManager::from_recognizer(Arc::new(SizeRecognizer));
    OcrPipeline::new(manager.recognizer(), preprocess, PdfConfig::default())
}

#[tokio::test]
async fn test_jpeg_upload() {
    let result = pipeline(None)
        .run(encoded(120, 45, ImageFormat::Jpeg), DocumentKind::Jpeg)
        .await
        .unwrap();

    assert_eq!(result.text, "120x45");
    assert_eq!(result.pages, 1);
    assert_eq!(result.model, "size");
}

#[tokio::test]
async fn test_png_with_normalization() {
    let result = pipeline(Some(PreprocessConfig::default()))
        .run(encoded(300, 90, ImageFormat::Png), DocumentKind::Png)
        .await
        .unwrap();

    assert_eq!(result.text, "384x384");
}

#[tokio::test]
async fn test_empty_bytes_are_invalid_input() {
    let err = pipeline(None)
        .run(Vec::new(), DocumentKind::Png)
        .await
        .unwrap_err();

    assert!(matches!(err, OcrError::InvalidInput(_)));
}

#[test]
fn test_content_type_from_upload() {
    assert_eq!(
        DocumentKind::from_content_type("image/jpeg; charset=binary"),
        Some(DocumentKind::Jpeg)
    );
    assert_eq!(DocumentKind::from_content_type("IMAGE/PNG"), Some(DocumentKind::Png));
    assert_eq!(DocumentKind::from_content_type("image/gif"), None);
    assert_eq!(DocumentKind::from_content_type(""), None);
}
