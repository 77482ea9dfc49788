// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! OCR over uploaded images and PDFs
//!
//! This module provides:
//! - Upload decoding and PDF rasterization
//! - Optional handwriting normalization
//! - Recognition via local TrOCR (ONNX) or a remote Read API

pub mod error;
pub mod image_utils;
pub mod model_manager;
pub mod pdf;
pub mod pipeline;
pub mod preprocessing;
pub mod read_api;
pub mod recognizer;
pub mod trocr;

pub use error::OcrError;
pub use image_utils::{decode_image_bytes, detect_format, encode_png, ImageError, ImageInfo};
pub use model_manager::{ModelManager, RecognizerBackend, RecognizerInfo};
pub use pdf::{pdfium_available, rasterize_pdf, PdfConfig, PdfPagePolicy};
pub use pipeline::{DocumentKind, OcrPipeline, RecognitionResult};
pub use preprocessing::{normalize, NormalizedImage, PreprocessConfig};
pub use read_api::{ReadApiClient, ReadApiConfig};
pub use recognizer::TextRecognizer;
pub use trocr::{DevicePreference, ExecutionDevice, TrOcrConfig, TrOcrModel};
