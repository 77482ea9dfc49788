// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Shared helpers for the HTTP tests: stub recognizers and multipart bodies
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request},
};
use fabstir_ocr_node::vision::{encode_png, OcrError, TextRecognizer};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const BOUNDARY: &str = "ocr-test-boundary-7f3a";

/// Returns a fixed text and counts invocations
#[derive(Debug)]
pub struct CountingRecognizer {
    text: String,
    calls: AtomicUsize,
}

impl CountingRecognizer {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextRecognizer for CountingRecognizer {
    async fn recognize(&self, image: DynamicImage) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (w, h) = image.dimensions();
        Ok(format!("{} {}x{}", self.text, w, h))
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// Never finishes within a test's request deadline
#[derive(Debug)]
pub struct SlowRecognizer;

#[async_trait]
impl TextRecognizer for SlowRecognizer {
    async fn recognize(&self, _image: DynamicImage) -> Result<String, OcrError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok("too late".to_string())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Always fails as if the model broke
#[derive(Debug)]
pub struct FailingRecognizer;

#[async_trait]
impl TextRecognizer for FailingRecognizer {
    async fn recognize(&self, _image: DynamicImage) -> Result<String, OcrError> {
        Err(OcrError::Inference("decoder output had no logits".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([250, 250, 250]));
    encode_png(&DynamicImage::ImageRgb8(image)).unwrap()
}

/// One part `multipart/form-data` body
pub fn multipart_body(
    field: &str,
    filename: Option<&str>,
    content_type: Option<&str>,
    data: &[u8],
) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());

    let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", field);
    if let Some(name) = filename {
        disposition.push_str(&format!("; filename=\"{}\"", name));
    }
    body.extend_from_slice(disposition.as_bytes());
    body.extend_from_slice(b"\r\n");

    if let Some(ct) = content_type {
        body.extend_from_slice(format!("Content-Type: {}\r\n", ct).as_bytes());
    }
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn ocr_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/ocr")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn upload_request(content_type: &str, data: &[u8]) -> Request<Body> {
    ocr_request(multipart_body("file", Some("scan"), Some(content_type), data))
}

pub async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
