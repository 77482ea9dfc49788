// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Handwriting normalization applied before recognition
//!
//! Steps, in order:
//! 1. Grayscale conversion
//! 2. Uniform scale factor `target_size / max(width, height)`
//! 3. Lanczos3 resize preserving aspect ratio (skipped for target-sized
//!    images and for square images that already fit)
//! 4. Centered paste onto a white `target_size x target_size` canvas
//! 5. Adaptive mean threshold (local window, constant offset)
//!
//! The threshold runs on `imageproc`'s integral image in integer arithmetic,
//! so the output is byte-identical across runs for a fixed input.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast;
use thiserror::Error;

/// Default square side fed to the recognizer (TrOCR input size)
pub const DEFAULT_TARGET_SIZE: u32 = 384;

/// Default adaptive threshold neighborhood (pixels per side, odd)
pub const DEFAULT_BLOCK_SIZE: u32 = 11;

/// Default constant subtracted from the local mean
pub const DEFAULT_THRESHOLD_C: i32 = 2;

const WHITE: Luma<u8> = Luma([255]);

#[derive(Debug, Error, PartialEq)]
pub enum PreprocessConfigError {
    #[error("target size must be greater than zero")]
    ZeroTargetSize,

    #[error("threshold block size must be odd and at least 3, got {0}")]
    InvalidBlockSize(u32),
}

/// Parameters of the handwriting normalization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessConfig {
    pub target_size: u32,
    pub block_size: u32,
    pub threshold_c: i32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            threshold_c: DEFAULT_THRESHOLD_C,
        }
    }
}

impl PreprocessConfig {
    pub fn new(
        target_size: u32,
        block_size: u32,
        threshold_c: i32,
    ) -> Result<Self, PreprocessConfigError> {
        if target_size == 0 {
            return Err(PreprocessConfigError::ZeroTargetSize);
        }
        if block_size < 3 || block_size % 2 == 0 {
            return Err(PreprocessConfigError::InvalidBlockSize(block_size));
        }
        Ok(Self {
            target_size,
            block_size,
            threshold_c,
        })
    }
}

/// Fixed-size, single-channel, binarized image produced by [`normalize`]
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage(GrayImage);

impl NormalizedImage {
    pub fn side(&self) -> u32 {
        self.0.width()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    /// Expand back to a `DynamicImage` for recognizers that take color input
    pub fn into_dynamic(self) -> DynamicImage {
        DynamicImage::ImageLuma8(self.0)
    }
}

/// Run the full normalization pipeline
pub fn normalize(image: &DynamicImage, config: &PreprocessConfig) -> NormalizedImage {
    let gray = image.to_luma8();
    let padded = pad_to_square(&gray, config.target_size);
    NormalizedImage(adaptive_threshold(
        &padded,
        config.block_size,
        config.threshold_c,
    ))
}

/// Scale to fit `target_size` and center on a white square canvas
///
/// Square inputs that already fit the canvas are pasted as they are.
pub fn pad_to_square(gray: &GrayImage, target_size: u32) -> GrayImage {
    let (orig_w, orig_h) = gray.dimensions();
    let mut canvas = GrayImage::from_pixel(target_size, target_size, WHITE);

    if orig_w == 0 || orig_h == 0 {
        return canvas;
    }

    let (new_w, new_h) = if skips_resize(orig_w, orig_h, target_size) {
        (orig_w, orig_h)
    } else {
        fit_dimensions(orig_w, orig_h, target_size)
    };

    let resized;
    let source = if (new_w, new_h) == (orig_w, orig_h) {
        gray
    } else {
        resized = imageops::resize(gray, new_w, new_h, FilterType::Lanczos3);
        &resized
    };

    let offset_x = (target_size - new_w) / 2;
    let offset_y = (target_size - new_h) / 2;
    imageops::replace(&mut canvas, source, offset_x as i64, offset_y as i64);

    canvas
}

/// Target-sized images, and square images no larger than the canvas
fn skips_resize(width: u32, height: u32, target_size: u32) -> bool {
    let target_sized = width == target_size && height == target_size;
    let fitting_square = width == height && width <= target_size;
    target_sized || fitting_square
}

/// Dimensions after scaling by `target_size / max(w, h)`, each clamped to [1, target]
pub fn fit_dimensions(width: u32, height: u32, target_size: u32) -> (u32, u32) {
    let scale = target_size as f64 / width.max(height) as f64;
    let new_w = ((width as f64 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((height as f64 * scale).round() as u32).clamp(1, target_size);
    (new_w, new_h)
}

/// Binarize with a local mean threshold over a `block_size` window
///
/// A pixel becomes white when `value >= mean(window) - c`, black otherwise;
/// the window is clipped at the image border. `block_size` is odd and at
/// least 3, as enforced by [`PreprocessConfig::new`].
pub fn adaptive_threshold(gray: &GrayImage, block_size: u32, c: i32) -> GrayImage {
    contrast::adaptive_threshold(gray, (block_size / 2).max(1), c)
}
