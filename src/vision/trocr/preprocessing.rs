// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Pixel tensor preparation for the TrOCR vision encoder

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

/// Square input side of the TrOCR ViT encoder
pub const TROCR_INPUT_SIZE: u32 = 384;

/// TrOCR image processor normalization (same for all channels)
pub const MEAN: f32 = 0.5;
pub const STD: f32 = 0.5;

/// Convert an image to `pixel_values` of shape `[1, 3, 384, 384]`
///
/// Steps:
/// 1. Convert to RGB (grayscale/binarized input is replicated per channel)
/// 2. Resize to 384x384 with bilinear filtering, ignoring aspect ratio
/// 3. Rescale to [0, 1] and normalize: (pixel/255 - 0.5) / 0.5
pub fn pixel_values(image: &DynamicImage) -> Array4<f32> {
    let size = TROCR_INPUT_SIZE;
    let rgb = if image.width() == size && image.height() == size {
        image.to_rgb8()
    } else {
        image
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8()
    };

    let side = size as usize;
    let mut tensor = Array4::zeros((1, 3, side, side));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 / 255.0 - MEAN) / STD;
        }
    }

    tensor
}
