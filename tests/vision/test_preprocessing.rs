// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Handwriting normalization through the public API

use fabstir_ocr_node::vision::preprocessing::{
    adaptive_threshold, fit_dimensions, pad_to_square, PreprocessConfigError,
};
use fabstir_ocr_node::vision::{normalize, PreprocessConfig};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

/// White page with a dark horizontal stroke across the middle
fn stroke_page(width: u32, height: u32) -> DynamicImage {
    let mut img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let (y0, y1) = (height / 2 - 10, height / 2 + 10);
    for y in y0..y1 {
        for x in width / 8..width - width / 8 {
            img.put_pixel(x, y, Rgb([10, 10, 10]));
        }
    }
    DynamicImage::ImageRgb8(img)
}

#[test]
fn test_wide_page_becomes_padded_binary_square() {
    let config = PreprocessConfig::default();
    let normalized = normalize(&stroke_page(800, 200), &config);
    let gray = normalized.as_gray();

    assert_eq!(normalized.side(), 384);
    assert_eq!(gray.dimensions(), (384, 384));
    assert!(gray.pixels().all(|p| p[0] == 0 || p[0] == 255));

    // 800x200 scales to 384x96, centered with 144 rows of padding above
    for y in 0..140 {
        for x in 0..384 {
            assert_eq!(gray.get_pixel(x, y)[0], 255, "padding at ({}, {})", x, y);
        }
    }
    assert!(gray.pixels().any(|p| p[0] == 0), "stroke edges must survive");
}

#[test]
fn test_custom_target_size() {
    let config = PreprocessConfig::new(128, 7, 4).unwrap();
    let normalized = normalize(&stroke_page(100, 300), &config);

    assert_eq!(normalized.side(), 128);
    assert_eq!(normalized.into_dynamic().to_luma8().dimensions(), (128, 128));
}

#[test]
fn test_blank_page_stays_white() {
    let blank = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 70, Rgb([255, 255, 255])));
    let normalized = normalize(&blank, &PreprocessConfig::default());

    assert!(normalized.as_gray().pixels().all(|p| p[0] == 255));
}

#[test]
fn test_invalid_parameters_rejected() {
    assert_eq!(
        PreprocessConfig::new(0, 11, 2),
        Err(PreprocessConfigError::ZeroTargetSize)
    );
    assert_eq!(
        PreprocessConfig::new(384, 10, 2),
        Err(PreprocessConfigError::InvalidBlockSize(10))
    );
    assert_eq!(
        PreprocessConfig::new(384, 1, 2),
        Err(PreprocessConfigError::InvalidBlockSize(1))
    );
}

#[test]
fn test_fit_dimensions_keeps_aspect() {
    assert_eq!(fit_dimensions(800, 200, 384), (384, 96));
    assert_eq!(fit_dimensions(200, 800, 384), (96, 384));
    assert_eq!(fit_dimensions(384, 384, 384), (384, 384));
    assert_eq!(fit_dimensions(5000, 1, 384), (384, 1));
}

#[test]
fn test_threshold_marks_dark_dot_on_light_background() {
    let mut gray = GrayImage::from_pixel(21, 21, Luma([200]));
    gray.put_pixel(10, 10, Luma([40]));

    let out = adaptive_threshold(&gray, 11, 2);

    assert_eq!(out.get_pixel(10, 10)[0], 0);
    assert_eq!(out.get_pixel(0, 0)[0], 255);
    assert_eq!(out.get_pixel(20, 20)[0], 255);
}

#[test]
fn test_small_square_keeps_its_pixels() {
    let mut img = RgbImage::from_pixel(60, 60, Rgb([255, 255, 255]));
    img.put_pixel(30, 30, Rgb([10, 10, 10]));

    let normalized = normalize(&DynamicImage::ImageRgb8(img), &PreprocessConfig::default());
    let gray = normalized.as_gray();

    // Pasted 1:1 at offset 162, so the dot stays a single sharp pixel
    let black: Vec<(u32, u32)> = gray
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] == 0)
        .map(|(x, y, _)| (x, y))
        .collect();
    assert_eq!(black, vec![(192, 192)]);
}

#[test]
fn test_normalize_matches_imageproc_threshold() {
    let page = stroke_page(640, 260);
    let config = PreprocessConfig::new(256, 5, 3).unwrap();

    let padded = pad_to_square(&page.to_luma8(), 256);
    let expected = imageproc::contrast::adaptive_threshold(&padded, 2, 3);

    assert_eq!(normalize(&page, &config).as_gray(), &expected);
}
