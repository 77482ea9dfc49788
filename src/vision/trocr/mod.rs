// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! TrOCR handwriting recognition (ONNX encoder-decoder)

pub mod beam_search;
pub mod decoder;
pub mod encoder;
pub mod model;
pub mod preprocessing;
pub mod session;

pub use beam_search::{beam_search, BeamSearchConfig, StepScorer};
pub use model::{GenerationConfig, TrOcrConfig, TrOcrModel};
pub use session::{DevicePreference, ExecutionDevice};
