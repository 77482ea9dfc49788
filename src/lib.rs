// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod version;
pub mod vision;

// Re-export main types
pub use api::{create_app, AppState};
pub use config::{AppConfig, ConfigError, ServiceConfig};
pub use vision::{
    DocumentKind, ModelManager, OcrError, OcrPipeline, RecognitionResult, RecognizerBackend,
    TextRecognizer,
};
