// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Startup construction of the shared recognizer

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::vision::read_api::{ReadApiClient, ReadApiConfig};
use crate::vision::recognizer::TextRecognizer;
use crate::vision::trocr::{ExecutionDevice, TrOcrConfig, TrOcrModel};

/// Which recognizer serves requests, chosen once at startup
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerBackend {
    /// Local TrOCR encoder-decoder
    TrOcr(TrOcrConfig),
    /// Remote Read API
    ReadApi(ReadApiConfig),
}

impl RecognizerBackend {
    pub fn label(&self) -> &'static str {
        match self {
            RecognizerBackend::TrOcr(_) => "trocr",
            RecognizerBackend::ReadApi(_) => "read-api",
        }
    }
}

/// Information about the loaded recognizer
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizerInfo {
    pub name: String,
    /// Execution device for local models, `None` for remote backends
    pub device: Option<ExecutionDevice>,
}

/// Owns the recognizer handle for the lifetime of the process.
///
/// Loading completes before the listener is bound; requests only ever
/// clone the `Arc`.
pub struct ModelManager {
    recognizer: Arc<dyn TextRecognizer>,
    info: RecognizerInfo,
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl ModelManager {
    /// Load the configured backend
    pub async fn load(backend: RecognizerBackend) -> Result<Self> {
        info!("Initializing {} recognizer", backend.label());

        match backend {
            RecognizerBackend::TrOcr(config) => {
                let model = tokio::task::spawn_blocking(move || TrOcrModel::load(&config))
                    .await
                    .context("TrOCR loading task panicked")??;
                let info = RecognizerInfo {
                    name: model.name().to_string(),
                    device: Some(model.device()),
                };
                info!("TrOCR recognizer loaded ({})", model.device());
                Ok(Self {
                    recognizer: Arc::new(model),
                    info,
                })
            }
            RecognizerBackend::ReadApi(config) => {
                let client =
                    ReadApiClient::new(config).context("Failed to build Read API client")?;
                Ok(Self::from_recognizer(Arc::new(client)))
            }
        }
    }

    /// Wrap an already constructed recognizer
    pub fn from_recognizer(recognizer: Arc<dyn TextRecognizer>) -> Self {
        let info = RecognizerInfo {
            name: recognizer.name().to_string(),
            device: None,
        };
        Self { recognizer, info }
    }

    pub fn recognizer(&self) -> Arc<dyn TextRecognizer> {
        Arc::clone(&self.recognizer)
    }

    pub fn info(&self) -> &RecognizerInfo {
        &self.info
    }
}
