// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! TrOCR handwriting recognizer
//!
//! Combines:
//! - Vision encoder (page raster to hidden states)
//! - Text decoder driven by beam search
//! - Tokenizer (token ids to text)

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::DynamicImage;
use ndarray::Array3;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::beam_search::{
    beam_search, log_softmax, BeamSearchConfig, Cancellable, StepScorer,
    DEFAULT_MAX_NEW_TOKENS, DEFAULT_NUM_BEAMS,
};
use super::decoder::TrOcrDecoder;
use super::encoder::TrOcrEncoder;
use super::preprocessing::pixel_values;
use super::session::{DevicePreference, ExecutionDevice};
use crate::vision::error::OcrError;
use crate::vision::recognizer::TextRecognizer;

pub const ENCODER_FILE: &str = "encoder_model.onnx";
pub const DECODER_FILE: &str = "decoder_model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const GENERATION_CONFIG_FILE: &str = "generation_config.json";

/// Local recognizer settings
#[derive(Debug, Clone, PartialEq)]
pub struct TrOcrConfig {
    pub model_dir: PathBuf,
    pub num_beams: usize,
    pub max_new_tokens: usize,
    pub device: DevicePreference,
}

impl Default for TrOcrConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./models/trocr-base-handwritten-onnx"),
            num_beams: DEFAULT_NUM_BEAMS,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            device: DevicePreference::Auto,
        }
    }
}

/// Special token ids from `generation_config.json`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub decoder_start_token_id: u32,
    pub eos_token_id: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            decoder_start_token_id: 2,
            eos_token_id: 2,
        }
    }
}

impl GenerationConfig {
    /// Read from the model directory, falling back to defaults when absent
    pub fn load(model_dir: &Path) -> Result<Self> {
        let path = model_dir.join(GENERATION_CONFIG_FILE);
        if !path.exists() {
            debug!("No {} found, using default token ids", GENERATION_CONFIG_FILE);
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

/// TrOCR encoder-decoder with beam search decoding
#[derive(Clone)]
pub struct TrOcrModel {
    encoder: TrOcrEncoder,
    decoder: TrOcrDecoder,
    tokenizer: Arc<Tokenizer>,
    search: BeamSearchConfig,
    model_dir: PathBuf,
}

impl std::fmt::Debug for TrOcrModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrOcrModel")
            .field("model_dir", &self.model_dir)
            .field("device", &self.encoder.device())
            .field("search", &self.search)
            .finish_non_exhaustive()
    }
}

impl TrOcrModel {
    /// Load encoder, decoder and tokenizer from `config.model_dir`
    ///
    /// Expected files:
    /// - encoder_model.onnx
    /// - decoder_model.onnx
    /// - tokenizer.json
    /// - generation_config.json (optional)
    pub fn load(config: &TrOcrConfig) -> Result<Self> {
        let model_dir = config.model_dir.as_path();
        if !model_dir.exists() {
            anyhow::bail!("TrOCR model directory not found: {}", model_dir.display());
        }

        info!("Loading TrOCR model from {}", model_dir.display());

        let tokenizer_path = model_dir.join(TOKENIZER_FILE);
        if !tokenizer_path.exists() {
            anyhow::bail!("TrOCR tokenizer not found: {}", tokenizer_path.display());
        }
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        let generation = GenerationConfig::load(model_dir)?;
        debug!("Generation config: {:?}", generation);

        let encoder = TrOcrEncoder::load(&model_dir.join(ENCODER_FILE), config.device)?;
        let device = encoder.device();
        let decoder = TrOcrDecoder::load(&model_dir.join(DECODER_FILE), device)?;

        let search = BeamSearchConfig {
            num_beams: config.num_beams,
            max_new_tokens: config.max_new_tokens,
            decoder_start_token_id: generation.decoder_start_token_id,
            eos_token_id: generation.eos_token_id,
            ..BeamSearchConfig::default()
        };

        info!(
            "TrOCR ready on {} ({} beams, max {} tokens)",
            device, search.num_beams, search.max_new_tokens
        );

        Ok(Self {
            encoder,
            decoder,
            tokenizer: Arc::new(tokenizer),
            search,
            model_dir: model_dir.to_path_buf(),
        })
    }

    pub fn device(&self) -> ExecutionDevice {
        self.encoder.device()
    }

    /// Recognize a single image on the calling thread
    pub fn recognize_blocking(&self, image: &DynamicImage) -> Result<String> {
        self.recognize_cancellable(image, Arc::new(AtomicBool::new(false)))
    }

    /// Like `recognize_blocking`, but gives up between decoder steps once
    /// `cancel` is set
    pub fn recognize_cancellable(
        &self,
        image: &DynamicImage,
        cancel: Arc<AtomicBool>,
    ) -> Result<String> {
        let start = Instant::now();

        let pixels = pixel_values(image);
        let hidden = self.encoder.encode(&pixels).context("Failed to encode image")?;

        let scorer = DecoderScorer {
            decoder: &self.decoder,
            encoder_hidden_states: &hidden,
        };
        let ids = beam_search(&mut Cancellable::new(scorer, cancel), &self.search)
            .context("Beam search failed")?;

        let text = self
            .tokenizer
            .decode(&ids, true)
            .map_err(|e| anyhow::anyhow!("Decoding failed: {}", e))?
            .trim()
            .to_string();

        debug!(
            "TrOCR generated {} tokens, {} chars in {}ms",
            ids.len(),
            text.len(),
            start.elapsed().as_millis()
        );

        Ok(text)
    }
}

/// Adapts the ONNX decoder to the beam search scorer interface
struct DecoderScorer<'a> {
    decoder: &'a TrOcrDecoder,
    encoder_hidden_states: &'a Array3<f32>,
}

impl StepScorer for DecoderScorer<'_> {
    fn log_probs(&mut self, sequences: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
        let logits = self
            .decoder
            .next_token_logits(self.encoder_hidden_states, sequences)?;
        Ok(logits.iter().map(|row| log_softmax(row)).collect())
    }
}

/// Raises the cancel flag when the awaiting future is dropped
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl TextRecognizer for TrOcrModel {
    async fn recognize(&self, image: DynamicImage) -> Result<String, OcrError> {
        let model = self.clone();
        let cancel = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(cancel.clone());

        tokio::task::spawn_blocking(move || model.recognize_cancellable(&image, cancel))
            .await
            .map_err(|e| OcrError::Inference(format!("inference task panicked: {}", e)))?
            .map_err(|e| OcrError::Inference(format!("{:#}", e)))
    }

    fn name(&self) -> &str {
        "trocr"
    }
}
