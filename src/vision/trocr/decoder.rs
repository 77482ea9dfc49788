// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! TrOCR text decoder
//!
//! Scores the next token for a batch of partial sequences that all share
//! one encoder output. The exported decoder has no KV cache, so every step
//! re-feeds the full prefix of each beam.

use anyhow::{Context, Result};
use ndarray::{Array2, Array3, Axis};
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::session::{build_session, ExecutionDevice};

/// TrOCR decoder session
#[derive(Clone)]
pub struct TrOcrDecoder {
    session: Arc<Mutex<Session>>,
    device: ExecutionDevice,
}

impl std::fmt::Debug for TrOcrDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrOcrDecoder")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl TrOcrDecoder {
    pub fn load(model_path: &Path, device: ExecutionDevice) -> Result<Self> {
        info!("Loading TrOCR decoder from {}", model_path.display());
        let session = build_session(model_path, device).context("Failed to load TrOCR decoder")?;

        let input_names: Vec<_> = session.inputs.iter().map(|i| &i.name).collect();
        debug!("Decoder inputs: {:?}", input_names);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            device,
        })
    }

    /// Last-position logits for each sequence
    ///
    /// # Arguments
    /// - `encoder_hidden_states`: `[1, seq_len, hidden]` from the encoder
    /// - `sequences`: equal-length token prefixes, one per live beam
    ///
    /// # Returns
    /// One `vocab_size` logit vector per input sequence, in input order
    pub fn next_token_logits(
        &self,
        encoder_hidden_states: &Array3<f32>,
        sequences: &[Vec<u32>],
    ) -> Result<Vec<Vec<f32>>> {
        let batch = sequences.len();
        let seq_len = match sequences.first() {
            Some(first) => first.len(),
            None => return Ok(Vec::new()),
        };
        if seq_len == 0 || sequences.iter().any(|s| s.len() != seq_len) {
            anyhow::bail!("Decoder batch requires non-empty sequences of equal length");
        }

        let mut input_ids = Array2::<i64>::zeros((batch, seq_len));
        for (b, seq) in sequences.iter().enumerate() {
            for (t, &token) in seq.iter().enumerate() {
                input_ids[[b, t]] = token as i64;
            }
        }

        let (_, enc_len, hidden) = encoder_hidden_states.dim();
        let encoder_batch = encoder_hidden_states
            .broadcast((batch, enc_len, hidden))
            .context("Encoder output cannot be broadcast to the beam batch")?
            .to_owned();

        let ids_value = Value::from_array(input_ids).context("Failed to create input_ids tensor")?;
        let encoder_value = Value::from_array(encoder_batch)
            .context("Failed to create encoder_hidden_states tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("TrOCR decoder session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids_value,
                "encoder_hidden_states" => encoder_value
            ])
            .context("Decoder inference failed")?;

        let logits = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract logits")?;

        // [batch, seq_len, vocab]
        if logits.ndim() != 3 || logits.shape()[0] != batch || logits.shape()[1] == 0 {
            anyhow::bail!("Unexpected decoder logits shape: {:?}", logits.shape());
        }
        let last = logits.shape()[1] - 1;

        Ok((0..batch)
            .map(|b| {
                logits
                    .index_axis(Axis(0), b)
                    .index_axis(Axis(0), last)
                    .iter()
                    .copied()
                    .collect()
            })
            .collect())
    }
}
