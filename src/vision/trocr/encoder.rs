// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! TrOCR vision encoder
//!
//! Runs the ViT encoder once per page and returns `last_hidden_state`,
//! which every decoder step then attends over.

use anyhow::{Context, Result};
use ndarray::{Array3, Array4, Ix3};
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::preprocessing::TROCR_INPUT_SIZE;
use super::session::{build_resolved_session, DevicePreference, ExecutionDevice};

/// TrOCR vision encoder session
#[derive(Clone)]
pub struct TrOcrEncoder {
    /// ONNX Runtime session (`run` needs `&mut`)
    session: Arc<Mutex<Session>>,
    input_name: String,
    device: ExecutionDevice,
}

impl std::fmt::Debug for TrOcrEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrOcrEncoder")
            .field("input_name", &self.input_name)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl TrOcrEncoder {
    /// Load the encoder, resolving the device from a preference
    pub fn load(model_path: &Path, preference: DevicePreference) -> Result<Self> {
        info!("Loading TrOCR encoder from {}", model_path.display());
        let (session, device) = build_resolved_session(model_path, preference)
            .context("Failed to load TrOCR encoder")?;
        Ok(Self::from_session(session, device))
    }

    fn from_session(session: Session, device: ExecutionDevice) -> Self {
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "pixel_values".to_string());

        debug!("TrOCR encoder input: {}, device: {}", input_name, device);

        Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            device,
        }
    }

    pub fn device(&self) -> ExecutionDevice {
        self.device
    }

    /// Encode `[1, 3, 384, 384]` pixel values into `[1, seq_len, hidden]`
    pub fn encode(&self, pixel_values: &Array4<f32>) -> Result<Array3<f32>> {
        let shape = pixel_values.shape();
        let side = TROCR_INPUT_SIZE as usize;
        if shape != [1, 3, side, side] {
            anyhow::bail!(
                "Invalid pixel_values shape: {:?}, expected [1, 3, {}, {}]",
                shape,
                side,
                side
            );
        }

        let input_value = Value::from_array(pixel_values.to_owned())
            .context("Failed to create pixel_values tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("TrOCR encoder session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .context("Encoder inference failed")?;

        let hidden = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract last_hidden_state")?;

        debug!("Encoder output shape: {:?}", hidden.shape());

        let hidden = hidden
            .to_owned()
            .into_dimensionality::<Ix3>()
            .context("Encoder output is not [batch, seq_len, hidden]")?;

        Ok(hidden)
    }
}
