// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ONNX Runtime session construction and execution device resolution

use anyhow::{Context, Result};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Intra-op threads per session
const INTRA_THREADS: usize = 4;

/// Device requested by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// CUDA when the provider initializes, CPU otherwise
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            other => Err(format!(
                "unknown device '{}', expected auto, cpu or cuda",
                other
            )),
        }
    }
}

/// Device the sessions actually run on, fixed after loading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionDevice {
    Cpu,
    Cuda,
}

impl fmt::Display for ExecutionDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionDevice::Cpu => write!(f, "cpu"),
            ExecutionDevice::Cuda => write!(f, "cuda"),
        }
    }
}

/// Build a session on an explicit device
pub fn build_session(model_path: &Path, device: ExecutionDevice) -> Result<Session> {
    if !model_path.exists() {
        anyhow::bail!("ONNX model file not found: {}", model_path.display());
    }

    let builder = Session::builder().context("Failed to create session builder")?;

    let builder = match device {
        ExecutionDevice::Cpu => builder
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?,
        ExecutionDevice::Cuda => builder
            .with_execution_providers([CUDAExecutionProvider::default()
                .build()
                .error_on_failure()])
            .context("Failed to set CUDA execution provider")?,
    };

    builder
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(INTRA_THREADS)
        .context("Failed to set intra threads")?
        .commit_from_file(model_path)
        .context(format!(
            "Failed to load ONNX model from {}",
            model_path.display()
        ))
}

/// Build the first session of a model and settle the device for the rest.
///
/// `Auto` tries CUDA first and falls back to CPU; the returned device is then
/// used for every other session of the same model.
pub fn build_resolved_session(
    model_path: &Path,
    preference: DevicePreference,
) -> Result<(Session, ExecutionDevice)> {
    match preference {
        DevicePreference::Cpu => Ok((
            build_session(model_path, ExecutionDevice::Cpu)?,
            ExecutionDevice::Cpu,
        )),
        DevicePreference::Cuda => Ok((
            build_session(model_path, ExecutionDevice::Cuda)
                .context("CUDA was requested but could not be initialized")?,
            ExecutionDevice::Cuda,
        )),
        DevicePreference::Auto => match build_session(model_path, ExecutionDevice::Cuda) {
            Ok(session) => {
                info!("CUDA execution provider initialized");
                Ok((session, ExecutionDevice::Cuda))
            }
            Err(e) => {
                warn!("CUDA execution provider unavailable ({:#}), using CPU", e);
                Ok((
                    build_session(model_path, ExecutionDevice::Cpu)?,
                    ExecutionDevice::Cpu,
                ))
            }
        },
    }
}
