// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use fabstir_ocr_node::{
    api::{start_server, AppState},
    config::ServiceConfig,
    vision::{pdfium_available, ModelManager},
};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting {}", fabstir_ocr_node::version::get_version_string());

    let config = ServiceConfig::parse()
        .validate()
        .context("Invalid service configuration")?;

    info!("Loading {} recognizer...", config.backend.label());
    let manager = ModelManager::load(config.backend.clone())
        .await
        .context("Failed to initialize recognizer")?;
    info!(
        "Recognizer ready: {} ({})",
        manager.info().name,
        manager
            .info()
            .device
            .map(|d| d.to_string())
            .unwrap_or_else(|| "remote".to_string())
    );

    pdfium_available();

    let state = AppState::new(&manager, &config);
    start_server(state, config.listen_addr).await
}
