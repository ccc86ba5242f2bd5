//! Gaze Reader - Main Entry Point

use std::path::PathBuf;

use anyhow::Context;
use reader::{init_logging, run, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("loading configuration")?;
    init_logging(config.level());

    info!("=== Gaze Reader v{} ===", env!("CARGO_PKG_VERSION"));

    let summary = run(config).await?;
    if !summary.tracking_enabled {
        info!("Gaze tracking was unavailable; document stays touch-scrollable");
    }
    Ok(())
}
