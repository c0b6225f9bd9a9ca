//! Recharge Analysis - groundwater recharge vs. climate
//!
//! Matches BGS Africa recharge observations to model grid cells, merges a
//! GSWP3 precipitation climatology and plots recharge against precipitation
//! and net radiation by climate regime.
//!
//! Usage: `recharge_analysis [config.json]`

mod charts;
mod config;
mod data;
mod pipeline;
mod stats;

use anyhow::Context;
use config::AnalysisConfig;
use pipeline::AnalysisPipeline;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            let path = PathBuf::from(path);
            AnalysisConfig::from_file(&path)
                .with_context(|| format!("loading config {}", path.display()))?
        }
        None => AnalysisConfig::default(),
    };

    // Initialize logging
    let level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let summary = match AnalysisPipeline::new(config).run() {
        Ok(summary) => summary,
        Err(e) => {
            error!("analysis failed: {:#}", e);
            return Err(e);
        }
    };

    info!(
        observations = summary.observations,
        dropped = summary.dropped_observations,
        matched = summary.matched,
        max_distance = summary.max_distance,
        grid_cells = summary.grid_cells,
        years = summary.years_averaged,
        merged_rows = summary.merged_rows,
        labelled = summary.counts.total,
        figures = summary.figures.len(),
        "analysis complete"
    );
    Ok(())
}
