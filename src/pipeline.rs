//! Analysis Pipeline
//! Runs the recharge analysis end to end: precipitation climatology,
//! nearest-domain join, merge, figures and regime counts.

use crate::charts::{ChartPlotter, ScatterRenderer};
use crate::config::AnalysisConfig;
use crate::data::gridded::PrecipitationClimatology;
use crate::data::{AnnualAccumulator, CoordinateColumns, DataLoader, DataProcessor, PrecipitationReader};
use crate::stats::RegimeCounts;
use anyhow::{Context, Result};
use polars::prelude::DataFrame;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

const OBSERVATION_XY: CoordinateColumns<'static> = CoordinateColumns { x: "Long", y: "Lat" };
const DOMAIN_XY: CoordinateColumns<'static> = CoordinateColumns { x: "lon", y: "lat" };

/// Merged table plus the bookkeeping of how it was built.
#[derive(Debug)]
pub struct PreparedAnalysis {
    pub merged: DataFrame,
    pub observations: usize,
    pub dropped_observations: usize,
    pub matched: usize,
    pub max_distance: f64,
    pub grid_cells: usize,
    pub years_averaged: usize,
}

#[derive(Debug)]
pub struct AnalysisSummary {
    pub observations: usize,
    pub dropped_observations: usize,
    pub matched: usize,
    pub max_distance: f64,
    pub grid_cells: usize,
    pub years_averaged: usize,
    pub merged_rows: usize,
    pub figures: Vec<PathBuf>,
    pub counts: RegimeCounts,
}

pub struct AnalysisPipeline {
    config: AnalysisConfig,
}

impl AnalysisPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Run every step, write the figures and print the regime counts.
    pub fn run(&self) -> Result<AnalysisSummary> {
        let results_dir = &self.config.results_dir;
        fs::create_dir_all(results_dir)
            .with_context(|| format!("creating {}", results_dir.display()))?;

        let prepared = self.prepare()?;
        let figures = self.render_figures(&prepared.merged)?;
        let counts = self.regime_counts(&prepared.merged)?;

        println!("{}", counts);

        Ok(AnalysisSummary {
            observations: prepared.observations,
            dropped_observations: prepared.dropped_observations,
            matched: prepared.matched,
            max_distance: prepared.max_distance,
            grid_cells: prepared.grid_cells,
            years_averaged: prepared.years_averaged,
            merged_rows: prepared.merged.height(),
            figures,
            counts,
        })
    }

    /// Load all inputs and build the merged, renamed, regime-ordered table.
    pub fn prepare(&self) -> Result<PreparedAnalysis> {
        let climatology = self.load_precipitation()?;
        let mut precipitation = climatology.to_dataframe()?;
        info!(
            cells = climatology.cells.len(),
            years = climatology.years,
            "precipitation climatology ready"
        );

        let recharge_path = self.config.recharge_path();
        let observations = DataLoader::load_csv(&recharge_path, self.config.recharge_separator as u8)
            .with_context(|| format!("loading {}", recharge_path.display()))?;
        let domains = DataLoader::load_csv(&self.config.domains_file, self.config.domains_separator as u8)
            .with_context(|| format!("loading {}", self.config.domains_file.display()))?;
        info!(
            observations = observations.height(),
            domains = domains.height(),
            "tables loaded"
        );

        let join = DataProcessor::attach_nearest_domains(&observations, &domains, OBSERVATION_XY, DOMAIN_XY)?;
        info!(
            matched = join.matched,
            dropped = join.dropped,
            max_distance = join.max_distance,
            "observations matched to nearest domain cell"
        );

        let mut matched = join.table;
        DataProcessor::snap_coordinates(&mut matched, &["lat", "lon"])?;
        DataProcessor::snap_coordinates(&mut precipitation, &["lat", "lon"])?;

        let mut merged = DataProcessor::merge_on_coordinates(matched, precipitation)?;
        let renamed = DataProcessor::apply_display_names(&mut merged)?;
        debug!(?renamed, "display names applied");
        let merged = DataProcessor::order_by_regime(&merged, &self.config.regime_column)?;
        info!(rows = merged.height(), "merged table ready");

        Ok(PreparedAnalysis {
            merged,
            observations: observations.height(),
            dropped_observations: join.dropped,
            matched: join.matched,
            max_distance: join.max_distance,
            grid_cells: climatology.cells.len(),
            years_averaged: climatology.years,
        })
    }

    /// Annual sums of every decade file, averaged over the year window.
    pub fn load_precipitation(&self) -> Result<PrecipitationClimatology> {
        let window = self.config.start_year..=self.config.end_year;
        let reader = PrecipitationReader::new(&self.config.precipitation_variable);
        let mut acc = AnnualAccumulator::new();

        for path in self.config.precipitation_paths() {
            let steps = reader
                .accumulate_file(&path, &mut acc, &window)
                .with_context(|| format!("reading {}", path.display()))?;
            info!(file = %path.display(), steps, "precipitation file accumulated");
        }

        debug!(years = ?acc.years(), "annual sums accumulated");
        let climatology = acc.climatology(window)?;
        Ok(climatology)
    }

    /// One PNG per configured figure, written to the results directory.
    pub fn render_figures(&self, merged: &DataFrame) -> Result<Vec<PathBuf>> {
        let regime = &self.config.regime_column;
        let mut written = Vec::with_capacity(self.config.figures.len());

        for fig in &self.config.figures {
            let points = DataProcessor::scatter_points(merged, &fig.x, &fig.y, regime)?;
            let figure = ChartPlotter::build_figure(fig, &points, self.config.shuffle_seed);
            for series in &figure.series {
                if let Some(c) = series.spearman {
                    info!(
                        x = %fig.x,
                        y = %fig.y,
                        regime = %series.regime,
                        n = c.n,
                        rho = c.r,
                        p = c.p_value,
                        significant = c.is_significant,
                        "rank correlation"
                    );
                }
            }

            let path = self.config.results_dir.join(figure.file_name());
            ScatterRenderer::render_png(&figure, &self.config.render, &path)
                .with_context(|| format!("rendering {}", path.display()))?;
            info!(
                file = %path.display(),
                points = figure.points.len(),
                skipped = figure.skipped,
                "figure written"
            );
            written.push(path);
        }
        Ok(written)
    }

    /// Observations per climate regime.
    pub fn regime_counts(&self, merged: &DataFrame) -> Result<RegimeCounts> {
        let labels = DataProcessor::regime_labels(merged, &self.config.regime_column)?;
        Ok(RegimeCounts::from_labels(&self.config.regime_column, &labels))
    }
}
