//! Chart Plotter Module
//! Turns merged-table points into a drawable scatter figure: one series per
//! climate regime, a randomised draw order and rank-correlation labels.

use crate::config::FigureConfig;
use crate::data::processor::ScatterPoint;
use crate::data::regime::ClimateRegime;
use crate::stats::{Correlation, StatsCalculator};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::warn;

/// Legend/annotation entry for one regime.
#[derive(Debug, Clone)]
pub struct RegimeSeries {
    pub regime: ClimateRegime,
    pub count: usize,
    pub spearman: Option<Correlation>,
}

impl RegimeSeries {
    /// Text drawn next to the scatter, e.g. `ρs = 0.52 (n=31)`.
    pub fn annotation(&self) -> String {
        match &self.spearman {
            Some(c) => format!("ρs = {:.2} (n={})", c.r, c.n),
            None => format!("ρs = n/a (n={})", self.count),
        }
    }
}

/// A point ready to draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedPoint {
    pub x: f64,
    pub y: f64,
    pub regime: ClimateRegime,
}

/// Everything the renderer needs for one figure.
#[derive(Debug, Clone)]
pub struct ScatterFigure {
    pub config: FigureConfig,
    /// Regimes present, in regime order.
    pub series: Vec<RegimeSeries>,
    /// Draw order.
    pub points: Vec<PlacedPoint>,
    /// Points without a known regime.
    pub skipped: usize,
}

impl ScatterFigure {
    pub fn x_label(&self) -> String {
        format!("{} [{}]", self.config.x, self.config.x_unit)
    }

    pub fn y_label(&self) -> String {
        format!("{} [{}]", self.config.y, self.config.y_unit)
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}_scatterplot_MacDonald.png", self.config.x, self.config.y)
    }
}

/// Assembles scatter figures.
pub struct ChartPlotter;

impl ChartPlotter {
    /// Group points by regime and fix a reproducible random draw order, so
    /// that no regime is systematically painted over another.
    pub fn build_figure(config: &FigureConfig, points: &[ScatterPoint], seed: u64) -> ScatterFigure {
        let mut placed: Vec<PlacedPoint> = Vec::with_capacity(points.len());
        let mut skipped = 0;
        for p in points {
            match p.regime.as_deref().and_then(ClimateRegime::from_label) {
                Some(regime) => placed.push(PlacedPoint { x: p.x, y: p.y, regime }),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(figure = %config.x, skipped, "points without a known climate regime are not drawn");
        }

        let series = ClimateRegime::ALL
            .iter()
            .filter_map(|&regime| {
                let (xs, ys): (Vec<f64>, Vec<f64>) = placed
                    .iter()
                    .filter(|p| p.regime == regime)
                    .map(|p| (p.x, p.y))
                    .unzip();
                (!xs.is_empty()).then(|| RegimeSeries {
                    regime,
                    count: xs.len(),
                    spearman: StatsCalculator::spearman(&xs, &ys),
                })
            })
            .collect();

        // Input row order depends on the merge; fix it before shuffling
        placed.sort_by(|a, b| {
            a.regime
                .cmp(&b.regime)
                .then(a.x.total_cmp(&b.x))
                .then(a.y.total_cmp(&b.y))
        });
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        placed.shuffle(&mut rng);

        ScatterFigure {
            config: config.clone(),
            series,
            points: placed,
            skipped,
        }
    }
}
