//! Stats module - Correlations and regime counts

mod calculator;

pub use calculator::{Correlation, RegimeCounts, StatsCalculator};
