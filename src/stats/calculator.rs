//! Statistics Calculator Module
//! Correlation between recharge and its climate drivers, and regime counts.

use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::statistics::{Data, OrderStatistics, RankTieBreaker, Statistics};
use std::collections::HashMap;
use std::fmt;

/// Significance threshold for correlation tests
pub const SIGNIFICANCE_THRESHOLD: f64 = 0.05;

/// Correlation coefficient with its two-sided p-value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation {
    pub n: usize,
    pub r: f64,
    pub p_value: f64,
    pub is_significant: bool,
}

/// Handles statistical calculations.
pub struct StatsCalculator;

impl StatsCalculator {
    /// Pearson product-moment correlation.
    ///
    /// `None` for fewer than three pairs, mismatched lengths or a constant
    /// sample.
    pub fn pearson(x: &[f64], y: &[f64]) -> Option<Correlation> {
        let n = x.len();
        if n < 3 || n != y.len() {
            return None;
        }

        let sx = x.iter().std_dev();
        let sy = y.iter().std_dev();
        if !(sx > 0.0 && sy > 0.0) {
            return None;
        }

        let r = (x.iter().covariance(y.iter()) / (sx * sy)).clamp(-1.0, 1.0);
        let p_value = Self::correlation_p_value(r, n);
        Some(Correlation {
            n,
            r,
            p_value,
            is_significant: p_value <= SIGNIFICANCE_THRESHOLD,
        })
    }

    /// Spearman rank correlation (Pearson on average ranks).
    pub fn spearman(x: &[f64], y: &[f64]) -> Option<Correlation> {
        if x.len() != y.len() {
            return None;
        }
        let rx = Data::new(x.to_vec()).ranks(RankTieBreaker::Average);
        let ry = Data::new(y.to_vec()).ranks(RankTieBreaker::Average);
        Self::pearson(&rx, &ry)
    }

    /// Two-tailed p-value of `r` under the t-distribution with n - 2 dof.
    fn correlation_p_value(r: f64, n: usize) -> f64 {
        if r.abs() >= 1.0 {
            return 0.0;
        }
        let dof = (n - 2) as f64;
        let t = r * (dof / (1.0 - r * r)).sqrt();
        match StudentsT::new(0.0, 1.0, dof) {
            Ok(dist) => 2.0 * (1.0 - dist.cdf(t.abs())),
            Err(_) => f64::NAN,
        }
    }
}

/// Number of rows per climate regime, most frequent first.
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeCounts {
    pub column: String,
    pub entries: Vec<(String, usize)>,
    pub total: usize,
}

impl RegimeCounts {
    pub fn from_labels(column: &str, labels: &[String]) -> Self {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for label in labels {
            *counts.entry(label.as_str()).or_default() += 1;
        }

        let mut entries: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(label, count)| (label.to_string(), count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Self {
            column: column.to_string(),
            entries,
            total: labels.len(),
        }
    }

    /// Share of each regime in the same order as `entries`.
    pub fn fractions(&self) -> Vec<(String, f64)> {
        self.entries
            .iter()
            .map(|(label, count)| {
                let share = if self.total == 0 {
                    f64::NAN
                } else {
                    *count as f64 / self.total as f64
                };
                (label.clone(), share)
            })
            .collect()
    }

    fn label_width(&self) -> usize {
        self.entries.iter().map(|(l, _)| l.len()).max().unwrap_or(0)
    }
}

impl fmt::Display for RegimeCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.label_width();

        writeln!(f, "{}", self.column)?;
        for (label, count) in &self.entries {
            writeln!(f, "{:<width$}    {}", label, count, width = width)?;
        }
        writeln!(f, "count: {}", self.total)?;
        writeln!(f)?;

        writeln!(f, "{}", self.column)?;
        for (label, share) in self.fractions() {
            writeln!(f, "{:<width$}    {:.6}", label, share, width = width)?;
        }
        write!(f, "proportion")
    }
}
