//! Analysis Configuration
//! Input/output locations, the averaging window and figure settings.
//! Every field has a default, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// One scatter figure: `y` against `x`, both columns of the merged table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureConfig {
    pub x: String,
    pub y: String,
    pub x_unit: String,
    pub y_unit: String,
    pub x_limits: (f64, f64),
    pub y_limits: (f64, f64),
    /// Draw the 1:1 line.
    #[serde(default)]
    pub origin_line: bool,
    #[serde(default)]
    pub title: String,
}

/// Output scale of the PNG figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub dpi: u32,
    pub facet_size_inches: f64,
    /// Marker area in pt^2 (matplotlib `s`).
    pub marker_area_pt2: f64,
    pub font_size_pt: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            dpi: 600,
            facet_size_inches: 3.0,
            marker_area_pt2: 25.0,
            font_size_pt: 9.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub data_dir: PathBuf,
    pub recharge_file: String,
    pub recharge_separator: char,
    pub domains_file: PathBuf,
    pub domains_separator: char,
    pub precipitation_prefix: String,
    pub decades: Vec<String>,
    pub precipitation_suffix: String,
    pub precipitation_variable: String,
    pub start_year: i32,
    pub end_year: i32,
    pub results_dir: PathBuf,
    pub regime_column: String,
    pub figures: Vec<FigureConfig>,
    pub render: RenderConfig,
    pub shuffle_seed: u64,
    pub log_level: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            recharge_file: "Recharge_data_Africa_BGS.csv".to_string(),
            recharge_separator: ';',
            domains_file: PathBuf::from("model_outputs/2b/aggregated/domains.csv"),
            domains_separator: ',',
            precipitation_prefix: "pr_gswp3-ewembi_".to_string(),
            decades: ["1971_1980", "1981_1990", "1991_2000", "2001_2010"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            precipitation_suffix: ".nc4".to_string(),
            precipitation_variable: "pr".to_string(),
            start_year: 1975,
            end_year: 2004,
            results_dir: PathBuf::from("results/macdonald"),
            regime_column: "domain_days_below_1_0.08_aridity_netrad".to_string(),
            figures: vec![
                FigureConfig {
                    x: "Precipitation GSWP3".to_string(),
                    y: "Groundwater recharge".to_string(),
                    x_unit: "mm/yr".to_string(),
                    y_unit: "mm/yr".to_string(),
                    x_limits: (-100.0, 3100.0),
                    y_limits: (-100.0, 2100.0),
                    origin_line: true,
                    title: String::new(),
                },
                FigureConfig {
                    x: "Net radiation".to_string(),
                    y: "Groundwater recharge".to_string(),
                    x_unit: "mm/yr".to_string(),
                    y_unit: "mm/yr".to_string(),
                    x_limits: (-100.0, 2100.0),
                    y_limits: (-100.0, 2100.0),
                    origin_line: false,
                    title: String::new(),
                },
            ],
            render: RenderConfig::default(),
            shuffle_seed: 42,
            log_level: "info".to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Read a JSON config; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_year > self.end_year {
            return Err(ConfigError::Invalid(format!(
                "start_year {} is after end_year {}",
                self.start_year, self.end_year
            )));
        }
        if self.decades.is_empty() {
            return Err(ConfigError::Invalid("no precipitation decades".to_string()));
        }
        if !self.recharge_separator.is_ascii() || !self.domains_separator.is_ascii() {
            return Err(ConfigError::Invalid("CSV separators must be ASCII".to_string()));
        }
        if self.render.dpi == 0 || self.render.facet_size_inches <= 0.0 {
            return Err(ConfigError::Invalid("figure size must be positive".to_string()));
        }
        for fig in &self.figures {
            if fig.x_limits.0 >= fig.x_limits.1 || fig.y_limits.0 >= fig.y_limits.1 {
                return Err(ConfigError::Invalid(format!(
                    "axis limits of '{} vs {}' are inverted",
                    fig.y, fig.x
                )));
            }
        }
        Ok(())
    }

    pub fn recharge_path(&self) -> PathBuf {
        self.data_dir.join(&self.recharge_file)
    }

    /// One file per decade, in configured order.
    pub fn precipitation_paths(&self) -> Vec<PathBuf> {
        self.decades
            .iter()
            .map(|decade| {
                self.data_dir.join(format!(
                    "{}{}{}",
                    self.precipitation_prefix, decade, self.precipitation_suffix
                ))
            })
            .collect()
    }
}
