//! Data Processor Module
//! Joins observations to model domains and gridded precipitation, and
//! prepares the merged table for plotting.

use crate::data::loader::{DataLoader, LoaderError};
use crate::data::nearest::NearestIndex;
use crate::data::regime::ClimateRegime;
use polars::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

/// Source column -> display name, applied after merging.
pub const COLUMN_RENAMES: [(&str, &str); 8] = [
    ("LTA_P_mmpa", "Precipitation"),
    ("netrad_median", "Net radiation"),
    ("pr_median", "Precipitation ISIMIP"),
    ("pr_gswp3", "Precipitation GSWP3"),
    ("evap", "Actual Evapotranspiration"),
    ("qr", "Groundwater recharge ISIMIP"),
    ("qtot", "Total runoff"),
    ("Recharge_mmpa", "Groundwater recharge"),
];

pub const DISTANCE_COL: &str = "distance";
pub const SORT_HELPER_COL: &str = "sort_helper";

/// Decimal places kept when snapping coordinates before an exact merge.
const COORDINATE_DECIMALS: i32 = 6;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("Domain table has no rows with coordinates")]
    NoDomains,
    #[error("Column '{0}' not found")]
    MissingColumn(String),
}

/// Names of the x/y coordinate columns of a table.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateColumns<'a> {
    pub x: &'a str,
    pub y: &'a str,
}

/// Observations with their nearest domain cell attached.
#[derive(Debug)]
pub struct NearestJoin {
    pub table: DataFrame,
    pub matched: usize,
    /// Observations dropped for lack of coordinates.
    pub dropped: usize,
    pub max_distance: f64,
}

/// A plottable (x, y) pair with its climate regime label.
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub regime: Option<String>,
}

/// Handles joining, renaming and ordering of the analysis tables.
pub struct DataProcessor;

impl DataProcessor {
    /// Attach the nearest domain row (and its distance) to every observation.
    ///
    /// Domain columns whose names are already used by the observations get
    /// a `_domain` suffix.
    pub fn attach_nearest_domains(
        observations: &DataFrame,
        domains: &DataFrame,
        obs_xy: CoordinateColumns,
        domain_xy: CoordinateColumns,
    ) -> Result<NearestJoin, ProcessorError> {
        let obs_coords = DataLoader::coordinates(observations, obs_xy.x, obs_xy.y)?;
        let domain_coords = DataLoader::coordinates(domains, domain_xy.x, domain_xy.y)?;

        let index = NearestIndex::build(&domain_coords);
        if index.is_empty() {
            return Err(ProcessorError::NoDomains);
        }
        debug!(candidates = index.len(), "domain index built");

        let mask: Vec<bool> = obs_coords.iter().map(Option::is_some).collect();
        let dropped = mask.iter().filter(|keep| !**keep).count();
        let observations = if dropped > 0 {
            warn!(dropped, "observations without coordinates are not matched");
            observations.filter(&BooleanChunked::from_slice("mask".into(), &mask))?
        } else {
            observations.clone()
        };

        let queries: Vec<[f64; 2]> = obs_coords.into_iter().flatten().collect();
        let matches = index
            .nearest_all(&queries)
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(ProcessorError::NoDomains)?;

        let idx = IdxCa::from_vec(
            "idx".into(),
            matches.iter().map(|m| m.index as IdxSize).collect(),
        );
        let mut nearest = domains.take(&idx)?;

        let colliding: Vec<String> = nearest
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .filter(|name| DataLoader::has_column(&observations, name))
            .collect();
        for name in colliding {
            nearest.rename(&name, format!("{}_domain", name).into())?;
        }

        let distances: Vec<f64> = matches.iter().map(|m| m.distance).collect();
        let max_distance = distances.iter().copied().fold(0.0, f64::max);

        let mut table = observations.hstack(nearest.get_columns())?;
        table.with_column(Column::new(DISTANCE_COL.into(), distances))?;

        Ok(NearestJoin {
            table,
            matched: matches.len(),
            dropped,
            max_distance,
        })
    }

    /// Round coordinate columns so that values read from CSV and NetCDF
    /// compare equal in an exact merge. Absent columns are ignored.
    pub fn snap_coordinates(df: &mut DataFrame, columns: &[&str]) -> Result<(), ProcessorError> {
        let factor = 10f64.powi(COORDINATE_DECIMALS);
        for &name in columns {
            if !DataLoader::has_column(df, name) {
                continue;
            }
            let snapped: Vec<Option<f64>> = DataLoader::numeric_column(df, name)?
                .into_iter()
                .map(|v| v.map(|x| (x * factor).round() / factor))
                .collect();
            df.with_column(Column::new(name.into(), snapped))?;
        }
        Ok(())
    }

    /// Full outer merge on `lat` and `lon` with coalesced key columns.
    pub fn merge_on_coordinates(left: DataFrame, right: DataFrame) -> Result<DataFrame, ProcessorError> {
        for df in [&left, &right] {
            for key in ["lat", "lon"] {
                if !DataLoader::has_column(df, key) {
                    return Err(ProcessorError::MissingColumn(key.to_string()));
                }
            }
        }

        let merged = left
            .lazy()
            .join(
                right.lazy(),
                [col("lat"), col("lon")],
                [col("lat"), col("lon")],
                JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
            )
            .collect()?;
        Ok(merged)
    }

    /// Rename source columns to their display names.
    ///
    /// Returns the applied renames; absent columns are skipped.
    pub fn apply_display_names(df: &mut DataFrame) -> Result<Vec<(String, String)>, ProcessorError> {
        let mut applied = Vec::new();
        for (old, new) in COLUMN_RENAMES {
            if !DataLoader::has_column(df, old) {
                continue;
            }
            if DataLoader::has_column(df, new) {
                warn!(column = old, display = new, "display name already taken, keeping source name");
                continue;
            }
            df.rename(old, new.into())?;
            applied.push((old.to_string(), new.to_string()));
        }
        Ok(applied)
    }

    /// Sort rows by climate regime (wet warm, wet cold, dry cold, dry warm),
    /// keeping the input order within a regime. Rows without a known regime
    /// go last.
    pub fn order_by_regime(df: &DataFrame, regime_col: &str) -> Result<DataFrame, ProcessorError> {
        if !DataLoader::has_column(df, regime_col) {
            return Err(ProcessorError::MissingColumn(regime_col.to_string()));
        }
        let helper: Vec<Option<u32>> = DataLoader::string_column(df, regime_col)?
            .iter()
            .map(|label| {
                label
                    .as_deref()
                    .and_then(ClimateRegime::from_label)
                    .map(|r| r.sort_order())
            })
            .collect();

        let mut with_helper = df.clone();
        with_helper.with_column(Column::new(SORT_HELPER_COL.into(), helper))?;
        let sorted = with_helper.sort(
            [SORT_HELPER_COL],
            SortMultipleOptions::default()
                .with_nulls_last(true)
                .with_maintain_order(true),
        )?;
        Ok(sorted)
    }

    /// Rows where both `x` and `y` are finite, with their regime label.
    pub fn scatter_points(
        df: &DataFrame,
        x: &str,
        y: &str,
        regime_col: &str,
    ) -> Result<Vec<ScatterPoint>, ProcessorError> {
        let xs = DataLoader::numeric_column(df, x)?;
        let ys = DataLoader::numeric_column(df, y)?;
        let regimes = DataLoader::string_column(df, regime_col)?;

        Ok(xs
            .into_iter()
            .zip(ys)
            .zip(regimes)
            .filter_map(|((x, y), regime)| Some(ScatterPoint { x: x?, y: y?, regime }))
            .collect())
    }

    /// Non-null regime labels of all rows.
    pub fn regime_labels(df: &DataFrame, regime_col: &str) -> Result<Vec<String>, ProcessorError> {
        Ok(DataLoader::string_column(df, regime_col)?
            .into_iter()
            .flatten()
            .collect())
    }
}
