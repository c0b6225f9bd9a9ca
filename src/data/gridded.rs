//! Gridded Precipitation Module
//! Reads daily precipitation reanalysis from NetCDF and reduces it to a
//! multi-year mean of annual sums per grid cell.

use crate::data::cftime::CfTimeError;
use polars::prelude::*;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::Path;
use thiserror::Error;

/// Flux (kg m-2 s-1) summed over daily steps to mm per year.
pub const SECONDS_PER_DAY: f64 = 86400.0;

/// Time steps read from a file per request.
const CHUNK_STEPS: usize = 64;

#[derive(Error, Debug)]
pub enum GriddedError {
    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),
    #[error("Time axis error: {0}")]
    Time(#[from] CfTimeError),
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error("Input file not found: {0}")]
    NotFound(String),
    #[error("Missing variable '{0}'")]
    MissingVariable(String),
    #[error("Unexpected layout of '{variable}': {details}")]
    Layout { variable: String, details: String },
    #[error("Grid of {0} differs from previously read files")]
    GridMismatch(String),
    #[error("No precipitation data in {start}-{end}")]
    EmptyWindow { start: i32, end: i32 },
    #[cfg(not(feature = "netcdf"))]
    #[error("Built without NetCDF support")]
    FeatureDisabled,
}

/// A block of consecutive daily fields on a regular lat/lon grid.
///
/// `values` is laid out `[time][lat][lon]`; missing values are NaN.
#[derive(Debug, Clone)]
pub struct DailyField {
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub years: Vec<i32>,
    pub values: Vec<f64>,
}

impl DailyField {
    pub fn cell_count(&self) -> usize {
        self.lats.len() * self.lons.len()
    }
}

/// Per-cell annual sums, accumulated over any number of files.
#[derive(Debug, Default)]
pub struct AnnualAccumulator {
    lats: Vec<f64>,
    lons: Vec<f64>,
    /// year -> sum of valid steps per cell
    years: BTreeMap<i32, Vec<f64>>,
}

impl AnnualAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Years seen so far.
    pub fn years(&self) -> Vec<i32> {
        self.years.keys().copied().collect()
    }

    /// Add a block of daily fields. Steps of the same year add up even when
    /// they come from different files.
    pub fn add_field(&mut self, field: &DailyField, source: &str) -> Result<(), GriddedError> {
        let n_cells = field.cell_count();
        if field.values.len() != field.years.len() * n_cells {
            return Err(GriddedError::Layout {
                variable: source.to_string(),
                details: format!(
                    "{} values for {} steps of {} cells",
                    field.values.len(),
                    field.years.len(),
                    n_cells
                ),
            });
        }

        if self.lats.is_empty() && self.lons.is_empty() {
            self.lats = field.lats.clone();
            self.lons = field.lons.clone();
        } else if !same_axis(&self.lats, &field.lats) || !same_axis(&self.lons, &field.lons) {
            return Err(GriddedError::GridMismatch(source.to_string()));
        }

        for (step, &year) in field.years.iter().enumerate() {
            let sums = self.years.entry(year).or_insert_with(|| vec![0.0; n_cells]);
            let slice = &field.values[step * n_cells..(step + 1) * n_cells];

            sums.par_iter_mut()
                .zip(slice.par_iter())
                .filter(|(_, v)| v.is_finite())
                .for_each(|(sum, &v)| *sum += v);
        }
        Ok(())
    }

    /// Multi-year mean of the annual sums for the years in `window`.
    ///
    /// Missing steps are skipped in the annual sums, so a cell-year without
    /// any valid step counts as 0 and every year in the window enters every
    /// cell's mean. All grid cells are kept.
    pub fn climatology(&self, window: RangeInclusive<i32>) -> Result<PrecipitationClimatology, GriddedError> {
        let selected: Vec<&Vec<f64>> = self
            .years
            .range(window.clone())
            .map(|(_, sums)| sums)
            .collect();
        if selected.is_empty() {
            return Err(GriddedError::EmptyWindow {
                start: *window.start(),
                end: *window.end(),
            });
        }

        let n_lon = self.lons.len();
        let n_years = selected.len() as f64;
        let cells: Vec<GridCellValue> = (0..self.lats.len() * n_lon)
            .into_par_iter()
            .map(|cell| GridCellValue {
                lat: self.lats[cell / n_lon],
                lon: self.lons[cell % n_lon],
                value: selected.iter().map(|sums| sums[cell]).sum::<f64>() / n_years,
            })
            .collect();

        Ok(PrecipitationClimatology {
            years: selected.len(),
            cells,
        })
    }
}

fn same_axis(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-9)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCellValue {
    pub lat: f64,
    pub lon: f64,
    /// Mean annual sum of the raw flux.
    pub value: f64,
}

/// Multi-year mean precipitation per grid cell.
#[derive(Debug, Clone)]
pub struct PrecipitationClimatology {
    /// Number of years averaged.
    pub years: usize,
    pub cells: Vec<GridCellValue>,
}

impl PrecipitationClimatology {
    /// Columns: lat, lon, pr (raw units), pr_gswp3 (mm/yr).
    pub fn to_dataframe(&self) -> Result<DataFrame, GriddedError> {
        let lats: Vec<f64> = self.cells.iter().map(|c| c.lat).collect();
        let lons: Vec<f64> = self.cells.iter().map(|c| c.lon).collect();
        let pr: Vec<f64> = self.cells.iter().map(|c| c.value).collect();
        // kg m-2 s-1 -> m/s (0.001) -> mm (1000), per day
        let pr_mm: Vec<f64> = pr.iter().map(|v| v * SECONDS_PER_DAY * 0.001 * 1000.0).collect();

        let df = DataFrame::new(vec![
            Column::new("lat".into(), lats),
            Column::new("lon".into(), lons),
            Column::new("pr".into(), pr),
            Column::new("pr_gswp3".into(), pr_mm),
        ])?;
        Ok(df)
    }
}

/// Reads daily precipitation files chunk by chunk into an accumulator.
pub struct PrecipitationReader {
    variable: String,
}

impl PrecipitationReader {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }

    /// Stream one file into `acc`, skipping chunks entirely outside `window`.
    ///
    /// Returns the number of time steps accumulated.
    #[cfg(feature = "netcdf")]
    pub fn accumulate_file(
        &self,
        path: &Path,
        acc: &mut AnnualAccumulator,
        window: &RangeInclusive<i32>,
    ) -> Result<usize, GriddedError> {
        use crate::data::cftime::{CfCalendar, CfTimeUnits};
        use tracing::debug;

        if !path.is_file() {
            return Err(GriddedError::NotFound(path.display().to_string()));
        }
        let file = netcdf::open(path)?;
        let var = file
            .variable(&self.variable)
            .ok_or_else(|| GriddedError::MissingVariable(self.variable.clone()))?;

        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let (lat_dim, lon_dim, lon_first) = match dims.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            [_, lat, lon] if is_lat(lat) && is_lon(lon) => (lat.to_string(), lon.to_string(), false),
            [_, lon, lat] if is_lat(lat) && is_lon(lon) => (lat.to_string(), lon.to_string(), true),
            _ => {
                return Err(GriddedError::Layout {
                    variable: self.variable.clone(),
                    details: format!("dimensions {:?}, expected (time, lat, lon)", dims),
                })
            }
        };

        let lats = read_axis(&file, &lat_dim, &["lat", "latitude"])?;
        let lons = read_axis(&file, &lon_dim, &["lon", "longitude"])?;
        let (nt, n1, n2) = (shape[0], shape[1], shape[2]);

        let time_var = file
            .variable("time")
            .ok_or_else(|| GriddedError::MissingVariable("time".to_string()))?;
        let times: Vec<f64> = time_var.get_values(..)?;
        let units = string_attribute(&time_var, "units")?
            .ok_or_else(|| GriddedError::MissingVariable("time:units".to_string()))?;
        let calendar = CfCalendar::parse(&string_attribute(&time_var, "calendar")?.unwrap_or_default())?;
        let units = CfTimeUnits::parse(&units, calendar)?;
        let years = times
            .iter()
            .map(|t| units.year_of(*t))
            .collect::<Result<Vec<i32>, _>>()?;
        if years.len() != nt {
            return Err(GriddedError::Layout {
                variable: "time".to_string(),
                details: format!("{} time values for {} steps", years.len(), nt),
            });
        }

        let fills: Vec<f64> = ["_FillValue", "missing_value"]
            .iter()
            .filter_map(|name| numeric_attribute(&var, name).transpose())
            .collect::<Result<_, _>>()?;

        let mut accumulated = 0;
        let mut start = 0;
        while start < nt {
            let end = (start + CHUNK_STEPS).min(nt);
            let chunk_years = &years[start..end];
            if !chunk_years.iter().any(|y| window.contains(y)) {
                start = end;
                continue;
            }

            let raw: Vec<f64> = var.get_values([start..end, 0..n1, 0..n2])?;
            let mut values: Vec<f64> = raw
                .into_iter()
                .map(|v| {
                    if v.is_finite() && v.abs() < 1.0e30 && !fills.contains(&v) {
                        v
                    } else {
                        f64::NAN
                    }
                })
                .collect();
            if lon_first {
                values = transpose_steps(&values, end - start, n1, n2);
            }

            acc.add_field(
                &DailyField {
                    lats: lats.clone(),
                    lons: lons.clone(),
                    years: chunk_years.to_vec(),
                    values,
                },
                &path.display().to_string(),
            )?;
            accumulated += end - start;
            start = end;
        }

        debug!(file = %path.display(), steps = nt, accumulated, "read precipitation file");
        Ok(accumulated)
    }

    #[cfg(not(feature = "netcdf"))]
    pub fn accumulate_file(
        &self,
        path: &Path,
        _acc: &mut AnnualAccumulator,
        _window: &RangeInclusive<i32>,
    ) -> Result<usize, GriddedError> {
        let _ = (&self.variable, path);
        Err(GriddedError::FeatureDisabled)
    }
}

#[cfg(feature = "netcdf")]
fn is_lat(name: &str) -> bool {
    matches!(name, "lat" | "latitude" | "y")
}

#[cfg(feature = "netcdf")]
fn is_lon(name: &str) -> bool {
    matches!(name, "lon" | "longitude" | "x")
}

#[cfg(feature = "netcdf")]
/// Coordinate variable named after its dimension, else the first alias found.
fn read_axis(file: &netcdf::File, dim: &str, aliases: &[&str]) -> Result<Vec<f64>, GriddedError> {
    for name in std::iter::once(&dim).chain(aliases) {
        if let Some(var) = file.variable(name) {
            return Ok(var.get_values(..)?);
        }
    }
    Err(GriddedError::MissingVariable(format!("{}|{}", dim, aliases.join("|"))))
}

#[cfg(feature = "netcdf")]
fn string_attribute(var: &netcdf::Variable, name: &str) -> Result<Option<String>, GriddedError> {
    match var.attribute(name) {
        Some(attr) => match attr.value()? {
            netcdf::AttributeValue::Str(s) => Ok(Some(s)),
            _ => Ok(None),
        },
        None => Ok(None),
    }
}

#[cfg(feature = "netcdf")]
fn numeric_attribute(var: &netcdf::Variable, name: &str) -> Result<Option<f64>, GriddedError> {
    use netcdf::AttributeValue;

    let Some(attr) = var.attribute(name) else {
        return Ok(None);
    };
    Ok(match attr.value()? {
        AttributeValue::Float(v) => Some(v as f64),
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Short(v) => Some(v as f64),
        AttributeValue::Int(v) => Some(v as f64),
        _ => None,
    })
}

/// `[time][lon][lat]` -> `[time][lat][lon]`
#[cfg_attr(not(feature = "netcdf"), allow(dead_code))]
fn transpose_steps(values: &[f64], steps: usize, n_lon: usize, n_lat: usize) -> Vec<f64> {
    let n_cells = n_lon * n_lat;
    let mut out = vec![f64::NAN; values.len()];
    for t in 0..steps {
        for i in 0..n_lon {
            for j in 0..n_lat {
                out[t * n_cells + j * n_lon + i] = values[t * n_cells + i * n_lat + j];
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(years: Vec<i32>, per_step: Vec<Vec<f64>>) -> DailyField {
        DailyField {
            lats: vec![10.25, 10.75],
            lons: vec![0.25],
            years,
            values: per_step.into_iter().flatten().collect(),
        }
    }

    #[test]
    fn test_constant_flux_climatology() {
        let flux = 1.0 / SECONDS_PER_DAY; // 1 mm/day
        let mut acc = AnnualAccumulator::new();
        let years: Vec<i32> = std::iter::repeat(1975)
            .take(365)
            .chain(std::iter::repeat(1976).take(366))
            .collect();
        let steps = vec![vec![flux, flux]; years.len()];
        acc.add_field(&field(years, steps), "test").unwrap();

        let clim = acc.climatology(1975..=1976).unwrap();
        assert_eq!(clim.years, 2);
        assert_eq!(clim.cells.len(), 2);

        let df = clim.to_dataframe().unwrap();
        let mm = df.column("pr_gswp3").unwrap().f64().unwrap().get(0).unwrap();
        assert!((mm - 365.5).abs() < 1e-9);
    }

    #[test]
    fn test_window_and_missing_cells() {
        let mut acc = AnnualAccumulator::new();
        // second cell has no data at all, 1974 lies outside the window
        acc.add_field(
            &field(
                vec![1974, 1975, 1975, 1976],
                vec![
                    vec![100.0, f64::NAN],
                    vec![1.0, f64::NAN],
                    vec![2.0, f64::NAN],
                    vec![5.0, f64::NAN],
                ],
            ),
            "a",
        )
        .unwrap();

        let clim = acc.climatology(1975..=2004).unwrap();
        assert_eq!(clim.years, 2);
        assert_eq!(clim.cells.len(), 2);
        assert_eq!(clim.cells[0].lat, 10.25);
        assert!((clim.cells[0].value - 4.0).abs() < 1e-12);
        assert_eq!(clim.cells[1].value, 0.0);

        assert!(matches!(
            acc.climatology(1990..=1995),
            Err(GriddedError::EmptyWindow { .. })
        ));
    }

    #[test]
    fn test_gap_year_counts_as_zero() {
        let mut acc = AnnualAccumulator::new();
        acc.add_field(
            &field(
                vec![1975, 1976],
                vec![vec![2.0, f64::NAN], vec![f64::NAN, f64::NAN]],
            ),
            "gap",
        )
        .unwrap();

        let clim = acc.climatology(1975..=1976).unwrap();
        assert_eq!(clim.cells.len(), 2);
        assert_eq!(clim.cells[0].value, 1.0);
        assert_eq!(clim.cells[1].value, 0.0);

        let df = clim.to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("pr_gswp3").unwrap().f64().unwrap().get(1), Some(0.0));
    }

    #[test]
    fn test_year_split_across_files_adds_up() {
        let mut acc = AnnualAccumulator::new();
        acc.add_field(&field(vec![1980], vec![vec![1.0, 1.0]]), "a").unwrap();
        acc.add_field(&field(vec![1980], vec![vec![2.0, 3.0]]), "b").unwrap();
        assert_eq!(acc.years(), vec![1980]);

        let clim = acc.climatology(1980..=1980).unwrap();
        assert_eq!(clim.cells[0].value, 3.0);
        assert_eq!(clim.cells[1].value, 4.0);
    }

    #[test]
    fn test_grid_mismatch_is_rejected() {
        let mut acc = AnnualAccumulator::new();
        acc.add_field(&field(vec![1980], vec![vec![1.0, 1.0]]), "a").unwrap();

        let mut other = field(vec![1981], vec![vec![1.0, 1.0]]);
        other.lons = vec![0.75];
        assert!(matches!(
            acc.add_field(&other, "b"),
            Err(GriddedError::GridMismatch(_))
        ));

        let mut short = field(vec![1981], vec![vec![1.0]]);
        short.values.truncate(1);
        assert!(matches!(acc.add_field(&short, "c"), Err(GriddedError::Layout { .. })));
    }

    #[test]
    fn test_transpose_steps() {
        // one step, 2 lons x 3 lats stored lon-major
        let lon_major = vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0];
        let lat_major = transpose_steps(&lon_major, 1, 2, 3);
        assert_eq!(lat_major, vec![0.0, 10.0, 1.0, 11.0, 2.0, 12.0]);
    }
}

#[cfg(all(test, feature = "netcdf"))]
mod netcdf_tests {
    use super::*;
    use tempfile::tempdir;

    /// Daily file with `pr` on `(time, dims[0], dims[1])`; time in days since `origin`.
    fn write_file(
        path: &Path,
        dims: [(&str, &[f64]); 2],
        origin: &str,
        values: &[f64],
        attrs: &[(&str, f64)],
    ) {
        let cells = dims[0].1.len() * dims[1].1.len();
        let steps = values.len() / cells;

        let mut file = netcdf::create(path).unwrap();
        file.add_dimension("time", steps).unwrap();
        for (name, axis) in dims {
            file.add_dimension(name, axis.len()).unwrap();
        }
        for (name, axis) in dims {
            let mut var = file.add_variable::<f64>(name, &[name]).unwrap();
            var.put_values(axis, ..).unwrap();
        }
        {
            let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
            time.put_attribute("units", format!("days since {}", origin)).unwrap();
            time.put_attribute("calendar", "noleap").unwrap();
            let offsets: Vec<f64> = (0..steps).map(|d| d as f64).collect();
            time.put_values(&offsets, ..).unwrap();
        }
        let mut pr = file
            .add_variable::<f64>("pr", &["time", dims[0].0, dims[1].0])
            .unwrap();
        for (name, value) in attrs {
            pr.put_attribute(name, *value).unwrap();
        }
        pr.put_values(values, ..).unwrap();
    }

    #[test]
    fn test_fill_and_huge_values_are_masked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pr_fill.nc4");
        // two steps, cells [lon 0.25, lon 0.75]
        write_file(
            &path,
            [("lat", &[10.25]), ("lon", &[0.25, 0.75])],
            "1975-01-01",
            &[-999.0, -888.0, 3.0, 5.0e30],
            &[("_FillValue", -999.0), ("missing_value", -888.0)],
        );

        let mut acc = AnnualAccumulator::new();
        let steps = PrecipitationReader::new("pr")
            .accumulate_file(&path, &mut acc, &(1975..=1975))
            .unwrap();
        assert_eq!(steps, 2);

        let clim = acc.climatology(1975..=1975).unwrap();
        assert_eq!(clim.cells.len(), 2);
        assert_eq!(clim.cells[0].value, 3.0);
        assert_eq!(clim.cells[1].value, 0.0);
    }

    #[test]
    fn test_lon_major_layout_is_transposed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pr_lon_major.nc4");
        let lons = [0.25, 0.75];
        let lats = [10.25, 10.75, 11.25];
        // value = 10 * lon index + lat index, stored [lon][lat]
        let values: Vec<f64> = (0..2)
            .flat_map(|i| (0..3).map(move |j| (10 * i + j) as f64))
            .collect();
        write_file(
            &path,
            [("longitude", &lons), ("latitude", &lats)],
            "1980-01-01",
            &values,
            &[],
        );

        let mut acc = AnnualAccumulator::new();
        PrecipitationReader::new("pr")
            .accumulate_file(&path, &mut acc, &(1980..=1980))
            .unwrap();
        let clim = acc.climatology(1980..=1980).unwrap();

        assert_eq!(clim.cells.len(), 6);
        for cell in &clim.cells {
            let i = lons.iter().position(|l| *l == cell.lon).unwrap();
            let j = lats.iter().position(|l| *l == cell.lat).unwrap();
            assert_eq!(cell.value, (10 * i + j) as f64);
        }
        // lat-major order
        assert_eq!((clim.cells[1].lat, clim.cells[1].lon), (10.25, 0.75));
    }

    #[test]
    fn test_chunks_outside_window_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pr_window.nc4");
        // 1974 and 1975 in a noleap calendar on a (time, y, x) grid
        let values = vec![1.0; 730];
        write_file(&path, [("y", &[10.25]), ("x", &[0.25])], "1974-01-01", &values, &[]);

        let mut acc = AnnualAccumulator::new();
        let steps = PrecipitationReader::new("pr")
            .accumulate_file(&path, &mut acc, &(1975..=1975))
            .unwrap();

        // five whole chunks of 1974 (320 steps) are never read
        assert_eq!(steps, 730 - 5 * CHUNK_STEPS);
        assert_eq!(acc.years(), vec![1974, 1975]);

        let clim = acc.climatology(1975..=1975).unwrap();
        assert_eq!(clim.cells[0].value, 365.0);
        assert_eq!((clim.cells[0].lat, clim.cells[0].lon), (10.25, 0.25));
    }

    #[test]
    fn test_missing_file() {
        let mut acc = AnnualAccumulator::new();
        let result = PrecipitationReader::new("pr").accumulate_file(
            Path::new("/nonexistent/pr.nc4"),
            &mut acc,
            &(1975..=2004),
        );
        assert!(matches!(result, Err(GriddedError::NotFound(_))));
    }
}
