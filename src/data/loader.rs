//! CSV Data Loader Module
//! Handles CSV file loading and column extraction using Polars.

use polars::prelude::*;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to load CSV: {0}")]
    CsvError(#[from] PolarsError),
    #[error("Input file not found: {0}")]
    NotFound(String),
    #[error("Column '{0}' not found")]
    MissingColumn(String),
}

/// Handles CSV file loading with Polars for high performance.
pub struct DataLoader;

impl DataLoader {
    /// Load a CSV file with the given field separator.
    pub fn load_csv(file_path: &Path, separator: u8) -> Result<DataFrame, LoaderError> {
        if !file_path.is_file() {
            return Err(LoaderError::NotFound(file_path.display().to_string()));
        }

        // Use lazy evaluation for memory efficiency, then collect
        let df = LazyCsvReader::new(file_path)
            .with_separator(separator)
            .with_has_header(true)
            .with_infer_schema_length(Some(10000))
            .with_ignore_errors(true)
            .finish()?
            .collect()?;

        debug!(
            file = %file_path.display(),
            rows = df.height(),
            numeric_columns = Self::get_numeric_columns(&df).len(),
            "loaded csv"
        );
        Ok(df)
    }

    /// Get list of numeric column names.
    pub fn get_numeric_columns(df: &DataFrame) -> Vec<String> {
        df.get_columns()
            .iter()
            .filter(|col| {
                matches!(
                    col.dtype(),
                    DataType::Float32
                        | DataType::Float64
                        | DataType::Int8
                        | DataType::Int16
                        | DataType::Int32
                        | DataType::Int64
                        | DataType::UInt8
                        | DataType::UInt16
                        | DataType::UInt32
                        | DataType::UInt64
                )
            })
            .map(|col| col.name().to_string())
            .collect()
    }

    /// Check whether the DataFrame has a column with this name.
    pub fn has_column(df: &DataFrame, column: &str) -> bool {
        df.get_column_index(column).is_some()
    }

    /// Read a column as `f64`, nulls and NaN mapped to `None`.
    pub fn numeric_column(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>, LoaderError> {
        if !Self::has_column(df, column) {
            return Err(LoaderError::MissingColumn(column.to_string()));
        }
        let values = df.column(column)?.cast(&DataType::Float64)?;
        let values = values
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();
        Ok(values)
    }

    /// Read a column as strings, nulls mapped to `None`.
    pub fn string_column(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>, LoaderError> {
        if !Self::has_column(df, column) {
            return Err(LoaderError::MissingColumn(column.to_string()));
        }
        let values = df.column(column)?.cast(&DataType::String)?;
        let values = values
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect();
        Ok(values)
    }

    /// Read `[x, y]` point coordinates from two columns.
    ///
    /// Rows where either coordinate is missing yield `None`.
    pub fn coordinates(
        df: &DataFrame,
        x_col: &str,
        y_col: &str,
    ) -> Result<Vec<Option<[f64; 2]>>, LoaderError> {
        let xs = Self::numeric_column(df, x_col)?;
        let ys = Self::numeric_column(df, y_col)?;
        Ok(xs
            .into_iter()
            .zip(ys)
            .map(|(x, y)| Some([x?, y?]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_semicolon_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recharge.csv");
        fs::write(
            &path,
            "ID;Lat;Long;Recharge_mmpa;Country\n1;10.5;20.25;35.0;Mali\n2;-3.0;30.0;;Kenya\n",
        )
        .unwrap();

        let df = DataLoader::load_csv(&path, b';').unwrap();
        assert_eq!(df.height(), 2);
        assert!(DataLoader::has_column(&df, "Recharge_mmpa"));

        let recharge = DataLoader::numeric_column(&df, "Recharge_mmpa").unwrap();
        assert_eq!(recharge, vec![Some(35.0), None]);

        let coords = DataLoader::coordinates(&df, "Long", "Lat").unwrap();
        assert_eq!(coords, vec![Some([20.25, 10.5]), Some([30.0, -3.0])]);

        let numeric = DataLoader::get_numeric_columns(&df);
        assert!(numeric.contains(&"Lat".to_string()));
        assert!(!numeric.contains(&"Country".to_string()));
    }

    #[test]
    fn test_missing_file_and_column() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        assert!(matches!(
            DataLoader::load_csv(&missing, b','),
            Err(LoaderError::NotFound(_))
        ));

        let path = dir.path().join("domains.csv");
        fs::write(&path, "lat,lon,domain\n0.25,0.75,wet warm\n").unwrap();
        let df = DataLoader::load_csv(&path, b',').unwrap();
        assert!(matches!(
            DataLoader::numeric_column(&df, "netrad_median"),
            Err(LoaderError::MissingColumn(_))
        ));
        assert_eq!(
            DataLoader::string_column(&df, "domain").unwrap(),
            vec![Some("wet warm".to_string())]
        );
    }
}
