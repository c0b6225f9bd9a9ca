//! Data module - Loading, gridded reduction, spatial join and merging

pub mod cftime;
pub mod gridded;
pub mod loader;
pub mod nearest;
pub mod processor;
pub mod regime;

pub use gridded::{AnnualAccumulator, PrecipitationReader};
pub use loader::DataLoader;
pub use processor::{CoordinateColumns, DataProcessor};
