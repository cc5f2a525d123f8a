//! Ingestion pipeline turning wide spreadsheet exports and a long-format
//! Parquet snapshot into per-source time series for rolling averages.
//!
//! Presentation lives elsewhere: callers ask [`state::PipelineState`] for
//! series and [`data::rolling::rolling`] for on-demand means.

pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod state;

pub use config::{Settings, SourceDatasetConfig};
pub use data::model::{MeasurementPoint, RollingResult, SeriesCollection, TimeSeries};
pub use data::rolling::rolling;
pub use error::PipelineError;
pub use state::{LoadReport, PipelineState};
