/// Data layer: core types, reading, normalization and aggregation.
///
/// Architecture:
/// ```text
///  .xlsx / .ods / .csv              .parquet (HTTP or file)
///        │                                │
///        ▼                                ▼
///   ┌──────────┐                   ┌──────────┐
///   │  loader   │ → RawTable        │ snapshot │ → LongRecord
///   └──────────┘                   └──────────┘
///        │                                │
///        ▼                                │
///   ┌───────────┐                         │
///   │ normalize  │ date carry-forward     │
///   └───────────┘                         │
///        │                                │
///        ▼                                ▼
///   ┌──────────────────────────────────────────┐
///   │ assemble (+ sanitize)  → TimeSeries       │
///   └──────────────────────────────────────────┘
///        │
///        ▼
///   ┌──────────┐   ┌──────────┐
///   │  filter   │ → │ rolling  │
///   └──────────┘   └──────────┘
/// ```
pub mod assemble;
pub mod filter;
pub mod loader;
pub mod model;
pub mod normalize;
pub mod rolling;
pub mod sanitize;
pub mod snapshot;

use std::path::Path;

use bytes::Bytes;
use log::info;

use crate::config::{SnapshotColumns, SourceDatasetConfig};
use crate::error::Result;
use model::{SeriesCollection, TimeSeries};
use sanitize::SanitizeStats;

/// Full wide-format path: read, carry dates forward, sanitize, assemble.
pub fn ingest_workbook(
    path: &Path,
    config: &SourceDatasetConfig,
) -> Result<(TimeSeries, SanitizeStats)> {
    let table = loader::load_workbook(path, config)?;
    let rows = normalize::carry_forward(normalize::rows_from_table(&table));
    let (series, stats) = assemble::assemble_wide(config, &rows);
    info!(
        "dataset '{}': {} point(s) from {} row(s)",
        config.id,
        series.len(),
        rows.len()
    );
    Ok((series, stats))
}

/// Long-format path: decode and group by source.
pub fn ingest_snapshot(
    location: &str,
    data: Bytes,
    columns: &SnapshotColumns,
) -> Result<SeriesCollection> {
    let (records, stats) = snapshot::decode_snapshot(location, data, columns)?;
    let collection = assemble::assemble_long(records);
    info!(
        "{location}: {} source(s), {} point(s)",
        collection.len(),
        stats.kept
    );
    Ok(collection)
}
