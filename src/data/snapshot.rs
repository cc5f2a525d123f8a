use std::path::PathBuf;
use std::time::Duration;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type, TimeUnit};
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime};
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::LongRecord;
use super::sanitize::{accept, parse_measurement};
use crate::config::{SnapshotColumns, SnapshotSettings};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Somewhere a columnar snapshot can be fetched from. Fetching never caches.
pub trait SnapshotSource {
    /// URL or path, used as the cache key.
    fn location(&self) -> &str;

    fn fetch(&self) -> Result<Bytes>;
}

/// Blocking HTTP GET of a fixed URL.
pub struct HttpSnapshot {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpSnapshot {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::unavailable(&url, e))?;
        Ok(Self { url, client })
    }
}

impl SnapshotSource for HttpSnapshot {
    fn location(&self) -> &str {
        &self.url
    }

    fn fetch(&self) -> Result<Bytes> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::unavailable(&self.url, e))?;
        let body = response
            .bytes()
            .map_err(|e| PipelineError::unavailable(&self.url, e))?;
        info!("fetched {} bytes from {}", body.len(), self.url);
        Ok(body)
    }
}

/// A snapshot kept on local disk.
pub struct FileSnapshot {
    path: PathBuf,
    location: String,
}

impl FileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let location = path.display().to_string();
        Self { path, location }
    }
}

impl SnapshotSource for FileSnapshot {
    fn location(&self) -> &str {
        &self.location
    }

    fn fetch(&self) -> Result<Bytes> {
        let data = std::fs::read(&self.path)
            .map_err(|e| PipelineError::unavailable(&self.location, e))?;
        Ok(Bytes::from(data))
    }
}

/// Pick HTTP or file access from the configured location.
pub fn source_from_settings(settings: &SnapshotSettings) -> Result<Box<dyn SnapshotSource>> {
    if settings.is_remote() {
        let http = HttpSnapshot::new(
            settings.location.clone(),
            Duration::from_secs(settings.timeout_secs),
        )?;
        Ok(Box::new(http))
    } else {
        Ok(Box::new(FileSnapshot::new(&settings.location)))
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Rows kept and dropped while decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub kept: usize,
    pub bad_timestamp: usize,
    pub bad_source: usize,
    pub bad_value: usize,
}

/// Decode a Parquet snapshot into long-format records.
///
/// Expected schema (names configurable):
/// - timestamp: Timestamp (any unit), Date32/Date64, or text
/// - source: anything castable to Utf8
/// - value: any numeric type, or text such as `"<0,45"`
///
/// Rows with a null or unreadable field are dropped, as are values that
/// are not finite and strictly positive.
pub fn decode_snapshot(
    location: &str,
    data: Bytes,
    columns: &SnapshotColumns,
) -> Result<(Vec<LongRecord>, DecodeStats)> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)
        .map_err(|e| PipelineError::parse(location, format!("reading parquet metadata: {e}")))?;
    let reader = builder
        .build()
        .map_err(|e| PipelineError::parse(location, format!("building parquet reader: {e}")))?;

    let mut records = Vec::new();
    let mut stats = DecodeStats::default();

    for batch_result in reader {
        let batch = batch_result
            .map_err(|e| PipelineError::parse(location, format!("reading record batch: {e}")))?;
        let column = |name: &str| {
            batch
                .column_by_name(name)
                .cloned()
                .ok_or_else(|| PipelineError::parse(location, format!("missing column '{name}'")))
        };

        let timestamps = timestamp_column(location, &column(&columns.timestamp)?)?;
        let sources = string_column(location, &column(&columns.source)?)?;
        let values = value_column(location, &column(&columns.value)?)?;

        for ((timestamp, source), value) in timestamps.into_iter().zip(sources).zip(values) {
            let Some(timestamp) = timestamp else {
                stats.bad_timestamp += 1;
                continue;
            };
            let Some(source_id) = source else {
                stats.bad_source += 1;
                continue;
            };
            // no per-source maximum for snapshot sources
            let Some(value) = value.and_then(|v| accept(v, f64::INFINITY).ok()) else {
                stats.bad_value += 1;
                continue;
            };
            stats.kept += 1;
            records.push(LongRecord {
                timestamp,
                source_id,
                value,
            });
        }
    }

    debug!("{location}: {stats:?}");
    Ok((records, stats))
}

// -- Arrow helpers --

fn cast_err(location: &str, what: &str, e: arrow::error::ArrowError) -> PipelineError {
    PipelineError::parse(location, format!("{what} column: {e}"))
}

fn string_column(location: &str, col: &ArrayRef) -> Result<Vec<Option<String>>> {
    let utf8 = cast(col, &DataType::Utf8).map_err(|e| cast_err(location, "source", e))?;
    let strings = utf8.as_string::<i32>();
    Ok((0..strings.len())
        .map(|i| {
            strings
                .is_valid(i)
                .then(|| strings.value(i).trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .collect())
}

fn value_column(location: &str, col: &ArrayRef) -> Result<Vec<Option<f64>>> {
    match col.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            Ok(string_column(location, col)?
                .into_iter()
                .map(|s| s.as_deref().and_then(parse_measurement))
                .collect())
        }
        _ => {
            let floats =
                cast(col, &DataType::Float64).map_err(|e| cast_err(location, "value", e))?;
            let floats = floats.as_primitive::<Float64Type>();
            Ok(floats.iter().collect())
        }
    }
}

fn timestamp_column(location: &str, col: &ArrayRef) -> Result<Vec<Option<NaiveDateTime>>> {
    let unit = match col.data_type() {
        DataType::Timestamp(unit, _) => *unit,
        DataType::Date32 | DataType::Date64 => {
            let millis = cast(col, &DataType::Date64)
                .and_then(|a| cast(&a, &DataType::Int64))
                .map_err(|e| cast_err(location, "timestamp", e))?;
            return Ok(epoch_values(&millis, TimeUnit::Millisecond));
        }
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            return Ok(string_column(location, col)?
                .into_iter()
                .map(|s| s.as_deref().and_then(parse_timestamp_text))
                .collect());
        }
        other => {
            return Err(PipelineError::parse(
                location,
                format!("timestamp column has unsupported type {other:?}"),
            ))
        }
    };
    let raw = cast(col, &DataType::Int64).map_err(|e| cast_err(location, "timestamp", e))?;
    Ok(epoch_values(&raw, unit))
}

/// Timezone-aware values are stored as UTC instants and come out as UTC
/// wall-clock time.
fn epoch_values(raw: &ArrayRef, unit: TimeUnit) -> Vec<Option<NaiveDateTime>> {
    raw.as_primitive::<Int64Type>()
        .iter()
        .map(|v| {
            let v = v?;
            let dt = match unit {
                TimeUnit::Second => DateTime::from_timestamp(v, 0),
                TimeUnit::Millisecond => DateTime::from_timestamp_millis(v),
                TimeUnit::Microsecond => DateTime::from_timestamp_micros(v),
                TimeUnit::Nanosecond => Some(DateTime::from_timestamp_nanos(v)),
            };
            dt.map(|dt| dt.naive_utc())
        })
        .collect()
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Parse a textual timestamp, ISO first, then day-first layouts.
pub fn parse_timestamp_text(text: &str) -> Option<NaiveDateTime> {
    let s = text.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
}
