use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use super::rolling::moving_average;
use crate::config::FIXED_WINDOW;

// ---------------------------------------------------------------------------
// CellValue – a single cell read from a workbook or CSV export
// ---------------------------------------------------------------------------

/// A dynamically-typed cell as it comes out of a reader.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    /// Native spreadsheet date/time cell.
    DateTime(NaiveDateTime),
    Empty,
}

impl CellValue {
    /// Blank cells and whitespace-only text both count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Guess the type of a textual field (CSV cells arrive as text).
    pub fn from_text(s: &str) -> Self {
        if s.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Number(v) => write!(f, "{v}"),
            CellValue::DateTime(d) => write!(f, "{d}"),
            CellValue::Empty => write!(f, "<empty>"),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw tabular content
// ---------------------------------------------------------------------------

/// Rows × named columns as returned by the source reader.
/// Columns are always `Date` followed by the dataset's hour labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One wide-format row; `date == None` means "previous row + 1 day".
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub date: Option<NaiveDate>,
    /// hour label → raw cell
    pub cells: BTreeMap<String, CellValue>,
}

impl RawRow {
    /// True when there is nothing to ingest or infer from this row.
    pub fn is_blank(&self) -> bool {
        self.date.is_none() && self.cells.values().all(CellValue::is_empty)
    }
}

/// A wide-format row whose date has been resolved by carry-forward.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub date: NaiveDate,
    pub cells: BTreeMap<String, CellValue>,
}

// ---------------------------------------------------------------------------
// Measurements and series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementPoint {
    pub timestamp: NaiveDateTime,
    pub source_id: String,
    pub value: f64,
}

/// One already-long-format snapshot row, before grouping.
pub type LongRecord = MeasurementPoint;

/// Points of one source, sorted by timestamp, with the fixed-window mean
/// attached.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    source_id: String,
    points: Vec<MeasurementPoint>,
    fixed_mean: Vec<f64>,
}

impl TimeSeries {
    /// Sort `points` (stable on ties) and precompute the
    /// [`FIXED_WINDOW`] moving average.
    pub fn new(source_id: impl Into<String>, mut points: Vec<MeasurementPoint>) -> Self {
        points.sort_by_key(|p| p.timestamp);
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let fixed_mean = moving_average(&values, FIXED_WINDOW);
        Self {
            source_id: source_id.into(),
            points,
            fixed_mean,
        }
    }

    pub fn empty(source_id: impl Into<String>) -> Self {
        Self::new(source_id, Vec::new())
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn points(&self) -> &[MeasurementPoint] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Moving average over [`FIXED_WINDOW`] samples, one entry per point.
    pub fn fixed_mean(&self) -> &[f64] {
        &self.fixed_mean
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.points.last().map(|p| p.timestamp)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Source id → series. Ordered so output is stable.
pub type SeriesCollection = BTreeMap<String, TimeSeries>;

/// Result of one on-demand aggregation call.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingResult {
    pub source_id: String,
    pub window: usize,
    /// `(point, mean)` pairs in timestamp order.
    pub series_with_mean: Vec<(MeasurementPoint, f64)>,
}

impl RollingResult {
    pub fn last_mean(&self) -> Option<f64> {
        self.series_with_mean.last().map(|(_, m)| *m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn point(ts: NaiveDateTime, value: f64) -> MeasurementPoint {
        MeasurementPoint {
            timestamp: ts,
            source_id: "s".to_string(),
            value,
        }
    }

    #[test]
    fn new_series_is_sorted_and_stable_on_ties() {
        let series = TimeSeries::new(
            "s",
            vec![
                point(at(2, 8), 3.0),
                point(at(1, 8), 1.0),
                point(at(2, 8), 4.0),
            ],
        );
        assert_eq!(series.values(), vec![1.0, 3.0, 4.0]);
        assert_eq!(series.fixed_mean().len(), 3);
        assert_eq!(series.first_timestamp(), Some(at(1, 8)));
        assert_eq!(series.last_timestamp(), Some(at(2, 8)));
    }

    #[test]
    fn blank_row_needs_no_date_and_no_values() {
        let mut cells = BTreeMap::new();
        cells.insert("08:00".to_string(), CellValue::Text("  ".to_string()));
        let mut row = RawRow { date: None, cells };
        assert!(row.is_blank());

        row.date = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert!(!row.is_blank());
    }

    #[test]
    fn empty_series() {
        let series = TimeSeries::empty("x");
        assert!(series.is_empty());
        assert!(series.fixed_mean().is_empty());
        assert_eq!(series.source_id(), "x");
    }
}
