use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDateTime, NaiveTime};
use log::{debug, warn};

use super::model::{LongRecord, MeasurementPoint, NormalizedRow, SeriesCollection, TimeSeries};
use super::sanitize::{sanitize_cell, SanitizeStats};
use crate::config::SourceDatasetConfig;

/// Label for the last reading of the day.
pub const END_OF_DAY_LABEL: &str = "24:00";

/// Clock time for an hour label. `"24:00"` is pinned to 23:59 of the same
/// day so it never rolls into the next date.
pub fn hour_label_time(label: &str) -> Option<NaiveTime> {
    let label = label.trim();
    if label == END_OF_DAY_LABEL {
        return NaiveTime::from_hms_opt(23, 59, 0);
    }
    NaiveTime::parse_from_str(label, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(label, "%H:%M:%S"))
        .ok()
}

/// Melt normalized wide rows into one sorted series.
pub fn assemble_wide(
    config: &SourceDatasetConfig,
    rows: &[NormalizedRow],
) -> (TimeSeries, SanitizeStats) {
    let mut stats = SanitizeStats::default();
    let mut bad_labels: BTreeSet<&str> = BTreeSet::new();
    let mut points = Vec::new();

    for row in rows {
        for (label, cell) in &row.cells {
            let Some(time) = hour_label_time(label) else {
                bad_labels.insert(label.as_str());
                continue;
            };
            let outcome = sanitize_cell(cell, config.max_value);
            stats.record(&outcome);
            if let Ok(value) = outcome {
                points.push(MeasurementPoint {
                    timestamp: NaiveDateTime::new(row.date, time),
                    source_id: config.id.clone(),
                    value,
                });
            }
        }
    }

    for label in bad_labels {
        warn!("dataset '{}': hour label '{label}' is not a clock time, cells skipped", config.id);
    }
    debug!("dataset '{}': {stats}", config.id);

    (TimeSeries::new(config.id.clone(), points), stats)
}

/// Group already-long-format records by source.
pub fn assemble_long(records: Vec<LongRecord>) -> SeriesCollection {
    let mut grouped: BTreeMap<String, Vec<MeasurementPoint>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.source_id.clone())
            .or_default()
            .push(record);
    }
    grouped
        .into_iter()
        .map(|(source, points)| {
            let series = TimeSeries::new(source.clone(), points);
            (source, series)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::data::model::CellValue;

    fn config(max_value: f64) -> SourceDatasetConfig {
        SourceDatasetConfig {
            id: "treated".to_string(),
            sheet: "Sheet1".to_string(),
            header_row: 0,
            columns: vec![0, 1, 2],
            max_value,
            hour_labels: vec!["08:00".to_string(), "24:00".to_string()],
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn row(date: NaiveDate, cells: &[(&str, &str)]) -> NormalizedRow {
        NormalizedRow {
            date,
            cells: cells
                .iter()
                .map(|(k, v)| (k.to_string(), CellValue::from_text(v)))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn end_of_day_stays_on_same_date() {
        let late = NaiveDateTime::new(d(1), hour_label_time("24:00").unwrap());
        let next = NaiveDateTime::new(d(2), hour_label_time("00:00").unwrap());
        assert_eq!(late, d(1).and_hms_opt(23, 59, 0).unwrap());
        assert!(late < next);
    }

    #[test]
    fn hour_labels_parse() {
        assert_eq!(hour_label_time("08:00"), NaiveTime::from_hms_opt(8, 0, 0));
        assert_eq!(hour_label_time("07:30:00"), NaiveTime::from_hms_opt(7, 30, 0));
        assert_eq!(hour_label_time("25:00"), None);
        assert_eq!(hour_label_time("Média"), None);
    }

    #[test]
    fn wide_rows_become_sorted_points() {
        let rows = vec![
            row(d(2), &[("08:00", "0,3"), ("24:00", "0")]),
            row(d(1), &[("08:00", "<0,1"), ("24:00", "0,2")]),
        ];
        let (series, stats) = assemble_wide(&config(1.0), &rows);
        assert_eq!(series.values(), vec![0.1, 0.2, 0.3]);
        assert_eq!(series.points()[1].timestamp, d(1).and_hms_opt(23, 59, 0).unwrap());
        assert!(series.points().iter().all(|p| p.source_id == "treated"));
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.zero, 1);
    }

    #[test]
    fn unparseable_labels_are_skipped() {
        let rows = vec![row(d(1), &[("08:00", "0,5"), ("Total", "9")])];
        let (series, stats) = assemble_wide(&config(1.0), &rows);
        assert_eq!(series.len(), 1);
        assert_eq!(stats.accepted, 1);
    }

    #[test]
    fn long_records_group_by_source() {
        let ts = |h| d(1).and_hms_opt(h, 0, 0).unwrap();
        let rec = |source: &str, h, value| MeasurementPoint {
            timestamp: ts(h),
            source_id: source.to_string(),
            value,
        };
        let collection = assemble_long(vec![
            rec("B", 3, 1.0),
            rec("A", 2, 2.0),
            rec("B", 1, 3.0),
        ]);
        assert_eq!(collection.len(), 2);
        assert_eq!(collection["B"].values(), vec![3.0, 1.0]);
        assert_eq!(collection["A"].source_id(), "A");
    }
}
