use std::collections::BTreeMap;

use chrono::{Days, NaiveDate, NaiveDateTime};
use log::debug;

use super::model::{CellValue, NormalizedRow, RawRow, RawTable};

/// Text date layouts seen in exports, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d/%m/%y", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"];

/// Day zero of spreadsheet serial dates.
fn serial_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
}

/// Interpret a date cell. Anything unreadable counts as missing.
pub fn parse_date_cell(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::DateTime(dt) => Some(dt.date()),
        CellValue::Text(s) => parse_date_text(s),
        CellValue::Number(serial) if serial.is_finite() && *serial >= 1.0 => {
            serial_epoch()?.checked_add_days(Days::new(serial.trunc() as u64))
        }
        _ => None,
    }
}

pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Reshape a raw table (`Date` + hour columns) into wide rows.
pub fn rows_from_table(table: &RawTable) -> Vec<RawRow> {
    let labels = table.columns.iter().skip(1);
    table
        .rows
        .iter()
        .map(|row| {
            let date = row.first().and_then(parse_date_cell);
            let cells: BTreeMap<String, CellValue> = labels
                .clone()
                .enumerate()
                .map(|(i, label)| {
                    let cell = row.get(i + 1).cloned().unwrap_or(CellValue::Empty);
                    (label.clone(), cell)
                })
                .collect();
            RawRow { date, cells }
        })
        .collect()
}

/// Resolve missing dates positionally.
///
/// Blank rows are dropped first. An undated row takes the previous kept
/// row's date plus one day; undated rows before the first dated row are
/// dropped. One row per calendar day is assumed: a skipped day with no
/// explicit date shifts every inferred date after it.
pub fn carry_forward(rows: Vec<RawRow>) -> Vec<NormalizedRow> {
    let mut previous: Option<NaiveDate> = None;
    let mut out = Vec::with_capacity(rows.len());
    let mut dropped_leading = 0usize;

    for row in rows {
        if row.is_blank() {
            continue;
        }
        let date = match (row.date, previous) {
            (Some(date), _) => date,
            (None, Some(prev)) => match prev.succ_opt() {
                Some(next) => next,
                None => continue,
            },
            (None, None) => {
                dropped_leading += 1;
                continue;
            }
        };
        previous = Some(date);
        out.push(NormalizedRow {
            date,
            cells: row.cells,
        });
    }

    if dropped_leading > 0 {
        debug!("dropped {dropped_leading} undated row(s) before the first dated row");
    }
    out
}
