use std::fmt;

use thiserror::Error;

use super::model::CellValue;

/// Prefix meaning "below the instrument's detection limit".
pub const BELOW_LIMIT_MARKER: char = '<';

/// Why a cell was not accepted as a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Rejection {
    #[error("empty cell")]
    Empty,
    #[error("not a number")]
    Malformed,
    #[error("zero")]
    Zero,
    #[error("negative")]
    Negative,
    #[error("not finite")]
    NonFinite,
    #[error("above dataset maximum")]
    AboveMaximum,
}

/// Parse measurement text: strip the `<` marker, accept a decimal comma.
///
/// `"<0,45"` → `Some(0.45)`.
pub fn parse_measurement(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let unmarked = trimmed
        .strip_prefix(BELOW_LIMIT_MARKER)
        .unwrap_or(trimmed)
        .trim();
    unmarked.replace(',', ".").parse::<f64>().ok()
}

/// Apply the dataset policy to an already-parsed number.
pub fn accept(value: f64, max_value: f64) -> Result<f64, Rejection> {
    if !value.is_finite() {
        Err(Rejection::NonFinite)
    } else if value == 0.0 {
        Err(Rejection::Zero)
    } else if value < 0.0 {
        Err(Rejection::Negative)
    } else if value > max_value {
        Err(Rejection::AboveMaximum)
    } else {
        Ok(value)
    }
}

/// Turn one raw cell into a measurement or say why it was dropped.
pub fn sanitize_cell(cell: &CellValue, max_value: f64) -> Result<f64, Rejection> {
    let value = match cell {
        CellValue::Empty => return Err(Rejection::Empty),
        CellValue::Number(v) => *v,
        CellValue::Text(s) if s.trim().is_empty() => return Err(Rejection::Empty),
        CellValue::Text(s) => parse_measurement(s).ok_or(Rejection::Malformed)?,
        CellValue::DateTime(_) => return Err(Rejection::Malformed),
    };
    accept(value, max_value)
}

/// Tally of accepted and rejected cells for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeStats {
    pub accepted: usize,
    pub empty: usize,
    pub malformed: usize,
    pub zero: usize,
    pub negative: usize,
    pub non_finite: usize,
    pub above_maximum: usize,
}

impl SanitizeStats {
    pub fn record(&mut self, outcome: &Result<f64, Rejection>) {
        match outcome {
            Ok(_) => self.accepted += 1,
            Err(Rejection::Empty) => self.empty += 1,
            Err(Rejection::Malformed) => self.malformed += 1,
            Err(Rejection::Zero) => self.zero += 1,
            Err(Rejection::Negative) => self.negative += 1,
            Err(Rejection::NonFinite) => self.non_finite += 1,
            Err(Rejection::AboveMaximum) => self.above_maximum += 1,
        }
    }

    /// Non-empty cells that were dropped.
    pub fn rejected(&self) -> usize {
        self.malformed + self.zero + self.negative + self.non_finite + self.above_maximum
    }
}

impl fmt::Display for SanitizeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} accepted, {} rejected (malformed {}, zero {}, negative {}, non-finite {}, above max {}), {} empty",
            self.accepted,
            self.rejected(),
            self.malformed,
            self.zero,
            self.negative,
            self.non_finite,
            self.above_maximum,
            self.empty
        )
    }
}
