use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};

use super::model::{SeriesCollection, TimeSeries};
use crate::config::DEFAULT_PERIOD_DAYS;

// ---------------------------------------------------------------------------
// Filter predicate: which sources and which calendar days are selected
// ---------------------------------------------------------------------------

/// Source selection plus an inclusive date period.
/// An empty `sources` set means nothing is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesFilter {
    pub sources: BTreeSet<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Initialise a [`SeriesFilter`] with every source selected and the last
/// [`DEFAULT_PERIOD_DAYS`] days up to the newest point.
///
/// Returns `None` for a collection without any points.
pub fn init_filter(collection: &SeriesCollection) -> Option<SeriesFilter> {
    let end = collection
        .values()
        .filter_map(TimeSeries::last_timestamp)
        .max()?
        .date();
    let start = end
        .checked_sub_days(Days::new(DEFAULT_PERIOD_DAYS as u64))
        .unwrap_or(NaiveDate::MIN);
    Some(SeriesFilter {
        sources: collection.keys().cloned().collect(),
        start,
        end,
    })
}

/// Keep the selected sources, restricted to the selected period.
///
/// Sources are dropped when:
/// * they are not in `filter.sources`
/// * no point falls inside `start..=end`
///
/// Kept series are rebuilt, so their fixed-window mean covers only the
/// filtered points.
pub fn apply_filter(collection: &SeriesCollection, filter: &SeriesFilter) -> SeriesCollection {
    collection
        .iter()
        .filter(|(source, _)| filter.sources.contains(*source))
        .filter_map(|(source, series)| {
            let points: Vec<_> = series
                .points()
                .iter()
                .filter(|p| {
                    let day = p.timestamp.date();
                    day >= filter.start && day <= filter.end
                })
                .cloned()
                .collect();
            if points.is_empty() {
                None
            } else {
                Some((source.clone(), TimeSeries::new(source.clone(), points)))
            }
        })
        .collect()
}
