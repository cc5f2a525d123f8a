use crate::config::{FIXED_WINDOW, MAX_WINDOW};
use crate::error::{PipelineError, Result};

use super::model::{RollingResult, SeriesCollection, TimeSeries};

/// Simple moving average with `min_periods = 1`: the first `window - 1`
/// entries average over however many samples exist so far.
///
/// Each entry is the plain mean of its slice, so `window == 1` returns the
/// input unchanged.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Rolling mean of one series over `window` samples.
pub fn rolling(series: &TimeSeries, window: usize) -> Result<RollingResult> {
    if !(1..=MAX_WINDOW).contains(&window) {
        return Err(PipelineError::InvalidWindow {
            window,
            max: MAX_WINDOW,
        });
    }

    let means = if window == FIXED_WINDOW {
        series.fixed_mean().to_vec()
    } else {
        moving_average(&series.values(), window)
    };

    Ok(RollingResult {
        source_id: series.source_id().to_string(),
        window,
        series_with_mean: series.points().iter().cloned().zip(means).collect(),
    })
}

/// [`rolling`] applied to every source independently.
pub fn rolling_all(collection: &SeriesCollection, window: usize) -> Result<Vec<RollingResult>> {
    collection.values().map(|s| rolling(s, window)).collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::data::model::MeasurementPoint;

    fn named(name: &str, values: &[f64]) -> TimeSeries {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &value)| MeasurementPoint {
                timestamp: start + chrono::Duration::hours(i as i64),
                source_id: name.to_string(),
                value,
            })
            .collect();
        TimeSeries::new(name, points)
    }

    fn series(values: &[f64]) -> TimeSeries {
        named("raw", values)
    }

    #[test]
    fn window_one_is_identity() {
        let values = [0.1, 0.7, 0.3333, 12.5];
        let result = rolling(&series(&values), 1).unwrap();
        let means: Vec<f64> = result.series_with_mean.iter().map(|(_, m)| *m).collect();
        assert_eq!(means, values.to_vec());
    }

    #[test]
    fn partial_windows_at_start() {
        let means = moving_average(&[2.0, 4.0, 6.0, 8.0], 3);
        assert_eq!(means, vec![2.0, 3.0, 4.0, 6.0]);
    }

    #[test]
    fn large_window_ends_with_overall_mean() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let result = rolling(&series(&values), 50).unwrap();
        assert_eq!(result.last_mean(), Some(3.0));
    }

    #[test]
    fn fixed_window_reuses_precomputed_column() {
        let values: Vec<f64> = (1..=40).map(|v| v as f64 * 0.1).collect();
        let s = series(&values);
        let reused = rolling(&s, FIXED_WINDOW).unwrap();
        let fresh = moving_average(&values, FIXED_WINDOW);
        let means: Vec<f64> = reused.series_with_mean.iter().map(|(_, m)| *m).collect();
        assert_eq!(means, fresh);
    }

    #[test]
    fn rejects_out_of_range_window() {
        let s = series(&[1.0]);
        assert!(matches!(
            rolling(&s, 0),
            Err(PipelineError::InvalidWindow { window: 0, .. })
        ));
        assert!(rolling(&s, MAX_WINDOW + 1).is_err());
    }

    #[test]
    fn rolling_all_keeps_sources_apart() {
        let mut collection = SeriesCollection::new();
        collection.insert("a".to_string(), named("a", &[1.0, 1.0]));
        collection.insert("b".to_string(), named("b", &[10.0, 20.0]));

        let results = rolling_all(&collection, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].last_mean(), Some(1.0));
        assert_eq!(results[1].source_id, "b");
        assert_eq!(results[1].last_mean(), Some(15.0));
    }

    #[test]
    fn empty_series_rolls_to_empty() {
        let result = rolling(&TimeSeries::empty("none"), 6).unwrap();
        assert!(result.series_with_mean.is_empty());
        assert_eq!(result.last_mean(), None);
    }
}
