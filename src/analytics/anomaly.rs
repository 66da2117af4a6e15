//! Trailing-window z-score anomaly detection over daily series.

use serde::{Deserialize, Serialize};

use super::normalize::ReportRow;

/// One day of a metric.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TimeSeriesPoint {
    /// ISO calendar date (YYYY-MM-DD).
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Spike,
    Drop,
}

/// A point that deviates from its trailing baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyRecord {
    pub date: String,
    pub metric: String,
    pub value: f64,
    pub baseline_mean: f64,
    pub baseline_std: f64,
    /// `None` when the baseline has zero variance.
    pub z_score: Option<f64>,
    pub direction: Direction,
}

/// Spread assumed for a zero-variance window: a departure must reach
/// `z_threshold` units of the metric to be flagged.
const FLAT_BASELINE_SPREAD: f64 = 1.0;

/// Baseline statistics of a window.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Baseline {
    mean: f64,
    std_dev: f64,
    flat: bool,
}

impl Baseline {
    fn of(window: &[TimeSeriesPoint]) -> Self {
        let n = window.len() as f64;
        let mean = window.iter().map(|p| p.value).sum::<f64>() / n;
        let flat = window.windows(2).all(|pair| pair[0].value == pair[1].value);
        let std_dev = if flat || window.len() < 2 {
            0.0
        } else {
            let sum_sq: f64 = window.iter().map(|p| (p.value - mean).powi(2)).sum();
            (sum_sq / (n - 1.0)).sqrt()
        };
        Self {
            mean,
            std_dev,
            flat: flat || std_dev == 0.0,
        }
    }
}

/// Flag points deviating from the `window_days` points strictly before them.
///
/// The first `window_days` points have no complete baseline and are never
/// evaluated. Against a zero-variance baseline the z-score is undefined: a
/// point equal to the baseline is never flagged, and a departure is flagged
/// with a `None` z-score only when it is at least `z_threshold` units.
pub fn detect(
    series: &[TimeSeriesPoint],
    metric: &str,
    window_days: usize,
    z_threshold: f64,
) -> Vec<AnomalyRecord> {
    if window_days == 0 || series.len() <= window_days {
        return Vec::new();
    }

    (window_days..series.len())
        .filter_map(|i| {
            let point = &series[i];
            let baseline = Baseline::of(&series[i - window_days..i]);

            let (z_score, direction) = if baseline.flat {
                let departure = point.value - series[i - 1].value;
                if departure == 0.0 || departure.abs() / FLAT_BASELINE_SPREAD < z_threshold {
                    return None;
                }
                (None, direction_of(departure))
            } else {
                let z = (point.value - baseline.mean) / baseline.std_dev;
                if z.abs() < z_threshold {
                    return None;
                }
                (Some(z), direction_of(z))
            };

            Some(AnomalyRecord {
                date: point.date.clone(),
                metric: metric.to_string(),
                value: point.value,
                baseline_mean: baseline.mean,
                baseline_std: baseline.std_dev,
                z_score,
                direction,
            })
        })
        .collect()
}

fn direction_of(signed: f64) -> Direction {
    if signed > 0.0 {
        Direction::Spike
    } else {
        Direction::Drop
    }
}

/// Convert GA's `YYYYMMDD` date dimension to ISO form. ISO input passes through.
pub fn normalize_date(raw: &str) -> String {
    if raw.len() == 8 && raw.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..])
    } else {
        raw.to_string()
    }
}

/// Build an ascending daily series from report rows grouped by `date_field`.
pub fn series_from_rows(rows: &[ReportRow], date_field: &str, metric: &str) -> Vec<TimeSeriesPoint> {
    let mut series: Vec<TimeSeriesPoint> = rows
        .iter()
        .map(|row| TimeSeriesPoint {
            date: normalize_date(row.text(date_field)),
            value: row.number(metric),
        })
        .collect();
    series.sort_by(|a, b| a.date.cmp(&b.date));
    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::normalize::FieldValue;

    fn series(values: &[f64]) -> Vec<TimeSeriesPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| TimeSeriesPoint {
                date: format!("2025-01-{:02}", i + 1),
                value: *v,
            })
            .collect()
    }

    #[test]
    fn test_flat_series_never_flagged() {
        let flat = series(&[0.1; 30]);
        for threshold in [0.0, 0.5, 2.5, 100.0] {
            assert!(detect(&flat, "sessions", 7, threshold).is_empty());
        }
    }

    #[test]
    fn test_jump_after_flat_window_is_spike() {
        let points = series(&[10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 100.0]);
        let anomalies = detect(&points, "sessions", 7, 2.5);

        assert_eq!(anomalies.len(), 1);
        let spike = &anomalies[0];
        assert_eq!(spike.date, "2025-01-08");
        assert_eq!(spike.direction, Direction::Spike);
        assert_eq!(spike.baseline_mean, 10.0);
        assert_eq!(spike.baseline_std, 0.0);
        assert_eq!(spike.z_score, None);
    }

    #[test]
    fn test_small_move_off_flat_baseline_ignored() {
        let mut values = vec![0.0; 7];
        values.push(1.0);
        assert!(detect(&series(&values), "keyEvents", 7, 2.5).is_empty());

        values[7] = 2.5;
        let anomalies = detect(&series(&values), "keyEvents", 7, 2.5);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].direction, Direction::Spike);

        let mut values = vec![4.0; 7];
        values.push(2.0);
        assert!(detect(&series(&values), "keyEvents", 7, 2.5).is_empty());
        assert_eq!(detect(&series(&values), "keyEvents", 7, 1.5)[0].direction, Direction::Drop);
    }

    #[test]
    fn test_spike_and_drop_against_noisy_baseline() {
        let points = series(&[10.0, 12.0, 11.0, 9.0, 10.0, 11.0, 10.0, 40.0, 11.0, 9.0]);
        let anomalies = detect(&points, "sessions", 7, 2.5);

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].date, "2025-01-08");
        assert_eq!(anomalies[0].direction, Direction::Spike);
        let z = anomalies[0].z_score.unwrap();
        assert!(z > 2.5);

        let points = series(&[100.0, 104.0, 98.0, 101.0, 99.0, 102.0, 100.0, 10.0]);
        let anomalies = detect(&points, "sessions", 7, 2.5);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].direction, Direction::Drop);
        assert!(anomalies[0].z_score.unwrap() < -2.5);
    }

    #[test]
    fn test_baseline_excludes_current_point() {
        let points = series(&[1.0, 3.0, 50.0]);
        let anomalies = detect(&points, "m", 2, 2.0);
        assert_eq!(anomalies.len(), 1);
        // mean of [1, 3] = 2, sample std = sqrt(2)
        assert_eq!(anomalies[0].baseline_mean, 2.0);
        assert!((anomalies[0].baseline_std - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // window [0, 2]: mean 1, std sqrt(2); value 1 + 2*sqrt(2) gives z = 2
        let value = 1.0 + 2.0 * 2f64.sqrt();
        let points = series(&[0.0, 2.0, value]);
        let anomalies = detect(&points, "m", 2, 2.0 - 1e-9);
        assert_eq!(anomalies.len(), 1);
        assert!(detect(&points, "m", 2, 2.1).is_empty());
    }

    #[test]
    fn test_first_window_points_not_evaluated() {
        let points = series(&[1000.0, 1.0, 2.0, 1.0, 2.0]);
        let anomalies = detect(&points, "m", 3, 1.0);
        assert!(anomalies.iter().all(|a| a.date.as_str() > "2025-01-03"));
        assert!(detect(&series(&[1.0, 2.0]), "m", 7, 1.0).is_empty());
    }

    #[test]
    fn test_window_of_one_has_zero_std() {
        let points = series(&[5.0, 5.0, 9.0]);
        let anomalies = detect(&points, "m", 1, 2.5);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].baseline_std, 0.0);
        assert_eq!(anomalies[0].z_score, None);
        assert_eq!(anomalies[0].date, "2025-01-03");
    }

    #[test]
    fn test_series_from_rows_normalizes_and_sorts() {
        let rows: Vec<ReportRow> = [("20250103", 3.0), ("20250101", 1.0), ("20250102", 2.0)]
            .iter()
            .map(|(date, v)| {
                [
                    ("date".to_string(), FieldValue::Text(date.to_string())),
                    ("sessions".to_string(), FieldValue::Number(*v)),
                ]
                .into_iter()
                .collect()
            })
            .collect();

        let series = series_from_rows(&rows, "date", "sessions");
        let dates: Vec<_> = series.iter().map(|p| p.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-01-01", "2025-01-02", "2025-01-03"]);
        assert_eq!(series[2].value, 3.0);
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Direction::Spike).unwrap(), "spike");
        assert_eq!(serde_json::to_value(Direction::Drop).unwrap(), "drop");
    }
}
