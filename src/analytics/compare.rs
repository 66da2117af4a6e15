//! Period-over-period merge of grouped report rows.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::normalize::ReportRow;

/// Separator between values of a composite grouping key.
pub const KEY_SEPARATOR: &str = " | ";

/// Current vs. previous metrics for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRow {
    pub key: String,
    pub current: BTreeMap<String, f64>,
    pub previous: BTreeMap<String, f64>,
    pub delta: BTreeMap<String, f64>,
    /// `None` whenever the previous value is zero.
    pub pct_change: BTreeMap<String, Option<f64>>,
}

/// Values of a row's `key_fields`, in order. Rows join on these.
fn group_values(row: &ReportRow, key_fields: &[String]) -> Vec<String> {
    key_fields
        .iter()
        .map(|field| row.text(field).to_string())
        .collect()
}


/// Join current rows with previous rows on `key_fields`.
///
/// Groups missing from `previous` are compared against zero rather than
/// dropped; groups only present in `previous` are not reported. Output is
/// sorted by the first metric of the current period, descending, keeping
/// input order on ties.
pub fn merge(
    current: &[ReportRow],
    previous: &[ReportRow],
    key_fields: &[String],
    metrics: &[String],
) -> Vec<ComparisonRow> {
    let mut previous_by_key: HashMap<Vec<String>, &ReportRow> = HashMap::new();
    for row in previous {
        previous_by_key
            .entry(group_values(row, key_fields))
            .or_insert(row);
    }

    let mut merged: Vec<ComparisonRow> = current
        .iter()
        .map(|row| {
            let values = group_values(row, key_fields);
            let prior = previous_by_key.get(&values).copied();
            compare_row(values.join(KEY_SEPARATOR), row, prior, metrics)
        })
        .collect();

    if let Some(primary) = metrics.first() {
        merged.sort_by(|a, b| {
            let a = a.current.get(primary).copied().unwrap_or(0.0);
            let b = b.current.get(primary).copied().unwrap_or(0.0);
            b.partial_cmp(&a).unwrap_or(Ordering::Equal)
        });
    }

    merged
}

fn compare_row(
    key: String,
    current_row: &ReportRow,
    previous_row: Option<&ReportRow>,
    metrics: &[String],
) -> ComparisonRow {
    let mut row = ComparisonRow {
        key,
        current: BTreeMap::new(),
        previous: BTreeMap::new(),
        delta: BTreeMap::new(),
        pct_change: BTreeMap::new(),
    };

    for metric in metrics {
        let current = current_row.number(metric);
        let previous = previous_row.map_or(0.0, |r| r.number(metric));
        let delta = current - previous;
        let pct = if previous != 0.0 {
            Some(delta / previous)
        } else {
            None
        };

        row.current.insert(metric.clone(), current);
        row.previous.insert(metric.clone(), previous);
        row.delta.insert(metric.clone(), delta);
        row.pct_change.insert(metric.clone(), pct);
    }

    row
}
