//! Comparison period resolution.
//!
//! Only date expressions whose preceding period is unambiguous resolve:
//! `NdaysAgo..yesterday` and `NdaysAgo..today` for the previous period, and
//! two ISO dates for the previous year. Everything else is reported as not
//! resolvable instead of being guessed.

use chrono::{Months, NaiveDate};
use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::DateRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    /// The block of days immediately before the requested range.
    PreviousPeriod,
    /// The same calendar dates one year earlier.
    PreviousYear,
}

impl std::fmt::Display for CompareMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareMode::PreviousPeriod => write!(f, "previous_period"),
            CompareMode::PreviousYear => write!(f, "previous_year"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot derive a {mode} comparison for {start_date}..{end_date}: {hint}")]
pub struct NotResolvable {
    pub mode: CompareMode,
    pub start_date: String,
    pub end_date: String,
    pub hint: &'static str,
}

const PREVIOUS_PERIOD_HINT: &str =
    "use start_date 'NdaysAgo' (N >= 1) with end_date 'yesterday' or 'today'";
const PREVIOUS_YEAR_HINT: &str =
    "use ISO dates (YYYY-MM-DD) with start_date on or before end_date";

/// Derive the comparison range for `start_date..end_date`.
pub fn resolve_previous_period(
    start_date: &str,
    end_date: &str,
    mode: CompareMode,
) -> Result<DateRange, NotResolvable> {
    let resolved = match mode {
        CompareMode::PreviousPeriod => previous_relative_block(start_date, end_date),
        CompareMode::PreviousYear => previous_calendar_year(start_date, end_date),
    };

    resolved.ok_or_else(|| NotResolvable {
        mode,
        start_date: start_date.to_string(),
        end_date: end_date.to_string(),
        hint: match mode {
            CompareMode::PreviousPeriod => PREVIOUS_PERIOD_HINT,
            CompareMode::PreviousYear => PREVIOUS_YEAR_HINT,
        },
    })
}

fn previous_relative_block(start_date: &str, end_date: &str) -> Option<DateRange> {
    let n = days_ago(start_date).filter(|n| *n >= 1)?;
    let (start, end) = match end_date {
        "yesterday" => (n.checked_mul(2)?, n.checked_add(1)?),
        "today" => (n.checked_mul(2)?.checked_sub(1)?, n),
        _ => return None,
    };
    Some(DateRange::new(
        format!("{}daysAgo", start),
        format!("{}daysAgo", end),
    ))
}

fn previous_calendar_year(start_date: &str, end_date: &str) -> Option<DateRange> {
    let start = parse_iso_date(start_date)?;
    let end = parse_iso_date(end_date)?;
    if start > end {
        return None;
    }
    let shift = |d: NaiveDate| d.checked_sub_months(Months::new(12));
    Some(DateRange::new(
        shift(start)?.format("%Y-%m-%d").to_string(),
        shift(end)?.format("%Y-%m-%d").to_string(),
    ))
}

/// Parse the `N` of a `NdaysAgo` expression.
pub fn days_ago(expr: &str) -> Option<u32> {
    let digits = expr.strip_suffix("daysAgo")?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Parse a strict `YYYY-MM-DD` date.
pub fn parse_iso_date(expr: &str) -> Option<NaiveDate> {
    if expr.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(expr, "%Y-%m-%d").ok()
}

/// Whether `expr` is a date expression the backend accepts.
pub fn is_date_expression(expr: &str) -> bool {
    matches!(expr, "today" | "yesterday") || days_ago(expr).is_some() || parse_iso_date(expr).is_some()
}
