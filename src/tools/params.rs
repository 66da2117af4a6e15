//! Tool parameter shapes and their validation rules.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analytics::funnel::{validate_steps, FunnelStepSpec};
use crate::analytics::period::{is_date_expression, parse_iso_date};
use crate::analytics::CompareMode;
use crate::error::ToolError;

pub const MAX_DIMENSIONS: usize = 9;
pub const MAX_METRICS: usize = 10;
pub const MAX_WINDOW_DAYS: u32 = 60;
pub const MAX_SEARCH_RESULTS: u32 = 500;

/// Bounds that depend on configuration.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_rows: u32,
}

impl Limits {
    /// Cap an effective row limit, caller-supplied or built in.
    pub fn clamp(&self, limit: u32) -> u32 {
        limit.min(self.max_rows)
    }
}

/// Argument checks that run before any handler.
pub trait Validate {
    fn validate(&self, limits: &Limits) -> Result<(), ToolError>;
}

fn default_start_date() -> String {
    "28daysAgo".to_string()
}

fn default_end_date() -> String {
    "yesterday".to_string()
}

fn default_anomaly_start_date() -> String {
    "90daysAgo".to_string()
}

fn default_funnel_start_date() -> String {
    "30daysAgo".to_string()
}

fn default_compare_mode() -> CompareMode {
    CompareMode::PreviousPeriod
}

fn default_anomaly_metric() -> String {
    "sessions".to_string()
}

fn default_window_days() -> u32 {
    7
}

fn default_z_threshold() -> f64 {
    2.5
}

fn default_true() -> bool {
    true
}

// Report tools params
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReportParams {
    /// Start date: "today", "yesterday", "NdaysAgo" or "YYYY-MM-DD"
    #[serde(default = "default_start_date")]
    pub start_date: String,
    /// End date: "today", "yesterday", "NdaysAgo" or "YYYY-MM-DD"
    #[serde(default = "default_end_date")]
    pub end_date: String,
    /// Maximum number of rows to return
    pub limit: Option<u32>,
    /// Compare against "previous_period" or "previous_year"
    pub compare: Option<CompareMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct OrderByParam {
    /// Metric or dimension name to order by (must be one of the requested fields)
    pub field: String,
    /// Sort descending (default true)
    #[serde(default = "default_true")]
    pub desc: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RunReportParams {
    /// Dimension API names, e.g. ["country", "deviceCategory"]
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Metric API names, e.g. ["sessions", "totalUsers"]
    pub metrics: Vec<String>,
    /// Start date: "today", "yesterday", "NdaysAgo" or "YYYY-MM-DD"
    #[serde(default = "default_start_date")]
    pub start_date: String,
    /// End date: "today", "yesterday", "NdaysAgo" or "YYYY-MM-DD"
    #[serde(default = "default_end_date")]
    pub end_date: String,
    /// Maximum number of rows to return
    pub limit: Option<u32>,
    /// Ordering by one requested metric or dimension
    pub order_by: Option<OrderByParam>,
    /// Raw Data API FilterExpression applied to dimensions
    pub dimension_filter: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ComparePeriodsParams {
    /// Dimensions that identify a group, e.g. ["sessionDefaultChannelGroup"]
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Metrics to compare; the first one orders the output
    pub metrics: Vec<String>,
    /// Start date: "NdaysAgo" for previous_period, "YYYY-MM-DD" for previous_year
    #[serde(default = "default_start_date")]
    pub start_date: String,
    /// End date: "yesterday"/"today" for previous_period, "YYYY-MM-DD" for previous_year
    #[serde(default = "default_end_date")]
    pub end_date: String,
    /// "previous_period" (default) or "previous_year"
    #[serde(default = "default_compare_mode")]
    pub compare: CompareMode,
    /// Maximum number of rows per period
    pub limit: Option<u32>,
    /// Raw Data API FilterExpression applied to both periods
    pub dimension_filter: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DetectAnomaliesParams {
    /// Metric to scan (default "sessions")
    #[serde(default = "default_anomaly_metric")]
    pub metric: String,
    /// Start date of the daily series (default "90daysAgo")
    #[serde(default = "default_anomaly_start_date")]
    pub start_date: String,
    /// End date of the daily series (default "yesterday")
    #[serde(default = "default_end_date")]
    pub end_date: String,
    /// Trailing days used as baseline (1-60, default 7)
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    /// Minimum absolute z-score to flag (default 2.5)
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,
    /// Raw Data API FilterExpression applied before aggregation
    pub dimension_filter: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FunnelReportParams {
    /// Ordered funnel steps (2-10)
    pub steps: Vec<FunnelStepSpec>,
    /// Start date (default "30daysAgo")
    #[serde(default = "default_funnel_start_date")]
    pub start_date: String,
    /// End date (default "yesterday")
    #[serde(default = "default_end_date")]
    pub end_date: String,
    /// Open funnel: users may enter at any step
    #[serde(default)]
    pub is_open_funnel: bool,
    /// Dimension to break the funnel down by, e.g. "deviceCategory"
    pub breakdown_dimension: Option<String>,
    /// Maximum distinct breakdown values
    pub breakdown_limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Dimension,
    Metric,
    #[default]
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SearchFieldsParams {
    /// Text to look for in field names and descriptions (case-insensitive)
    #[serde(default)]
    pub query: String,
    /// "dimension", "metric" or "all" (default)
    #[serde(default)]
    pub kind: FieldKind,
    /// Maximum matches per kind (default 25)
    pub limit: Option<u32>,
}

fn invalid(message: impl Into<String>) -> ToolError {
    ToolError::Validation(message.into())
}

pub(crate) fn validate_date_range(start_date: &str, end_date: &str) -> Result<(), ToolError> {
    for (name, value) in [("start_date", start_date), ("end_date", end_date)] {
        if !is_date_expression(value) {
            return Err(invalid(format!(
                "{} '{}' must be 'today', 'yesterday', 'NdaysAgo' or 'YYYY-MM-DD'",
                name, value
            )));
        }
    }
    if let (Some(start), Some(end)) = (parse_iso_date(start_date), parse_iso_date(end_date)) {
        if start > end {
            return Err(invalid("start_date must be on or before end_date"));
        }
    }
    Ok(())
}

pub(crate) fn validate_limit(limit: Option<u32>, max: u32) -> Result<(), ToolError> {
    match limit {
        Some(0) => Err(invalid("limit must be at least 1")),
        Some(n) if n > max => Err(invalid(format!("limit must be at most {}", max))),
        _ => Ok(()),
    }
}

fn is_field_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.'))
}

pub(crate) fn validate_fields(
    kind: &str,
    names: &[String],
    min: usize,
    max: usize,
) -> Result<(), ToolError> {
    if names.len() < min || names.len() > max {
        return Err(invalid(format!(
            "expected between {} and {} {}, got {}",
            min,
            max,
            kind,
            names.len()
        )));
    }
    if let Some(bad) = names.iter().find(|n| !is_field_name(n)) {
        return Err(invalid(format!("'{}' is not a valid {} name", bad, kind)));
    }
    for (i, name) in names.iter().enumerate() {
        if names[..i].contains(name) {
            return Err(invalid(format!("{} '{}' is listed twice", kind, name)));
        }
    }
    Ok(())
}

fn validate_filter(filter: &Option<Value>) -> Result<(), ToolError> {
    match filter {
        None | Some(Value::Object(_)) => Ok(()),
        Some(_) => Err(invalid("dimension_filter must be a JSON object")),
    }
}

impl Validate for ReportParams {
    fn validate(&self, limits: &Limits) -> Result<(), ToolError> {
        validate_date_range(&self.start_date, &self.end_date)?;
        validate_limit(self.limit, limits.max_rows)
    }
}

impl Validate for RunReportParams {
    fn validate(&self, limits: &Limits) -> Result<(), ToolError> {
        validate_fields("dimensions", &self.dimensions, 0, MAX_DIMENSIONS)?;
        validate_fields("metrics", &self.metrics, 1, MAX_METRICS)?;
        validate_date_range(&self.start_date, &self.end_date)?;
        validate_limit(self.limit, limits.max_rows)?;
        validate_filter(&self.dimension_filter)?;
        if let Some(order) = &self.order_by {
            if !self.metrics.contains(&order.field) && !self.dimensions.contains(&order.field) {
                return Err(invalid(format!(
                    "order_by field '{}' must be one of the requested metrics or dimensions",
                    order.field
                )));
            }
        }
        Ok(())
    }
}

impl Validate for ComparePeriodsParams {
    fn validate(&self, limits: &Limits) -> Result<(), ToolError> {
        validate_fields("dimensions", &self.dimensions, 0, MAX_DIMENSIONS)?;
        validate_fields("metrics", &self.metrics, 1, MAX_METRICS)?;
        validate_date_range(&self.start_date, &self.end_date)?;
        validate_limit(self.limit, limits.max_rows)?;
        validate_filter(&self.dimension_filter)
    }
}

impl Validate for DetectAnomaliesParams {
    fn validate(&self, _limits: &Limits) -> Result<(), ToolError> {
        validate_fields("metric", std::slice::from_ref(&self.metric), 1, 1)?;
        validate_date_range(&self.start_date, &self.end_date)?;
        validate_filter(&self.dimension_filter)?;
        if self.window_days == 0 || self.window_days > MAX_WINDOW_DAYS {
            return Err(invalid(format!(
                "window_days must be between 1 and {}",
                MAX_WINDOW_DAYS
            )));
        }
        if !self.z_threshold.is_finite() || self.z_threshold <= 0.0 {
            return Err(invalid("z_threshold must be a positive number"));
        }
        Ok(())
    }
}

impl Validate for FunnelReportParams {
    fn validate(&self, limits: &Limits) -> Result<(), ToolError> {
        validate_steps(&self.steps).map_err(|e| invalid(e.to_string()))?;
        validate_date_range(&self.start_date, &self.end_date)?;
        validate_limit(self.breakdown_limit, limits.max_rows)?;
        if let Some(dimension) = &self.breakdown_dimension {
            validate_fields("breakdown_dimension", std::slice::from_ref(dimension), 1, 1)?;
        } else if self.breakdown_limit.is_some() {
            return Err(invalid("breakdown_limit requires breakdown_dimension"));
        }
        Ok(())
    }
}

impl Validate for SearchFieldsParams {
    fn validate(&self, _limits: &Limits) -> Result<(), ToolError> {
        validate_limit(self.limit, MAX_SEARCH_RESULTS)
    }
}
