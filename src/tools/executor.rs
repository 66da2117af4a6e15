//! Tool handlers: build request, run it, shape the output.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::descriptors::ReportDescriptor;
use super::params::{
    ComparePeriodsParams, DetectAnomaliesParams, FieldKind, FunnelReportParams, Limits,
    ReportParams, RunReportParams, SearchFieldsParams,
};
use super::registry::ValidatedCall;
use crate::analytics::period::resolve_previous_period;
use crate::analytics::{anomaly, compare, funnel, normalize};
use crate::analytics::{CompareMode, OrderKey, ReportRequest};
use crate::api::DateRange;
use crate::backend::AnalyticsBackend;
use crate::error::ToolError;

const DEFAULT_SEARCH_LIMIT: u32 = 25;
const DEFAULT_REPORT_LIMIT: u32 = 100;
/// Upper bound on daily points requested for anomaly scans.
const MAX_SERIES_DAYS: u32 = 1000;

/// Run a validated call against the backend. Every row limit sent is capped by `limits`.
pub async fn execute(
    backend: &dyn AnalyticsBackend,
    call: ValidatedCall,
    limits: &Limits,
) -> Result<Value, ToolError> {
    match call {
        ValidatedCall::Report { descriptor, params } => {
            run_descriptor(backend, descriptor, &params, limits).await
        }
        ValidatedCall::RunReport(params) => run_custom_report(backend, &params, limits).await,
        ValidatedCall::ComparePeriods(params) => compare_periods(backend, &params, limits).await,
        ValidatedCall::DetectAnomalies(params) => detect_anomalies(backend, &params, limits).await,
        ValidatedCall::FunnelReport(params) => funnel_report(backend, &params).await,
        ValidatedCall::SearchFields(params) => search_fields(backend, &params).await,
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Backend(format!("failed to encode result: {}", e)))
}

async fn run_descriptor(
    backend: &dyn AnalyticsBackend,
    descriptor: &ReportDescriptor,
    params: &ReportParams,
    limits: &Limits,
) -> Result<Value, ToolError> {
    let request = descriptor.request(params, limits);
    let mut output = match params.compare {
        Some(mode) => compare_report(backend, &request, &descriptor.key_fields(), mode).await?,
        None => plain_report(backend, &request).await?,
    };
    output["report"] = json!(descriptor.name);
    Ok(output)
}

async fn run_custom_report(
    backend: &dyn AnalyticsBackend,
    params: &RunReportParams,
    limits: &Limits,
) -> Result<Value, ToolError> {
    let mut request = ReportRequest::new(params.start_date.clone(), params.end_date.clone())
        .dimensions(params.dimensions.iter().cloned())
        .metrics(params.metrics.iter().cloned())
        .limit(limits.clamp(params.limit.unwrap_or(DEFAULT_REPORT_LIMIT)))
        .filter(params.dimension_filter.clone());

    if let Some(order) = &params.order_by {
        let key = if params.metrics.contains(&order.field) {
            OrderKey::Metric(order.field.clone())
        } else {
            OrderKey::Dimension(order.field.clone())
        };
        request = request.order_by(key, order.desc);
    }

    plain_report(backend, &request).await
}

async fn plain_report(
    backend: &dyn AnalyticsBackend,
    request: &ReportRequest,
) -> Result<Value, ToolError> {
    let rows = normalize::run_report(backend, request).await?;
    Ok(json!({
        "dateRange": to_json(&request.date_range)?,
        "rowCount": rows.len(),
        "rows": to_json(&rows)?,
    }))
}

async fn compare_periods(
    backend: &dyn AnalyticsBackend,
    params: &ComparePeriodsParams,
    limits: &Limits,
) -> Result<Value, ToolError> {
    let mut request = ReportRequest::new(params.start_date.clone(), params.end_date.clone())
        .dimensions(params.dimensions.iter().cloned())
        .metrics(params.metrics.iter().cloned())
        .limit(limits.clamp(params.limit.unwrap_or(DEFAULT_REPORT_LIMIT)))
        .filter(params.dimension_filter.clone());
    if let Some(primary) = params.metrics.first() {
        request = request.order_by(OrderKey::Metric(primary.clone()), true);
    }

    compare_report(backend, &request, &params.dimensions, params.compare).await
}

/// Resolve the comparison range, fetch both periods concurrently and merge.
async fn compare_report(
    backend: &dyn AnalyticsBackend,
    request: &ReportRequest,
    key_fields: &[String],
    mode: CompareMode,
) -> Result<Value, ToolError> {
    let previous_range = resolve_previous_period(
        &request.date_range.start_date,
        &request.date_range.end_date,
        mode,
    )
    .map_err(|e| ToolError::NotResolvable(e.to_string()))?;
    let previous_request = request.for_range(previous_range.clone());

    debug!(
        mode = %mode,
        current = ?request.date_range,
        previous = ?previous_range,
        "Fetching comparison periods"
    );

    let (current, previous) = tokio::try_join!(
        normalize::run_report(backend, request),
        normalize::run_report(backend, &previous_request),
    )?;

    let rows = compare::merge(&current, &previous, key_fields, &request.metrics);
    Ok(json!({
        "mode": mode.to_string(),
        "dateRange": to_json(&request.date_range)?,
        "comparisonRange": to_json(&previous_range)?,
        "rowCount": rows.len(),
        "rows": to_json(&rows)?,
    }))
}

async fn detect_anomalies(
    backend: &dyn AnalyticsBackend,
    params: &DetectAnomaliesParams,
    limits: &Limits,
) -> Result<Value, ToolError> {
    // Newest first, so a capped series drops the oldest days.
    let request = ReportRequest::new(params.start_date.clone(), params.end_date.clone())
        .dimensions(["date"])
        .metrics([params.metric.clone()])
        .limit(limits.clamp(MAX_SERIES_DAYS))
        .order_by(OrderKey::Dimension("date".to_string()), true)
        .filter(params.dimension_filter.clone());

    let rows = normalize::run_report(backend, &request).await?;
    let series_capped = rows.len() >= request.limit as usize;
    if series_capped {
        debug!(limit = request.limit, "Anomaly series hit the row limit; oldest days dropped");
    }
    let series = anomaly::series_from_rows(&rows, "date", &params.metric);
    let anomalies = anomaly::detect(
        &series,
        &params.metric,
        params.window_days as usize,
        params.z_threshold,
    );

    Ok(json!({
        "metric": params.metric,
        "dateRange": to_json(&request.date_range)?,
        "windowDays": params.window_days,
        "zThreshold": params.z_threshold,
        "pointsEvaluated": series.len().saturating_sub(params.window_days as usize),
        "seriesStart": series.first().map(|p| p.date.as_str()),
        "seriesCapped": series_capped,
        "anomalyCount": anomalies.len(),
        "anomalies": to_json(&anomalies)?,
    }))
}

async fn funnel_report(
    backend: &dyn AnalyticsBackend,
    params: &FunnelReportParams,
) -> Result<Value, ToolError> {
    let date_range = DateRange::new(params.start_date.clone(), params.end_date.clone());
    let breakdown = params
        .breakdown_dimension
        .as_ref()
        .map(|dimension| funnel::Breakdown {
            dimension: dimension.clone(),
            limit: params.breakdown_limit,
        });

    let request = funnel::compile(&params.steps, date_range.clone(), params.is_open_funnel, breakdown)
        .map_err(|e| ToolError::Validation(e.to_string()))?;
    let response = backend.run_funnel_report(&request).await?;
    let tables = funnel::flatten(&response);

    Ok(json!({
        "dateRange": to_json(&date_range)?,
        "isOpenFunnel": params.is_open_funnel,
        "steps": params.steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        "table": to_json(&tables.table)?,
        "visualization": to_json(&tables.visualization)?,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldMatch<'a> {
    api_name: &'a str,
    ui_name: Option<&'a str>,
    description: Option<&'a str>,
    category: Option<&'a str>,
}

fn matches_query(needle: &str, fields: [Option<&str>; 3]) -> bool {
    needle.is_empty()
        || fields
            .iter()
            .flatten()
            .any(|text| text.to_lowercase().contains(needle))
}

async fn search_fields(
    backend: &dyn AnalyticsBackend,
    params: &SearchFieldsParams,
) -> Result<Value, ToolError> {
    let metadata = backend.get_metadata().await?;
    let needle = params.query.trim().to_lowercase();
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT) as usize;

    let dimensions: Vec<FieldMatch> = if params.kind == FieldKind::Metric {
        Vec::new()
    } else {
        metadata
            .dimensions
            .iter()
            .filter(|d| {
                matches_query(
                    &needle,
                    [Some(d.api_name.as_str()), d.ui_name.as_deref(), d.description.as_deref()],
                )
            })
            .take(limit)
            .map(|d| FieldMatch {
                api_name: &d.api_name,
                ui_name: d.ui_name.as_deref(),
                description: d.description.as_deref(),
                category: d.category.as_deref(),
            })
            .collect()
    };

    let metrics: Vec<FieldMatch> = if params.kind == FieldKind::Dimension {
        Vec::new()
    } else {
        metadata
            .metrics
            .iter()
            .filter(|m| {
                matches_query(
                    &needle,
                    [Some(m.api_name.as_str()), m.ui_name.as_deref(), m.description.as_deref()],
                )
            })
            .take(limit)
            .map(|m| FieldMatch {
                api_name: &m.api_name,
                ui_name: m.ui_name.as_deref(),
                description: m.description.as_deref(),
                category: m.category.as_deref(),
            })
            .collect()
    };

    Ok(json!({
        "query": params.query,
        "dimensions": to_json(&dimensions)?,
        "metrics": to_json(&metrics)?,
        "total": dimensions.len() + metrics.len(),
    }))
}
