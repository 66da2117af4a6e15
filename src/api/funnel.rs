//! runFunnelReport request and response shapes (v1alpha).

use serde::{Deserialize, Serialize};

use super::report::{DateRange, FieldRef, ReportTable};

/// Body of `properties/{id}:runFunnelReport`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFunnelReportRequest {
    pub date_ranges: Vec<DateRange>,
    pub funnel: Funnel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funnel_breakdown: Option<FunnelBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Funnel {
    pub is_open_funnel: bool,
    pub steps: Vec<FunnelStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStep {
    pub name: String,
    pub is_directly_followed_by: bool,
    /// Protobuf duration string, e.g. "300s".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub within_duration_from_prior_step: Option<String>,
    pub filter_expression: FunnelFilterExpression,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelFilterExpression {
    pub funnel_event_filter: FunnelEventFilter,
}

/// Matches an event by name, optionally narrowed by a parameter filter
/// that must hold as well.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelEventFilter {
    pub event_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funnel_parameter_filter_expression: Option<FunnelParameterFilterExpression>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelParameterFilterExpression {
    pub funnel_parameter_filter: FunnelParameterFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelParameterFilter {
    pub event_parameter_name: String,
    pub string_filter: StringFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StringFilter {
    pub match_type: String,
    pub value: String,
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelBreakdown {
    pub breakdown_dimension: FieldRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Response of `properties/{id}:runFunnelReport`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFunnelReportResponse {
    #[serde(default)]
    pub funnel_table: Option<ReportTable>,
    #[serde(default)]
    pub funnel_visualization: Option<ReportTable>,
}
