//! runReport request and response shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A contiguous range of days, in either relative or ISO form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: String,
    pub end_date: String,
}

impl DateRange {
    pub fn new(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            start_date: start_date.into(),
            end_date: end_date.into(),
        }
    }
}

/// Reference to a dimension or metric by API name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricOrderBy {
    pub metric_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionOrderBy {
    pub dimension_name: String,
}

/// One ordering clause; exactly one of `metric` / `dimension` is set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OrderBy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<MetricOrderBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<DimensionOrderBy>,
    pub desc: bool,
}

/// Body of `properties/{id}:runReport`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReportRequest {
    pub date_ranges: Vec<DateRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<FieldRef>,
    pub metrics: Vec<FieldRef>,
    pub limit: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_bys: Vec<OrderBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension_filter: Option<Value>,
}

/// Column header of a report table.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Header {
    pub name: String,
}

/// A single cell; GA encodes every value as a string, but nulls and
/// numbers are tolerated.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Cell {
    #[serde(default)]
    pub value: Option<Value>,
}

/// One raw row, values positionally aligned with the table headers.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    #[serde(default)]
    pub dimension_values: Vec<Cell>,
    #[serde(default)]
    pub metric_values: Vec<Cell>,
}

/// Column-oriented table shared by report and funnel responses.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTable {
    #[serde(default)]
    pub dimension_headers: Vec<Header>,
    #[serde(default)]
    pub metric_headers: Vec<Header>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

/// Response of `properties/{id}:runReport`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReportResponse {
    #[serde(flatten)]
    pub table: ReportTable,
    #[serde(default)]
    pub row_count: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serializes_in_api_shape() {
        let request = RunReportRequest {
            date_ranges: vec![DateRange::new("7daysAgo", "yesterday")],
            dimensions: vec![FieldRef {
                name: "country".to_string(),
            }],
            metrics: vec![FieldRef {
                name: "sessions".to_string(),
            }],
            limit: 10,
            order_bys: vec![OrderBy {
                metric: Some(MetricOrderBy {
                    metric_name: "sessions".to_string(),
                }),
                dimension: None,
                desc: true,
            }],
            dimension_filter: None,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "dateRanges": [{"startDate": "7daysAgo", "endDate": "yesterday"}],
                "dimensions": [{"name": "country"}],
                "metrics": [{"name": "sessions"}],
                "limit": 10,
                "orderBys": [{"metric": {"metricName": "sessions"}, "desc": true}]
            })
        );
    }

    #[test]
    fn test_response_tolerates_missing_sections() {
        let response: RunReportResponse = serde_json::from_value(json!({
            "metricHeaders": [{"name": "sessions", "type": "TYPE_INTEGER"}],
            "kind": "analyticsData#runReport"
        }))
        .unwrap();

        assert!(response.table.dimension_headers.is_empty());
        assert_eq!(response.table.metric_headers[0].name, "sessions");
        assert!(response.table.rows.is_empty());
        assert_eq!(response.row_count, None);
    }
}
