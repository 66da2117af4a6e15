//! Report query building and response pivoting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::report::{DimensionOrderBy, FieldRef, MetricOrderBy, OrderBy};
use crate::api::{DateRange, ReportTable, RunReportRequest};
use crate::backend::AnalyticsBackend;
use crate::error::ApiError;

/// Value of one report field: text for dimensions, number for metrics.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

/// One normalized report row, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ReportRow(BTreeMap<String, FieldValue>);

impl ReportRow {
    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.0.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    /// Numeric value of a field; `0` when absent or textual.
    pub fn number(&self, field: &str) -> f64 {
        match self.0.get(field) {
            Some(FieldValue::Number(n)) => *n,
            _ => 0.0,
        }
    }

    /// Text value of a field; empty when absent or numeric.
    pub fn text(&self, field: &str) -> &str {
        match self.0.get(field) {
            Some(FieldValue::Text(s)) => s,
            _ => "",
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for ReportRow {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Field a report is ordered by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderKey {
    Metric(String),
    Dimension(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOrder {
    pub key: OrderKey,
    pub desc: bool,
}

/// Declarative report request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub date_range: DateRange,
    pub limit: u32,
    pub order_by: Option<ReportOrder>,
    pub filter: Option<Value>,
}

impl ReportRequest {
    /// Create a request over a date range with no fields and a limit of 10.
    pub fn new(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            dimensions: Vec::new(),
            metrics: Vec::new(),
            date_range: DateRange::new(start_date, end_date),
            limit: 10,
            order_by: None,
            filter: None,
        }
    }

    pub fn dimensions<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dimensions = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn metrics<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn order_by(mut self, key: OrderKey, desc: bool) -> Self {
        self.order_by = Some(ReportOrder { key, desc });
        self
    }

    pub fn filter(mut self, filter: Option<Value>) -> Self {
        self.filter = filter;
        self
    }

    /// Same request over a different date range.
    pub fn for_range(&self, date_range: DateRange) -> Self {
        Self {
            date_range,
            ..self.clone()
        }
    }

    /// Build the backend request body.
    pub fn to_wire(&self) -> RunReportRequest {
        let field_refs = |names: &[String]| {
            names
                .iter()
                .map(|name| FieldRef { name: name.clone() })
                .collect::<Vec<_>>()
        };

        let order_bys = self
            .order_by
            .iter()
            .map(|order| match &order.key {
                OrderKey::Metric(name) => OrderBy {
                    metric: Some(MetricOrderBy {
                        metric_name: name.clone(),
                    }),
                    dimension: None,
                    desc: order.desc,
                },
                OrderKey::Dimension(name) => OrderBy {
                    metric: None,
                    dimension: Some(DimensionOrderBy {
                        dimension_name: name.clone(),
                    }),
                    desc: order.desc,
                },
            })
            .collect();

        RunReportRequest {
            date_ranges: vec![self.date_range.clone()],
            dimensions: field_refs(&self.dimensions),
            metrics: field_refs(&self.metrics),
            limit: self.limit,
            order_bys,
            dimension_filter: self.filter.clone(),
        }
    }
}

/// Run a report and return its rows as field-named records.
pub async fn run_report(
    backend: &dyn AnalyticsBackend,
    request: &ReportRequest,
) -> Result<Vec<ReportRow>, ApiError> {
    let response = backend.run_report(&request.to_wire()).await?;
    tracing::debug!(
        rows = response.table.rows.len(),
        row_count = ?response.row_count,
        "Report returned"
    );
    Ok(pivot(&response.table))
}

/// Zip each row's positional values onto the table headers.
///
/// Every output row has exactly one entry per header, whatever the values.
pub fn pivot(table: &ReportTable) -> Vec<ReportRow> {
    table
        .rows
        .iter()
        .map(|row| {
            let dimensions = table.dimension_headers.iter().enumerate().map(|(i, h)| {
                let value = row.dimension_values.get(i).and_then(|c| c.value.as_ref());
                (h.name.clone(), FieldValue::Text(dimension_text(value)))
            });
            let metrics = table.metric_headers.iter().enumerate().map(|(i, h)| {
                let value = row.metric_values.get(i).and_then(|c| c.value.as_ref());
                (h.name.clone(), FieldValue::Number(coerce_metric(value)))
            });
            dimensions.chain(metrics).collect()
        })
        .collect()
}

/// Coerce a raw metric value to a finite number, `0` otherwise.
pub fn coerce_metric(value: Option<&Value>) -> f64 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite()).unwrap_or(0.0)
}

fn dimension_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
