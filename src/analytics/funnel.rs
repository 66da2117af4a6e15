//! Funnel step compilation and funnel response flattening.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::normalize::{pivot, ReportRow};
use crate::api::funnel::{
    Funnel, FunnelBreakdown, FunnelEventFilter, FunnelFilterExpression,
    FunnelParameterFilter, FunnelParameterFilterExpression, FunnelStep, StringFilter,
};
use crate::api::report::FieldRef;
use crate::api::{DateRange, RunFunnelReportRequest, RunFunnelReportResponse};

pub const MIN_FUNNEL_STEPS: usize = 2;
pub const MAX_FUNNEL_STEPS: usize = 10;

/// Event parameter matched by `page_location_contains`.
const PAGE_LOCATION_PARAM: &str = "page_location";

/// One funnel stage.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FunnelStepSpec {
    /// Display name of the step
    pub name: String,
    /// Event that completes the step (e.g. "page_view", "purchase")
    pub event_name: String,
    /// Only count the event when page_location contains this text (case-insensitive)
    #[serde(default)]
    pub page_location_contains: Option<String>,
    /// Require this step to directly follow the previous one
    #[serde(default)]
    pub is_directly_followed_by: bool,
    /// Maximum time since the previous step, as a duration like "300s"
    #[serde(default)]
    pub within_duration_from_prior_step: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FunnelError {
    #[error("a funnel needs between 2 and 10 steps, got {0}")]
    StepCount(usize),

    #[error("step {index} ('{name}'): {reason}")]
    InvalidStep {
        index: usize,
        name: String,
        reason: String,
    },
}

/// Breakdown of funnel results by one dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakdown {
    pub dimension: String,
    pub limit: Option<u32>,
}

/// Both funnel sub-tables as field-named rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FunnelTables {
    pub table: Vec<ReportRow>,
    pub visualization: Vec<ReportRow>,
}

/// Check step count and per-step fields without building anything.
pub fn validate_steps(steps: &[FunnelStepSpec]) -> Result<(), FunnelError> {
    if !(MIN_FUNNEL_STEPS..=MAX_FUNNEL_STEPS).contains(&steps.len()) {
        return Err(FunnelError::StepCount(steps.len()));
    }

    for (index, step) in steps.iter().enumerate() {
        let invalid = |reason: &str| FunnelError::InvalidStep {
            index,
            name: step.name.clone(),
            reason: reason.to_string(),
        };

        if step.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if step.event_name.trim().is_empty() {
            return Err(invalid("event_name must not be empty"));
        }
        if let Some(duration) = step.within_duration_from_prior_step.as_deref() {
            if !is_duration(duration) {
                return Err(invalid(
                    "within_duration_from_prior_step must look like \"300s\" or \"1.5s\"",
                ));
            }
        }
    }

    Ok(())
}

/// Compile ordered steps into the backend funnel request.
pub fn compile(
    steps: &[FunnelStepSpec],
    date_range: DateRange,
    is_open_funnel: bool,
    breakdown: Option<Breakdown>,
) -> Result<RunFunnelReportRequest, FunnelError> {
    validate_steps(steps)?;

    let steps = steps.iter().map(compile_step).collect();

    Ok(RunFunnelReportRequest {
        date_ranges: vec![date_range],
        funnel: Funnel {
            is_open_funnel,
            steps,
        },
        funnel_breakdown: breakdown.map(|b| FunnelBreakdown {
            breakdown_dimension: FieldRef { name: b.dimension },
            limit: b.limit,
        }),
    })
}

fn compile_step(spec: &FunnelStepSpec) -> FunnelStep {
    let page_filter = spec
        .page_location_contains
        .as_ref()
        .filter(|fragment| !fragment.is_empty())
        .map(|fragment| FunnelParameterFilterExpression {
            funnel_parameter_filter: FunnelParameterFilter {
                event_parameter_name: PAGE_LOCATION_PARAM.to_string(),
                string_filter: StringFilter {
                    match_type: "CONTAINS".to_string(),
                    value: fragment.clone(),
                    case_sensitive: false,
                },
            },
        });

    FunnelStep {
        name: spec.name.clone(),
        is_directly_followed_by: spec.is_directly_followed_by,
        within_duration_from_prior_step: spec.within_duration_from_prior_step.clone(),
        filter_expression: FunnelFilterExpression {
            funnel_event_filter: FunnelEventFilter {
                event_name: spec.event_name.clone(),
                funnel_parameter_filter_expression: page_filter,
            },
        },
    }
}

/// Pivot both funnel sub-tables; each keeps its own headers.
pub fn flatten(response: &RunFunnelReportResponse) -> FunnelTables {
    FunnelTables {
        table: response.funnel_table.as_ref().map(pivot).unwrap_or_default(),
        visualization: response
            .funnel_visualization
            .as_ref()
            .map(pivot)
            .unwrap_or_default(),
    }
}

/// Protobuf JSON duration: decimal seconds with an `s` suffix.
fn is_duration(value: &str) -> bool {
    let Some(number) = value.strip_suffix('s') else {
        return false;
    };
    let mut parts = number.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let frac = parts.next();
    !whole.is_empty()
        && whole.chars().all(|c| c.is_ascii_digit())
        && frac.map_or(true, |f| !f.is_empty() && f.len() <= 9 && f.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(name: &str, event: &str) -> FunnelStepSpec {
        FunnelStepSpec {
            name: name.to_string(),
            event_name: event.to_string(),
            page_location_contains: None,
            is_directly_followed_by: false,
            within_duration_from_prior_step: None,
        }
    }

    fn range() -> DateRange {
        DateRange::new("30daysAgo", "yesterday")
    }

    #[test]
    fn test_two_plain_steps() {
        let request = compile(
            &[step("View", "view_item"), step("Buy", "purchase")],
            range(),
            false,
            None,
        )
        .unwrap();

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "dateRanges": [{"startDate": "30daysAgo", "endDate": "yesterday"}],
                "funnel": {
                    "isOpenFunnel": false,
                    "steps": [
                        {
                            "name": "View",
                            "isDirectlyFollowedBy": false,
                            "filterExpression": {"funnelEventFilter": {"eventName": "view_item"}}
                        },
                        {
                            "name": "Buy",
                            "isDirectlyFollowedBy": false,
                            "filterExpression": {"funnelEventFilter": {"eventName": "purchase"}}
                        }
                    ]
                }
            })
        );
    }

    #[test]
    fn test_page_location_and_adjacency_constraints() {
        let mut checkout = step("Checkout", "page_view");
        checkout.page_location_contains = Some("/checkout".to_string());
        checkout.is_directly_followed_by = true;
        checkout.within_duration_from_prior_step = Some("600s".to_string());

        let request = compile(
            &[step("Cart", "add_to_cart"), checkout],
            range(),
            true,
            Some(Breakdown {
                dimension: "deviceCategory".to_string(),
                limit: Some(5),
            }),
        )
        .unwrap();

        let json = serde_json::to_value(&request).unwrap();
        let second = &json["funnel"]["steps"][1];
        assert_eq!(second["isDirectlyFollowedBy"], true);
        assert_eq!(second["withinDurationFromPriorStep"], "600s");
        assert_eq!(
            second["filterExpression"]["funnelEventFilter"],
            json!({
                "eventName": "page_view",
                "funnelParameterFilterExpression": {
                    "funnelParameterFilter": {
                        "eventParameterName": "page_location",
                        "stringFilter": {
                            "matchType": "CONTAINS",
                            "value": "/checkout",
                            "caseSensitive": false
                        }
                    }
                }
            })
        );
        assert_eq!(json["funnel"]["isOpenFunnel"], true);
        assert_eq!(
            json["funnelBreakdown"],
            json!({"breakdownDimension": {"name": "deviceCategory"}, "limit": 5})
        );
        assert!(json["funnel"]["steps"][0].get("withinDurationFromPriorStep").is_none());
    }

    #[test]
    fn test_step_count_bounds() {
        let one = vec![step("Only", "page_view")];
        assert_eq!(
            compile(&one, range(), false, None).unwrap_err(),
            FunnelError::StepCount(1)
        );

        let eleven: Vec<_> = (0..11).map(|i| step(&format!("S{i}"), "page_view")).collect();
        assert_eq!(
            compile(&eleven, range(), false, None).unwrap_err(),
            FunnelError::StepCount(11)
        );

        let ten: Vec<_> = (0..10).map(|i| step(&format!("S{i}"), "page_view")).collect();
        assert_eq!(compile(&ten, range(), false, None).unwrap().funnel.steps.len(), 10);
    }

    #[test]
    fn test_invalid_step_fields() {
        let mut bad = step("Buy", "purchase");
        bad.within_duration_from_prior_step = Some("10 minutes".to_string());
        let err = validate_steps(&[step("View", "view_item"), bad]).unwrap_err();
        assert!(matches!(err, FunnelError::InvalidStep { index: 1, .. }));

        let err = validate_steps(&[step("View", ""), step("Buy", "purchase")]).unwrap_err();
        assert!(matches!(err, FunnelError::InvalidStep { index: 0, .. }));
    }

    #[test]
    fn test_duration_format() {
        assert!(is_duration("300s"));
        assert!(is_duration("1.5s"));
        assert!(!is_duration("300"));
        assert!(!is_duration("s"));
        assert!(!is_duration("1.s"));
        assert!(!is_duration("-5s"));
    }

    #[test]
    fn test_flatten_each_table_keeps_own_headers() {
        let response: RunFunnelReportResponse = serde_json::from_value(json!({
            "funnelTable": {
                "dimensionHeaders": [{"name": "funnelStepName"}],
                "metricHeaders": [{"name": "activeUsers"}, {"name": "funnelStepCompletionRate"}],
                "rows": [
                    {"dimensionValues": [{"value": "1. View"}], "metricValues": [{"value": "100"}, {"value": "0.4"}]},
                    {"dimensionValues": [{"value": "2. Buy"}], "metricValues": [{"value": "40"}, {"value": "0"}]}
                ]
            },
            "funnelVisualization": {
                "dimensionHeaders": [{"name": "funnelStepName"}, {"name": "deviceCategory"}],
                "metricHeaders": [{"name": "activeUsers"}],
                "rows": [
                    {"dimensionValues": [{"value": "1. View"}, {"value": "mobile"}], "metricValues": [{"value": "70"}]}
                ]
            }
        }))
        .unwrap();

        let tables = flatten(&response);
        assert_eq!(tables.table.len(), 2);
        assert_eq!(tables.table[0].len(), 3);
        assert_eq!(tables.table[1].number("activeUsers"), 40.0);
        assert_eq!(tables.visualization.len(), 1);
        assert_eq!(tables.visualization[0].len(), 3);
        assert_eq!(tables.visualization[0].text("deviceCategory"), "mobile");
    }

    #[test]
    fn test_flatten_missing_tables() {
        let tables = flatten(&RunFunnelReportResponse::default());
        assert!(tables.table.is_empty());
        assert!(tables.visualization.is_empty());
    }
}
