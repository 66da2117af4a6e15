//! The immutable tool catalog and argument validation.

use std::sync::Arc;

use rmcp::schemars::{self, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::descriptors::{ReportDescriptor, REPORT_DESCRIPTORS};
use super::params::{
    ComparePeriodsParams, DetectAnomaliesParams, FunnelReportParams, Limits, ReportParams,
    RunReportParams, SearchFieldsParams, Validate,
};
use crate::error::ToolError;

pub type JsonObject = Map<String, Value>;

/// Which handler a tool runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Report(&'static ReportDescriptor),
    RunReport,
    ComparePeriods,
    DetectAnomalies,
    FunnelReport,
    SearchFields,
}

/// Arguments that passed validation, tagged with their handler.
#[derive(Debug, Clone)]
pub enum ValidatedCall {
    Report {
        descriptor: &'static ReportDescriptor,
        params: ReportParams,
    },
    RunReport(RunReportParams),
    ComparePeriods(ComparePeriodsParams),
    DetectAnomalies(DetectAnomaliesParams),
    FunnelReport(FunnelReportParams),
    SearchFields(SearchFieldsParams),
}

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: String,
    pub input_schema: Arc<JsonObject>,
    pub kind: ToolKind,
}

impl ToolDefinition {
    fn new<P: JsonSchema>(name: &'static str, description: impl Into<String>, kind: ToolKind) -> Self {
        Self {
            name,
            description: description.into(),
            input_schema: schema_of::<P>(),
            kind,
        }
    }
}

fn schema_of<P: JsonSchema>() -> Arc<JsonObject> {
    let schema = schemars::schema_for!(P);
    match serde_json::to_value(schema) {
        Ok(Value::Object(map)) => Arc::new(map),
        _ => Arc::new(JsonObject::new()),
    }
}

/// Deserialize and check arguments. Absent arguments mean `{}`.
fn parse<P>(arguments: Value, limits: &Limits) -> Result<P, ToolError>
where
    P: DeserializeOwned + Validate,
{
    let arguments = match arguments {
        Value::Null => Value::Object(JsonObject::new()),
        Value::Object(map) => Value::Object(map),
        _ => {
            return Err(ToolError::Validation(
                "arguments must be a JSON object".to_string(),
            ))
        }
    };
    let params: P =
        serde_json::from_value(arguments).map_err(|e| ToolError::Validation(e.to_string()))?;
    params.validate(limits)?;
    Ok(params)
}

/// Catalog of every tool, fixed at startup.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    limits: Limits,
}

impl ToolRegistry {
    pub fn standard(limits: Limits) -> Self {
        let mut tools: Vec<ToolDefinition> = REPORT_DESCRIPTORS
            .iter()
            .map(|descriptor| {
                let description = if descriptor.comparable {
                    format!(
                        "{}. Set compare to previous_period or previous_year for period-over-period rows.",
                        descriptor.description
                    )
                } else {
                    descriptor.description.to_string()
                };
                ToolDefinition::new::<ReportParams>(
                    descriptor.name,
                    description,
                    ToolKind::Report(descriptor),
                )
            })
            .collect();

        tools.extend([
            ToolDefinition::new::<RunReportParams>(
                "run_report",
                "Run a report with any dimensions and metrics, optional ordering and dimension filter",
                ToolKind::RunReport,
            ),
            ToolDefinition::new::<ComparePeriodsParams>(
                "compare_periods",
                "Compare metrics per group between a date range and the previous period or previous year",
                ToolKind::ComparePeriods,
            ),
            ToolDefinition::new::<DetectAnomaliesParams>(
                "detect_anomalies",
                "Flag days whose metric value deviates from the trailing window by a z-score threshold. \
                 Against a perfectly flat window a day is flagged (zScore null) only when it moves \
                 at least z_threshold units. The newest days are kept when the series hits the row limit.",
                ToolKind::DetectAnomalies,
            ),
            ToolDefinition::new::<FunnelReportParams>(
                "funnel_report",
                "Completion and abandonment through an ordered sequence of events",
                ToolKind::FunnelReport,
            ),
            ToolDefinition::new::<SearchFieldsParams>(
                "search_fields",
                "Search the property's dimensions and metrics by name or description",
                ToolKind::SearchFields,
            ),
        ]);

        Self { tools, limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Catalog as `{"tools": [{name, description, inputSchema}]}`.
    pub fn catalog(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": Value::Object((*tool.input_schema).clone()),
                })
            })
            .collect();
        serde_json::json!({ "tools": tools })
    }

    /// Resolve a tool and validate its arguments. Nothing runs here.
    pub fn validate(&self, name: &str, arguments: Value) -> Result<ValidatedCall, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let limits = &self.limits;

        Ok(match tool.kind {
            ToolKind::Report(descriptor) => {
                let params: ReportParams = parse(arguments, limits)?;
                if params.compare.is_some() && !descriptor.comparable {
                    return Err(ToolError::Validation(format!(
                        "{} does not support compare",
                        descriptor.name
                    )));
                }
                ValidatedCall::Report { descriptor, params }
            }
            ToolKind::RunReport => ValidatedCall::RunReport(parse(arguments, limits)?),
            ToolKind::ComparePeriods => ValidatedCall::ComparePeriods(parse(arguments, limits)?),
            ToolKind::DetectAnomalies => ValidatedCall::DetectAnomalies(parse(arguments, limits)?),
            ToolKind::FunnelReport => ValidatedCall::FunnelReport(parse(arguments, limits)?),
            ToolKind::SearchFields => ValidatedCall::SearchFields(parse(arguments, limits)?),
        })
    }
}
