//! Metadata (dimension / metric catalog) response shapes.

use serde::{Deserialize, Serialize};

/// Dimension available for the property.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionMetadata {
    pub api_name: String,
    #[serde(default)]
    pub ui_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub custom_definition: bool,
}

/// Metric available for the property.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricMetadata {
    pub api_name: String,
    #[serde(default)]
    pub ui_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(rename = "type", default)]
    pub metric_type: Option<String>,
    #[serde(default)]
    pub custom_definition: bool,
}

/// Response of `properties/{id}/metadata`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetadataResponse {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dimensions: Vec<DimensionMetadata>,
    #[serde(default)]
    pub metrics: Vec<MetricMetadata>,
}
