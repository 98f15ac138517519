//! Declarative chart description attached to query results.

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Area,
    Pie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub takeaway: String,
    pub x_key: String,
    pub y_keys: Vec<String>,
    #[serde(default)]
    pub legend: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple_lines: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_categories: Option<Vec<String>>,
    /// Always overwritten by [`assign_colors`]; whatever the model sent is discarded.
    #[serde(default)]
    pub colors: Map<String, serde_json::Value>,
}

/// CSS color for the value key at `index` among the declared `y_keys`.
pub fn color_for_position(index: usize) -> String {
    format!("hsl(var(--chart-{}))", index + 1)
}

/// Replace `colors` with the positional palette, one entry per y key.
pub fn assign_colors(config: &mut ChartConfig) {
    config.colors = config
        .y_keys
        .iter()
        .enumerate()
        .map(|(index, key)| (key.clone(), serde_json::Value::String(color_for_position(index))))
        .collect();
}

/// Check that the chosen keys exist in the result columns.
pub fn validate_against_columns(config: &ChartConfig, columns: &[String]) -> Result<(), ToolError> {
    if config.y_keys.is_empty() {
        return Err(ToolError::Generation(
            "chart config declares no value keys".to_string(),
        ));
    }

    let has_column = |key: &str| columns.iter().any(|column| column == key);

    if !has_column(&config.x_key) {
        return Err(ToolError::Generation(format!(
            "chart axis key `{}` is not a result column",
            config.x_key
        )));
    }
    if let Some(missing) = config.y_keys.iter().find(|key| !has_column(key)) {
        return Err(ToolError::Generation(format!(
            "chart value key `{}` is not a result column",
            missing
        )));
    }
    Ok(())
}
