//! Natural-language questions over the `unicorns` dataset.
//!
//! Pipeline: generate a SQL candidate with the model, pass it through the
//! read-only gate, run it, then ask the model for a chart description of
//! the rows. Each stage fails with its own [`ToolError`] kind.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};

use super::chart_config::{assign_colors, validate_against_columns, ChartConfig};
use super::query_guard::validate_read_only_query;
use crate::error::ToolError;
use crate::protocol::{ModelMsg, ModelTarget, QueryResult, SqlMsg};
use crate::structured_output::generate_object;
use crate::system_prompt::{
    chart_config_prompt, query_generation_prompt, query_generation_system_prompt,
    CHART_SYSTEM_PROMPT,
};

#[derive(Debug, Clone, Deserialize)]
pub struct QueryDatabaseInput {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDatabaseOutput {
    pub results: Vec<Map<String, Value>>,
    pub columns: Vec<String>,
    /// `None` (serialized as `null`) when the query matched no rows
    pub config: Option<ChartConfig>,
}

#[derive(Debug, Deserialize)]
struct GeneratedQuery {
    query: String,
}

/// Ask the model for a single read-only SQL query answering `request`.
pub async fn generate_query(
    model_tx: &mpsc::Sender<ModelMsg>,
    target: &ModelTarget,
    request: &str,
) -> Result<String, ToolError> {
    let (generated, usage): (GeneratedQuery, _) = generate_object(
        model_tx,
        target,
        &query_generation_system_prompt(),
        &query_generation_prompt(request),
    )
    .await?;
    tracing::debug!(total_tokens = usage.total_tokens, "query generated");

    let query = generated.query.trim().to_string();
    if query.is_empty() {
        return Err(ToolError::Generation("model returned an empty query".to_string()));
    }
    Ok(query)
}

/// Gate `candidate` and run it. A rejected candidate never reaches the store.
pub async fn run_generated_query(
    sql_tx: &mpsc::Sender<SqlMsg>,
    candidate: &str,
) -> Result<QueryResult, ToolError> {
    if let Err(rejection) = validate_read_only_query(candidate) {
        tracing::warn!(query = %candidate, %rejection, "generated query rejected");
        return Err(rejection.into());
    }

    let (tx, rx) = oneshot::channel();
    sql_tx
        .send(SqlMsg::ExecuteSql {
            sql: candidate.to_string(),
            respond_to: tx,
        })
        .await
        .map_err(|_| ToolError::Upstream("data store is not running".to_string()))?;

    let result = rx
        .await
        .map_err(|_| ToolError::Upstream("data store dropped the request".to_string()))??;
    Ok(result)
}

/// Ask the model how to chart `result`, then fix the colors by key position.
pub async fn generate_chart_config(
    model_tx: &mpsc::Sender<ModelMsg>,
    target: &ModelTarget,
    request: &str,
    result: &QueryResult,
) -> Result<ChartConfig, ToolError> {
    let data = serde_json::to_string_pretty(&result.rows)
        .map_err(|e| ToolError::Generation(format!("unserializable rows: {}", e)))?;

    let (mut config, usage): (ChartConfig, _) = generate_object(
        model_tx,
        target,
        CHART_SYSTEM_PROMPT,
        &chart_config_prompt(request, &data),
    )
    .await?;
    tracing::debug!(total_tokens = usage.total_tokens, "chart config generated");

    validate_against_columns(&config, &result.columns())?;
    assign_colors(&mut config);
    Ok(config)
}

pub struct QueryDatabaseExecutor {
    model_tx: mpsc::Sender<ModelMsg>,
    sql_tx: mpsc::Sender<SqlMsg>,
    target: ModelTarget,
}

impl QueryDatabaseExecutor {
    pub fn new(
        model_tx: mpsc::Sender<ModelMsg>,
        sql_tx: mpsc::Sender<SqlMsg>,
        target: ModelTarget,
    ) -> Self {
        Self {
            model_tx,
            sql_tx,
            target,
        }
    }

    pub async fn execute(&self, input: QueryDatabaseInput) -> Result<QueryDatabaseOutput, ToolError> {
        if input.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
        }

        let sql = generate_query(&self.model_tx, &self.target, &input.query).await?;
        tracing::info!(%sql, "running generated query");
        let result = run_generated_query(&self.sql_tx, &sql).await?;

        let columns = result.columns();
        let config = if result.is_empty() {
            None
        } else {
            Some(generate_chart_config(&self.model_tx, &self.target, &input.query, &result).await?)
        };

        Ok(QueryDatabaseOutput {
            results: result.rows,
            columns,
            config,
        })
    }
}
