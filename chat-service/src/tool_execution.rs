//! Tool dispatch for the agentic loop.
//!
//! Every call the model makes becomes a [`ToolInvocation`]. Failures never
//! escape as errors: they are folded into the invocation's result payload
//! so the model can see them on its next pass.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::app_state::ActorHandles;
use crate::error::ToolError;
use crate::protocol::{ModelTarget, ParsedToolCall};
use crate::tools::{
    BuiltinTool, DocumentExecutor, GetInformationExecutor, GetWeatherExecutor,
    QueryDatabaseExecutor,
};

/// Result text for calls past the step budget.
pub const STEP_BUDGET_SKIP_MESSAGE: &str = "not executed: step budget reached";

/// Everything a tool needs to run on behalf of one turn.
#[derive(Clone)]
pub struct ToolContext {
    pub handles: ActorHandles,
    pub target: ModelTarget,
    pub user_id: String,
    pub top_k: usize,
    pub weather_base_url: String,
    pub http: reqwest::Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool: String,
    pub arguments: Value,
    pub status: InvocationStatus,
    pub result: Value,
}

impl ToolInvocation {
    pub fn pending(call: &ParsedToolCall) -> Self {
        Self {
            call_id: call.id.clone(),
            tool: call.tool.clone(),
            arguments: call.arguments.clone(),
            status: InvocationStatus::Pending,
            result: Value::Null,
        }
    }

    /// A call that arrived after the step budget ran out. It is never dispatched.
    pub fn skipped_for_budget(call: &ParsedToolCall) -> Self {
        let mut invocation = Self::pending(call);
        invocation.status = InvocationStatus::Failed;
        invocation.result = json!({ "skipped": STEP_BUDGET_SKIP_MESSAGE });
        invocation
    }

    fn succeed(&mut self, result: Value) {
        self.status = InvocationStatus::Succeeded;
        self.result = result;
    }

    fn fail(&mut self, error: &ToolError) {
        self.status = InvocationStatus::Failed;
        self.result = error.to_payload();
    }

    pub fn is_error(&self) -> bool {
        self.status == InvocationStatus::Failed
    }
}

/// Run one tool call to completion.
///
/// Unknown tools and tools outside `active` fail without running.
pub async fn execute_tool_call(
    ctx: &ToolContext,
    call: &ParsedToolCall,
    active: &[BuiltinTool],
) -> ToolInvocation {
    let mut invocation = ToolInvocation::pending(call);

    let outcome = match BuiltinTool::from_name(&call.tool) {
        None => Err(ToolError::InvalidArguments(format!(
            "unknown tool `{}`",
            call.tool
        ))),
        Some(tool) if !active.contains(&tool) => Err(ToolError::InvalidArguments(format!(
            "tool `{}` is not available for this turn",
            call.tool
        ))),
        Some(tool) => {
            tracing::info!(tool = tool.name(), call_id = %call.id, "executing tool");
            dispatch(ctx, tool, &call.arguments).await
        }
    };

    match outcome {
        Ok(result) => {
            tracing::debug!(tool = %call.tool, call_id = %call.id, "tool succeeded");
            invocation.succeed(result);
        }
        Err(error) => {
            tracing::warn!(tool = %call.tool, call_id = %call.id, kind = error.kind(), %error, "tool failed");
            invocation.fail(&error);
        }
    }
    invocation
}

async fn dispatch(ctx: &ToolContext, tool: BuiltinTool, arguments: &Value) -> Result<Value, ToolError> {
    match tool {
        BuiltinTool::GetInformation => {
            let executor = GetInformationExecutor::new(
                ctx.handles.embedding_tx.clone(),
                ctx.handles.vector_tx.clone(),
                ctx.top_k,
            );
            to_value(executor.execute(parse_input(arguments)?).await?)
        }
        BuiltinTool::QueryDatabase => {
            let executor = QueryDatabaseExecutor::new(
                ctx.handles.model_tx.clone(),
                ctx.handles.sql_tx.clone(),
                ctx.target.clone(),
            );
            to_value(executor.execute(parse_input(arguments)?).await?)
        }
        BuiltinTool::GetWeather => {
            let executor = GetWeatherExecutor::new(ctx.http.clone(), ctx.weather_base_url.clone());
            executor.execute(parse_input(arguments)?).await
        }
        BuiltinTool::CreateDocument => {
            to_value(document_executor(ctx).create(parse_input(arguments)?).await?)
        }
        BuiltinTool::UpdateDocument => {
            to_value(document_executor(ctx).update(parse_input(arguments)?).await?)
        }
    }
}

fn document_executor(ctx: &ToolContext) -> DocumentExecutor {
    DocumentExecutor::new(
        ctx.handles.model_tx.clone(),
        ctx.handles.session_tx.clone(),
        ctx.target.clone(),
        ctx.user_id.clone(),
    )
}

fn parse_input<T: DeserializeOwned>(arguments: &Value) -> Result<T, ToolError> {
    if let Value::String(raw) = arguments {
        return Err(ToolError::InvalidArguments(format!(
            "arguments are not valid JSON: {}",
            raw
        )));
    }
    serde_json::from_value(arguments.clone()).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn to_value<T: Serialize>(output: T) -> Result<Value, ToolError> {
    serde_json::to_value(output)
        .map_err(|e| ToolError::Generation(format!("unserializable tool output: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ModelProvider;
    use tokio::sync::mpsc;

    /// Context whose actors are all gone; only validation paths are exercised.
    fn detached_context() -> ToolContext {
        let handles = ActorHandles {
            model_tx: mpsc::channel(1).0,
            embedding_tx: mpsc::channel(1).0,
            vector_tx: mpsc::channel(1).0,
            sql_tx: mpsc::channel(1).0,
            session_tx: mpsc::channel(1).0,
        };
        ToolContext {
            handles,
            target: ModelTarget {
                provider: ModelProvider::OpenAi,
                api_identifier: "gpt-4o-mini".into(),
            },
            user_id: "alice".into(),
            top_k: 5,
            weather_base_url: "http://127.0.0.1:9".into(),
            http: reqwest::Client::new(),
        }
    }

    fn call(tool: &str, arguments: Value) -> ParsedToolCall {
        ParsedToolCall {
            id: "call_1".into(),
            tool: tool.into(),
            arguments,
        }
    }

    #[tokio::test]
    async fn unknown_tool_fails_without_dispatch() {
        let invocation = execute_tool_call(
            &detached_context(),
            &call("request_suggestions", json!({})),
            &BuiltinTool::ALL,
        )
        .await;
        assert_eq!(invocation.status, InvocationStatus::Failed);
        assert_eq!(invocation.result["error"]["kind"], "invalid_arguments");
    }

    #[tokio::test]
    async fn inactive_tool_is_refused() {
        let invocation = execute_tool_call(
            &detached_context(),
            &call("get_weather", json!({"latitude": 1.0, "longitude": 2.0})),
            &[BuiltinTool::QueryDatabase],
        )
        .await;
        assert!(invocation.is_error());
        assert!(invocation.result["error"]["message"]
            .as_str()
            .unwrap()
            .contains("not available"));
    }

    #[tokio::test]
    async fn malformed_arguments_are_reported() {
        let invocation = execute_tool_call(
            &detached_context(),
            &call("query_database", Value::String("{broken".into())),
            &BuiltinTool::ALL,
        )
        .await;
        assert_eq!(invocation.result["error"]["kind"], "invalid_arguments");

        let invocation = execute_tool_call(
            &detached_context(),
            &call("query_database", json!({"question": "wrong field"})),
            &BuiltinTool::ALL,
        )
        .await;
        assert_eq!(invocation.result["error"]["kind"], "invalid_arguments");
    }

    #[tokio::test]
    async fn dead_actor_is_an_upstream_failure() {
        let invocation = execute_tool_call(
            &detached_context(),
            &call("get_information", json!({"question": "refunds"})),
            &BuiltinTool::ALL,
        )
        .await;
        assert_eq!(invocation.result["error"]["kind"], "upstream");
    }

    #[test]
    fn budget_skip_is_a_failed_result() {
        let invocation = ToolInvocation::skipped_for_budget(&call("query_database", json!({"query": "x"})));
        assert!(invocation.is_error());
        assert_eq!(invocation.result["skipped"], STEP_BUDGET_SKIP_MESSAGE);
    }
}
