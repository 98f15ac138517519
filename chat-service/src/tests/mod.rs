//! Cross-module scenarios.
//!
//! The model gateway is replaced by a scripted actor; the chat store and the
//! relational dataset are real SQLite files under a temporary directory.

pub mod agentic_integration;
pub mod http_integration;

use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::actors::ChatStoreActor;
use crate::agentic_loop::AgenticLoopConfig;
use crate::app_state::ActorHandles;
use crate::protocol::{
    ChatMessage, Completion, ModelMsg, ModelProvider, ModelStreamEvent, ModelTarget, OpenAITool,
    ParsedToolCall, SessionMsg, TokenUsage,
};
use crate::system_prompt::{CHART_SYSTEM_PROMPT, TITLE_SYSTEM_PROMPT};
use crate::tool_execution::ToolContext;
use crate::tools::BuiltinTool;

pub fn target() -> ModelTarget {
    ModelTarget {
        provider: ModelProvider::OpenAi,
        api_identifier: "gpt-4o-mini".into(),
    }
}

pub fn usage(total: u64) -> TokenUsage {
    TokenUsage {
        prompt_tokens: total - 1,
        completion_tokens: 1,
        total_tokens: total,
    }
}

pub fn tool_call(id: &str, tool: &str, arguments: serde_json::Value) -> ParsedToolCall {
    ParsedToolCall {
        id: id.into(),
        tool: tool.into(),
        arguments,
    }
}

/// A model pass: the events sent for one `StreamChat` request.
pub type Pass = Vec<ModelStreamEvent>;

/// What the loop sent on each streamed pass.
#[derive(Debug, Clone)]
pub struct RecordedPass {
    pub messages: Vec<ChatMessage>,
    pub tools: Option<Vec<OpenAITool>>,
}

/// Scripted model gateway.
///
/// Streamed passes are replayed in order; once the script runs out the last
/// pass repeats. Completions are answered by system prompt: titles, chart
/// configs, and everything else gets `query_reply`.
pub fn spawn_gateway(
    passes: Vec<Pass>,
    query_reply: &'static str,
    chart_reply: &'static str,
) -> (mpsc::Sender<ModelMsg>, Arc<Mutex<Vec<RecordedPass>>>) {
    let (tx, mut rx) = mpsc::channel(8);
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let log = recorded.clone();

    tokio::spawn(async move {
        let mut served = 0usize;
        while let Some(msg) = rx.recv().await {
            match msg {
                ModelMsg::StreamChat { messages, tools, respond_to, .. } => {
                    log.lock().unwrap().push(RecordedPass { messages, tools });
                    let pass = passes
                        .get(served)
                        .or_else(|| passes.last())
                        .cloned()
                        .unwrap_or_default();
                    served += 1;
                    for event in pass {
                        let _ = respond_to.send(event);
                    }
                }
                ModelMsg::Complete { system, respond_to, .. } => {
                    let text = if system == TITLE_SYSTEM_PROMPT {
                        "Vercel valuation".to_string()
                    } else if system == CHART_SYSTEM_PROMPT {
                        chart_reply.to_string()
                    } else {
                        query_reply.to_string()
                    };
                    let _ = respond_to.send(Ok(Completion { text, usage: usage(20) }));
                }
            }
        }
    });

    (tx, recorded)
}

/// Handles whose model channel is `model_tx`; the rest point at actors
/// that are not running unless replaced by the caller.
pub fn handles_with_model(model_tx: mpsc::Sender<ModelMsg>) -> ActorHandles {
    ActorHandles {
        model_tx,
        embedding_tx: mpsc::channel(1).0,
        vector_tx: mpsc::channel(1).0,
        sql_tx: mpsc::channel(1).0,
        session_tx: mpsc::channel(1).0,
    }
}

pub fn loop_config(handles: ActorHandles, active_tools: Vec<BuiltinTool>) -> AgenticLoopConfig {
    AgenticLoopConfig {
        target: target(),
        system_prompt: "You answer questions about unicorn startups.".into(),
        active_tools,
        smooth_streaming: false,
        tool_context: ToolContext {
            handles,
            target: target(),
            user_id: "alice".into(),
            top_k: 5,
            weather_base_url: "http://127.0.0.1:9".into(),
            http: reqwest::Client::new(),
        },
    }
}

/// Start a real chat store on `path`.
pub async fn spawn_chat_store(path: &Path) -> mpsc::Sender<SessionMsg> {
    let (tx, rx) = mpsc::channel(8);
    let actor = ChatStoreActor::new(rx, path.to_path_buf()).await.unwrap();
    tokio::spawn(actor.run());
    tx
}
