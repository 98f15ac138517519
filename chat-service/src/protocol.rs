use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};

use crate::error::{SqlExecutionError, StoreError};

// ============ Models ============

/// Upstream API family a model is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Mistral,
    Ollama,
}

impl ModelProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelProvider::OpenAi => "openai",
            ModelProvider::Mistral => "mistral",
            ModelProvider::Ollama => "ollama",
        }
    }
}

/// Concrete model a request is routed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelTarget {
    pub provider: ModelProvider,
    pub api_identifier: String,
}

// ============ Chat wire format ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// OpenAI tool definition format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAITool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OpenAIFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAIFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Tool call as echoed back to the model in an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAIToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: OpenAIToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAIToolCallFunction {
    pub name: String,
    /// JSON-encoded arguments, as the chat completions API expects.
    pub arguments: String,
}

/// Parsed tool call from a streamed assistant response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedToolCall {
    pub id: String,
    pub tool: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

// ============ Actor messages ============

/// Events produced while a chat completion streams.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStreamEvent {
    Token(String),
    ToolCalls(Vec<ParsedToolCall>),
    Usage(TokenUsage),
    Failed(String),
}

/// Output of a single non-streaming completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

pub enum ModelMsg {
    /// Stream a chat completion. The gateway stops reading upstream once
    /// `respond_to` is dropped.
    StreamChat {
        target: ModelTarget,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<OpenAITool>>,
        respond_to: mpsc::UnboundedSender<ModelStreamEvent>,
    },
    /// One-shot completion; `json_mode` asks the provider for a JSON object.
    Complete {
        target: ModelTarget,
        system: String,
        prompt: String,
        json_mode: bool,
        respond_to: oneshot::Sender<Result<Completion, String>>,
    },
}

pub enum EmbeddingMsg {
    Embed {
        text: String,
        respond_to: oneshot::Sender<Result<Vec<f32>, String>>,
    },
}

/// A nearest-neighbour hit from the document store.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentHit {
    pub source: Option<String>,
    pub page: Option<i64>,
    pub page_content: String,
    pub distance: f32,
}

pub enum VectorMsg {
    /// Search stored document chunks, closest first
    SearchDocuments {
        query_vector: Vec<f32>,
        limit: usize,
        respond_to: oneshot::Sender<Result<Vec<DocumentHit>, String>>,
    },
}

/// Rows returned by a read query. Column order follows the first row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub rows: Vec<Map<String, Value>>,
}

impl QueryResult {
    pub fn columns(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub enum SqlMsg {
    ExecuteSql {
        sql: String,
        respond_to: oneshot::Sender<Result<QueryResult, SqlExecutionError>>,
    },
}

// ============ Chat store ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "tool" => Some(MessageRole::Tool),
            _ => None,
        }
    }
}

/// A persisted message. `content` is either a JSON string or an array of parts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub chat_id: String,
    pub role: MessageRole,
    pub content: Value,
    pub created_at: DateTime<Utc>,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

pub enum SessionMsg {
    GetChat {
        id: String,
        respond_to: oneshot::Sender<Result<Option<ChatSession>, StoreError>>,
    },
    /// Insert a chat unless one with the same id exists, and reply with the
    /// row as stored. An existing row keeps its owner and title.
    SaveChat {
        chat: ChatSession,
        respond_to: oneshot::Sender<Result<ChatSession, StoreError>>,
    },
    SaveMessages {
        messages: Vec<StoredMessage>,
        respond_to: oneshot::Sender<Result<(), StoreError>>,
    },
    GetMessages {
        chat_id: String,
        respond_to: oneshot::Sender<Result<Vec<StoredMessage>, StoreError>>,
    },
    ListChats {
        user_id: String,
        respond_to: oneshot::Sender<Result<Vec<ChatSession>, StoreError>>,
    },
    /// Remove a chat and its messages; returns whether the chat existed
    DeleteChat {
        id: String,
        respond_to: oneshot::Sender<Result<bool, StoreError>>,
    },
    SaveDocument {
        document: StoredDocument,
        respond_to: oneshot::Sender<Result<(), StoreError>>,
    },
    GetDocument {
        id: String,
        respond_to: oneshot::Sender<Result<Option<StoredDocument>, StoreError>>,
    },
}

// ============ Caller-facing events ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    StepBudgetReached,
    CallerDisconnected,
    ModelError,
}

/// Events streamed to the caller during a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TurnEvent {
    TextDelta {
        text: String,
    },
    Error {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Finish {
        finish_reason: FinishReason,
        usage: TokenUsage,
    },
}
