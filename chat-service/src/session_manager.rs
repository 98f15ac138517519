//! Turn admission and conversation persistence.
//!
//! Everything that touches the chat store on behalf of a request goes
//! through here: admitting a turn, saving what it produced, listing and
//! deleting chats.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::app_state::ActorHandles;
use crate::error::{ApiError, StoreError};
use crate::message_builders::{sanitize_response_messages, ResponseMessage};
use crate::models::find_model;
use crate::protocol::{
    ChatMessage, ChatSession, MessageRole, ModelMsg, ModelTarget, SessionMsg, StoredMessage,
    TokenUsage,
};
use crate::structured_output::generate_text;
use crate::system_prompt::TITLE_SYSTEM_PROMPT;
use crate::tool_selection::select_active_tools;
use crate::tools::BuiltinTool;

const MAX_TITLE_CHARS: usize = 80;

/// A message as submitted by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    pub id: String,
    pub messages: Vec<IncomingMessage>,
    #[serde(rename = "modelId")]
    pub model_id: String,
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
}

/// An admitted turn, ready to run.
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    pub chat_id: String,
    pub user_id: String,
    pub target: ModelTarget,
    /// Conversation as the model will see it, latest user message last
    pub history: Vec<ChatMessage>,
    pub active_tools: Vec<BuiltinTool>,
}

/// Send one request to the chat store and wait for its reply.
async fn ask<T>(
    session_tx: &mpsc::Sender<SessionMsg>,
    build: impl FnOnce(oneshot::Sender<Result<T, StoreError>>) -> SessionMsg,
) -> Result<T, StoreError> {
    let (tx, rx) = oneshot::channel();
    session_tx
        .send(build(tx))
        .await
        .map_err(|_| StoreError::Unavailable("chat store is not running".to_string()))?;
    rx.await
        .map_err(|_| StoreError::Unavailable("chat store dropped the request".to_string()))?
}

/// Validate a submission, make sure its chat exists, and save the user message.
///
/// Checks run in a fixed order: identity, model, user message, ownership.
pub async fn begin_turn(
    handles: &ActorHandles,
    caller: Option<&CallerIdentity>,
    request: TurnRequest,
) -> Result<PreparedTurn, ApiError> {
    let caller = caller.ok_or_else(|| ApiError::Unauthorized("Unauthorized".to_string()))?;

    let model = find_model(&request.model_id)
        .ok_or_else(|| ApiError::NotFound("Model not found".to_string()))?;
    let target = model.target();

    let user_message = request
        .messages
        .iter()
        .rev()
        .find(|message| message.role == "user")
        .cloned()
        .ok_or_else(|| ApiError::BadRequest("No user message found".to_string()))?;

    match ask(&handles.session_tx, |respond_to| SessionMsg::GetChat {
        id: request.id.clone(),
        respond_to,
    })
    .await?
    {
        Some(chat) if chat.user_id != caller.user_id => {
            tracing::warn!(chat_id = %request.id, "turn submitted to another user's chat");
            return Err(ApiError::Unauthorized("Unauthorized".to_string()));
        }
        Some(_) => {}
        None => {
            let title = generate_title(&handles.model_tx, &target, &user_message.content).await;
            let chat = ChatSession {
                id: request.id.clone(),
                user_id: caller.user_id.clone(),
                title,
                created_at: Utc::now(),
            };
            // A concurrent first turn may have created the chat since the lookup
            let stored =
                ask(&handles.session_tx, |respond_to| SessionMsg::SaveChat { chat, respond_to })
                    .await?;
            if stored.user_id != caller.user_id {
                tracing::warn!(chat_id = %request.id, "chat was created by another user first");
                return Err(ApiError::Unauthorized("Unauthorized".to_string()));
            }
            tracing::info!(chat_id = %request.id, "chat created");
        }
    }

    let stored = StoredMessage {
        id: user_message
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        chat_id: request.id.clone(),
        role: MessageRole::User,
        content: Value::String(user_message.content.clone()),
        created_at: Utc::now(),
        usage: TokenUsage::default(),
    };
    ask(&handles.session_tx, |respond_to| SessionMsg::SaveMessages {
        messages: vec![stored],
        respond_to,
    })
    .await?;

    let active_tools = select_active_tools(&user_message.content, &BuiltinTool::ALL);
    tracing::debug!(
        chat_id = %request.id,
        tools = ?active_tools.iter().map(BuiltinTool::name).collect::<Vec<_>>(),
        "active tools selected"
    );

    Ok(PreparedTurn {
        chat_id: request.id,
        user_id: caller.user_id.clone(),
        target,
        history: to_model_history(&request.messages),
        active_tools,
    })
}

/// Client messages the model should see. Other roles are dropped.
fn to_model_history(messages: &[IncomingMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .filter_map(|message| match message.role.as_str() {
            "user" => Some(ChatMessage::user(message.content.clone())),
            "assistant" if !message.content.is_empty() => {
                Some(ChatMessage::assistant(message.content.clone()))
            }
            _ => None,
        })
        .collect()
}

/// Short title for a new chat. Falls back to the message itself.
pub async fn generate_title(
    model_tx: &mpsc::Sender<ModelMsg>,
    target: &ModelTarget,
    first_message: &str,
) -> String {
    match generate_text(model_tx, target, TITLE_SYSTEM_PROMPT, first_message).await {
        Ok(completion) => {
            let title = clean_title(&completion.text);
            if title.is_empty() {
                clean_title(first_message)
            } else {
                title
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "title generation failed, using message text");
            clean_title(first_message)
        }
    }
}

fn clean_title(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '`' | ':'))
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    stripped.trim().chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_string()
}

/// Save the messages a finalized turn produced, all carrying the turn's usage.
pub async fn persist_turn(
    session_tx: &mpsc::Sender<SessionMsg>,
    chat_id: &str,
    response_messages: Vec<ResponseMessage>,
    usage: TokenUsage,
) -> Result<usize, StoreError> {
    let now = Utc::now();
    let messages: Vec<StoredMessage> = sanitize_response_messages(response_messages)
        .into_iter()
        .map(|message| StoredMessage {
            id: message.id,
            chat_id: chat_id.to_string(),
            role: message.role,
            content: message.content,
            created_at: now,
            usage,
        })
        .collect();

    let count = messages.len();
    if count > 0 {
        ask(session_tx, |respond_to| SessionMsg::SaveMessages { messages, respond_to }).await?;
    }
    Ok(count)
}

/// Delete a chat owned by the caller.
pub async fn delete_chat(
    session_tx: &mpsc::Sender<SessionMsg>,
    caller: Option<&CallerIdentity>,
    id: Option<&str>,
) -> Result<(), ApiError> {
    let id = id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::NotFound("Not Found".to_string()))?;
    let caller = caller.ok_or_else(|| ApiError::Unauthorized("Unauthorized".to_string()))?;

    let chat = ask(session_tx, |respond_to| SessionMsg::GetChat {
        id: id.to_string(),
        respond_to,
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("Not Found".to_string()))?;

    if chat.user_id != caller.user_id {
        return Err(ApiError::Unauthorized("Unauthorized".to_string()));
    }

    ask(session_tx, |respond_to| SessionMsg::DeleteChat {
        id: id.to_string(),
        respond_to,
    })
    .await?;
    tracing::info!(chat_id = %id, "chat deleted");
    Ok(())
}

/// The caller's chats, newest first.
pub async fn list_chats(
    session_tx: &mpsc::Sender<SessionMsg>,
    caller: Option<&CallerIdentity>,
) -> Result<Vec<ChatSession>, ApiError> {
    let caller = caller.ok_or_else(|| ApiError::Unauthorized("Unauthorized".to_string()))?;
    Ok(ask(session_tx, |respond_to| SessionMsg::ListChats {
        user_id: caller.user_id.clone(),
        respond_to,
    })
    .await?)
}
