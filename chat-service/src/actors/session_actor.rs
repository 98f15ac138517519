//! Durable chat, message and document storage.
//!
//! Every request opens its own connection inside `spawn_blocking` and runs
//! as one statement or one transaction, so concurrent turns never observe a
//! half-written change.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::protocol::{
    ChatSession, MessageRole, SessionMsg, StoredDocument, StoredMessage, TokenUsage,
};

const CHAT_STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chats (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    chat_id TEXT NOT NULL REFERENCES chats(id),
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    prompt_tokens TEXT NOT NULL DEFAULT '0',
    completion_tokens TEXT NOT NULL DEFAULT '0',
    total_tokens TEXT NOT NULL DEFAULT '0'
);
CREATE INDEX IF NOT EXISTS idx_messages_chat_id ON messages(chat_id);
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

pub struct ChatStoreActor {
    rx: mpsc::Receiver<SessionMsg>,
    db_path: PathBuf,
}

impl ChatStoreActor {
    /// Open (and if needed create) the chat store at `db_path`.
    pub async fn new(rx: mpsc::Receiver<SessionMsg>, db_path: PathBuf) -> Result<Self, StoreError> {
        let path = db_path.clone();
        blocking(move || {
            let conn = open(&path)?;
            conn.execute_batch(CHAT_STORE_SCHEMA)?;
            Ok(())
        })
        .await?;
        tracing::info!(path = ?db_path, "chat store ready");

        Ok(Self { rx, db_path })
    }

    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            let db_path = self.db_path.clone();
            tokio::spawn(async move {
                handle_message(db_path, msg).await;
            });
        }
    }
}

async fn handle_message(db_path: PathBuf, msg: SessionMsg) {
    match msg {
        SessionMsg::GetChat { id, respond_to } => {
            let result = blocking(move || get_chat(&open(&db_path)?, &id)).await;
            let _ = respond_to.send(result);
        }
        SessionMsg::SaveChat { chat, respond_to } => {
            let result = blocking(move || save_chat(&mut open(&db_path)?, &chat)).await;
            let _ = respond_to.send(result);
        }
        SessionMsg::SaveMessages {
            messages,
            respond_to,
        } => {
            let result = blocking(move || save_messages(&mut open(&db_path)?, &messages)).await;
            let _ = respond_to.send(result);
        }
        SessionMsg::GetMessages {
            chat_id,
            respond_to,
        } => {
            let result = blocking(move || get_messages(&open(&db_path)?, &chat_id)).await;
            let _ = respond_to.send(result);
        }
        SessionMsg::ListChats {
            user_id,
            respond_to,
        } => {
            let result = blocking(move || list_chats(&open(&db_path)?, &user_id)).await;
            let _ = respond_to.send(result);
        }
        SessionMsg::DeleteChat { id, respond_to } => {
            let result = blocking(move || delete_chat(&mut open(&db_path)?, &id)).await;
            let _ = respond_to.send(result);
        }
        SessionMsg::SaveDocument {
            document,
            respond_to,
        } => {
            let result = blocking(move || save_document(&open(&db_path)?, &document)).await;
            let _ = respond_to.send(result);
        }
        SessionMsg::GetDocument { id, respond_to } => {
            let result = blocking(move || get_document(&open(&db_path)?, &id)).await;
            let _ = respond_to.send(result);
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("chat store task panicked: {}", e)))?
}

fn open(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)
        .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Database(format!("invalid timestamp `{}`: {}", raw, e)))
}

fn parse_token_count(raw: &str) -> Result<u64, StoreError> {
    raw.trim()
        .parse()
        .map_err(|_| StoreError::Database(format!("invalid token count `{}`", raw)))
}

fn get_chat(conn: &Connection, id: &str) -> Result<Option<ChatSession>, StoreError> {
    let row = conn
        .query_row(
            "SELECT id, user_id, title, created_at FROM chats WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, user_id, title, created_at)| {
        Ok(ChatSession {
            id,
            user_id,
            title,
            created_at: parse_timestamp(&created_at)?,
        })
    })
    .transpose()
}

/// Insert-if-absent and read back in one transaction, so callers racing to
/// create the same chat all see the single winning owner.
fn save_chat(conn: &mut Connection, chat: &ChatSession) -> Result<ChatSession, StoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute(
        "INSERT INTO chats (id, user_id, title, created_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO NOTHING",
        params![
            chat.id,
            chat.user_id,
            chat.title,
            chat.created_at.to_rfc3339()
        ],
    )?;
    let stored = get_chat(&tx, &chat.id)?
        .ok_or_else(|| StoreError::Database(format!("chat `{}` vanished after insert", chat.id)))?;
    tx.commit()?;
    Ok(stored)
}

fn save_messages(conn: &mut Connection, messages: &[StoredMessage]) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO messages
                (id, chat_id, role, content, created_at, prompt_tokens, completion_tokens, total_tokens)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for message in messages {
            let content = serde_json::to_string(&message.content)
                .map_err(|e| StoreError::Database(format!("unserializable content: {}", e)))?;
            stmt.execute(params![
                message.id,
                message.chat_id,
                message.role.as_str(),
                content,
                message.created_at.to_rfc3339(),
                message.usage.prompt_tokens.to_string(),
                message.usage.completion_tokens.to_string(),
                message.usage.total_tokens.to_string(),
            ])
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(ref failure, _)
                    if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
                {
                    StoreError::Conflict(format!("message `{}` already exists", message.id))
                }
                other => other.into(),
            })?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn get_messages(conn: &Connection, chat_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, role, content, created_at, prompt_tokens, completion_tokens, total_tokens
         FROM messages WHERE chat_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map(params![chat_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(id, chat_id, role, content, created_at, prompt, completion, total)| {
                let role = MessageRole::parse(&role)
                    .ok_or_else(|| StoreError::Database(format!("unknown role `{}`", role)))?;
                let content = serde_json::from_str(&content)
                    .map_err(|e| StoreError::Database(format!("corrupt message content: {}", e)))?;
                Ok(StoredMessage {
                    id,
                    chat_id,
                    role,
                    content,
                    created_at: parse_timestamp(&created_at)?,
                    usage: TokenUsage {
                        prompt_tokens: parse_token_count(&prompt)?,
                        completion_tokens: parse_token_count(&completion)?,
                        total_tokens: parse_token_count(&total)?,
                    },
                })
            },
        )
        .collect()
}

fn list_chats(conn: &Connection, user_id: &str) -> Result<Vec<ChatSession>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, created_at FROM chats
         WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, user_id, title, created_at)| {
            Ok(ChatSession {
                id,
                user_id,
                title,
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .collect()
}

fn delete_chat(conn: &mut Connection, id: &str) -> Result<bool, StoreError> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM messages WHERE chat_id = ?1", params![id])?;
    let removed = tx.execute("DELETE FROM chats WHERE id = ?1", params![id])?;
    tx.commit()?;
    Ok(removed > 0)
}

fn save_document(conn: &Connection, document: &StoredDocument) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO documents (id, user_id, title, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET title = excluded.title, content = excluded.content",
        params![
            document.id,
            document.user_id,
            document.title,
            document.content,
            document.created_at.to_rfc3339()
        ],
    )?;
    Ok(())
}

fn get_document(conn: &Connection, id: &str) -> Result<Option<StoredDocument>, StoreError> {
    let row = conn
        .query_row(
            "SELECT id, user_id, title, content, created_at FROM documents WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, user_id, title, content, created_at)| {
        Ok(StoredDocument {
            id,
            user_id,
            title,
            content,
            created_at: parse_timestamp(&created_at)?,
        })
    })
    .transpose()
}
