//! Generated markdown documents owned by the calling user.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::{StoreError, ToolError};
use crate::protocol::{ModelMsg, ModelTarget, SessionMsg, StoredDocument};
use crate::structured_output::generate_text;
use crate::system_prompt::{document_update_prompt, DOCUMENT_SYSTEM_PROMPT};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDocumentInput {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateDocumentInput {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentOutput {
    pub id: String,
    pub title: String,
    pub content: String,
    pub message: String,
}

pub struct DocumentExecutor {
    model_tx: mpsc::Sender<ModelMsg>,
    session_tx: mpsc::Sender<SessionMsg>,
    target: ModelTarget,
    user_id: String,
}

impl DocumentExecutor {
    pub fn new(
        model_tx: mpsc::Sender<ModelMsg>,
        session_tx: mpsc::Sender<SessionMsg>,
        target: ModelTarget,
        user_id: String,
    ) -> Self {
        Self {
            model_tx,
            session_tx,
            target,
            user_id,
        }
    }

    pub async fn create(&self, input: CreateDocumentInput) -> Result<DocumentOutput, ToolError> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(ToolError::InvalidArguments("title must not be empty".to_string()));
        }

        let completion =
            generate_text(&self.model_tx, &self.target, DOCUMENT_SYSTEM_PROMPT, &title).await?;

        let document = StoredDocument {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            title,
            content: completion.text,
            created_at: Utc::now(),
        };
        self.save(document.clone()).await?;
        tracing::info!(document_id = %document.id, "document created");

        Ok(DocumentOutput {
            id: document.id,
            title: document.title,
            content: document.content,
            message: "A document was created and is now visible to the user.".to_string(),
        })
    }

    pub async fn update(&self, input: UpdateDocumentInput) -> Result<DocumentOutput, ToolError> {
        let mut document = self
            .load(&input.id)
            .await?
            .filter(|document| document.user_id == self.user_id)
            .ok_or_else(|| ToolError::InvalidArguments(format!("document `{}` not found", input.id)))?;

        let completion = generate_text(
            &self.model_tx,
            &self.target,
            DOCUMENT_SYSTEM_PROMPT,
            &document_update_prompt(&document.content, &input.description),
        )
        .await?;

        document.content = completion.text;
        self.save(document.clone()).await?;
        tracing::info!(document_id = %document.id, "document updated");

        Ok(DocumentOutput {
            id: document.id,
            title: document.title,
            content: document.content,
            message: "The document has been updated successfully.".to_string(),
        })
    }

    async fn load(&self, id: &str) -> Result<Option<StoredDocument>, ToolError> {
        let (tx, rx) = oneshot::channel();
        self.session_tx
            .send(SessionMsg::GetDocument {
                id: id.to_string(),
                respond_to: tx,
            })
            .await
            .map_err(|_| store_down())?;
        rx.await.map_err(|_| store_down())?.map_err(store_error)
    }

    async fn save(&self, document: StoredDocument) -> Result<(), ToolError> {
        let (tx, rx) = oneshot::channel();
        self.session_tx
            .send(SessionMsg::SaveDocument {
                document,
                respond_to: tx,
            })
            .await
            .map_err(|_| store_down())?;
        rx.await.map_err(|_| store_down())?.map_err(store_error)
    }
}

fn store_down() -> ToolError {
    ToolError::Upstream("chat store is not running".to_string())
}

fn store_error(err: StoreError) -> ToolError {
    ToolError::Upstream(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Completion, ModelProvider, TokenUsage};
    use std::collections::HashMap;

    fn target() -> ModelTarget {
        ModelTarget {
            provider: ModelProvider::OpenAi,
            api_identifier: "gpt-4o-mini".into(),
        }
    }

    fn spawn_model() -> mpsc::Sender<ModelMsg> {
        let (tx, mut rx) = mpsc::channel(4);
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let ModelMsg::Complete { prompt, respond_to, .. } = msg {
                    let text = format!("# Draft\n\n{}", prompt.lines().last().unwrap_or_default());
                    let _ = respond_to.send(Ok(Completion { text, usage: TokenUsage::default() }));
                }
            }
        });
        tx
    }

    /// In-memory stand-in for the document half of the chat store.
    fn spawn_store() -> mpsc::Sender<SessionMsg> {
        let (tx, mut rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let mut documents: HashMap<String, StoredDocument> = HashMap::new();
            while let Some(msg) = rx.recv().await {
                match msg {
                    SessionMsg::SaveDocument { document, respond_to } => {
                        documents.insert(document.id.clone(), document);
                        let _ = respond_to.send(Ok(()));
                    }
                    SessionMsg::GetDocument { id, respond_to } => {
                        let _ = respond_to.send(Ok(documents.get(&id).cloned()));
                    }
                    _ => {}
                }
            }
        });
        tx
    }

    #[tokio::test]
    async fn create_then_update() {
        let store = spawn_store();
        let executor = DocumentExecutor::new(spawn_model(), store.clone(), target(), "alice".into());

        let created = executor
            .create(CreateDocumentInput { title: "Refund policy".into() })
            .await
            .unwrap();
        assert_eq!(created.title, "Refund policy");
        assert!(created.content.starts_with("# Draft"));

        let updated = executor
            .update(UpdateDocumentInput { id: created.id.clone(), description: "mention 14 days".into() })
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert!(updated.content.contains("mention 14 days"));
    }

    #[tokio::test]
    async fn other_users_documents_are_invisible() {
        let store = spawn_store();
        let owner = DocumentExecutor::new(spawn_model(), store.clone(), target(), "alice".into());
        let created = owner
            .create(CreateDocumentInput { title: "Private".into() })
            .await
            .unwrap();

        let intruder = DocumentExecutor::new(spawn_model(), store, target(), "mallory".into());
        let err = intruder
            .update(UpdateDocumentInput { id: created.id, description: "x".into() })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
    }
}
