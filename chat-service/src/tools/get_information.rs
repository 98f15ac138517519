//! Knowledge-base retrieval.
//!
//! Embeds the question and returns the closest document chunks as
//! `{source, page, snippet}` records. Similarity scores stay internal.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::ToolError;
use crate::protocol::{DocumentHit, EmbeddingMsg, VectorMsg};

#[derive(Debug, Clone, Deserialize)]
pub struct GetInformationInput {
    pub question: String,
}

/// One retrieved passage as the model sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelevantContent {
    pub source: Option<String>,
    pub page: Option<i64>,
    pub snippet: String,
}

impl From<DocumentHit> for RelevantContent {
    fn from(hit: DocumentHit) -> Self {
        Self {
            source: hit.source,
            page: hit.page,
            snippet: hit.page_content,
        }
    }
}

/// Replace literal `\n` escape sequences with spaces before embedding.
pub fn normalize_question(question: &str) -> String {
    question.replace("\\n", " ")
}

pub struct GetInformationExecutor {
    embedding_tx: mpsc::Sender<EmbeddingMsg>,
    vector_tx: mpsc::Sender<VectorMsg>,
    top_k: usize,
}

impl GetInformationExecutor {
    pub fn new(
        embedding_tx: mpsc::Sender<EmbeddingMsg>,
        vector_tx: mpsc::Sender<VectorMsg>,
        top_k: usize,
    ) -> Self {
        Self {
            embedding_tx,
            vector_tx,
            top_k,
        }
    }

    pub async fn execute(
        &self,
        input: GetInformationInput,
    ) -> Result<Vec<RelevantContent>, ToolError> {
        let question = normalize_question(&input.question);
        if question.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "question must not be empty".to_string(),
            ));
        }

        let query_vector = self.embed(question).await?;

        let (tx, rx) = oneshot::channel();
        self.vector_tx
            .send(VectorMsg::SearchDocuments {
                query_vector,
                limit: self.top_k,
                respond_to: tx,
            })
            .await
            .map_err(|_| ToolError::Upstream("vector store is not running".to_string()))?;
        let hits = rx
            .await
            .map_err(|_| ToolError::Upstream("vector store dropped the request".to_string()))?
            .map_err(ToolError::Upstream)?;

        tracing::debug!(hits = hits.len(), "knowledge base searched");
        Ok(hits.into_iter().map(RelevantContent::from).collect())
    }

    async fn embed(&self, text: String) -> Result<Vec<f32>, ToolError> {
        let (tx, rx) = oneshot::channel();
        self.embedding_tx
            .send(EmbeddingMsg::Embed {
                text,
                respond_to: tx,
            })
            .await
            .map_err(|_| ToolError::Upstream("embedding provider is not running".to_string()))?;
        rx.await
            .map_err(|_| ToolError::Upstream("embedding provider dropped the request".to_string()))?
            .map_err(ToolError::Upstream)
    }
}
