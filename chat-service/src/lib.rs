pub mod actors;
pub mod agentic_loop;
pub mod app_state;
pub mod cli;
pub mod commands;
pub mod data_schema;
pub mod error;
pub mod message_builders;
pub mod models;
pub mod paths;
pub mod protocol;
pub mod session_manager;
pub mod settings;
pub mod smooth_stream;
pub mod structured_output;
pub mod system_prompt;
pub mod tool_execution;
pub mod tool_selection;
pub mod tools;
pub mod turn_runner;

#[cfg(test)]
mod tests;

use tokio::sync::mpsc;

use actors::{
    ChatStoreActor, DocumentVectorStoreActor, EmbeddingActor, EmbeddingBackend, ModelGatewayActor,
    ReadOnlySqlActor,
};
use app_state::{ActorHandles, AppState};
use cli::{apply_cli_overrides, CliArgs};
use settings::{load_settings, AppSettings};

/// Capacity of every actor inbox.
const ACTOR_CHANNEL_CAPACITY: usize = 32;

/// Start every actor and return the handles used to reach them.
///
/// Only the chat store is required to come up. Any other actor that fails to
/// start is logged and its requests fail as upstream errors.
pub async fn spawn_actors(settings: &AppSettings) -> Result<ActorHandles, String> {
    let (model_tx, model_rx) = mpsc::channel(ACTOR_CHANNEL_CAPACITY);
    let (embedding_tx, embedding_rx) = mpsc::channel(ACTOR_CHANNEL_CAPACITY);
    let (vector_tx, vector_rx) = mpsc::channel(ACTOR_CHANNEL_CAPACITY);
    let (sql_tx, sql_rx) = mpsc::channel(ACTOR_CHANNEL_CAPACITY);
    let (session_tx, session_rx) = mpsc::channel(ACTOR_CHANNEL_CAPACITY);

    // Chat store
    let chat_db = paths::ensure_store_location(settings.chat_store.path.clone()).await;
    let session_actor = ChatStoreActor::new(session_rx, chat_db.clone())
        .await
        .map_err(|e| format!("Failed to open chat store {:?}: {}", chat_db, e))?;
    tokio::spawn(session_actor.run());
    tracing::info!(path = ?chat_db, "chat store actor started");

    // Model gateway
    tokio::spawn(ModelGatewayActor::new(model_rx, settings.providers.clone()).run());
    tracing::info!("model gateway actor started");

    // Embeddings; a backend that fails to load is reported on every request
    let backend = EmbeddingBackend::from_settings(&settings.embedding, &settings.providers).await;
    tokio::spawn(
        EmbeddingActor::new(embedding_rx, backend, settings.embedding.cache_capacity).run(),
    );

    // Document vectors
    let vector_settings = settings.vector_store.clone();
    tokio::spawn(async move {
        match DocumentVectorStoreActor::new(
            vector_rx,
            &vector_settings.path,
            vector_settings.collection.clone(),
            vector_settings.max_distance,
        )
        .await
        {
            Ok(actor) => actor.run().await,
            Err(e) => tracing::error!(error = %e, "vector store unavailable"),
        }
    });

    // Relational data, read-only
    tokio::spawn(
        ReadOnlySqlActor::new(sql_rx, settings.data_store.path.clone(), settings.data_store.max_rows)
            .run(),
    );

    Ok(ActorHandles {
        model_tx,
        embedding_tx,
        vector_tx,
        sql_tx,
        session_tx,
    })
}

/// Load configuration, start the actors and serve HTTP until shutdown.
pub async fn run(args: CliArgs) -> Result<(), String> {
    let mut settings = load_settings(args.config.as_deref()).await?;
    apply_cli_overrides(&args, &mut settings)?;

    if settings.auth.tokens.is_empty() {
        tracing::warn!("no auth tokens configured; every chat request will be rejected");
    }

    let handles = spawn_actors(&settings).await?;
    commands::serve(AppState::new(handles, settings)).await
}
