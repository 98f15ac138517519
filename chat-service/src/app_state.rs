//! Shared service state.
//!
//! Everything here is either an actor sender or read-only configuration;
//! turns share nothing else.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::protocol::{EmbeddingMsg, ModelMsg, SessionMsg, SqlMsg, VectorMsg};
use crate::settings::AppSettings;

/// Actor message channel handles.
///
/// Cloning is cheap; every request handler and turn task gets its own copy.
#[derive(Clone)]
pub struct ActorHandles {
    pub model_tx: mpsc::Sender<ModelMsg>,
    pub embedding_tx: mpsc::Sender<EmbeddingMsg>,
    pub vector_tx: mpsc::Sender<VectorMsg>,
    pub sql_tx: mpsc::Sender<SqlMsg>,
    pub session_tx: mpsc::Sender<SessionMsg>,
}

/// State handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub handles: ActorHandles,
    pub settings: Arc<AppSettings>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(handles: ActorHandles, settings: AppSettings) -> Self {
        Self {
            handles,
            settings: Arc::new(settings),
            http: reqwest::Client::new(),
        }
    }
}
