//! Model registry handlers.

use axum::Json;
use serde_json::{json, Value};

use crate::models::{all_models, Model};

/// List the models a turn may select.
pub async fn list_models() -> Json<Vec<Model>> {
    Json(all_models().to_vec())
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
