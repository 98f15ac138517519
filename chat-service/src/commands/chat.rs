//! Chat and history handlers.

use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::commands::auth::caller_identity;
use crate::error::ApiError;
use crate::protocol::ChatSession;
use crate::session_manager::{self, begin_turn, TurnRequest};
use crate::turn_runner::spawn_turn;

/// Submit a turn and stream its events as SSE.
pub async fn submit_turn(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let caller = caller_identity(&headers, &state.settings.auth)
        .ok_or_else(|| ApiError::Unauthorized("Unauthorized".to_string()))?;
    let Json(request) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let prepared = begin_turn(&state.handles, Some(&caller), request).await?;
    let (events, _turn) = spawn_turn(&state, prepared);

    let stream = futures::stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        let sse = Event::default().json_data(&event).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to encode turn event");
            Event::default().comment("unencodable event")
        });
        Some((Ok::<_, Infallible>(sse), events))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
pub struct DeleteChatParams {
    pub id: Option<String>,
}

pub async fn delete_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<DeleteChatParams>,
) -> Result<(StatusCode, &'static str), ApiError> {
    let caller = caller_identity(&headers, &state.settings.auth);
    session_manager::delete_chat(
        &state.handles.session_tx,
        caller.as_ref(),
        params.id.as_deref(),
    )
    .await?;
    Ok((StatusCode::OK, "Chat deleted"))
}

/// The caller's chats, newest first.
pub async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChatSession>>, ApiError> {
    let caller = caller_identity(&headers, &state.settings.auth);
    let chats = session_manager::list_chats(&state.handles.session_tx, caller.as_ref()).await?;
    Ok(Json(chats))
}
