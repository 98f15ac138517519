//! Runs an admitted turn in its own task.

use tokio::sync::mpsc;

use crate::agentic_loop::{run_agentic_loop, AgenticLoopConfig, TurnOutcome};
use crate::app_state::AppState;
use crate::protocol::TurnEvent;
use crate::session_manager::{persist_turn, PreparedTurn};
use crate::system_prompt::DEFAULT_SYSTEM_PROMPT;
use crate::tool_execution::ToolContext;

/// Capacity of the per-turn event channel.
const TURN_EVENT_BUFFER: usize = 64;

/// Build the loop configuration for a turn from the shared settings.
pub fn loop_config(state: &AppState, turn: &PreparedTurn) -> AgenticLoopConfig {
    let settings = &state.settings;
    AgenticLoopConfig {
        target: turn.target.clone(),
        system_prompt: settings
            .agent
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        active_tools: turn.active_tools.clone(),
        smooth_streaming: settings.agent.smooth_streaming,
        tool_context: ToolContext {
            handles: state.handles.clone(),
            target: turn.target.clone(),
            user_id: turn.user_id.clone(),
            top_k: settings.vector_store.top_k,
            weather_base_url: settings.weather.base_url.clone(),
            http: state.http.clone(),
        },
    }
}

/// Spawn the turn and return its event stream.
///
/// The task keeps running after the receiver is dropped so the turn is
/// still persisted. The join handle resolves once persistence is done.
pub fn spawn_turn(
    state: &AppState,
    turn: PreparedTurn,
) -> (mpsc::Receiver<TurnEvent>, tokio::task::JoinHandle<TurnOutcome>) {
    let (events_tx, events_rx) = mpsc::channel(TURN_EVENT_BUFFER);
    let config = loop_config(state, &turn);
    let session_tx = state.handles.session_tx.clone();

    let handle = tokio::spawn(async move {
        tracing::info!(chat_id = %turn.chat_id, model = %turn.target.api_identifier, "turn started");
        let outcome = run_agentic_loop(config, turn.history, events_tx).await;

        match persist_turn(
            &session_tx,
            &turn.chat_id,
            outcome.response_messages.clone(),
            outcome.usage,
        )
        .await
        {
            Ok(saved) => {
                tracing::debug!(chat_id = %turn.chat_id, saved, "turn persisted");
            }
            Err(err) => {
                tracing::error!(chat_id = %turn.chat_id, error = %err, "failed to persist turn");
            }
        }
        outcome
    });

    (events_rx, handle)
}
