//! Agentic loop execution for multi-step tool calling.
//!
//! One turn is an explicit state machine:
//! `Reasoning -> (ToolCall -> ToolResult -> Reasoning)* -> Finalized`.
//!
//! ## Key Types
//! - `AgenticLoopConfig` - Model, prompt and tool set for one turn
//! - `LoopState` - Current state of the turn
//! - `TurnState` - Counters and context threaded through every transition
//! - `TurnOutcome` - What the caller persists once the turn is finalized
//!
//! ## Key Functions
//! - `run_agentic_loop()` - Main loop execution

use serde_json::Value;
use tokio::sync::mpsc;

use crate::message_builders::{
    create_assistant_message_with_tool_calls, create_tool_result_message, ResponseMessage,
};
use crate::protocol::{
    ChatMessage, FinishReason, ModelMsg, ModelStreamEvent, ModelTarget, OpenAITool,
    ParsedToolCall, TokenUsage, TurnEvent,
};
use crate::smooth_stream::WordChunker;
use crate::system_prompt::{EMPTY_ANSWER_NOTICE, STEP_BUDGET_NOTICE};
use crate::tool_execution::{execute_tool_call, ToolContext, ToolInvocation};
use crate::tools::BuiltinTool;

// ============================================================================
// Types
// ============================================================================

/// Maximum number of tool calls a single turn may make.
pub const MAX_TOOL_STEPS: usize = 5;

/// Configuration for one run of the agentic loop.
#[derive(Clone)]
pub struct AgenticLoopConfig {
    /// Model every streamed pass is sent to
    pub target: ModelTarget,
    /// System prompt placed ahead of the conversation
    pub system_prompt: String,
    /// Tools the model may call this turn
    pub active_tools: Vec<BuiltinTool>,
    /// Re-chunk model text into whole words before it reaches the caller
    pub smooth_streaming: bool,
    pub tool_context: ToolContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    Reasoning,
    ToolCall(Vec<ParsedToolCall>),
    ToolResult,
    Finalized(FinishReason),
}

/// Per-turn counters and context, owned by the loop.
#[derive(Debug)]
pub struct TurnState {
    /// Tool calls counted against `MAX_TOOL_STEPS`
    pub steps: usize,
    pub usage: TokenUsage,
    /// Messages sent to the model on the next pass
    pub context: Vec<ChatMessage>,
    /// Messages produced this turn, in order, for persistence
    pub response_messages: Vec<ResponseMessage>,
    tools_withheld: bool,
    streamed_text: bool,
}

impl TurnState {
    pub fn new(system_prompt: &str, history: Vec<ChatMessage>) -> Self {
        let mut context = Vec::with_capacity(history.len() + 1);
        context.push(ChatMessage::system(system_prompt));
        context.extend(history);
        Self {
            steps: 0,
            usage: TokenUsage::default(),
            context,
            response_messages: Vec::new(),
            tools_withheld: false,
            streamed_text: false,
        }
    }

    fn budget_exhausted(&self) -> bool {
        self.steps >= MAX_TOOL_STEPS
    }
}

/// Result of a finalized turn.
#[derive(Debug)]
pub struct TurnOutcome {
    pub finish_reason: FinishReason,
    pub usage: TokenUsage,
    pub response_messages: Vec<ResponseMessage>,
    pub tool_steps: usize,
}

/// How a single streamed model pass ended.
enum PassOutcome {
    Completed {
        text: String,
        tool_calls: Vec<ParsedToolCall>,
        usage: TokenUsage,
    },
    Failed {
        text: String,
        message: String,
    },
    Disconnected {
        text: String,
    },
}

// ============================================================================
// Main Loop
// ============================================================================

/// Run the agentic loop: stream the model, execute tool calls, repeat.
///
/// Text deltas, errors and a closing `Finish` event are sent on `events`.
/// The loop never fails; every ending is expressed as a [`FinishReason`].
pub async fn run_agentic_loop(
    config: AgenticLoopConfig,
    history: Vec<ChatMessage>,
    events: mpsc::Sender<TurnEvent>,
) -> TurnOutcome {
    let openai_tools: Option<Vec<OpenAITool>> = if config.active_tools.is_empty() {
        None
    } else {
        Some(config.active_tools.iter().map(BuiltinTool::to_openai_tool).collect())
    };

    let mut turn = TurnState::new(&config.system_prompt, history);
    let mut state = LoopState::Reasoning;

    let finish_reason = loop {
        state = match state {
            LoopState::Reasoning => {
                let tools = if turn.tools_withheld { None } else { openai_tools.clone() };
                reason(&config, &mut turn, tools, &events).await
            }
            LoopState::ToolCall(calls) => {
                run_tool_calls(&config, &mut turn, calls).await;
                LoopState::ToolResult
            }
            LoopState::ToolResult => {
                if events.is_closed() {
                    tracing::info!(steps = turn.steps, "caller disconnected during tool execution");
                    LoopState::Finalized(FinishReason::CallerDisconnected)
                } else {
                    if turn.budget_exhausted() && !turn.tools_withheld {
                        tracing::info!(steps = turn.steps, "step budget reached, withholding tools");
                        turn.tools_withheld = true;
                        turn.context.push(ChatMessage::system(STEP_BUDGET_NOTICE));
                    }
                    LoopState::Reasoning
                }
            }
            LoopState::Finalized(reason) => break reason,
        };
    };

    let needs_notice = matches!(
        finish_reason,
        FinishReason::Stop | FinishReason::StepBudgetReached
    );
    if needs_notice && !turn.streamed_text {
        let _ = events
            .send(TurnEvent::TextDelta {
                text: EMPTY_ANSWER_NOTICE.to_string(),
            })
            .await;
        turn.response_messages
            .push(ResponseMessage::assistant_text(EMPTY_ANSWER_NOTICE));
    }

    tracing::info!(
        finish_reason = ?finish_reason,
        steps = turn.steps,
        total_tokens = turn.usage.total_tokens,
        "turn finalized"
    );
    let _ = events
        .send(TurnEvent::Finish {
            finish_reason,
            usage: turn.usage,
        })
        .await;

    TurnOutcome {
        finish_reason,
        usage: turn.usage,
        response_messages: turn.response_messages,
        tool_steps: turn.steps,
    }
}

/// One Reasoning pass: stream the model and decide the next state.
async fn reason(
    config: &AgenticLoopConfig,
    turn: &mut TurnState,
    tools: Option<Vec<OpenAITool>>,
    events: &mpsc::Sender<TurnEvent>,
) -> LoopState {
    let pass = stream_model_pass(
        &config.tool_context.handles.model_tx,
        &config.target,
        turn.context.clone(),
        tools,
        events,
        config.smooth_streaming,
    )
    .await;

    match pass {
        PassOutcome::Completed {
            text,
            tool_calls,
            usage,
        } => {
            turn.usage.add(&usage);
            turn.streamed_text |= !text.is_empty();

            if !tool_calls.is_empty() && !turn.tools_withheld {
                tracing::debug!(count = tool_calls.len(), "model requested tools");
                turn.context
                    .push(create_assistant_message_with_tool_calls(&text, &tool_calls));
                turn.response_messages
                    .push(ResponseMessage::assistant_with_tool_calls(&text, &tool_calls));
                return LoopState::ToolCall(tool_calls);
            }

            if !tool_calls.is_empty() {
                tracing::warn!(
                    count = tool_calls.len(),
                    "ignoring tool calls requested after the step budget"
                );
            }
            keep_text(turn, &text);
            LoopState::Finalized(if turn.tools_withheld {
                FinishReason::StepBudgetReached
            } else {
                FinishReason::Stop
            })
        }
        PassOutcome::Failed { text, message } => {
            tracing::error!(error = %message, "model stream failed");
            turn.streamed_text |= !text.is_empty();
            keep_text(turn, &text);
            let _ = events.send(TurnEvent::Error { message }).await;
            LoopState::Finalized(FinishReason::ModelError)
        }
        PassOutcome::Disconnected { text } => {
            tracing::info!("caller disconnected, abandoning model stream");
            keep_text(turn, &text);
            LoopState::Finalized(FinishReason::CallerDisconnected)
        }
    }
}

fn keep_text(turn: &mut TurnState, text: &str) {
    if text.is_empty() {
        return;
    }
    turn.context.push(ChatMessage::assistant(text));
    turn.response_messages.push(ResponseMessage::assistant_text(text));
}

/// Execute a batch of tool calls in order, counting each against the budget.
///
/// Calls past the budget are answered without being dispatched.
async fn run_tool_calls(config: &AgenticLoopConfig, turn: &mut TurnState, calls: Vec<ParsedToolCall>) {
    let mut invocations = Vec::with_capacity(calls.len());

    for call in &calls {
        let invocation = if turn.budget_exhausted() {
            tracing::warn!(tool = %call.tool, call_id = %call.id, "step budget reached, skipping tool call");
            ToolInvocation::skipped_for_budget(call)
        } else {
            turn.steps += 1;
            tracing::debug!(tool = %call.tool, step = turn.steps, "tool step");
            execute_tool_call(&config.tool_context, call, &config.active_tools).await
        };
        turn.context.push(create_tool_result_message(&invocation));
        invocations.push(invocation);
    }

    turn.response_messages
        .push(ResponseMessage::tool_results(&invocations));
}

// ============================================================================
// Streaming
// ============================================================================

/// Stream one model pass, forwarding text to the caller as it arrives.
///
/// The model request is abandoned as soon as the caller's channel closes.
async fn stream_model_pass(
    model_tx: &mpsc::Sender<ModelMsg>,
    target: &ModelTarget,
    messages: Vec<ChatMessage>,
    tools: Option<Vec<OpenAITool>>,
    events: &mpsc::Sender<TurnEvent>,
    smoothing: bool,
) -> PassOutcome {
    let (stream_tx, mut stream_rx) = mpsc::unbounded_channel();
    let request = ModelMsg::StreamChat {
        target: target.clone(),
        messages,
        tools,
        respond_to: stream_tx,
    };
    if model_tx.send(request).await.is_err() {
        return PassOutcome::Failed {
            text: String::new(),
            message: "model gateway is not running".to_string(),
        };
    }

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    let mut usage = TokenUsage::default();
    let mut chunker = smoothing.then(WordChunker::default);

    loop {
        tokio::select! {
            biased;
            _ = events.closed() => {
                return PassOutcome::Disconnected { text };
            }
            event = stream_rx.recv() => {
                match event {
                    Some(ModelStreamEvent::Token(token)) => {
                        text.push_str(&token);
                        let chunks = match chunker.as_mut() {
                            Some(chunker) => chunker.push(&token),
                            None => vec![token],
                        };
                        if !emit_text(events, chunks).await {
                            return PassOutcome::Disconnected { text };
                        }
                    }
                    Some(ModelStreamEvent::ToolCalls(calls)) => tool_calls = calls,
                    Some(ModelStreamEvent::Usage(reported)) => usage = reported,
                    Some(ModelStreamEvent::Failed(message)) => {
                        flush(&mut chunker, events).await;
                        return PassOutcome::Failed { text, message };
                    }
                    None => break,
                }
            }
        }
    }

    if !flush(&mut chunker, events).await {
        return PassOutcome::Disconnected { text };
    }
    PassOutcome::Completed {
        text,
        tool_calls,
        usage,
    }
}

async fn flush(chunker: &mut Option<WordChunker>, events: &mpsc::Sender<TurnEvent>) -> bool {
    let rest = chunker.as_mut().and_then(WordChunker::flush);
    emit_text(events, rest).await
}

/// Send text chunks to the caller. Returns false once the caller is gone.
async fn emit_text(events: &mpsc::Sender<TurnEvent>, chunks: impl IntoIterator<Item = String>) -> bool {
    for text in chunks {
        if text.is_empty() {
            continue;
        }
        if events.send(TurnEvent::TextDelta { text }).await.is_err() {
            return false;
        }
    }
    true
}

/// Text of the last assistant answer in the outcome, if any.
pub fn final_answer_text(outcome: &TurnOutcome) -> Option<&str> {
    outcome
        .response_messages
        .iter()
        .rev()
        .find_map(|message| match &message.content {
            Value::String(text) if !text.is_empty() => Some(text.as_str()),
            _ => None,
        })
}
