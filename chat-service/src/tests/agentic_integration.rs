//! End-to-end turns through the agentic loop.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};

use super::*;
use crate::actors::sql_actor::tests::seed_unicorns;
use crate::actors::ReadOnlySqlActor;
use crate::agentic_loop::{final_answer_text, run_agentic_loop, MAX_TOOL_STEPS};
use crate::protocol::{FinishReason, MessageRole, TurnEvent};
use crate::system_prompt::{EMPTY_ANSWER_NOTICE, STEP_BUDGET_NOTICE};
use crate::tool_execution::STEP_BUDGET_SKIP_MESSAGE;
use crate::tool_selection::select_active_tools;

const VERCEL_QUERY: &str =
    r#"{"query": "SELECT company, valuation FROM unicorns WHERE lower(company) = 'vercel'"}"#;
const VERCEL_CHART: &str = r#"{"type": "bar", "title": "Vercel valuation", "description": "Valuation in billions",
    "takeaway": "Vercel is valued at $3.25B", "xKey": "company", "yKeys": ["valuation"], "legend": false}"#;

async fn drain(mut rx: mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn streamed_text(events: &[TurnEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            TurnEvent::TextDelta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn tool_result_parts(outcome: &crate::agentic_loop::TurnOutcome) -> Vec<Value> {
    outcome
        .response_messages
        .iter()
        .filter(|message| message.role == MessageRole::Tool)
        .filter_map(|message| message.content.as_array().cloned())
        .flatten()
        .collect()
}

#[tokio::test]
async fn query_marker_answers_from_the_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let data_db = dir.path().join("insights.db");
    seed_unicorns(&data_db);

    let (sql_tx, sql_rx) = mpsc::channel(4);
    tokio::spawn(ReadOnlySqlActor::new(sql_rx, data_db, 100).run());

    let (model_tx, recorded) = spawn_gateway(
        vec![
            vec![
                ModelStreamEvent::ToolCalls(vec![tool_call(
                    "call_1",
                    "query_database",
                    json!({"query": "What is Vercel's valuation?"}),
                )]),
                ModelStreamEvent::Usage(usage(30)),
            ],
            vec![
                ModelStreamEvent::Token("Vercel is valued ".into()),
                ModelStreamEvent::Token("at $3.25B.".into()),
                ModelStreamEvent::Usage(usage(50)),
            ],
        ],
        VERCEL_QUERY,
        VERCEL_CHART,
    );
    let mut handles = handles_with_model(model_tx);
    handles.sql_tx = sql_tx;

    let utterance = "@query What is Vercel's valuation?";
    let active = select_active_tools(utterance, &BuiltinTool::ALL);
    let (events_tx, events_rx) = mpsc::channel(64);
    let outcome = run_agentic_loop(
        loop_config(handles, active),
        vec![ChatMessage::user(utterance)],
        events_tx,
    )
    .await;
    let events = drain(events_rx).await;

    assert_eq!(outcome.finish_reason, FinishReason::Stop);
    assert_eq!(outcome.tool_steps, 1);
    assert_eq!(outcome.usage.total_tokens, 80);
    assert_eq!(streamed_text(&events), "Vercel is valued at $3.25B.");
    assert_eq!(final_answer_text(&outcome), Some("Vercel is valued at $3.25B."));

    let results = tool_result_parts(&outcome);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["isError"], false);
    assert_eq!(results[0]["result"]["results"][0]["company"], "Vercel");
    assert_eq!(results[0]["result"]["columns"], json!(["company", "valuation"]));
    assert_eq!(results[0]["result"]["config"]["colors"]["valuation"], "hsl(var(--chart-1))");

    let passes = recorded.lock().unwrap().clone();
    assert_eq!(passes.len(), 2);
    let offered: Vec<String> = passes[0]
        .tools
        .as_ref()
        .unwrap()
        .iter()
        .map(|tool| tool.function.name.clone())
        .collect();
    assert_eq!(offered, vec!["query_database"]);
    let fed_back = passes[1].messages.last().unwrap();
    assert_eq!(fed_back.role, "tool");
    assert_eq!(fed_back.tool_call_id.as_deref(), Some("call_1"));
}

#[tokio::test]
async fn failing_tool_becomes_a_result_and_the_turn_continues() {
    let (model_tx, recorded) = spawn_gateway(
        vec![
            vec![ModelStreamEvent::ToolCalls(vec![tool_call(
                "call_1",
                "get_information",
                json!({"question": "refund policy"}),
            )])],
            vec![ModelStreamEvent::Token("I could not search the knowledge base.".into())],
        ],
        VERCEL_QUERY,
        VERCEL_CHART,
    );

    let (events_tx, events_rx) = mpsc::channel(64);
    let outcome = run_agentic_loop(
        loop_config(handles_with_model(model_tx), BuiltinTool::ALL.to_vec()),
        vec![ChatMessage::user("What is the refund policy?")],
        events_tx,
    )
    .await;
    let events = drain(events_rx).await;

    assert_eq!(outcome.finish_reason, FinishReason::Stop);
    let results = tool_result_parts(&outcome);
    assert_eq!(results[0]["isError"], true);
    assert_eq!(results[0]["result"]["error"]["kind"], "upstream");
    assert!(!events.iter().any(|event| matches!(event, TurnEvent::Error { .. })));
    assert_eq!(recorded.lock().unwrap().len(), 2);
}

fn two_lookups(pass: usize) -> Pass {
    vec![ModelStreamEvent::ToolCalls(vec![
        tool_call(&format!("call_{}a", pass), "get_information", json!({"question": "a"})),
        tool_call(&format!("call_{}b", pass), "get_information", json!({"question": "b"})),
    ])]
}

#[tokio::test]
async fn step_budget_forces_a_final_pass_without_tools() {
    let (model_tx, recorded) = spawn_gateway(
        vec![
            two_lookups(1),
            two_lookups(2),
            two_lookups(3),
            vec![ModelStreamEvent::Token("Here is what I found.".into())],
        ],
        VERCEL_QUERY,
        VERCEL_CHART,
    );

    let (events_tx, events_rx) = mpsc::channel(64);
    let outcome = run_agentic_loop(
        loop_config(handles_with_model(model_tx), BuiltinTool::ALL.to_vec()),
        vec![ChatMessage::user("Search everything")],
        events_tx,
    )
    .await;
    let events = drain(events_rx).await;

    assert_eq!(outcome.finish_reason, FinishReason::StepBudgetReached);
    assert_eq!(outcome.tool_steps, MAX_TOOL_STEPS);
    assert_eq!(final_answer_text(&outcome), Some("Here is what I found."));

    let results = tool_result_parts(&outcome);
    assert_eq!(results.len(), 6);
    let skipped: Vec<&Value> = results
        .iter()
        .filter(|part| part["result"]["skipped"] == STEP_BUDGET_SKIP_MESSAGE)
        .collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0]["toolCallId"], "call_3b");

    let passes = recorded.lock().unwrap().clone();
    assert_eq!(passes.len(), 4);
    assert!(passes[2].tools.is_some());
    assert!(passes[3].tools.is_none());
    assert!(passes[3]
        .messages
        .iter()
        .any(|message| message.role == "system" && message.content == STEP_BUDGET_NOTICE));

    assert!(matches!(
        events.last(),
        Some(TurnEvent::Finish { finish_reason: FinishReason::StepBudgetReached, .. })
    ));
}

#[tokio::test]
async fn budget_reached_with_a_silent_model_still_answers() {
    // The last scripted pass repeats, so the tool-less pass asks for tools again
    let (model_tx, _) = spawn_gateway(
        vec![two_lookups(1), two_lookups(2), two_lookups(3)],
        VERCEL_QUERY,
        VERCEL_CHART,
    );

    let (events_tx, events_rx) = mpsc::channel(64);
    let outcome = run_agentic_loop(
        loop_config(handles_with_model(model_tx), BuiltinTool::ALL.to_vec()),
        vec![ChatMessage::user("Search everything")],
        events_tx,
    )
    .await;
    let events = drain(events_rx).await;

    assert_eq!(outcome.finish_reason, FinishReason::StepBudgetReached);
    assert!(outcome.tool_steps <= MAX_TOOL_STEPS);
    assert_eq!(streamed_text(&events), EMPTY_ANSWER_NOTICE);
    assert_eq!(final_answer_text(&outcome), Some(EMPTY_ANSWER_NOTICE));
}

#[tokio::test]
async fn model_failure_is_reported_and_partial_text_kept() {
    let (model_tx, _) = spawn_gateway(
        vec![vec![
            ModelStreamEvent::Token("Let me ".into()),
            ModelStreamEvent::Failed("HTTP 500: overloaded".into()),
        ]],
        VERCEL_QUERY,
        VERCEL_CHART,
    );

    let (events_tx, events_rx) = mpsc::channel(64);
    let outcome = run_agentic_loop(
        loop_config(handles_with_model(model_tx), Vec::new()),
        vec![ChatMessage::user("hi")],
        events_tx,
    )
    .await;
    let events = drain(events_rx).await;

    assert_eq!(outcome.finish_reason, FinishReason::ModelError);
    assert_eq!(final_answer_text(&outcome), Some("Let me "));
    assert!(events.contains(&TurnEvent::Error {
        message: "HTTP 500: overloaded".into()
    }));
}

#[tokio::test]
async fn disconnect_abandons_the_model_stream() {
    let (model_tx, mut model_rx) = mpsc::channel::<ModelMsg>(4);
    let abandoned = Arc::new(Notify::new());
    let signal = abandoned.clone();
    tokio::spawn(async move {
        while let Some(msg) = model_rx.recv().await {
            if let ModelMsg::StreamChat { respond_to, .. } = msg {
                let _ = respond_to.send(ModelStreamEvent::Token("Partial ".into()));
                respond_to.closed().await;
                signal.notify_one();
            }
        }
    });

    let (events_tx, mut events_rx) = mpsc::channel(64);
    let turn = tokio::spawn(run_agentic_loop(
        loop_config(handles_with_model(model_tx), Vec::new()),
        vec![ChatMessage::user("hi")],
        events_tx,
    ));

    assert_eq!(
        events_rx.recv().await,
        Some(TurnEvent::TextDelta { text: "Partial ".into() })
    );
    drop(events_rx);

    let outcome = turn.await.unwrap();
    abandoned.notified().await;
    assert_eq!(outcome.finish_reason, FinishReason::CallerDisconnected);
    assert_eq!(final_answer_text(&outcome), Some("Partial "));
}

#[tokio::test]
async fn dispatched_tool_finishes_after_disconnect() {
    let arrived = Arc::new(Notify::new());
    let signal = arrived.clone();
    let router = Router::new().route(
        "/forecast",
        get(move || {
            let signal = signal.clone();
            async move {
                signal.notify_one();
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                Json(json!({"current": {"temperature_2m": 21.0}}))
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let (model_tx, recorded) = spawn_gateway(
        vec![vec![ModelStreamEvent::ToolCalls(vec![tool_call(
            "call_1",
            "get_weather",
            json!({"latitude": 52.52, "longitude": 13.41}),
        )])]],
        VERCEL_QUERY,
        VERCEL_CHART,
    );
    let mut config = loop_config(handles_with_model(model_tx), BuiltinTool::ALL.to_vec());
    config.tool_context.weather_base_url = format!("http://{}/forecast", addr);

    let (events_tx, events_rx) = mpsc::channel(64);
    let turn = tokio::spawn(run_agentic_loop(
        config,
        vec![ChatMessage::user("Weather in Berlin?")],
        events_tx,
    ));

    arrived.notified().await;
    drop(events_rx);

    let outcome = turn.await.unwrap();
    assert_eq!(outcome.finish_reason, FinishReason::CallerDisconnected);
    let results = tool_result_parts(&outcome);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["isError"], false);
    assert_eq!(results[0]["result"]["current"]["temperature_2m"], 21.0);
    assert_eq!(recorded.lock().unwrap().len(), 1);
}
