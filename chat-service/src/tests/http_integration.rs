//! Router-level checks with `tower::ServiceExt::oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tokio::sync::oneshot;
use tower::ServiceExt;

use super::*;
use crate::app_state::AppState;
use crate::commands::router;
use crate::settings::AppSettings;

const TOKEN: &str = "secret-a";

async fn app(passes: Vec<Pass>) -> (tempfile::TempDir, Router, mpsc::Sender<SessionMsg>) {
    let dir = tempfile::tempdir().unwrap();
    let session_tx = spawn_chat_store(&dir.path().join("chats.db")).await;
    let (model_tx, _) = spawn_gateway(passes, "{}", "{}");
    let mut handles = handles_with_model(model_tx);
    handles.session_tx = session_tx.clone();

    let mut settings = AppSettings::default();
    settings.auth.tokens.insert(TOKEN.into(), "alice".into());
    (dir, router(AppState::new(handles, settings)), session_tx)
}

fn chat_request(authorized: bool, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json");
    if authorized {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", TOKEN));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn stored_count(session_tx: &mpsc::Sender<SessionMsg>, chat_id: &str) -> usize {
    let (tx, rx) = oneshot::channel();
    session_tx
        .send(SessionMsg::GetMessages { chat_id: chat_id.into(), respond_to: tx })
        .await
        .unwrap();
    rx.await.unwrap().unwrap().len()
}

#[tokio::test]
async fn health_and_models_are_public() {
    let (_dir, app, _) = app(Vec::new()).await;

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/api/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let models: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert!(models
        .as_array()
        .unwrap()
        .iter()
        .any(|model| model["id"] == "gpt-4o-mini"));
}

#[tokio::test]
async fn chat_without_token_is_unauthorized() {
    let (_dir, app, _) = app(Vec::new()).await;
    let response = app
        .oneshot(chat_request(false, "not even json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let (_dir, app, _) = app(Vec::new()).await;
    let response = app.oneshot(chat_request(true, "{\"id\": 1}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_streams_sse_events_and_persists() {
    let (_dir, app, session_tx) = app(vec![vec![
        ModelStreamEvent::Token("Hello ".into()),
        ModelStreamEvent::Token("there".into()),
        ModelStreamEvent::Usage(usage(12)),
    ]])
    .await;

    let body = r#"{"id": "c1", "messages": [{"role": "user", "content": "hi"}], "modelId": "gpt-4o-mini"}"#;
    let response = app.oneshot(chat_request(true, body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let text = body_text(response).await;
    assert!(text.contains(r#"{"type":"text-delta","text":"Hello "}"#));
    assert!(text.contains(r#""finishReason":"stop""#));
    assert!(text.contains(r#""totalTokens":12"#));

    // Persistence runs after the last event; give it a moment.
    let mut stored = 0;
    for _ in 0..50 {
        stored = stored_count(&session_tx, "c1").await;
        if stored == 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(stored, 2);
}

#[tokio::test]
async fn delete_route_maps_outcomes_to_status_codes() {
    let (_dir, app, _) = app(vec![vec![ModelStreamEvent::Token("ok".into())]]).await;

    let response = app
        .clone()
        .oneshot(
            Request::delete("/api/chat")
                .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = r#"{"id": "c1", "messages": [{"role": "user", "content": "hi"}], "modelId": "gpt-4o-mini"}"#;
    let response = app.clone().oneshot(chat_request(true, body)).await.unwrap();
    body_text(response).await;

    let response = app
        .clone()
        .oneshot(Request::delete("/api/chat?id=c1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::delete("/api/chat?id=c1")
                .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Chat deleted");
}
