//! One-shot generation helpers on top of the model gateway.
//!
//! Structured calls ask the provider for a JSON object and then parse the
//! reply leniently: markdown fences are stripped, the outermost object is
//! extracted, and `json5` is tried when strict parsing fails.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::ToolError;
use crate::protocol::{Completion, ModelMsg, ModelTarget, TokenUsage};

lazy_static::lazy_static! {
    static ref CODE_FENCE_RE: Option<Regex> = Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").ok();
}

/// Run a single completion and return its text.
pub async fn generate_text(
    model_tx: &mpsc::Sender<ModelMsg>,
    target: &ModelTarget,
    system: &str,
    prompt: &str,
) -> Result<Completion, ToolError> {
    complete(model_tx, target, system, prompt, false).await
}

/// Run a JSON-mode completion and deserialize the reply into `T`.
pub async fn generate_object<T: DeserializeOwned>(
    model_tx: &mpsc::Sender<ModelMsg>,
    target: &ModelTarget,
    system: &str,
    prompt: &str,
) -> Result<(T, TokenUsage), ToolError> {
    let completion = complete(model_tx, target, system, prompt, true).await?;
    let value = parse_json_lenient(&completion.text).ok_or_else(|| {
        ToolError::Generation(format!(
            "model reply is not a JSON object: {}",
            truncate(&completion.text, 200)
        ))
    })?;
    let object = serde_json::from_value(value)
        .map_err(|e| ToolError::Generation(format!("model reply has the wrong shape: {}", e)))?;
    Ok((object, completion.usage))
}

async fn complete(
    model_tx: &mpsc::Sender<ModelMsg>,
    target: &ModelTarget,
    system: &str,
    prompt: &str,
    json_mode: bool,
) -> Result<Completion, ToolError> {
    let (tx, rx) = oneshot::channel();
    model_tx
        .send(ModelMsg::Complete {
            target: target.clone(),
            system: system.to_string(),
            prompt: prompt.to_string(),
            json_mode,
            respond_to: tx,
        })
        .await
        .map_err(|_| ToolError::Upstream("model gateway is not running".to_string()))?;

    rx.await
        .map_err(|_| ToolError::Upstream("model gateway dropped the request".to_string()))?
        .map_err(ToolError::Upstream)
}

/// Parse a model reply that should contain one JSON object.
pub fn parse_json_lenient(raw: &str) -> Option<Value> {
    let unfenced = strip_code_fences(raw);
    let candidate = outermost_object(unfenced).unwrap_or(unfenced);

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return Some(value);
    }
    json5::from_str::<Value>(candidate).ok()
}

fn strip_code_fences(raw: &str) -> &str {
    CODE_FENCE_RE
        .as_ref()
        .and_then(|re| re.captures(raw))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or_else(|| raw.trim())
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
