use serde_json::Value;
use tokio::sync::mpsc;

use super::request_builder::{
    build_completion_request_body, build_stream_chat_request_body, resolve_provider_endpoint,
};
use super::stream_handler::{
    extract_text_from_stream_chunk, extract_usage, SseEventParser, SsePayload, StreamingToolCalls,
};
use crate::protocol::{
    ChatMessage, Completion, ModelMsg, ModelStreamEvent, ModelTarget, OpenAITool, TokenUsage,
};
use crate::settings::ProviderSettings;

/// Routes chat and completion requests to OpenAI-compatible providers.
///
/// Every request runs in its own task so a long stream never blocks the
/// mailbox.
pub struct ModelGatewayActor {
    rx: mpsc::Receiver<ModelMsg>,
    client: reqwest::Client,
    providers: ProviderSettings,
}

impl ModelGatewayActor {
    pub fn new(rx: mpsc::Receiver<ModelMsg>, providers: ProviderSettings) -> Self {
        Self {
            rx,
            client: reqwest::Client::new(),
            providers,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("model gateway started");

        while let Some(msg) = self.rx.recv().await {
            let client = self.client.clone();
            let providers = self.providers.clone();

            tokio::spawn(async move {
                match msg {
                    ModelMsg::StreamChat {
                        target,
                        messages,
                        tools,
                        respond_to,
                    } => {
                        stream_chat(&client, &providers, &target, &messages, &tools, &respond_to)
                            .await;
                    }
                    ModelMsg::Complete {
                        target,
                        system,
                        prompt,
                        json_mode,
                        respond_to,
                    } => {
                        let result =
                            complete(&client, &providers, &target, &system, &prompt, json_mode)
                                .await;
                        let _ = respond_to.send(result);
                    }
                }
            });
        }

        tracing::info!("model gateway stopped");
    }
}

async fn stream_chat(
    client: &reqwest::Client,
    providers: &ProviderSettings,
    target: &ModelTarget,
    messages: &[ChatMessage],
    tools: &Option<Vec<OpenAITool>>,
    respond_to: &mpsc::UnboundedSender<ModelStreamEvent>,
) {
    let fail = |message: String| {
        tracing::warn!(model = %target.api_identifier, error = %message, "chat stream failed");
        let _ = respond_to.send(ModelStreamEvent::Failed(message));
    };

    let endpoint = match resolve_provider_endpoint(providers, target.provider) {
        Ok(endpoint) => endpoint,
        Err(e) => return fail(e),
    };
    let body = build_stream_chat_request_body(target, messages, tools);

    let mut request = client.post(endpoint.chat_completions_url()).json(&body);
    if let Some(key) = &endpoint.api_key {
        request = request.bearer_auth(key);
    }

    tracing::debug!(
        model = %target.api_identifier,
        provider = target.provider.as_str(),
        messages = messages.len(),
        tools = tools.as_ref().map(|t| t.len()).unwrap_or(0),
        "starting chat stream"
    );

    let mut resp = match request.send().await {
        Ok(resp) => resp,
        Err(e) => return fail(format!("Connection error: {}", e)),
    };
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return fail(format!("HTTP {}: {}", status, text));
    }

    let mut parser = SseEventParser::default();
    let mut tool_calls = StreamingToolCalls::default();
    let mut usage: Option<TokenUsage> = None;

    'stream: loop {
        let chunk = tokio::select! {
            _ = respond_to.closed() => {
                tracing::debug!(model = %target.api_identifier, "stream receiver dropped, abandoning generation");
                return;
            }
            chunk = resp.chunk() => chunk,
        };

        let chunk = match chunk {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => return fail(format!("Stream interrupted: {}", e)),
        };

        for payload in parser.push(&chunk) {
            let json = match payload {
                SsePayload::Done => break 'stream,
                SsePayload::Json(json) => json,
            };

            if let Some(error) = json.get("error").filter(|e| !e.is_null()) {
                return fail(format!("Provider error: {}", error));
            }
            if let Some(text) = extract_text_from_stream_chunk(&json) {
                if respond_to.send(ModelStreamEvent::Token(text)).is_err() {
                    return;
                }
            }
            if let Some(deltas) = json["choices"][0]["delta"]["tool_calls"].as_array() {
                tool_calls.process_streaming_tool_call_delta(deltas);
            }
            if let Some(chunk_usage) = extract_usage(&json) {
                usage = Some(chunk_usage);
            }
        }
    }

    if !tool_calls.is_empty() {
        let calls = tool_calls.into_parsed_calls();
        tracing::debug!(count = calls.len(), "model requested tool calls");
        let _ = respond_to.send(ModelStreamEvent::ToolCalls(calls));
    }
    if let Some(usage) = usage {
        let _ = respond_to.send(ModelStreamEvent::Usage(usage));
    }
}

async fn complete(
    client: &reqwest::Client,
    providers: &ProviderSettings,
    target: &ModelTarget,
    system: &str,
    prompt: &str,
    json_mode: bool,
) -> Result<Completion, String> {
    let endpoint = resolve_provider_endpoint(providers, target.provider)?;
    let body = build_completion_request_body(target, system, prompt, json_mode);

    let mut request = client.post(endpoint.chat_completions_url()).json(&body);
    if let Some(key) = &endpoint.api_key {
        request = request.bearer_auth(key);
    }

    let resp = request
        .send()
        .await
        .map_err(|e| format!("Connection error: {}", e))?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(format!("HTTP {}: {}", status, text));
    }

    let json: Value = resp
        .json()
        .await
        .map_err(|e| format!("Invalid completion response: {}", e))?;
    let text = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| "Completion response has no message content".to_string())?
        .to_string();

    Ok(Completion {
        text,
        usage: extract_usage(&json).unwrap_or_default(),
    })
}
