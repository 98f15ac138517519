//! Request body construction for provider API calls.

use serde_json::{json, Value};

use crate::protocol::{ChatMessage, ModelProvider, ModelTarget, OpenAITool};
use crate::settings::ProviderSettings;

/// Where a provider is reached and how it authenticates.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ProviderEndpoint {
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

/// Resolve the endpoint for `provider`. Hosted providers require an API key.
pub fn resolve_provider_endpoint(
    providers: &ProviderSettings,
    provider: ModelProvider,
) -> Result<ProviderEndpoint, String> {
    match provider {
        ModelProvider::OpenAi => Ok(ProviderEndpoint {
            base_url: providers.openai_base_url.clone(),
            api_key: Some(
                providers
                    .openai_api_key
                    .clone()
                    .ok_or_else(|| "OPENAI_API_KEY is not configured".to_string())?,
            ),
        }),
        ModelProvider::Mistral => Ok(ProviderEndpoint {
            base_url: providers.mistral_base_url.clone(),
            api_key: Some(
                providers
                    .mistral_api_key
                    .clone()
                    .ok_or_else(|| "MISTRAL_API_KEY is not configured".to_string())?,
            ),
        }),
        ModelProvider::Ollama => Ok(ProviderEndpoint {
            base_url: providers.ollama_base_url.clone(),
            api_key: None,
        }),
    }
}

/// Build a streaming chat request body. Tools are omitted when `tools` is
/// `None` or empty.
pub fn build_stream_chat_request_body(
    target: &ModelTarget,
    messages: &[ChatMessage],
    tools: &Option<Vec<OpenAITool>>,
) -> Value {
    let mut body = json!({
        "model": target.api_identifier,
        "messages": messages,
        "stream": true,
    });

    // Mistral reports usage on the final chunk without being asked and
    // rejects the option.
    if target.provider != ModelProvider::Mistral {
        body["stream_options"] = json!({ "include_usage": true });
    }

    if let Some(tool_list) = tools {
        if !tool_list.is_empty() {
            body["tools"] = json!(tool_list);
            body["tool_choice"] = json!("auto");
        }
    }

    body
}

/// Build a non-streaming completion body for title, query and chart generation.
pub fn build_completion_request_body(
    target: &ModelTarget,
    system: &str,
    prompt: &str,
    json_mode: bool,
) -> Value {
    let mut body = json!({
        "model": target.api_identifier,
        "messages": [
            ChatMessage::system(system),
            ChatMessage::user(prompt),
        ],
        "stream": false,
        "temperature": 0,
    });

    if json_mode {
        body["response_format"] = json!({ "type": "json_object" });
    }

    body
}
