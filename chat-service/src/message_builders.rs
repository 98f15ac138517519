//! Message construction for the agentic loop.
//!
//! Two shapes are produced for every step: the OpenAI chat format fed back
//! to the model, and the part-based content that is persisted.

use serde_json::{json, Value};

use crate::protocol::{
    ChatMessage, MessageRole, OpenAIToolCall, OpenAIToolCallFunction, ParsedToolCall,
};
use crate::tool_execution::ToolInvocation;

/// A message produced during a turn, waiting to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: Value,
}

impl ResponseMessage {
    fn new(role: MessageRole, content: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
        }
    }

    /// Plain assistant answer, stored as a JSON string.
    pub fn assistant_text(text: &str) -> Self {
        Self::new(MessageRole::Assistant, Value::String(text.to_string()))
    }

    /// Assistant step that requested tools: optional text part, then one part per call.
    pub fn assistant_with_tool_calls(text: &str, calls: &[ParsedToolCall]) -> Self {
        let mut parts = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            parts.push(json!({ "type": "text", "text": text }));
        }
        parts.extend(calls.iter().map(|call| {
            json!({
                "type": "tool-call",
                "toolCallId": call.id,
                "toolName": call.tool,
                "args": call.arguments,
            })
        }));
        Self::new(MessageRole::Assistant, Value::Array(parts))
    }

    /// One tool message carrying every result of a step.
    pub fn tool_results(invocations: &[ToolInvocation]) -> Self {
        let parts = invocations
            .iter()
            .map(|invocation| {
                json!({
                    "type": "tool-result",
                    "toolCallId": invocation.call_id,
                    "toolName": invocation.tool,
                    "result": invocation.result,
                    "isError": invocation.is_error(),
                })
            })
            .collect();
        Self::new(MessageRole::Tool, Value::Array(parts))
    }
}

/// Create an assistant message with native tool calls for the model context.
pub fn create_assistant_message_with_tool_calls(content: &str, calls: &[ParsedToolCall]) -> ChatMessage {
    let tool_calls = calls
        .iter()
        .map(|call| OpenAIToolCall {
            id: call.id.clone(),
            call_type: "function".to_string(),
            function: OpenAIToolCallFunction {
                name: call.tool.clone(),
                arguments: match &call.arguments {
                    // Echo malformed arguments back exactly as the model sent them
                    Value::String(raw) => raw.clone(),
                    other => other.to_string(),
                },
            },
        })
        .collect();

    ChatMessage {
        tool_calls: Some(tool_calls),
        ..ChatMessage::assistant(content)
    }
}

/// Create a tool result message answering `invocation.call_id`.
pub fn create_tool_result_message(invocation: &ToolInvocation) -> ChatMessage {
    ChatMessage {
        tool_call_id: Some(invocation.call_id.clone()),
        ..ChatMessage::new("tool", invocation.result.to_string())
    }
}

/// Drop tool-call parts that never got a result, then messages left empty.
pub fn sanitize_response_messages(messages: Vec<ResponseMessage>) -> Vec<ResponseMessage> {
    let answered: Vec<String> = messages
        .iter()
        .filter(|message| message.role == MessageRole::Tool)
        .filter_map(|message| message.content.as_array())
        .flatten()
        .filter(|part| part["type"] == "tool-result")
        .filter_map(|part| part["toolCallId"].as_str().map(str::to_string))
        .collect();

    messages
        .into_iter()
        .map(|mut message| {
            if message.role == MessageRole::Assistant {
                if let Value::Array(parts) = &mut message.content {
                    parts.retain(|part| match part["type"].as_str() {
                        Some("tool-call") => part["toolCallId"]
                            .as_str()
                            .is_some_and(|id| answered.iter().any(|a| a == id)),
                        Some("text") => part["text"].as_str().is_some_and(|t| !t.is_empty()),
                        _ => true,
                    });
                }
            }
            message
        })
        .filter(|message| match &message.content {
            Value::String(text) => !text.is_empty(),
            Value::Array(parts) => !parts.is_empty(),
            Value::Null => false,
            _ => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_execution::InvocationStatus;

    fn call(id: &str) -> ParsedToolCall {
        ParsedToolCall {
            id: id.to_string(),
            tool: "query_database".to_string(),
            arguments: json!({"query": "Vercel valuation"}),
        }
    }

    fn invocation(id: &str) -> ToolInvocation {
        ToolInvocation {
            call_id: id.to_string(),
            tool: "query_database".to_string(),
            arguments: json!({}),
            status: InvocationStatus::Succeeded,
            result: json!({"results": [], "columns": [], "config": null}),
        }
    }

    #[test]
    fn assistant_message_echoes_arguments_as_json_text() {
        let mut malformed = call("call_2");
        malformed.arguments = Value::String("{oops".into());
        let msg = create_assistant_message_with_tool_calls("", &[call("call_1"), malformed]);

        let tool_calls = msg.tool_calls.unwrap();
        assert_eq!(tool_calls[0].function.arguments, r#"{"query":"Vercel valuation"}"#);
        assert_eq!(tool_calls[1].function.arguments, "{oops");
        assert_eq!(msg.role, "assistant");
    }

    #[test]
    fn tool_result_message_references_call() {
        let msg = create_tool_result_message(&invocation("call_1"));
        assert_eq!(msg.role, "tool");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(msg.content.contains("\"columns\""));
    }

    #[test]
    fn persisted_parts_use_camel_case_keys() {
        let assistant = ResponseMessage::assistant_with_tool_calls("Checking.", &[call("call_1")]);
        assert_eq!(assistant.content[0], json!({"type": "text", "text": "Checking."}));
        assert_eq!(assistant.content[1]["toolCallId"], "call_1");
        assert_eq!(assistant.content[1]["toolName"], "query_database");

        let tool = ResponseMessage::tool_results(&[invocation("call_1")]);
        assert_eq!(tool.role, MessageRole::Tool);
        assert_eq!(tool.content[0]["isError"], false);
    }

    #[test]
    fn sanitize_drops_unanswered_calls_and_empty_messages() {
        let messages = vec![
            ResponseMessage::assistant_with_tool_calls("", &[call("call_1"), call("call_2")]),
            ResponseMessage::tool_results(&[invocation("call_1")]),
            ResponseMessage::assistant_with_tool_calls("", &[call("call_9")]),
            ResponseMessage::assistant_text(""),
            ResponseMessage::assistant_text("Vercel is valued at $3.25B."),
        ];

        let sanitized = sanitize_response_messages(messages);
        assert_eq!(sanitized.len(), 3);
        let parts = sanitized[0].content.as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["toolCallId"], "call_1");
        assert_eq!(sanitized[2].content, json!("Vercel is valued at $3.25B."));
    }
}
