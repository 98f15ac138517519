//! Stream handling for chat completion responses.
//!
//! This module handles:
//! - Splitting SSE byte chunks into `data:` payloads
//! - Accumulating OpenAI-style streaming tool calls
//! - Extracting text deltas and usage from stream chunks

use std::collections::HashMap;

use serde_json::Value;

use crate::protocol::{ParsedToolCall, TokenUsage};

/// One `data:` line of a server-sent event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SsePayload {
    Json(Value),
    Done,
}

/// Incremental SSE line splitter.
///
/// Buffers raw bytes so a multi-byte character split across two network
/// chunks is decoded intact.
#[derive(Default)]
pub struct SseEventParser {
    buffer: Vec<u8>,
}

impl SseEventParser {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SsePayload> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let trimmed = line.trim();

            let Some(data) = trimmed.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            if data == "[DONE]" {
                payloads.push(SsePayload::Done);
                continue;
            }
            match serde_json::from_str::<Value>(data) {
                Ok(json) => payloads.push(SsePayload::Json(json)),
                Err(e) => tracing::debug!(error = %e, "skipping malformed SSE payload"),
            }
        }

        payloads
    }
}

/// Accumulator for OpenAI-style streaming tool calls.
///
/// In the OpenAI streaming format, tool calls arrive incrementally:
/// - First chunk contains `id`, `type`, and `function.name`
/// - Subsequent chunks contain `function.arguments` fragments
/// - Multiple tool calls are indexed by their `index` field
#[derive(Default)]
pub struct StreamingToolCalls {
    /// Map of index -> (id, name, accumulated_arguments)
    calls: HashMap<usize, (String, String, String)>,
}

impl StreamingToolCalls {
    /// Process a delta.tool_calls array from a streaming chunk
    pub fn process_streaming_tool_call_delta(&mut self, tool_calls: &[Value]) {
        for (position, tc) in tool_calls.iter().enumerate() {
            let index = tc["index"]
                .as_u64()
                .map(|i| i as usize)
                .unwrap_or(position);
            let entry = self
                .calls
                .entry(index)
                .or_insert_with(|| (String::new(), String::new(), String::new()));

            if let Some(id) = tc["id"].as_str() {
                entry.0 = id.to_string();
            }
            if let Some(name) = tc["function"]["name"].as_str() {
                entry.1 = name.to_string();
            }
            if let Some(args) = tc["function"]["arguments"].as_str() {
                entry.2.push_str(args);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Convert accumulated tool calls to `ParsedToolCall`s, in index order.
    ///
    /// Arguments that are not valid JSON are kept as a raw string so the
    /// tool reports them as invalid instead of running with empty input.
    pub fn into_parsed_calls(self) -> Vec<ParsedToolCall> {
        let mut indexed: Vec<_> = self.calls.into_iter().collect();
        indexed.sort_by_key(|(idx, _)| *idx);

        indexed
            .into_iter()
            .filter(|(_, (_, name, _))| !name.is_empty())
            .map(|(_, (id, name, arguments_str))| {
                let arguments = if arguments_str.trim().is_empty() {
                    Value::Object(serde_json::Map::new())
                } else {
                    serde_json::from_str(&arguments_str).unwrap_or_else(|e| {
                        tracing::warn!(tool = %name, error = %e, "tool call arguments are not valid JSON");
                        Value::String(arguments_str)
                    })
                };
                // Ids must stay unique across every pass of a turn
                let id = if id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    id
                };
                ParsedToolCall {
                    id,
                    tool: name,
                    arguments,
                }
            })
            .collect()
    }
}

/// Extract a streamed text delta from a Chat Completions chunk.
pub fn extract_text_from_stream_chunk(json: &Value) -> Option<String> {
    let content = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))?;

    if let Some(text) = content.as_str() {
        return (!text.is_empty()).then(|| text.to_string());
    }

    // Some providers stream content as an array of parts
    let parts = content.as_array()?;
    let mut buf = String::new();
    for part in parts {
        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            buf.push_str(text);
        } else if let Some(text) = part.as_str() {
            buf.push_str(text);
        }
    }
    (!buf.is_empty()).then_some(buf)
}

/// Read a `usage` object from either a stream chunk or a full response.
pub fn extract_usage(json: &Value) -> Option<TokenUsage> {
    let usage = json.get("usage").filter(|u| u.is_object())?;
    let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or(0);
    let prompt_tokens = field("prompt_tokens");
    let completion_tokens = field("completion_tokens");
    let total_tokens = usage
        .get("total_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(prompt_tokens + completion_tokens);
    Some(TokenUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sse_parser_handles_split_lines_and_done() {
        let mut parser = SseEventParser::default();
        let first = parser.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel");
        assert!(first.is_empty());

        let second = parser.push(b"lo\"}}]}\n\n: keep-alive\ndata: [DONE]\n");
        assert_eq!(second.len(), 2);
        assert_eq!(
            extract_text_from_stream_chunk(match &second[0] {
                SsePayload::Json(v) => v,
                SsePayload::Done => panic!("expected json"),
            })
            .as_deref(),
            Some("Hello")
        );
        assert_eq!(second[1], SsePayload::Done);
    }

    #[test]
    fn sse_parser_keeps_multibyte_characters_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut parser = SseEventParser::default();
        assert!(parser.push(&line[..split]).is_empty());
        let payloads = parser.push(&line[split..]);
        match &payloads[0] {
            SsePayload::Json(v) => {
                assert_eq!(extract_text_from_stream_chunk(v).as_deref(), Some("café"))
            }
            SsePayload::Done => panic!("expected json"),
        }
    }

    #[test]
    fn tool_call_fragments_accumulate_in_index_order() {
        let mut calls = StreamingToolCalls::default();
        calls.process_streaming_tool_call_delta(&[
            json!({"index": 1, "id": "call_b", "function": {"name": "get_information", "arguments": ""}}),
            json!({"index": 0, "id": "call_a", "function": {"name": "query_database", "arguments": "{\"que"}}),
        ]);
        calls.process_streaming_tool_call_delta(&[
            json!({"index": 0, "function": {"arguments": "ry\": \"Vercel\"}"}}),
            json!({"index": 1, "function": {"arguments": "{\"question\": \"refunds\"}"}}),
        ]);

        let parsed = calls.into_parsed_calls();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].id, "call_a");
        assert_eq!(parsed[0].tool, "query_database");
        assert_eq!(parsed[0].arguments, json!({"query": "Vercel"}));
        assert_eq!(parsed[1].tool, "get_information");
        assert_eq!(parsed[1].arguments, json!({"question": "refunds"}));
    }

    #[test]
    fn malformed_arguments_are_kept_raw() {
        let mut calls = StreamingToolCalls::default();
        calls.process_streaming_tool_call_delta(&[
            json!({"index": 0, "function": {"name": "query_database", "arguments": "{not json"}}),
        ]);
        let parsed = calls.into_parsed_calls();
        assert!(parsed[0].id.starts_with("call_"));
        assert_eq!(parsed[0].arguments, json!("{not json"));
    }

    #[test]
    fn missing_ids_differ_between_passes() {
        let pass = || {
            let mut calls = StreamingToolCalls::default();
            calls.process_streaming_tool_call_delta(&[
                json!({"index": 0, "function": {"name": "get_information", "arguments": "{}"}}),
            ]);
            calls.into_parsed_calls().remove(0).id
        };
        let first = pass();
        let second = pass();
        assert!(first.starts_with("call_"));
        assert_ne!(first, second);
    }

    #[test]
    fn usage_is_read_and_total_derived() {
        let chunk = json!({"choices": [], "usage": {"prompt_tokens": 12, "completion_tokens": 3}});
        assert_eq!(
            extract_usage(&chunk),
            Some(TokenUsage { prompt_tokens: 12, completion_tokens: 3, total_tokens: 15 })
        );
        assert_eq!(extract_usage(&json!({"usage": null})), None);
    }

    #[test]
    fn content_parts_are_concatenated() {
        let chunk = json!({"choices": [{"delta": {"content": [{"text": "a"}, {"text": "b"}]}}]});
        assert_eq!(extract_text_from_stream_chunk(&chunk).as_deref(), Some("ab"));
        let empty = json!({"choices": [{"delta": {"content": ""}}]});
        assert_eq!(extract_text_from_stream_chunk(&empty), None);
    }
}
