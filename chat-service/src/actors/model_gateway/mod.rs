//! Model gateway actor and its HTTP plumbing.
//!
//! - `ModelGatewayActor`: routes chat and completion requests to the
//!   configured OpenAI-compatible provider
//! - Request body construction per provider
//! - SSE parsing and streamed tool-call accumulation

mod model_gateway_actor;
mod request_builder;
mod stream_handler;

pub use model_gateway_actor::ModelGatewayActor;

pub use request_builder::{
    build_completion_request_body, build_stream_chat_request_body, resolve_provider_endpoint,
    ProviderEndpoint,
};
pub use stream_handler::{
    extract_text_from_stream_chunk, extract_usage, SseEventParser, SsePayload, StreamingToolCalls,
};
