//! Command-line argument parsing and launch configuration.
//!
//! Every flag has an environment fallback; a flag that is set overrides the
//! matching value loaded from the settings file.

use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

use crate::settings::{AppSettings, EmbeddingProviderKind};

/// CLI arguments for insight-chat
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "insight-chat", about = "Tool-orchestrating chat service")]
pub struct CliArgs {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, value_name = "PATH", env = "INSIGHT_CONFIG")]
    pub config: Option<PathBuf>,
    #[arg(long, value_name = "HOST", env = "INSIGHT_HOST")]
    pub host: Option<String>,
    #[arg(long, value_name = "PORT", env = "INSIGHT_PORT")]
    pub port: Option<u16>,
    /// SQLite database holding the queryable dataset (opened read-only)
    #[arg(long, value_name = "PATH", env = "INSIGHT_DATA_DB")]
    pub data_db: Option<PathBuf>,
    /// SQLite database holding chats and messages
    #[arg(long, value_name = "PATH", env = "INSIGHT_CHAT_DB")]
    pub chat_db: Option<PathBuf>,
    /// LanceDB directory holding the document embeddings
    #[arg(long, value_name = "PATH", env = "INSIGHT_VECTOR_DB")]
    pub vector_db: Option<PathBuf>,
    /// Table name of the document collection
    #[arg(long, value_name = "NAME", env = "VECTOR_COLLECTION")]
    pub collection: Option<String>,
    /// Embedding provider: local, openai or mistral
    #[arg(long, value_name = "PROVIDER", env = "TEXT_EMBEDDING_MODEL_PROVIDER")]
    pub embedding_provider: Option<String>,
    #[arg(long, value_name = "MODEL", env = "TEXT_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,
    #[arg(long, value_name = "KEY", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,
    #[arg(long, value_name = "KEY", env = "MISTRAL_API_KEY", hide_env_values = true)]
    pub mistral_api_key: Option<String>,
    #[arg(long, value_name = "URL", env = "OLLAMA_BASE_URL")]
    pub ollama_base_url: Option<String>,
    /// Accepted bearer tokens as token=user_id pairs
    #[arg(long = "auth-token", value_name = "TOKEN=USER", env = "INSIGHT_AUTH_TOKENS", value_delimiter = ',', hide_env_values = true)]
    pub auth_tokens: Vec<String>,
    /// Override the system prompt (string or @path/to/file)
    #[arg(long, value_name = "PROMPT_OR_@FILE", env = "INSIGHT_SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,
    /// Enable/disable word-chunked streaming
    #[arg(long, value_name = "BOOL", env = "INSIGHT_SMOOTH_STREAMING", value_parser = clap::builder::BoolishValueParser::new())]
    pub smooth_streaming: Option<bool>,
    /// Emit logs as JSON lines
    #[arg(
        long,
        value_name = "BOOL",
        env = "INSIGHT_LOG_JSON",
        default_value_t = false,
        value_parser = clap::builder::BoolishValueParser::new(),
        action = clap::ArgAction::Set
    )]
    pub log_json: bool,
}

/// Read a value that may be either a literal string or a @path reference to a file
pub fn read_value_or_file(raw: &str) -> Result<String, String> {
    if let Some(path) = raw.strip_prefix('@') {
        let contents = fs::read_to_string(Path::new(path))
            .map_err(|e| format!("Failed to read {}: {}", path, e))?;
        Ok(contents)
    } else {
        Ok(raw.to_string())
    }
}

/// Parse a `token=user_id` pair.
pub fn parse_auth_token(raw: &str) -> Result<(String, String), String> {
    let (token, user) = raw
        .split_once('=')
        .ok_or_else(|| format!("Auth token '{}' must be in TOKEN=USER form", raw))?;
    let (token, user) = (token.trim(), user.trim());
    if token.is_empty() || user.is_empty() {
        return Err(format!("Auth token '{}' has an empty token or user", raw));
    }
    Ok((token.to_string(), user.to_string()))
}

pub fn apply_cli_overrides(args: &CliArgs, settings: &mut AppSettings) -> Result<(), String> {
    if let Some(host) = &args.host {
        settings.server.host = host.clone();
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if let Some(path) = &args.data_db {
        settings.data_store.path = path.clone();
    }
    if let Some(path) = &args.chat_db {
        settings.chat_store.path = path.clone();
    }
    if let Some(path) = &args.vector_db {
        settings.vector_store.path = path.clone();
    }
    if let Some(collection) = &args.collection {
        settings.vector_store.collection = collection.clone();
    }
    if let Some(provider) = &args.embedding_provider {
        settings.embedding.provider = EmbeddingProviderKind::parse(provider)
            .ok_or_else(|| format!("Unknown embedding provider '{}'", provider))?;
    }
    if let Some(model) = &args.embedding_model {
        settings.embedding.model = model.clone();
    }
    if let Some(key) = &args.openai_api_key {
        settings.providers.openai_api_key = Some(key.clone());
    }
    if let Some(key) = &args.mistral_api_key {
        settings.providers.mistral_api_key = Some(key.clone());
    }
    if let Some(url) = &args.ollama_base_url {
        settings.providers.ollama_base_url = url.clone();
    }
    for raw in &args.auth_tokens {
        let (token, user) = parse_auth_token(raw)?;
        settings.auth.tokens.insert(token, user);
    }
    if let Some(prompt) = &args.system_prompt {
        settings.agent.system_prompt = Some(read_value_or_file(prompt)?);
    }
    if let Some(smooth) = args.smooth_streaming {
        settings.agent.smooth_streaming = smooth;
    }
    Ok(())
}
