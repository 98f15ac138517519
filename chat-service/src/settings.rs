use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::paths;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub providers: ProviderSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub vector_store: VectorStoreSettings,
    #[serde(default)]
    pub data_store: DataStoreSettings,
    #[serde(default)]
    pub chat_store: ChatStoreSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub weather: WeatherSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Endpoints and credentials for the OpenAI-compatible model providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_mistral_base_url")]
    pub mistral_base_url: String,
    #[serde(default)]
    pub mistral_api_key: Option<String>,
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_mistral_base_url() -> String {
    "https://api.mistral.ai/v1".to_string()
}

fn default_ollama_base_url() -> String {
    "http://127.0.0.1:11434/v1".to_string()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            openai_base_url: default_openai_base_url(),
            openai_api_key: None,
            mistral_base_url: default_mistral_base_url(),
            mistral_api_key: None,
            ollama_base_url: default_ollama_base_url(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// In-process fastembed model
    Local,
    #[serde(rename = "openai")]
    OpenAi,
    Mistral,
}

impl EmbeddingProviderKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "local" | "fastembed" => Some(Self::Local),
            "openai" => Some(Self::OpenAi),
            "mistral" => Some(Self::Mistral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProviderKind,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_embedding_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::OpenAi
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_cache_capacity() -> usize {
    256
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreSettings {
    #[serde(default = "default_vector_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Hits farther than this are dropped before they reach the tool result
    #[serde(default)]
    pub max_distance: Option<f32>,
}

fn default_vector_store_path() -> PathBuf {
    paths::default_vector_store_path()
}

fn default_collection() -> String {
    "documents".to_string()
}

fn default_top_k() -> usize {
    5
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            path: default_vector_store_path(),
            collection: default_collection(),
            top_k: default_top_k(),
            max_distance: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataStoreSettings {
    #[serde(default = "default_data_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

fn default_data_db_path() -> PathBuf {
    paths::default_data_db_path()
}

fn default_max_rows() -> usize {
    500
}

impl Default for DataStoreSettings {
    fn default() -> Self {
        Self {
            path: default_data_db_path(),
            max_rows: default_max_rows(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStoreSettings {
    #[serde(default = "default_chat_db_path")]
    pub path: PathBuf,
}

fn default_chat_db_path() -> PathBuf {
    paths::default_chat_db_path()
}

impl Default for ChatStoreSettings {
    fn default() -> Self {
        Self {
            path: default_chat_db_path(),
        }
    }
}

/// Bearer tokens accepted by the HTTP surface, mapped to user ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_smooth_streaming")]
    pub smooth_streaming: bool,
    /// Replaces the built-in system prompt when set
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_smooth_streaming() -> bool {
    true
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            smooth_streaming: default_smooth_streaming(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSettings {
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
}

fn default_weather_base_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            base_url: default_weather_base_url(),
        }
    }
}

/// Load settings from `path`, or the platform config location.
///
/// A missing file yields defaults; a malformed file is an error so a typo
/// never silently drops credentials or auth tokens.
pub async fn load_settings(path: Option<&Path>) -> Result<AppSettings, String> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(paths::default_settings_path);

    match fs::read_to_string(&config_path).await {
        Ok(contents) => {
            let settings = serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse settings {:?}: {}", config_path, e))?;
            tracing::info!(path = ?config_path, "settings loaded");
            Ok(settings)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = ?config_path, "no settings file found, using defaults");
            Ok(AppSettings::default())
        }
        Err(e) => Err(format!("Failed to read settings {:?}: {}", config_path, e)),
    }
}
