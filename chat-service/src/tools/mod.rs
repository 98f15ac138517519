//! Built-in tool implementations.
//!
//! The tool set is closed: every tool the model can call is a
//! [`BuiltinTool`] variant with a stable name and a JSON parameter schema.
//! - `get_information`: knowledge-base retrieval
//! - `query_database`: guarded text-to-SQL with a chart description
//! - `get_weather`: Open-Meteo forecast lookup
//! - `create_document` / `update_document`: generated markdown documents

pub mod chart_config;
pub mod documents;
pub mod get_information;
pub mod get_weather;
pub mod query_database;
pub mod query_guard;

pub use chart_config::{assign_colors, color_for_position, ChartConfig, ChartType};
pub use documents::{CreateDocumentInput, DocumentExecutor, DocumentOutput, UpdateDocumentInput};
pub use get_information::{GetInformationExecutor, GetInformationInput, RelevantContent};
pub use get_weather::{GetWeatherExecutor, GetWeatherInput};
pub use query_database::{QueryDatabaseExecutor, QueryDatabaseInput, QueryDatabaseOutput};
pub use query_guard::{validate_read_only_query, QueryRejection, DENYLIST};

use serde_json::{json, Value};

use crate::protocol::{OpenAIFunction, OpenAITool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinTool {
    GetInformation,
    QueryDatabase,
    GetWeather,
    CreateDocument,
    UpdateDocument,
}

impl BuiltinTool {
    /// Every registered tool, in the order they are offered to the model.
    pub const ALL: [BuiltinTool; 5] = [
        BuiltinTool::CreateDocument,
        BuiltinTool::UpdateDocument,
        BuiltinTool::GetInformation,
        BuiltinTool::GetWeather,
        BuiltinTool::QueryDatabase,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinTool::GetInformation => "get_information",
            BuiltinTool::QueryDatabase => "query_database",
            BuiltinTool::GetWeather => "get_weather",
            BuiltinTool::CreateDocument => "create_document",
            BuiltinTool::UpdateDocument => "update_document",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            BuiltinTool::GetInformation => {
                "Get information from your knowledge base to answer questions."
            }
            BuiltinTool::QueryDatabase => {
                "Query the database to find relevant information for the user query."
            }
            BuiltinTool::GetWeather => "Get the current weather at a location.",
            BuiltinTool::CreateDocument => {
                "Create a document for writing activities. The content is generated from the title."
            }
            BuiltinTool::UpdateDocument => {
                "Update a document with the given description of changes."
            }
        }
    }

    /// JSON schema of the tool's arguments.
    pub fn parameters(&self) -> Value {
        match self {
            BuiltinTool::GetInformation => json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string", "description": "the users question" }
                },
                "required": ["question"]
            }),
            BuiltinTool::QueryDatabase => json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The user query for which a corresponding SQL query needs to be created"
                    }
                },
                "required": ["query"]
            }),
            BuiltinTool::GetWeather => json!({
                "type": "object",
                "properties": {
                    "latitude": { "type": "number" },
                    "longitude": { "type": "number" }
                },
                "required": ["latitude", "longitude"]
            }),
            BuiltinTool::CreateDocument => json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" }
                },
                "required": ["title"]
            }),
            BuiltinTool::UpdateDocument => json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string", "description": "The ID of the document to update" },
                    "description": { "type": "string", "description": "The description of changes that need to be made" }
                },
                "required": ["id", "description"]
            }),
        }
    }

    pub fn to_openai_tool(&self) -> OpenAITool {
        OpenAITool {
            tool_type: "function".to_string(),
            function: OpenAIFunction {
                name: self.name().to_string(),
                description: Some(self.description().to_string()),
                parameters: Some(self.parameters()),
            },
        }
    }
}
