//! Registry of the chat models a turn may select.
//!
//! The model selector submitted with a turn must match an entry's `id`;
//! anything else is rejected before the turn starts.

use serde::Serialize;

use crate::protocol::{ModelProvider, ModelTarget};

pub const DEFAULT_MODEL_NAME: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub label: String,
    pub api_identifier: String,
    pub description: String,
    pub provider: ModelProvider,
}

impl Model {
    fn new(
        id: &str,
        label: &str,
        api_identifier: &str,
        description: &str,
        provider: ModelProvider,
    ) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            api_identifier: api_identifier.to_string(),
            description: description.to_string(),
            provider,
        }
    }

    pub fn target(&self) -> ModelTarget {
        ModelTarget {
            provider: self.provider,
            api_identifier: self.api_identifier.clone(),
        }
    }
}

lazy_static::lazy_static! {
    static ref MODELS: Vec<Model> = vec![
        Model::new(
            "gpt-4o-mini",
            "GPT 4o mini",
            "gpt-4o-mini",
            "Small model for fast, lightweight tasks",
            ModelProvider::OpenAi,
        ),
        Model::new(
            "gpt-4o",
            "GPT 4o",
            "gpt-4o",
            "For complex, multi-step tasks",
            ModelProvider::OpenAi,
        ),
        Model::new(
            "mistral-large",
            "Mistral Large",
            "mistral-large-latest",
            "GPT 4o alternative",
            ModelProvider::Mistral,
        ),
    ];
}

/// Look up a registered model by selector.
pub fn find_model(id: &str) -> Option<&'static Model> {
    MODELS.iter().find(|model| model.id == id)
}

pub fn all_models() -> &'static [Model] {
    &MODELS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_is_registered() {
        let model = find_model(DEFAULT_MODEL_NAME).expect("default model");
        assert_eq!(model.provider, ModelProvider::OpenAi);
    }

    #[test]
    fn selector_maps_to_api_identifier() {
        let target = find_model("mistral-large").unwrap().target();
        assert_eq!(target.api_identifier, "mistral-large-latest");
        assert_eq!(target.provider, ModelProvider::Mistral);
    }

    #[test]
    fn unknown_selector_is_none() {
        assert!(find_model("gpt-5-ultra").is_none());
        assert!(find_model("").is_none());
    }
}
