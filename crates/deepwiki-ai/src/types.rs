use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::AiError;

/// Lazy, finite, non-restartable sequence of answer fragments.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, AiError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    #[serde(rename = "supportsStreaming")]
    pub supports_streaming: bool,
    #[serde(rename = "requiresApiKey")]
    pub requires_api_key: bool,
}

/// Connection and sampling settings for one provider backend.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub num_ctx: Option<u32>,
}

impl ProviderSettings {
    pub(crate) fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub(crate) fn resolve_model<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(self.model.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDocument {
    pub text: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

/// Ranked passages handed to a model alongside a question.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RetrievalContext {
    #[serde(default)]
    pub documents: Vec<ContextDocument>,
}

impl RetrievalContext {
    pub fn new(documents: Vec<ContextDocument>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn render(&self) -> String {
        self.documents
            .iter()
            .map(|document| {
                let file_path = document.file_path.as_deref().unwrap_or("unknown");
                format!("**File: {file_path}**\n\n{}", document.text)
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub question: String,
    pub context: RetrievalContext,
    pub model: Option<String>,
}

impl GenerationRequest {
    /// Context and question block sent as the user turn.
    pub fn user_prompt(&self) -> String {
        let mut prompt = String::new();
        if !self.context.is_empty() {
            prompt.push_str(&format!("<context>\n{}\n</context>\n\n", self.context.render()));
        }
        prompt.push_str(&format!(
            "<question>\n{}\n</question>\n\nAnswer:",
            self.question
        ));
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(path: Option<&str>, text: &str) -> ContextDocument {
        ContextDocument {
            text: text.to_string(),
            score: 0.5,
            file_path: path.map(str::to_string),
        }
    }

    #[test]
    fn user_prompt_omits_context_block_when_no_documents() {
        let request = GenerationRequest {
            system_prompt: "sys".to_string(),
            question: "What is this?".to_string(),
            context: RetrievalContext::default(),
            model: None,
        };
        assert_eq!(
            request.user_prompt(),
            "<question>\nWhat is this?\n</question>\n\nAnswer:"
        );
    }

    #[test]
    fn render_joins_documents_with_file_headers() {
        let context = RetrievalContext::new(vec![
            document(Some("src/lib.rs"), "pub mod a;"),
            document(None, "loose text"),
        ]);
        assert_eq!(
            context.render(),
            "**File: src/lib.rs**\n\npub mod a;\n\n---\n\n**File: unknown**\n\nloose text"
        );
    }

    #[test]
    fn resolve_model_prefers_non_blank_request_model() {
        let settings = ProviderSettings {
            model: "default-model".to_string(),
            ..ProviderSettings::default()
        };
        assert_eq!(settings.resolve_model(Some("custom")), "custom");
        assert_eq!(settings.resolve_model(Some("  ")), "default-model");
        assert_eq!(settings.resolve_model(None), "default-model");
    }
}
