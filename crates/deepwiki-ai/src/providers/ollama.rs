use std::sync::Arc;

use serde_json::{Map, Value, json};

use super::common::{ChunkOutcome, Framing, fragment_stream, join_url, shared_http_client};
use crate::error::{AiError, AiErrorCode};
use crate::registry::{TextProvider, TextProviderRef};
use crate::types::{GenerationRequest, ProviderDescriptor, ProviderSettings, TextStream};

pub const OLLAMA_PROVIDER_ID: &str = "ollama";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen3:1.7b";

struct OllamaProvider {
    descriptor: ProviderDescriptor,
    settings: ProviderSettings,
}

impl TextProvider for OllamaProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn generate(&self, request: GenerationRequest) -> TextStream {
        let base_url = if self.settings.base_url.trim().is_empty() {
            DEFAULT_OLLAMA_BASE_URL
        } else {
            self.settings.base_url.as_str()
        };
        let endpoint = join_url(base_url, "api/generate");
        let model = self.settings.resolve_model(request.model.as_deref());
        let payload = build_ollama_payload(&self.settings, model, &request);
        tracing::debug!(model, endpoint = %endpoint, "ollama generation request");

        let http_request = shared_http_client(&endpoint).post(endpoint).json(&payload);

        fragment_stream("Ollama", http_request, Framing::JsonLines, parse_ollama_line)
    }
}

pub(super) fn provider(settings: ProviderSettings) -> TextProviderRef {
    Arc::new(OllamaProvider {
        descriptor: ProviderDescriptor {
            id: OLLAMA_PROVIDER_ID.to_string(),
            supports_streaming: true,
            requires_api_key: false,
        },
        settings,
    })
}

fn build_ollama_payload(
    settings: &ProviderSettings,
    model: &str,
    request: &GenerationRequest,
) -> Value {
    let mut payload = json!({
        "model": model,
        "prompt": request.user_prompt(),
        "stream": true,
    });
    if !request.system_prompt.trim().is_empty() {
        payload["system"] = json!(request.system_prompt);
    }

    let mut options = Map::new();
    if let Some(temperature) = settings.temperature {
        options.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = settings.top_p {
        options.insert("top_p".to_string(), json!(top_p));
    }
    if let Some(num_ctx) = settings.num_ctx {
        options.insert("num_ctx".to_string(), json!(num_ctx));
    }
    if !options.is_empty() {
        payload["options"] = Value::Object(options);
    }
    payload
}

fn parse_ollama_line(line: &str) -> Result<ChunkOutcome, AiError> {
    let value: Value = serde_json::from_str(line).map_err(|error| {
        AiError::new(
            AiErrorCode::ProviderProtocol,
            format!("Invalid Ollama stream line: {error}"),
        )
    })?;

    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Err(AiError::new(
            AiErrorCode::ProviderHttp,
            format!("Ollama error: {message}"),
        ));
    }

    let text = value
        .get("response")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if value.get("done").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(ChunkOutcome::Finish {
            fragment: text,
            error: None,
        });
    }

    if text.is_empty() {
        Ok(ChunkOutcome::Skip)
    } else {
        Ok(ChunkOutcome::Fragment(text))
    }
}
