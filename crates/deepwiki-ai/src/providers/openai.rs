use std::sync::Arc;

use serde_json::{Value, json};

use super::common::{ChunkOutcome, Framing, fragment_stream, join_url, missing_api_key, shared_http_client};
use crate::error::{AiError, AiErrorCode};
use crate::registry::{TextProvider, TextProviderRef};
use crate::types::{GenerationRequest, ProviderDescriptor, ProviderSettings, TextStream};

pub const OPENAI_PROVIDER_ID: &str = "openai";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const OPENAI_API_KEY_ENVS: &[&str] = &["OPENAI_API_KEY"];

struct OpenAiProvider {
    descriptor: ProviderDescriptor,
    settings: ProviderSettings,
}

impl TextProvider for OpenAiProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn ensure_ready(&self) -> Result<(), AiError> {
        match self.settings.api_key() {
            Some(_) => Ok(()),
            None => Err(missing_api_key(OPENAI_PROVIDER_ID, OPENAI_API_KEY_ENVS)),
        }
    }

    fn generate(&self, request: GenerationRequest) -> TextStream {
        let api_key = match self.settings.api_key() {
            Some(api_key) => api_key.to_string(),
            None => {
                let error = missing_api_key(OPENAI_PROVIDER_ID, OPENAI_API_KEY_ENVS);
                return Box::pin(futures::stream::once(async move { Err(error) }));
            }
        };

        let base_url = if self.settings.base_url.trim().is_empty() {
            DEFAULT_OPENAI_BASE_URL
        } else {
            self.settings.base_url.as_str()
        };
        let endpoint = join_url(base_url, "chat/completions");
        let model = self.settings.resolve_model(request.model.as_deref());
        let payload = build_openai_payload(&self.settings, model, &request);
        tracing::debug!(model, endpoint = %endpoint, "openai generation request");

        let http_request = shared_http_client(&endpoint)
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&payload);

        fragment_stream(
            "OpenAI",
            http_request,
            Framing::ServerSentEvents,
            parse_openai_chunk,
        )
    }
}

pub(super) fn provider(settings: ProviderSettings) -> TextProviderRef {
    Arc::new(OpenAiProvider {
        descriptor: ProviderDescriptor {
            id: OPENAI_PROVIDER_ID.to_string(),
            supports_streaming: true,
            requires_api_key: true,
        },
        settings,
    })
}

fn build_openai_payload(
    settings: &ProviderSettings,
    model: &str,
    request: &GenerationRequest,
) -> Value {
    let mut messages = Vec::new();
    if !request.system_prompt.trim().is_empty() {
        messages.push(json!({ "role": "system", "content": request.system_prompt }));
    }
    messages.push(json!({ "role": "user", "content": request.user_prompt() }));

    let mut payload = json!({
        "model": model,
        "messages": messages,
        "stream": true,
    });
    if let Some(temperature) = settings.temperature {
        payload["temperature"] = json!(temperature);
    }
    if let Some(top_p) = settings.top_p {
        payload["top_p"] = json!(top_p);
    }
    payload
}

fn parse_openai_chunk(data: &str) -> Result<ChunkOutcome, AiError> {
    if data.trim() == "[DONE]" {
        return Ok(ChunkOutcome::Finish {
            fragment: String::new(),
            error: None,
        });
    }

    let value: Value = serde_json::from_str(data).map_err(|error| {
        AiError::new(
            AiErrorCode::ProviderProtocol,
            format!("Invalid OpenAI stream chunk: {error}"),
        )
    })?;

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(AiError::new(
            AiErrorCode::ProviderHttp,
            format!("OpenAI error: {message}"),
        )
        .with_details(error.clone()));
    }

    let Some(choice) = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
    else {
        return Ok(ChunkOutcome::Skip);
    };

    let text = choice
        .get("delta")
        .and_then(|delta| delta.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if choice.get("finish_reason").and_then(Value::as_str) == Some("content_filter") {
        return Ok(ChunkOutcome::Finish {
            fragment: text,
            error: Some(AiError::new(
                AiErrorCode::ProviderBlocked,
                "OpenAI stopped generation: content_filter",
            )),
        });
    }

    if text.is_empty() {
        Ok(ChunkOutcome::Skip)
    } else {
        Ok(ChunkOutcome::Fragment(text))
    }
}
