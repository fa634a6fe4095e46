use std::sync::Arc;

use serde_json::{Map, Value, json};

use super::common::{ChunkOutcome, Framing, fragment_stream, join_url, missing_api_key, shared_http_client};
use crate::error::{AiError, AiErrorCode};
use crate::registry::{TextProvider, TextProviderRef};
use crate::types::{GenerationRequest, ProviderDescriptor, ProviderSettings, TextStream};

pub const GOOGLE_PROVIDER_ID: &str = "google";
pub const DEFAULT_GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GOOGLE_MODEL: &str = "gemini-2.5-flash";
pub const GOOGLE_API_KEY_ENVS: &[&str] = &["GOOGLE_API_KEY", "GEMINI_API_KEY"];

const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

struct GoogleProvider {
    descriptor: ProviderDescriptor,
    settings: ProviderSettings,
}

impl TextProvider for GoogleProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn ensure_ready(&self) -> Result<(), AiError> {
        match self.settings.api_key() {
            Some(_) => Ok(()),
            None => Err(missing_api_key(GOOGLE_PROVIDER_ID, GOOGLE_API_KEY_ENVS)),
        }
    }

    fn generate(&self, request: GenerationRequest) -> TextStream {
        let api_key = match self.settings.api_key() {
            Some(api_key) => api_key.to_string(),
            None => {
                let error = missing_api_key(GOOGLE_PROVIDER_ID, GOOGLE_API_KEY_ENVS);
                return Box::pin(futures::stream::once(async move { Err(error) }));
            }
        };

        let model = self.settings.resolve_model(request.model.as_deref());
        let endpoint = build_google_endpoint(&self.settings.base_url, model);
        let payload = build_google_payload(&self.settings, &request);
        tracing::debug!(model, endpoint = %endpoint, "google generation request");

        let http_request = shared_http_client(&endpoint)
            .post(endpoint)
            .header("x-goog-api-key", api_key)
            .json(&payload);

        fragment_stream(
            "Google Generative AI",
            http_request,
            Framing::ServerSentEvents,
            parse_google_chunk,
        )
    }
}

pub(super) fn provider(settings: ProviderSettings) -> TextProviderRef {
    Arc::new(GoogleProvider {
        descriptor: ProviderDescriptor {
            id: GOOGLE_PROVIDER_ID.to_string(),
            supports_streaming: true,
            requires_api_key: true,
        },
        settings,
    })
}

fn build_google_endpoint(base_url: &str, model: &str) -> String {
    let base = if base_url.trim().is_empty() {
        DEFAULT_GOOGLE_BASE_URL
    } else {
        base_url
    };
    let trimmed = model.trim().trim_start_matches('/');
    let path = if trimmed.starts_with("models/") || trimmed.contains("/models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    };
    join_url(base, &format!("{path}:streamGenerateContent?alt=sse"))
}

fn build_google_payload(settings: &ProviderSettings, request: &GenerationRequest) -> Value {
    let mut payload = json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": request.user_prompt() }],
        }],
    });

    if !request.system_prompt.trim().is_empty() {
        payload["systemInstruction"] = json!({
            "parts": [{ "text": request.system_prompt }],
        });
    }

    let mut generation_config = Map::new();
    if let Some(temperature) = settings.temperature {
        generation_config.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = settings.top_p {
        generation_config.insert("topP".to_string(), json!(top_p));
    }
    if let Some(top_k) = settings.top_k {
        generation_config.insert("topK".to_string(), json!(top_k));
    }
    if !generation_config.is_empty() {
        payload["generationConfig"] = Value::Object(generation_config);
    }

    payload
}

fn parse_google_chunk(data: &str) -> Result<ChunkOutcome, AiError> {
    let value: Value = serde_json::from_str(data).map_err(|error| {
        AiError::new(
            AiErrorCode::ProviderProtocol,
            format!("Invalid Google stream chunk: {error}"),
        )
    })?;

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(AiError::new(
            AiErrorCode::ProviderHttp,
            format!("Google Generative AI error: {message}"),
        )
        .with_details(error.clone()));
    }

    if let Some(reason) = value
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
    {
        return Err(AiError::new(
            AiErrorCode::ProviderBlocked,
            format!("Google Generative AI blocked the prompt: {reason}"),
        ));
    }

    let Some(candidate) = value
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
    else {
        return Ok(ChunkOutcome::Skip);
    };

    let text = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();

    if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str)
        && BLOCKING_FINISH_REASONS.contains(&reason)
    {
        return Ok(ChunkOutcome::Finish {
            fragment: text,
            error: Some(AiError::new(
                AiErrorCode::ProviderBlocked,
                format!("Google Generative AI stopped generation: {reason}"),
            )),
        });
    }

    if text.is_empty() {
        Ok(ChunkOutcome::Skip)
    } else {
        Ok(ChunkOutcome::Fragment(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RetrievalContext;

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_prompt: "You explain repositories.".to_string(),
            question: "What does it do?".to_string(),
            context: RetrievalContext::default(),
            model: None,
        }
    }

    #[test]
    fn endpoint_targets_streaming_method_with_sse_alt() {
        assert_eq!(
            build_google_endpoint("", "gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
        assert_eq!(
            build_google_endpoint("http://127.0.0.1:9000/v1beta/", "models/custom"),
            "http://127.0.0.1:9000/v1beta/models/custom:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn payload_carries_system_instruction_and_sampling_config() {
        let settings = ProviderSettings {
            temperature: Some(0.7),
            top_p: Some(0.8),
            top_k: Some(40),
            ..ProviderSettings::default()
        };
        let payload = build_google_payload(&settings, &request());

        assert_eq!(
            payload["systemInstruction"]["parts"][0]["text"],
            "You explain repositories."
        );
        assert_eq!(payload["contents"][0]["role"], "user");
        assert!(
            payload["contents"][0]["parts"][0]["text"]
                .as_str()
                .expect("user text")
                .contains("<question>\nWhat does it do?\n</question>")
        );
        assert_eq!(payload["generationConfig"]["temperature"], 0.7);
        assert_eq!(payload["generationConfig"]["topP"], 0.8);
        assert_eq!(payload["generationConfig"]["topK"], 40);
    }

    #[test]
    fn chunk_concatenates_visible_parts_and_skips_thoughts() {
        let chunk = r#"{"candidates":[{"content":{"parts":[{"text":"plan","thought":true},{"text":"Hel"},{"text":"lo"}]}}]}"#;
        match parse_google_chunk(chunk).expect("chunk should parse") {
            ChunkOutcome::Fragment(text) => assert_eq!(text, "Hello"),
            _ => panic!("expected fragment"),
        }
    }

    #[test]
    fn chunk_without_text_is_skipped() {
        let chunk = r#"{"candidates":[{"finishReason":"STOP"}],"usageMetadata":{"totalTokenCount":3}}"#;
        assert!(matches!(
            parse_google_chunk(chunk).expect("chunk should parse"),
            ChunkOutcome::Skip
        ));
    }

    #[test]
    fn safety_finish_keeps_trailing_text_then_fails() {
        let chunk = r#"{"candidates":[{"content":{"parts":[{"text":"partial"}]},"finishReason":"SAFETY"}]}"#;
        match parse_google_chunk(chunk).expect("chunk should parse") {
            ChunkOutcome::Finish { fragment, error } => {
                assert_eq!(fragment, "partial");
                assert_eq!(
                    error.expect("blocked error").code,
                    AiErrorCode::ProviderBlocked
                );
            }
            _ => panic!("expected finish"),
        }
    }

    #[test]
    fn prompt_feedback_block_is_an_error() {
        let chunk = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let error = parse_google_chunk(chunk).err().expect("blocked prompt");
        assert_eq!(error.code, AiErrorCode::ProviderBlocked);
    }

    #[test]
    fn missing_key_is_reported_before_any_request() {
        let provider = provider(ProviderSettings::default());
        let error = provider.ensure_ready().expect_err("no key configured");
        assert_eq!(error.code, AiErrorCode::ProviderAuthMissing);
        assert!(error.message.contains("GOOGLE_API_KEY"));
    }
}
