mod common;
mod google;
mod ollama;
mod openai;
mod reliable;

use crate::registry::TextProviderRef;
use crate::types::ProviderSettings;

pub use google::{DEFAULT_GOOGLE_BASE_URL, DEFAULT_GOOGLE_MODEL, GOOGLE_API_KEY_ENVS, GOOGLE_PROVIDER_ID};
pub use ollama::{DEFAULT_OLLAMA_BASE_URL, DEFAULT_OLLAMA_MODEL, OLLAMA_PROVIDER_ID};
pub use openai::{DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL, OPENAI_API_KEY_ENVS, OPENAI_PROVIDER_ID};
pub use reliable::{DEFAULT_TRANSPORT_RETRY_COUNT, RetryingProvider};

pub const BUILTIN_PROVIDER_IDS: &[&str] = &[GOOGLE_PROVIDER_ID, OPENAI_PROVIDER_ID, OLLAMA_PROVIDER_ID];

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.8;
pub const DEFAULT_TOP_K: u32 = 40;
pub const DEFAULT_NUM_CTX: u32 = 8192;

/// Built-in settings for a provider id, before any configuration overrides.
pub fn default_settings(provider_id: &str) -> Option<ProviderSettings> {
    let settings = match provider_id {
        GOOGLE_PROVIDER_ID => ProviderSettings {
            base_url: DEFAULT_GOOGLE_BASE_URL.to_string(),
            model: DEFAULT_GOOGLE_MODEL.to_string(),
            temperature: Some(DEFAULT_TEMPERATURE),
            top_p: Some(DEFAULT_TOP_P),
            top_k: Some(DEFAULT_TOP_K),
            ..ProviderSettings::default()
        },
        OPENAI_PROVIDER_ID => ProviderSettings {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            temperature: Some(DEFAULT_TEMPERATURE),
            top_p: Some(DEFAULT_TOP_P),
            ..ProviderSettings::default()
        },
        OLLAMA_PROVIDER_ID => ProviderSettings {
            base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            temperature: Some(DEFAULT_TEMPERATURE),
            top_p: Some(DEFAULT_TOP_P),
            num_ctx: Some(DEFAULT_NUM_CTX),
            ..ProviderSettings::default()
        },
        _ => return None,
    };
    Some(settings)
}

/// Builds the adapter for a built-in provider id.
pub fn builtin_provider(provider_id: &str, settings: ProviderSettings) -> Option<TextProviderRef> {
    match provider_id {
        GOOGLE_PROVIDER_ID => Some(google::provider(settings)),
        OPENAI_PROVIDER_ID => Some(openai::provider(settings)),
        OLLAMA_PROVIDER_ID => Some(ollama::provider(settings)),
        _ => None,
    }
}

pub fn google(settings: ProviderSettings) -> TextProviderRef {
    google::provider(settings)
}

pub fn openai(settings: ProviderSettings) -> TextProviderRef {
    openai::provider(settings)
}

pub fn ollama(settings: ProviderSettings) -> TextProviderRef {
    ollama::provider(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_id_has_defaults_and_an_adapter() {
        for id in BUILTIN_PROVIDER_IDS {
            let settings = default_settings(id).expect("defaults");
            assert!(!settings.model.is_empty());
            let provider = builtin_provider(id, settings).expect("adapter");
            assert_eq!(provider.descriptor().id, *id);
        }
        assert!(default_settings("anthropic").is_none());
    }
}
