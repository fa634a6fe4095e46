use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AiError, AiErrorCode};
use crate::types::{GenerationRequest, ProviderDescriptor, TextStream};

/// Uniform wrapper around one language-model backend's streaming call.
pub trait TextProvider: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Reports missing credentials or other setup problems before any request
    /// is sent.
    fn ensure_ready(&self) -> Result<(), AiError> {
        Ok(())
    }

    fn generate(&self, request: GenerationRequest) -> TextStream;
}

pub type TextProviderRef = Arc<dyn TextProvider>;

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, TextProviderRef>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: TextProviderRef) {
        self.providers
            .insert(provider.descriptor().id.clone(), provider);
    }

    pub fn get(&self, id: &str) -> Option<TextProviderRef> {
        self.providers.get(id).cloned()
    }

    /// Looks up a provider and checks it can serve a request. Never falls back
    /// to a different provider.
    pub fn resolve(&self, id: &str) -> Result<TextProviderRef, AiError> {
        let provider = self.get(id).ok_or_else(|| {
            AiError::new(
                AiErrorCode::ProviderNotConfigured,
                format!(
                    "Provider '{id}' is not configured. Available providers: {}",
                    self.ids().join(", ")
                ),
            )
        })?;
        provider.ensure_ready()?;
        Ok(provider)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids = self.providers.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        let mut descriptors = self
            .providers
            .values()
            .map(|provider| provider.descriptor().clone())
            .collect::<Vec<_>>();
        descriptors.sort_by(|left, right| left.id.cmp(&right.id));
        descriptors
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    struct FixedProvider {
        descriptor: ProviderDescriptor,
        ready: bool,
    }

    impl TextProvider for FixedProvider {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        fn ensure_ready(&self) -> Result<(), AiError> {
            if self.ready {
                Ok(())
            } else {
                Err(AiError::new(AiErrorCode::ProviderAuthMissing, "missing key"))
            }
        }

        fn generate(&self, _request: GenerationRequest) -> TextStream {
            Box::pin(stream::empty())
        }
    }

    fn provider(id: &str, ready: bool) -> TextProviderRef {
        Arc::new(FixedProvider {
            descriptor: ProviderDescriptor {
                id: id.to_string(),
                supports_streaming: true,
                requires_api_key: true,
            },
            ready,
        })
    }

    #[test]
    fn resolve_rejects_unknown_provider_and_lists_available_ids() {
        let mut registry = ProviderRegistry::new();
        registry.register(provider("openai", true));
        registry.register(provider("google", true));

        let error = registry
            .resolve("anthropic")
            .err()
            .expect("unknown provider should fail");
        assert_eq!(error.code, AiErrorCode::ProviderNotConfigured);
        assert!(error.message.contains("google, openai"));
    }

    #[test]
    fn resolve_surfaces_readiness_errors() {
        let mut registry = ProviderRegistry::new();
        registry.register(provider("google", false));

        let error = registry
            .resolve("google")
            .err()
            .expect("provider without credentials should fail");
        assert_eq!(error.code, AiErrorCode::ProviderAuthMissing);
    }

    #[test]
    fn register_replaces_existing_provider_with_same_id() {
        let mut registry = ProviderRegistry::new();
        registry.register(provider("google", false));
        registry.register(provider("google", true));

        assert_eq!(registry.ids(), vec!["google".to_string()]);
        assert!(registry.resolve("google").is_ok());
    }
}
