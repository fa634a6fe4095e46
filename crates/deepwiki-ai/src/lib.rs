//! Provider-agnostic streaming text generation for repository questions.

mod error;
mod prompt;
pub mod providers;
mod registry;
mod types;

pub use error::{AiError, AiErrorCode};
pub use prompt::{language_display_name, repository_name, repository_system_prompt};
pub use providers::{RetryingProvider, builtin_provider, default_settings};
pub use registry::{ProviderRegistry, TextProvider, TextProviderRef};
pub use types::{
    ContextDocument, GenerationRequest, ProviderDescriptor, ProviderSettings, RetrievalContext,
    TextStream,
};
