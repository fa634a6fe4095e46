//! Streaming tool gateway over cached DeepWiki documentation and
//! retrieval-augmented question answering.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod encoder;
pub mod error;
pub mod events;
pub mod gateway;
mod logging;
pub mod request;
pub mod retriever;
mod runtime;
mod server;
pub mod tools;

pub use cache::{
    CacheKey, FileWikiCache, PageRef, Section, WikiCache, WikiContents, WikiPage, WikiStructure,
};
pub use catalog::{ServerInfo, ToolInfo, server_info};
pub use config::{
    GatewayConfig, LogConfig, RetrieverConfig, current_conf_dir, default_config_path, init_conf_dir,
    load_gateway_config, parse_gateway_config,
};
pub use encoder::encode;
pub use error::{CacheError, RetrievalError, ToolError};
pub use events::{ToolEvent, ToolName};
pub use gateway::{Gateway, ToolEventStream};
pub use logging::init_tracing;
pub use request::{QuestionQuery, ToolCall, ToolRequest};
pub use retriever::{HttpRetriever, NoopRetriever, RepoTarget, Retriever};
pub use runtime::{build_gateway, build_registry, serve_gateway};
pub use server::build_router;
pub use tools::{EventSink, ToolContext};
