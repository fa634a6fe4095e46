use std::path::PathBuf;

use deepwiki_ai::AiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("read wiki cache {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse wiki cache {path} failed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("retriever request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("retriever returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("retriever response could not be decoded: {0}")]
    Decode(String),
}

/// Every way a tool invocation can end other than `Done`.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error("{}", .0.message)]
    Provider(#[from] AiError),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("client disconnected")]
    Disconnected,
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Validation(_) => "validation",
            ToolError::NotFound(_) => "not_found",
            ToolError::Cache(_) => "cache",
            ToolError::Retrieval(_) => "retrieval",
            ToolError::Provider(_) => "provider",
            ToolError::Internal(_) => "internal",
            ToolError::Disconnected => "disconnected",
        }
    }
}
