use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use deepwiki_ai::ProviderRegistry;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::cache::WikiCache;
use crate::error::ToolError;
use crate::events::ToolEvent;
use crate::request::ToolCall;
use crate::retriever::Retriever;

mod ask_question;
mod read_wiki_contents;
mod read_wiki_structure;

/// Shared, read-only capabilities every handler may use.
#[derive(Clone)]
pub struct ToolContext {
    pub cache: Arc<dyn WikiCache>,
    pub retriever: Arc<dyn Retriever>,
    pub providers: ProviderRegistry,
}

/// Handler side of an invocation's event queue. Only non-terminal events can
/// be sent through it.
pub struct EventSink {
    sender: mpsc::Sender<ToolEvent>,
    sent: AtomicUsize,
}

impl EventSink {
    pub(crate) fn new(sender: mpsc::Sender<ToolEvent>) -> Self {
        Self {
            sender,
            sent: AtomicUsize::new(0),
        }
    }

    pub async fn progress(&self, stage: &str, detail: Map<String, Value>) -> Result<(), ToolError> {
        self.send(ToolEvent::Progress {
            stage: stage.to_string(),
            detail,
        })
        .await
    }

    pub async fn data(&self, payload: Map<String, Value>) -> Result<(), ToolError> {
        self.send(ToolEvent::Data { payload }).await
    }

    /// Serializes a record into a `Data` payload; the record must be a JSON
    /// object.
    pub async fn data_record<T: Serialize>(&self, record: &T) -> Result<(), ToolError> {
        match serde_json::to_value(record) {
            Ok(Value::Object(payload)) => self.data(payload).await,
            Ok(other) => Err(ToolError::Internal(format!(
                "data payload must be an object, got {other}"
            ))),
            Err(error) => Err(ToolError::Internal(format!(
                "serialize data payload failed: {error}"
            ))),
        }
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }

    async fn send(&self, event: ToolEvent) -> Result<(), ToolError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| ToolError::Disconnected)?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

pub(crate) async fn run(
    call: ToolCall,
    context: &ToolContext,
    sink: &EventSink,
) -> Result<(), ToolError> {
    match call {
        ToolCall::ReadWikiStructure(key) => {
            read_wiki_structure::run(context.cache.as_ref(), &key, sink).await
        }
        ToolCall::ReadWikiContents { key, page_id } => {
            read_wiki_contents::run(context.cache.as_ref(), &key, page_id.as_deref(), sink).await
        }
        ToolCall::AskQuestion(query) => {
            ask_question::run(context.retriever.as_ref(), &context.providers, query, sink).await
        }
    }
}
