use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::{FutureExt, Stream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ToolError;
use crate::events::ToolEvent;
use crate::request::{ToolCall, ToolRequest};
use crate::tools::{self, EventSink, ToolContext};

pub const DEFAULT_EVENT_BUFFER: usize = 32;

/// Dispatches tool invocations and turns each into an independent event
/// stream.
#[derive(Clone)]
pub struct Gateway {
    context: Arc<ToolContext>,
    event_buffer: usize,
}

impl Gateway {
    pub fn new(context: ToolContext) -> Self {
        Self {
            context: Arc::new(context),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    pub fn event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer.max(1);
        self
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Decodes a raw request body and invokes it. A malformed body yields a
    /// single `Error` event.
    pub fn invoke_json(&self, body: &[u8]) -> ToolEventStream {
        match ToolRequest::from_json_slice(body) {
            Ok(request) => self.invoke(request),
            Err(error) => {
                tracing::warn!(error = %error, "rejected malformed tool request");
                ToolEventStream::rejected(error)
            }
        }
    }

    /// Validates the request and starts producing its events on a spawned
    /// task. Must be called from within a tokio runtime.
    pub fn invoke(&self, request: ToolRequest) -> ToolEventStream {
        let call = match ToolCall::parse(&request) {
            Ok(call) => call,
            Err(error) => {
                tracing::warn!(tool = %request.tool, error = %error, "rejected tool request");
                return ToolEventStream::rejected(error);
            }
        };

        let (sender, receiver) = mpsc::channel(self.event_buffer);
        let context = self.context.clone();
        let task = tokio::spawn(produce(call, context, sender));
        ToolEventStream {
            receiver,
            task: Some(task),
        }
    }
}

async fn produce(call: ToolCall, context: Arc<ToolContext>, sender: mpsc::Sender<ToolEvent>) {
    let tool = call.tool();
    let started = Instant::now();
    if sender.send(ToolEvent::Start { tool }).await.is_err() {
        return;
    }

    let sink = EventSink::new(sender.clone());
    let result = match AssertUnwindSafe(tools::run(call, &context, &sink))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(ToolError::Internal(panic_message(panic.as_ref()))),
    };
    let body_events = sink.sent();
    drop(sink);

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let terminal = match result {
        Ok(()) => {
            tracing::info!(%tool, events = body_events, elapsed_ms, "tool invocation completed");
            ToolEvent::Done
        }
        Err(ToolError::Disconnected) => {
            tracing::info!(%tool, events = body_events, elapsed_ms, "client disconnected during tool invocation");
            return;
        }
        Err(ToolError::Provider(error)) => {
            tracing::warn!(
                %tool,
                provider_error = %error.as_compact_json(),
                events = body_events,
                elapsed_ms,
                "provider failed during tool invocation"
            );
            ToolEvent::Error {
                message: error.message,
            }
        }
        Err(error) => {
            tracing::warn!(
                %tool,
                kind = error.kind(),
                error = %error,
                events = body_events,
                elapsed_ms,
                "tool invocation failed"
            );
            ToolEvent::Error {
                message: error.to_string(),
            }
        }
    };
    let _ = sender.send(terminal).await;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool handler panicked".to_string()
    }
}

/// Events of one invocation in emission order. Dropping the stream cancels
/// the producing task.
pub struct ToolEventStream {
    receiver: mpsc::Receiver<ToolEvent>,
    task: Option<JoinHandle<()>>,
}

impl ToolEventStream {
    fn rejected(error: ToolError) -> Self {
        let (sender, receiver) = mpsc::channel(1);
        let _ = sender.try_send(ToolEvent::Error {
            message: error.to_string(),
        });
        Self {
            receiver,
            task: None,
        }
    }
}

impl Stream for ToolEventStream {
    type Item = ToolEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for ToolEventStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
