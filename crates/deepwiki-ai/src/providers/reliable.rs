use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use tokio::time::{Duration, sleep};

use crate::error::AiError;
use crate::registry::{TextProvider, TextProviderRef};
use crate::types::{GenerationRequest, ProviderDescriptor, TextStream};

pub const DEFAULT_TRANSPORT_RETRY_COUNT: u32 = 2;

/// Re-issues a generation whose first pull fails with a transport error.
/// Once a fragment has been produced, failures pass through unchanged.
pub struct RetryingProvider {
    inner: TextProviderRef,
    max_retries: u32,
    base_backoff_ms: u64,
}

impl RetryingProvider {
    pub fn wrap(inner: TextProviderRef) -> Self {
        Self {
            inner,
            max_retries: DEFAULT_TRANSPORT_RETRY_COUNT,
            base_backoff_ms: 1_000,
        }
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_backoff_ms(mut self, base_backoff_ms: u64) -> Self {
        self.base_backoff_ms = base_backoff_ms;
        self
    }

    pub fn into_ref(self) -> TextProviderRef {
        Arc::new(self)
    }
}

struct RetryState {
    inner: TextProviderRef,
    request: GenerationRequest,
    current: TextStream,
    max_retries: u32,
    base_backoff_ms: u64,
    retries_used: u32,
    produced: bool,
    finished: bool,
}

impl TextProvider for RetryingProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        self.inner.descriptor()
    }

    fn ensure_ready(&self) -> Result<(), AiError> {
        self.inner.ensure_ready()
    }

    fn generate(&self, request: GenerationRequest) -> TextStream {
        let state = RetryState {
            inner: self.inner.clone(),
            current: self.inner.generate(request.clone()),
            request,
            max_retries: self.max_retries,
            base_backoff_ms: self.base_backoff_ms,
            retries_used: 0,
            produced: false,
            finished: false,
        };

        Box::pin(stream::unfold(state, |mut state| async move {
            if state.finished {
                return None;
            }
            loop {
                match state.current.next().await {
                    Some(Ok(fragment)) => {
                        state.produced = true;
                        return Some((Ok(fragment), state));
                    }
                    Some(Err(error))
                        if !state.produced
                            && error.is_transport()
                            && state.retries_used < state.max_retries =>
                    {
                        state.retries_used += 1;
                        tracing::warn!(
                            provider = %state.inner.descriptor().id,
                            attempt = state.retries_used,
                            max_retries = state.max_retries,
                            error = %error.message,
                            "retrying generation after transport failure"
                        );
                        sleep_backoff(state.base_backoff_ms, state.retries_used).await;
                        state.current = state.inner.generate(state.request.clone());
                    }
                    Some(Err(error)) => {
                        state.finished = true;
                        return Some((Err(error), state));
                    }
                    None => return None,
                }
            }
        }))
    }
}

async fn sleep_backoff(base_backoff_ms: u64, attempt: u32) {
    let delay = base_backoff_ms.saturating_mul(u64::from(attempt));
    if delay > 0 {
        sleep(Duration::from_millis(delay)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::AiErrorCode;
    use crate::types::RetrievalContext;

    type Script = Vec<Result<String, AiError>>;

    struct ScriptedProvider {
        descriptor: ProviderDescriptor,
        attempts: AtomicUsize,
        scripts: Mutex<VecDeque<Script>>,
    }

    impl ScriptedProvider {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                descriptor: ProviderDescriptor {
                    id: "scripted".to_string(),
                    supports_streaming: true,
                    requires_api_key: false,
                },
                attempts: AtomicUsize::new(0),
                scripts: Mutex::new(scripts.into()),
            })
        }
    }

    impl TextProvider for ScriptedProvider {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        fn generate(&self, _request: GenerationRequest) -> TextStream {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let script = self
                .scripts
                .lock()
                .expect("script lock")
                .pop_front()
                .unwrap_or_default();
            Box::pin(stream::iter(script))
        }
    }

    fn transport() -> AiError {
        AiError::new(AiErrorCode::ProviderTransport, "connection reset")
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_prompt: String::new(),
            question: "q".to_string(),
            context: RetrievalContext::default(),
            model: None,
        }
    }

    async fn collect(provider: &RetryingProvider) -> Vec<Result<String, AiError>> {
        provider.generate(request()).collect().await
    }

    #[tokio::test]
    async fn retries_transport_failure_before_first_fragment() {
        let inner = ScriptedProvider::new(vec![
            vec![Err(transport())],
            vec![Ok("a".to_string()), Ok("b".to_string())],
        ]);
        let provider = RetryingProvider::wrap(inner.clone()).base_backoff_ms(0);

        let items = collect(&provider).await;
        assert_eq!(items, vec![Ok("a".to_string()), Ok("b".to_string())]);
        assert_eq!(inner.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_after_fragments_were_produced() {
        let inner = ScriptedProvider::new(vec![
            vec![Ok("a".to_string()), Err(transport())],
            vec![Ok("unused".to_string())],
        ]);
        let provider = RetryingProvider::wrap(inner.clone()).base_backoff_ms(0);

        let items = collect(&provider).await;
        assert_eq!(items, vec![Ok("a".to_string()), Err(transport())]);
        assert_eq!(inner.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn does_not_retry_non_transport_errors() {
        let http = AiError::new(AiErrorCode::ProviderHttp, "HTTP 401");
        let inner = ScriptedProvider::new(vec![vec![Err(http.clone())]]);
        let provider = RetryingProvider::wrap(inner.clone()).base_backoff_ms(0);

        assert_eq!(collect(&provider).await, vec![Err(http)]);
        assert_eq!(inner.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_configured_retries() {
        let inner = ScriptedProvider::new(vec![
            vec![Err(transport())],
            vec![Err(transport())],
            vec![Ok("late".to_string())],
        ]);
        let provider = RetryingProvider::wrap(inner.clone())
            .max_retries(1)
            .base_backoff_ms(0);

        assert_eq!(collect(&provider).await, vec![Err(transport())]);
        assert_eq!(inner.attempts.load(Ordering::SeqCst), 2);
    }
}
