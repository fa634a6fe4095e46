use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::json;

use crate::error::{AiError, AiErrorCode};
use crate::types::TextStream;

pub(super) fn join_url(base_url: &str, path: &str) -> String {
    if base_url.ends_with('/') {
        format!("{base_url}{path}")
    } else {
        format!("{base_url}/{path}")
    }
}

pub(super) fn shared_http_client(base_url: &str) -> &'static Client {
    static DEFAULT_CLIENT: OnceLock<Client> = OnceLock::new();
    static LOOPBACK_CLIENT: OnceLock<Client> = OnceLock::new();

    if is_loopback_base_url(base_url) {
        LOOPBACK_CLIENT.get_or_init(|| {
            Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_else(|_| Client::new())
        })
    } else {
        DEFAULT_CLIENT.get_or_init(Client::new)
    }
}

pub(super) fn is_loopback_base_url(base_url: &str) -> bool {
    let Ok(url) = reqwest::Url::parse(base_url) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1" || host == "::1"
}

pub(super) fn missing_api_key(provider: &str, key_envs: &[&str]) -> AiError {
    AiError::new(
        AiErrorCode::ProviderAuthMissing,
        format!(
            "Missing API key for provider '{provider}'. Set `api_key` under [providers.{provider}] or {}.",
            key_envs.join(" / ")
        ),
    )
}

pub(super) fn truncate_for_details(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    if limit <= 3 {
        return ".".repeat(limit);
    }
    let prefix: String = text.chars().take(limit - 3).collect();
    format!("{prefix}...")
}

/// Sends the request and turns transport failures and non-2xx statuses into
/// provider errors.
pub(super) async fn send_checked(
    label: &'static str,
    request: RequestBuilder,
) -> Result<Response, AiError> {
    let response = request.send().await.map_err(|error| {
        AiError::new(
            AiErrorCode::ProviderTransport,
            format!("{label} transport failed: {error}"),
        )
    })?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_string());
        let hint = match status {
            401 | 403 => " (check the API key)",
            429 => " (rate limited or quota exhausted)",
            _ => "",
        };
        return Err(AiError::new(
            AiErrorCode::ProviderHttp,
            format!("{label} HTTP {status}{hint}: {}", truncate_for_details(&body, 400)),
        )
        .with_details(json!({ "status": status })));
    }

    Ok(response)
}

/// Splits a chunked byte stream into text lines without waiting for the body
/// to finish.
pub(super) struct LineReader<S> {
    chunks: S,
    buffer: Vec<u8>,
    exhausted: bool,
}

impl<S, B> LineReader<S>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin,
    B: AsRef<[u8]>,
{
    pub(super) fn new(chunks: S) -> Self {
        Self {
            chunks,
            buffer: Vec::new(),
            exhausted: false,
        }
    }

    pub(super) async fn next_line(&mut self, label: &str) -> Result<Option<String>, AiError> {
        loop {
            if let Some(position) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let line = self.buffer.drain(..=position).collect::<Vec<_>>();
                return Ok(Some(decode_line(&line)));
            }

            if self.exhausted {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let line = std::mem::take(&mut self.buffer);
                return Ok(Some(decode_line(&line)));
            }

            match self.chunks.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(error)) => {
                    return Err(AiError::new(
                        AiErrorCode::ProviderTransport,
                        format!("{label} stream read failed: {error}"),
                    ));
                }
                None => self.exhausted = true,
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(&['\r', '\n'][..])
        .to_string()
}

/// Collects `data:` lines of one server-sent event until the blank separator.
#[derive(Default)]
pub(super) struct SseDecoder {
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub(super) fn push_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.flush();
        }
        if let Some(data) = line.strip_prefix("data:") {
            self.data_lines.push(data.trim_start().to_string());
        }
        None
    }

    pub(super) fn flush(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            return None;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(data)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum Framing {
    ServerSentEvents,
    JsonLines,
}

pub(super) enum ChunkOutcome {
    Fragment(String),
    Skip,
    /// Last chunk of the stream: optional trailing text, then success or failure.
    Finish {
        fragment: String,
        error: Option<AiError>,
    },
}

type PendingResponse = Pin<Box<dyn Future<Output = Result<Response, AiError>> + Send>>;
type ByteChunks = BoxStream<'static, Result<Vec<u8>, reqwest::Error>>;

struct FragmentState<F> {
    label: &'static str,
    pending: Option<PendingResponse>,
    lines: Option<LineReader<ByteChunks>>,
    sse: SseDecoder,
    framing: Framing,
    parse: F,
    finish: Option<Option<AiError>>,
}

impl<F> FragmentState<F> {
    async fn next_payload(&mut self) -> Result<Option<String>, AiError> {
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };
        loop {
            let Some(line) = lines.next_line(self.label).await? else {
                return Ok(match self.framing {
                    Framing::ServerSentEvents => self.sse.flush(),
                    Framing::JsonLines => None,
                });
            };
            match self.framing {
                Framing::ServerSentEvents => {
                    if let Some(data) = self.sse.push_line(&line) {
                        return Ok(Some(data));
                    }
                }
                Framing::JsonLines => {
                    if !line.trim().is_empty() {
                        return Ok(Some(line));
                    }
                }
            }
        }
    }
}

/// Builds a lazy fragment stream: the request is sent on first poll and every
/// decoded payload is handed to `parse` in arrival order. Dropping the stream
/// drops the HTTP response.
pub(super) fn fragment_stream<F>(
    label: &'static str,
    request: RequestBuilder,
    framing: Framing,
    parse: F,
) -> TextStream
where
    F: FnMut(&str) -> Result<ChunkOutcome, AiError> + Send + 'static,
{
    let state = FragmentState {
        label,
        pending: Some(Box::pin(send_checked(label, request))),
        lines: None,
        sse: SseDecoder::default(),
        framing,
        parse,
        finish: None,
    };

    Box::pin(stream::try_unfold(state, |mut state| async move {
        if let Some(outcome) = state.finish.take() {
            return match outcome {
                Some(error) => Err(error),
                None => Ok(None),
            };
        }

        if let Some(pending) = state.pending.take() {
            let response = pending.await?;
            let chunks: ByteChunks = response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed();
            state.lines = Some(LineReader::new(chunks));
        }

        loop {
            let Some(payload) = state.next_payload().await? else {
                return Ok(None);
            };
            match (state.parse)(&payload)? {
                ChunkOutcome::Fragment(text) => return Ok(Some((text, state))),
                ChunkOutcome::Skip => continue,
                ChunkOutcome::Finish { fragment, error } => {
                    if fragment.is_empty() {
                        return match error {
                            Some(error) => Err(error),
                            None => Ok(None),
                        };
                    }
                    state.lines = None;
                    state.finish = Some(error);
                    return Ok(Some((fragment, state)));
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(chunks: Vec<Vec<u8>>) -> LineReader<ByteChunks> {
        let items = chunks.into_iter().map(Ok).collect::<Vec<_>>();
        LineReader::new(stream::iter(items).boxed())
    }

    #[tokio::test]
    async fn line_reader_reassembles_lines_split_across_chunks() {
        let mut lines = reader(vec![
            b"data: {\"a\":".to_vec(),
            b"1}\r\n".to_vec(),
            b"\n".to_vec(),
            b"tail".to_vec(),
        ]);

        assert_eq!(
            lines.next_line("test").await.expect("line"),
            Some("data: {\"a\":1}".to_string())
        );
        assert_eq!(
            lines.next_line("test").await.expect("line"),
            Some(String::new())
        );
        assert_eq!(
            lines.next_line("test").await.expect("line"),
            Some("tail".to_string())
        );
        assert_eq!(lines.next_line("test").await.expect("eof"), None);
    }

    #[tokio::test]
    async fn line_reader_keeps_multibyte_characters_split_between_chunks() {
        let text = "h\u{e9}llo\n".as_bytes();
        let (head, tail) = text.split_at(2);
        let mut lines = reader(vec![head.to_vec(), tail.to_vec()]);

        assert_eq!(
            lines.next_line("test").await.expect("line"),
            Some("h\u{e9}llo".to_string())
        );
    }

    #[test]
    fn sse_decoder_joins_multi_line_data_and_ignores_other_fields() {
        let mut decoder = SseDecoder::default();
        assert_eq!(decoder.push_line("event: message"), None);
        assert_eq!(decoder.push_line("data: first"), None);
        assert_eq!(decoder.push_line("data:second"), None);
        assert_eq!(decoder.push_line(": comment"), None);
        assert_eq!(decoder.push_line(""), Some("first\nsecond".to_string()));
        assert_eq!(decoder.push_line(""), None);
    }

    #[test]
    fn truncate_for_details_marks_cut_text() {
        assert_eq!(truncate_for_details("abcdef", 5), "ab...");
        assert_eq!(truncate_for_details("abc", 5), "abc");
    }

    #[test]
    fn http_client_is_reused_across_requests() {
        let first = shared_http_client("https://api.openai.com/v1");
        let second = shared_http_client("https://api.openai.com/v1");
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn loopback_detection_covers_localhost_variants() {
        assert!(is_loopback_base_url("http://localhost:11434"));
        assert!(is_loopback_base_url("http://127.0.0.1:8080/v1"));
        assert!(!is_loopback_base_url("https://generativelanguage.googleapis.com"));
    }
}
