use std::time::Duration;

use async_trait::async_trait;
use deepwiki_ai::RetrievalContext;
use serde::Serialize;

use crate::error::RetrievalError;

/// Repository a question is about, as handed to the retrieval step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoTarget {
    pub repo_url: String,
    #[serde(rename = "type")]
    pub repo_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub language: String,
}

/// Embedding and retrieval half of the question-answering pipeline.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Makes sure the repository is indexed before queries run.
    async fn prepare(&self, target: &RepoTarget) -> Result<(), RetrievalError>;

    async fn retrieve(
        &self,
        target: &RepoTarget,
        question: &str,
    ) -> Result<RetrievalContext, RetrievalError>;
}

/// Answers every query with an empty context.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRetriever;

#[async_trait]
impl Retriever for NoopRetriever {
    async fn prepare(&self, _target: &RepoTarget) -> Result<(), RetrievalError> {
        Ok(())
    }

    async fn retrieve(
        &self,
        _target: &RepoTarget,
        _question: &str,
    ) -> Result<RetrievalContext, RetrievalError> {
        Ok(RetrievalContext::default())
    }
}

/// Client for an external retrieval service exposing `POST /prepare` and
/// `POST /retrieve`.
#[derive(Debug, Clone)]
pub struct HttpRetriever {
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct RetrieveBody<'a> {
    #[serde(flatten)]
    target: &'a RepoTarget,
    question: &'a str,
}

impl HttpRetriever {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, RetrievalError> {
        let url = format!("{}/{path}", self.endpoint);
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|error| RetrievalError::Transport {
                url: url.clone(),
                message: error.to_string(),
            })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Status { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn prepare(&self, target: &RepoTarget) -> Result<(), RetrievalError> {
        self.post("prepare", target).await?;
        Ok(())
    }

    async fn retrieve(
        &self,
        target: &RepoTarget,
        question: &str,
    ) -> Result<RetrievalContext, RetrievalError> {
        let response = self
            .post("retrieve", &RetrieveBody { target, question })
            .await?;
        response
            .json::<RetrievalContext>()
            .await
            .map_err(|error| RetrievalError::Decode(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use serde_json::json;

    use super::*;

    fn target() -> RepoTarget {
        RepoTarget {
            repo_url: "https://github.com/o/r".to_string(),
            repo_type: "github".to_string(),
            token: None,
            language: "en".to_string(),
        }
    }

    fn spawn_json_server(status: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind local test server");
        let address = listener.local_addr().expect("server local addr");
        thread::spawn(move || {
            if let Ok((mut socket, _)) = listener.accept() {
                socket
                    .set_read_timeout(Some(Duration::from_secs(2)))
                    .expect("set read timeout");
                let mut buffer = [0_u8; 8192];
                let _ = socket.read(&mut buffer);
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                socket
                    .write_all(response.as_bytes())
                    .expect("write response");
                let _ = socket.flush();
            }
        });
        format!("http://{address}")
    }

    #[test]
    fn target_serializes_type_and_hides_missing_token() {
        assert_eq!(
            serde_json::to_value(target()).expect("serialize"),
            json!({ "repo_url": "https://github.com/o/r", "type": "github", "language": "en" })
        );
    }

    #[tokio::test]
    async fn noop_retriever_returns_empty_context() {
        let context = NoopRetriever
            .retrieve(&target(), "anything")
            .await
            .expect("noop retrieve");
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn http_retriever_decodes_ranked_documents() {
        let endpoint = spawn_json_server(
            "200 OK",
            json!({
                "documents": [
                    { "text": "fn main() {}", "score": 0.9, "file_path": "src/main.rs" },
                    { "text": "# Readme" }
                ]
            })
            .to_string(),
        );
        let retriever = HttpRetriever::new(endpoint, Duration::from_secs(5));

        let context = retriever
            .retrieve(&target(), "entry point?")
            .await
            .expect("retrieve");
        assert_eq!(context.len(), 2);
        assert_eq!(context.documents[0].file_path.as_deref(), Some("src/main.rs"));
        assert_eq!(context.documents[1].score, 0.0);
    }

    #[tokio::test]
    async fn http_retriever_reports_error_status() {
        let endpoint = spawn_json_server("503 Service Unavailable", "{}".to_string());
        let retriever = HttpRetriever::new(endpoint, Duration::from_secs(5));

        let error = retriever.prepare(&target()).await.expect_err("503");
        assert!(matches!(error, RetrievalError::Status { status: 503, .. }));
    }
}
