use serde::Deserialize;
use serde_json::{Map, Value};

use crate::cache::CacheKey;
use crate::error::ToolError;
use crate::events::ToolName;
use crate::retriever::RepoTarget;

pub const DEFAULT_REPO_TYPE: &str = "github";
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_PROVIDER: &str = "google";

/// Body of a tool invocation as it arrives on the wire.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolRequest {
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
}

impl ToolRequest {
    pub fn new(tool: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            params: Some(params),
        }
    }

    pub fn from_json_slice(body: &[u8]) -> Result<Self, ToolError> {
        serde_json::from_slice(body)
            .map_err(|error| ToolError::Validation(format!("Invalid tool request: {error}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionQuery {
    pub target: RepoTarget,
    pub question: String,
    pub provider: String,
    pub model: Option<String>,
}

/// A validated invocation, ready for its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    ReadWikiStructure(CacheKey),
    ReadWikiContents {
        key: CacheKey,
        page_id: Option<String>,
    },
    AskQuestion(QuestionQuery),
}

impl ToolCall {
    pub fn parse(request: &ToolRequest) -> Result<Self, ToolError> {
        let tool = ToolName::parse(&request.tool)
            .ok_or_else(|| ToolError::Validation(format!("Unknown tool: {}", request.tool)))?;
        let empty = Map::new();
        let params = Params(request.params.as_ref().unwrap_or(&empty));

        match tool {
            ToolName::ReadWikiStructure => Ok(ToolCall::ReadWikiStructure(params.cache_key()?)),
            ToolName::ReadWikiContents => {
                let key = params.cache_key()?;
                let page_id = params.optional("page_id")?;
                Ok(ToolCall::ReadWikiContents { key, page_id })
            }
            ToolName::AskQuestion => {
                let repo_url = params.optional("repo_url")?;
                let question = params.optional("question")?;
                let (Some(repo_url), Some(question)) = (repo_url, question) else {
                    return Err(ToolError::Validation(
                        "repo_url and question are required".to_string(),
                    ));
                };
                Ok(ToolCall::AskQuestion(QuestionQuery {
                    target: RepoTarget {
                        repo_url,
                        repo_type: params.or_default("type", DEFAULT_REPO_TYPE)?,
                        token: params.optional("token")?,
                        language: params.or_default("language", DEFAULT_LANGUAGE)?,
                    },
                    question,
                    provider: params.or_default("provider", DEFAULT_PROVIDER)?,
                    model: params.optional("model")?,
                }))
            }
        }
    }

    pub fn tool(&self) -> ToolName {
        match self {
            ToolCall::ReadWikiStructure(_) => ToolName::ReadWikiStructure,
            ToolCall::ReadWikiContents { .. } => ToolName::ReadWikiContents,
            ToolCall::AskQuestion(_) => ToolName::AskQuestion,
        }
    }
}

struct Params<'a>(&'a Map<String, Value>);

impl Params<'_> {
    /// `null`, a missing key and a blank string all read as absent. Other
    /// strings are returned as sent.
    fn optional(&self, name: &str) -> Result<Option<String>, ToolError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => {
                Ok((!value.trim().is_empty()).then(|| value.clone()))
            }
            Some(other) => Err(ToolError::Validation(format!(
                "parameter '{name}' must be a string, got {}",
                json_type_name(other)
            ))),
        }
    }

    fn or_default(&self, name: &str, default: &str) -> Result<String, ToolError> {
        Ok(self.optional(name)?.unwrap_or_else(|| default.to_string()))
    }

    fn cache_key(&self) -> Result<CacheKey, ToolError> {
        let owner = self.optional("owner")?;
        let repo = self.optional("repo")?;
        let (Some(owner), Some(repo)) = (owner, repo) else {
            return Err(ToolError::Validation(
                "owner and repo are required".to_string(),
            ));
        };
        let key = CacheKey {
            owner,
            repo,
            repo_type: self.or_default("repo_type", DEFAULT_REPO_TYPE)?,
            language: self.or_default("language", DEFAULT_LANGUAGE)?,
        };
        for (name, value) in [
            ("owner", &key.owner),
            ("repo", &key.repo),
            ("repo_type", &key.repo_type),
            ("language", &key.language),
        ] {
            ensure_path_segment(name, value)?;
        }
        Ok(key)
    }
}

/// Cache keys become file names, so they must stay a single path segment.
fn ensure_path_segment(name: &str, value: &str) -> Result<(), ToolError> {
    if value.contains(['/', '\\', '\0']) || value == ".." || value == "." {
        return Err(ToolError::Validation(format!(
            "parameter '{name}' contains invalid characters"
        )));
    }
    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
