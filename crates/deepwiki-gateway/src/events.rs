use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Closed set of tools the gateway can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    ReadWikiStructure,
    ReadWikiContents,
    AskQuestion,
}

impl ToolName {
    pub const ALL: [ToolName; 3] = [
        ToolName::ReadWikiStructure,
        ToolName::ReadWikiContents,
        ToolName::AskQuestion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::ReadWikiStructure => "read_wiki_structure",
            ToolName::ReadWikiContents => "read_wiki_contents",
            ToolName::AskQuestion => "ask_question",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == name)
    }
}

impl Display for ToolName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const PROGRESS_PREPARING_RETRIEVER: &str = "preparing_retriever";
pub const PROGRESS_RETRIEVING_CONTEXT: &str = "retrieving_context";
pub const PROGRESS_GENERATING_ANSWER: &str = "generating_answer";

/// One step of a tool invocation as seen by the caller.
///
/// `Start` opens every accepted invocation and exactly one of `Done` or
/// `Error` closes it.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    Start { tool: ToolName },
    Progress { stage: String, detail: Map<String, Value> },
    Data { payload: Map<String, Value> },
    Done,
    Error { message: String },
}

impl ToolEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ToolEvent::Start { .. } => "start",
            ToolEvent::Progress { .. } => "progress",
            ToolEvent::Data { .. } => "data",
            ToolEvent::Done => "done",
            ToolEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ToolEvent::Done | ToolEvent::Error { .. })
    }

    /// JSON body carried in the `data:` line of the event frame.
    pub fn wire_data(&self) -> Value {
        match self {
            ToolEvent::Start { tool } => json!({ "status": "started", "tool": tool.as_str() }),
            ToolEvent::Progress { stage, detail } => {
                let mut body = Map::new();
                body.insert("status".to_string(), Value::String(stage.clone()));
                for (key, value) in detail {
                    if key != "status" {
                        body.insert(key.clone(), value.clone());
                    }
                }
                Value::Object(body)
            }
            ToolEvent::Data { payload } => Value::Object(payload.clone()),
            ToolEvent::Done => json!({ "status": "completed" }),
            ToolEvent::Error { message } => json!({ "error": message }),
        }
    }
}
