use deepwiki_ai::ProviderDescriptor;
use serde::Serialize;

use crate::events::ToolName;

pub const SERVER_NAME: &str = "deepwiki-mcp";
pub const SERVER_DESCRIPTION: &str = "MCP adapter for DeepWiki with streaming support";
pub const PROTOCOL: &str = "sse";

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: &'static str,
    pub description: &'static str,
    /// Parameter name and human readable description, in display order.
    #[serde(serialize_with = "serialize_parameters")]
    pub parameters: Vec<(&'static str, &'static str)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub protocol: &'static str,
    pub tools: Vec<ToolInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<ProviderDescriptor>,
}

fn serialize_parameters<S>(
    parameters: &[(&'static str, &'static str)],
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(parameters.len()))?;
    for (name, description) in parameters {
        map.serialize_entry(name, description)?;
    }
    map.end()
}

pub fn tool_info(tool: ToolName) -> ToolInfo {
    match tool {
        ToolName::ReadWikiStructure => ToolInfo {
            name: tool.as_str(),
            description: "Get a list of documentation topics for a repository",
            parameters: vec![
                ("owner", "Repository owner (required)"),
                ("repo", "Repository name (required)"),
                ("repo_type", "Repository type (default: 'github')"),
                ("language", "Language code (default: 'en')"),
            ],
        },
        ToolName::ReadWikiContents => ToolInfo {
            name: tool.as_str(),
            description: "View documentation about a repository",
            parameters: vec![
                ("owner", "Repository owner (required)"),
                ("repo", "Repository name (required)"),
                ("page_id", "Specific page ID (optional, returns all if omitted)"),
                ("repo_type", "Repository type (default: 'github')"),
                ("language", "Language code (default: 'en')"),
            ],
        },
        ToolName::AskQuestion => ToolInfo {
            name: tool.as_str(),
            description: "Ask any question about a repository and get an AI-powered, context-grounded response",
            parameters: vec![
                ("repo_url", "Repository URL (required)"),
                ("question", "Question to ask (required)"),
                ("provider", "Model provider (default: 'google')"),
                ("model", "Model name (optional)"),
                ("type", "Repository type (default: 'github')"),
                ("token", "Access token for private repos (optional)"),
                ("language", "Language code (default: 'en')"),
            ],
        },
    }
}

pub fn server_info(providers: Vec<ProviderDescriptor>) -> ServerInfo {
    ServerInfo {
        name: SERVER_NAME,
        version: env!("CARGO_PKG_VERSION"),
        description: SERVER_DESCRIPTION,
        protocol: PROTOCOL,
        tools: ToolName::ALL.into_iter().map(tool_info).collect(),
        providers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_info_lists_every_tool_with_parameters() {
        let value = serde_json::to_value(server_info(Vec::new())).expect("serialize info");
        assert_eq!(value["name"], "deepwiki-mcp");
        assert_eq!(value["protocol"], "sse");
        assert!(value.get("providers").is_none());

        let tools = value["tools"].as_array().expect("tools array");
        assert_eq!(tools.len(), 3);
        assert_eq!(tools[2]["name"], "ask_question");
        assert_eq!(tools[2]["parameters"]["repo_url"], "Repository URL (required)");
        assert_eq!(
            tools[1]["parameters"]
                .as_object()
                .expect("parameters object")
                .len(),
            5
        );
    }
}
