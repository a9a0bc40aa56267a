use serde::{Deserialize, Serialize};

/// Tool definition advertised to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A tool invocation as it arrives over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

/// Result envelope returned for every tool call, successful or not.
///
/// Failures are carried in-band with `is_error = true`; they are never
/// raised across the invocation boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(text: impl Into<String>, structured: Option<serde_json::Value>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            structured,
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>, structured: Option<serde_json::Value>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            structured,
            is_error: true,
        }
    }

    /// Concatenated text of every content part.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                ToolContent::Text { text } => text.as_str(),
            })
            .collect()
    }
}
