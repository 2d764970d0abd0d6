//! Anthropic-messages-shaped wire types: what the client sends and expects back (§3, §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A role in {user, assistant, system, tool_result}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    ToolResult,
}

/// Content for a tool_result block: a plain string or a short list of text blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolResultOutcome {
    Text(String),
    Blocks(Vec<ToolResultTextBlock>),
}

impl ToolResultOutcome {
    /// Flattens the outcome into plain text, joined by newlines for the multi-block case.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultTextBlock {
    pub text: String,
}

/// A single typed content block inside a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: ToolResultOutcome,
        #[serde(default, skip_serializing_if = "is_false")]
        is_error: bool,
    },
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Turn content: either a plain string or an ordered sequence of typed blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TurnContent {
    String(String),
    Blocks(Vec<ContentBlock>),
}

impl TurnContent {
    /// All `text` blocks concatenated in order (or the whole string, for the string variant).
    pub fn text_only(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn blocks(&self) -> Vec<ContentBlock> {
        match self {
            Self::String(s) => vec![ContentBlock::Text { text: s.clone() }],
            Self::Blocks(blocks) => blocks.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
}

/// Client-declared tool shape. The proxy never forwards this verbatim (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

/// The top-level system prompt: a string, or blocks (only the string form is produced by us,
/// but we accept both shapes on the way in).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SystemPrompt {
    String(String),
    Blocks(Vec<ContentBlock>),
}

impl SystemPrompt {
    pub fn as_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// `POST /v1/messages` request body (§6). Unknown fields are ignored by serde's default behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientMessage {
    pub model: String,
    pub messages: Vec<Turn>,
    #[serde(default)]
    pub system: Option<SystemPrompt>,
    #[serde(default)]
    pub tools: Vec<ToolDeclaration>,
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub stream: bool,
}

/// Stop reason as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    Error,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Non-streaming success response body (§6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl ClientResponse {
    pub fn new(id: String, content: Vec<ContentBlock>, stop_reason: StopReason, usage: Usage) -> Self {
        Self {
            id,
            kind: "message".to_string(),
            role: Role::Assistant,
            content,
            stop_reason,
            usage,
        }
    }
}

/// A server-sent event in the `message_start … message_stop` sequence (§4.2, §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    MessageStart {
        message: MessageStartPayload,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlockStart,
    },
    ContentBlockDelta {
        index: usize,
        delta: ContentBlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaPayload,
        usage: Usage,
    },
    MessageStop,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageStartPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockStart {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: Value },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageDeltaPayload {
    pub stop_reason: StopReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_content_string_text_only() {
        let c = TurnContent::String("hi there".into());
        assert_eq!(c.text_only(), "hi there");
    }

    #[test]
    fn turn_content_blocks_text_only_joins_with_newline() {
        let c = TurnContent::Blocks(vec![
            ContentBlock::Text { text: "a".into() },
            ContentBlock::ToolUse {
                id: "x".into(),
                name: "t".into(),
                input: serde_json::json!({}),
            },
            ContentBlock::Text { text: "b".into() },
        ]);
        assert_eq!(c.text_only(), "a\nb");
    }

    #[test]
    fn tool_result_outcome_blocks_join() {
        let outcome = ToolResultOutcome::Blocks(vec![
            ToolResultTextBlock { text: "one".into() },
            ToolResultTextBlock { text: "two".into() },
        ]);
        assert_eq!(outcome.as_text(), "one\ntwo");
    }

    #[test]
    fn content_block_tagging_round_trips() {
        let block = ContentBlock::ToolUse {
            id: "call_1".into(),
            name: "read_file".into(),
            input: serde_json::json!({"file_path": "/tmp/x"}),
        };
        let s = serde_json::to_string(&block).unwrap();
        assert!(s.contains(r#""type":"tool_use""#));
        let back: ContentBlock = serde_json::from_str(&s).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn client_message_unknown_fields_ignored() {
        let body = serde_json::json!({
            "model": "claude-3-5-sonnet",
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 16,
            "unexpected_field": true,
        });
        let msg: ClientMessage = serde_json::from_value(body).unwrap();
        assert_eq!(msg.model, "claude-3-5-sonnet");
    }
}
