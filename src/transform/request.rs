//! `to_backend`: client schema → backend schema (§4.2).

use std::collections::HashSet;

use crate::backend_schema::{
    BackendMessage, BackendRequest, FunctionDescriptor, ReasoningEffort, ToolCall, ToolDescriptor,
};
use crate::client_schema::{ClientMessage, ContentBlock, Role, Turn};
use crate::os_family::OsFamily;
use crate::registry::ToolRegistry;

use super::TransformError;

fn backend_role(role: Role) -> crate::backend_schema::BackendRole {
    use crate::backend_schema::BackendRole as B;
    match role {
        Role::User | Role::ToolResult => B::User,
        Role::Assistant => B::Assistant,
        Role::System => B::System,
    }
}

/// Converts a client request into the backend's chat-completions shape.
///
/// `max_tokens_ceiling` caps the client's requested budget at the backend's
/// declared ceiling (e.g. 8192 for the Groq-style backend, per §4.2).
pub fn to_backend(
    client: &ClientMessage,
    registry: &ToolRegistry,
    os: OsFamily,
    reasoning_effort: Option<ReasoningEffort>,
    max_tokens_ceiling: u32,
) -> Result<BackendRequest, TransformError> {
    let mut messages = Vec::new();

    if let Some(system) = &client.system {
        let text = system.as_text();
        if !text.is_empty() {
            messages.push(BackendMessage::system(text));
        }
    }

    let mut seen_tool_use_ids: HashSet<String> = HashSet::new();

    for turn in &client.messages {
        translate_turn(turn, &mut seen_tool_use_ids, &mut messages)?;
    }

    let tools = if client.tools.is_empty() {
        None
    } else {
        Some(
            registry
                .tools_for(os)
                .into_iter()
                .map(|entry| ToolDescriptor {
                    kind: "function".to_string(),
                    function: FunctionDescriptor {
                        name: entry.name.to_string(),
                        description: Some(entry.description),
                        parameters: entry.schema,
                    },
                })
                .collect(),
        )
    };
    let tool_choice = if tools.is_some() {
        Some("auto".to_string())
    } else {
        None
    };

    Ok(BackendRequest {
        model: client.model.clone(),
        messages,
        tools,
        tool_choice,
        max_tokens: client.max_tokens.min(max_tokens_ceiling),
        temperature: client.temperature,
        stream: client.stream,
        reasoning_effort,
    })
}

fn translate_turn(
    turn: &Turn,
    seen_tool_use_ids: &mut HashSet<String>,
    out: &mut Vec<BackendMessage>,
) -> Result<(), TransformError> {
    let blocks = turn.content.blocks();

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut tool_results = Vec::new();

    for block in &blocks {
        match block {
            ContentBlock::Text { text } => text_parts.push(text.as_str()),
            ContentBlock::ToolUse { id, name, input } => {
                seen_tool_use_ids.insert(id.clone());
                let arguments = serde_json::to_string(input).unwrap_or_default();
                tool_calls.push(ToolCall::new(id.clone(), name.clone(), arguments));
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                if !seen_tool_use_ids.contains(tool_use_id) {
                    return Err(TransformError::DanglingToolResult {
                        id: tool_use_id.clone(),
                    });
                }
                tool_results.push((tool_use_id.clone(), content.as_text()));
            }
        }
    }

    if !text_parts.is_empty() || !tool_calls.is_empty() {
        let content = if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.join("\n"))
        };
        out.push(BackendMessage {
            role: backend_role(turn.role),
            content,
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            tool_call_id: None,
        });
    }

    for (tool_use_id, text) in tool_results {
        out.push(BackendMessage::tool(tool_use_id, text));
    }

    Ok(())
}
