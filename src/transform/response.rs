//! `to_client_final`: a whole backend response → the client's Anthropic-messages shape (§4.2).

use serde_json::Value;
use uuid::Uuid;

use crate::backend_schema::{BackendResponse, FinishReason};
use crate::client_schema::{ClientResponse, ContentBlock, StopReason, ToolResultOutcome, Usage};
use crate::registry::{RegistryError, ToolRegistry};

use super::synth_tool_use_id;

fn map_finish_reason(raw: Option<&str>) -> StopReason {
    match raw.map(FinishReason::parse) {
        Some(FinishReason::Stop) => StopReason::EndTurn,
        Some(FinishReason::Length) => StopReason::MaxTokens,
        Some(FinishReason::ToolCalls) => StopReason::ToolUse,
        Some(FinishReason::Other) | None => StopReason::EndTurn,
    }
}

/// Converts a non-streaming backend response into the client's message shape.
/// Always succeeds: malformed tool arguments are self-healed per §7, never
/// surfaced as a hard error (that only applies to malformed client input).
pub fn to_client_final(response: &BackendResponse, registry: &ToolRegistry) -> ClientResponse {
    let Some(choice) = response.choices.first() else {
        return ClientResponse::new(
            format!("msg_{}", Uuid::new_v4().simple()),
            Vec::new(),
            StopReason::EndTurn,
            Usage::default(),
        );
    };

    let mut content = Vec::new();

    if let Some(text) = &choice.message.content
        && !text.is_empty()
    {
        content.push(ContentBlock::Text { text: text.clone() });
    }

    for tool_call in choice.message.tool_calls.iter().flatten() {
        let synthesized_id = synth_tool_use_id(&tool_call.id);
        let client_name = registry.reverse_tool_name(&tool_call.function.name);

        match serde_json::from_str::<Value>(&tool_call.function.arguments) {
            Err(_) => {
                // Unparseable argument JSON: surface as text, never as a tool_use
                // with non-JSON input (§8 invariant 1).
                content.push(ContentBlock::Text {
                    text: tool_call.function.arguments.clone(),
                });
            }
            Ok(raw_args) => match registry.canonical_args(&client_name, &raw_args) {
                Ok((canonical_name, canonical_args)) => {
                    content.push(ContentBlock::ToolUse {
                        id: synthesized_id,
                        name: canonical_name,
                        input: canonical_args,
                    });
                }
                Err(RegistryError::InvalidArgs { .. }) => {
                    // Self-healing (§7 InvalidArgs): rewrite into an error tool_result
                    // carrying the raw arguments, so the model can self-correct.
                    content.push(ContentBlock::ToolResult {
                        tool_use_id: synthesized_id,
                        content: ToolResultOutcome::Text(tool_call.function.arguments.clone()),
                        is_error: true,
                    });
                }
            },
        }
    }

    let stop_reason = map_finish_reason(choice.finish_reason.as_deref());
    let usage = response
        .usage
        .as_ref()
        .map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    ClientResponse::new(
        format!("msg_{}", Uuid::new_v4().simple()),
        content,
        stop_reason,
        usage,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend_schema::{BackendChoice, BackendResponseMessage, BackendUsage};
    use crate::backend_schema::ToolCall as BackendToolCall;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
    }

    #[test]
    fn plain_text_response_maps_to_end_turn() {
        let response = BackendResponse {
            choices: vec![BackendChoice {
                message: BackendResponseMessage {
                    content: Some("hi".into()),
                    tool_calls: None,
                },
                finish_reason: Some("stop".into()),
            }],
            usage: None,
        };
        let client = to_client_final(&response, &registry());
        assert_eq!(client.content, vec![ContentBlock::Text { text: "hi".into() }]);
        assert_eq!(client.stop_reason, StopReason::EndTurn);
        assert_eq!(client.usage, Usage::default());
    }

    #[test]
    fn tool_call_round_trips_with_renamed_args() {
        let response = BackendResponse {
            choices: vec![BackendChoice {
                message: BackendResponseMessage {
                    content: None,
                    tool_calls: Some(vec![BackendToolCall::new(
                        "c1",
                        "read_file",
                        r#"{"path":"/tmp/x"}"#.to_string(),
                    )]),
                },
                finish_reason: Some("tool_calls".into()),
            }],
            usage: None,
        };
        let client = to_client_final(&response, &registry());
        assert_eq!(client.stop_reason, StopReason::ToolUse);
        match &client.content[0] {
            ContentBlock::ToolUse { name, input, .. } => {
                assert_eq!(name, "read_file");
                assert_eq!(input, &json!({"file_path": "/tmp/x"}));
            }
            other => panic!("expected tool_use, got {other:?}"),
        }
    }

    #[test]
    fn malformed_tool_args_self_heal_into_error_tool_result() {
        let response = BackendResponse {
            choices: vec![BackendChoice {
                message: BackendResponseMessage {
                    content: None,
                    tool_calls: Some(vec![BackendToolCall::new(
                        "c1",
                        "read_file",
                        "{}".to_string(),
                    )]),
                },
                finish_reason: Some("tool_calls".into()),
            }],
            usage: None,
        };
        let client = to_client_final(&response, &registry());
        match &client.content[0] {
            ContentBlock::ToolResult { is_error, content, .. } => {
                assert!(*is_error);
                assert_eq!(content.as_text(), "{}");
            }
            other => panic!("expected tool_result, got {other:?}"),
        }
    }

    #[test]
    fn unparseable_argument_json_becomes_text_block() {
        let response = BackendResponse {
            choices: vec![BackendChoice {
                message: BackendResponseMessage {
                    content: None,
                    tool_calls: Some(vec![BackendToolCall::new(
                        "c1",
                        "read_file",
                        "{not json".to_string(),
                    )]),
                },
                finish_reason: Some("tool_calls".into()),
            }],
            usage: None,
        };
        let client = to_client_final(&response, &registry());
        assert_eq!(
            client.content[0],
            ContentBlock::Text {
                text: "{not json".into()
            }
        );
    }

    #[test]
    fn usage_copied_when_present() {
        let response = BackendResponse {
            choices: vec![BackendChoice {
                message: BackendResponseMessage {
                    content: Some("hi".into()),
                    tool_calls: None,
                },
                finish_reason: Some("length".into()),
            }],
            usage: Some(BackendUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            }),
        };
        let client = to_client_final(&response, &registry());
        assert_eq!(client.stop_reason, StopReason::MaxTokens);
        assert_eq!(
            client.usage,
            Usage {
                input_tokens: 10,
                output_tokens: 5
            }
        );
    }
}
