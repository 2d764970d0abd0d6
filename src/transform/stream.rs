//! `to_client_stream`: incremental backend deltas → client SSE events (§4.2).
//!
//! Implements the mid-stream partial JSON accumulation as a small explicit
//! state machine per tool call (`not yet parseable` vs `parsed once`), per the
//! re-architecture note in §9 — no ambient buffers.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::backend_schema::{BackendDelta, FinishReason};
use crate::client_schema::{
    ClientEvent, ContentBlockDelta, ContentBlockStart, MessageDeltaPayload, MessageStartPayload,
    Role, StopReason, Usage,
};
use crate::registry::ToolRegistry;

use super::synth_tool_use_id;

struct ToolCallState {
    block_index: usize,
    client_id: String,
    name: String,
    buffer: String,
    started: bool,
    last_emitted: Option<Value>,
}

/// Per-stream accumulator. One instance per in-flight streaming request.
pub struct StreamAccumulator {
    message_started: bool,
    message_id: String,
    next_block_index: usize,
    text_block_index: Option<usize>,
    /// Keyed by the backend's own per-call `index`, not our client block index.
    tool_calls: HashMap<usize, ToolCallState>,
    tool_call_order: Vec<usize>,
    finished: bool,
}

impl Default for StreamAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self {
            message_started: false,
            message_id: format!("msg_{}", Uuid::new_v4().simple()),
            next_block_index: 0,
            text_block_index: None,
            tool_calls: HashMap::new(),
            tool_call_order: Vec::new(),
            finished: false,
        }
    }

    /// Processes one backend delta, returning zero or more client-visible events.
    /// `registry` is applied to each tool-call fragment exactly as `to_client_final`
    /// applies it to a whole response: `reverse_tool_name` then `canonical_args`,
    /// so a renamed tool streams under its client name with client-shaped arguments.
    pub fn apply(&mut self, delta: &BackendDelta, registry: &ToolRegistry) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        if !self.message_started {
            self.message_started = true;
            events.push(ClientEvent::MessageStart {
                message: MessageStartPayload {
                    id: self.message_id.clone(),
                    kind: "message".to_string(),
                    role: Role::Assistant,
                    content: Vec::new(),
                },
            });
        }

        let Some(choice) = delta.choices.first() else {
            return events;
        };

        if let Some(text) = &choice.delta.content
            && !text.is_empty()
        {
            let index = *self.text_block_index.get_or_insert_with(|| {
                let index = self.next_block_index;
                self.next_block_index += 1;
                events.push(ClientEvent::ContentBlockStart {
                    index,
                    content_block: ContentBlockStart::Text {
                        text: String::new(),
                    },
                });
                index
            });
            events.push(ClientEvent::ContentBlockDelta {
                index,
                delta: ContentBlockDelta::TextDelta { text: text.clone() },
            });
        }

        for fragment in choice.delta.tool_calls.iter().flatten() {
            // A tool call starting closes any open text block first: client-visible
            // blocks never interleave (§4.2 ordering guarantee).
            if let Some(text_index) = self.text_block_index.take() {
                events.push(ClientEvent::ContentBlockStop { index: text_index });
            }

            let state = self.tool_calls.entry(fragment.index).or_insert_with(|| {
                let block_index = self.next_block_index;
                self.next_block_index += 1;
                self.tool_call_order.push(fragment.index);
                ToolCallState {
                    block_index,
                    client_id: fragment
                        .id
                        .as_deref()
                        .map(synth_tool_use_id)
                        .unwrap_or_else(|| synth_tool_use_id(&fragment.index.to_string())),
                    name: String::new(),
                    buffer: String::new(),
                    started: false,
                    last_emitted: None,
                }
            });

            if let Some(function) = &fragment.function {
                if let Some(name) = &function.name {
                    state.name = name.clone();
                }
                if let Some(args) = &function.arguments {
                    state.buffer.push_str(args);
                }
            }

            if !state.started {
                state.started = true;
                events.push(ClientEvent::ContentBlockStart {
                    index: state.block_index,
                    content_block: ContentBlockStart::ToolUse {
                        id: state.client_id.clone(),
                        name: registry.reverse_tool_name(&state.name),
                        input: serde_json::json!({}),
                    },
                });
            }

            if let Ok(parsed) = serde_json::from_str::<Value>(&state.buffer) {
                let client_name = registry.reverse_tool_name(&state.name);
                let canonical = match registry.canonical_args(&client_name, &parsed) {
                    // Required properties may still be missing from a buffer that
                    // only happens to be valid JSON mid-stream; fall back to the
                    // renamed-but-unvalidated shape rather than dropping the delta.
                    Ok((_, canonical_args)) => canonical_args,
                    Err(_) => parsed,
                };
                if state.last_emitted.as_ref() != Some(&canonical) {
                    events.push(ClientEvent::ContentBlockDelta {
                        index: state.block_index,
                        delta: ContentBlockDelta::InputJsonDelta {
                            partial_json: canonical.clone(),
                        },
                    });
                    state.last_emitted = Some(canonical);
                }
            }
        }

        if let Some(finish_reason) = &choice.finish_reason {
            events.extend(self.finish(finish_reason, delta.usage.as_ref()));
        }

        events
    }

    fn finish(
        &mut self,
        finish_reason: &str,
        usage: Option<&crate::backend_schema::BackendUsage>,
    ) -> Vec<ClientEvent> {
        self.finished = true;
        let mut events = Vec::new();

        if let Some(text_index) = self.text_block_index.take() {
            events.push(ClientEvent::ContentBlockStop { index: text_index });
        }
        for backend_index in &self.tool_call_order {
            if let Some(state) = self.tool_calls.get(backend_index) {
                events.push(ClientEvent::ContentBlockStop {
                    index: state.block_index,
                });
            }
        }

        let stop_reason = match FinishReason::parse(finish_reason) {
            FinishReason::Stop => StopReason::EndTurn,
            FinishReason::Length => StopReason::MaxTokens,
            FinishReason::ToolCalls => StopReason::ToolUse,
            FinishReason::Other => StopReason::EndTurn,
        };
        let usage = usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        events.push(ClientEvent::MessageDelta {
            delta: MessageDeltaPayload { stop_reason },
            usage,
        });
        events.push(ClientEvent::MessageStop);
        events
    }

    /// Emits a terminal error frame for a stream that fails after bytes have
    /// already been forwarded (§7 user-visible failure behavior). No retry is
    /// attempted once any byte has reached the client (§4.4, §9).
    pub fn abort_with_error(&mut self) -> Vec<ClientEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let mut events = Vec::new();
        if let Some(text_index) = self.text_block_index.take() {
            events.push(ClientEvent::ContentBlockStop { index: text_index });
        }
        for backend_index in &self.tool_call_order {
            if let Some(state) = self.tool_calls.get(backend_index) {
                events.push(ClientEvent::ContentBlockStop {
                    index: state.block_index,
                });
            }
        }
        events.push(ClientEvent::MessageDelta {
            delta: MessageDeltaPayload {
                stop_reason: StopReason::Error,
            },
            usage: Usage::default(),
        });
        events.push(ClientEvent::MessageStop);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend_schema::{
        BackendDeltaChoice, BackendDeltaMessage, FunctionCallDelta, ToolCallDelta,
    };

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
    }

    fn text_delta(text: &str) -> BackendDelta {
        BackendDelta {
            choices: vec![BackendDeltaChoice {
                delta: BackendDeltaMessage {
                    content: Some(text.to_string()),
                    tool_calls: None,
                },
                finish_reason: None,
            }],
            usage: None,
        }
    }

    #[test]
    fn first_delta_emits_message_start_and_block_start() {
        let mut acc = StreamAccumulator::new();
        let events = acc.apply(&text_delta("ok "), &registry());
        assert!(matches!(events[0], ClientEvent::MessageStart { .. }));
        assert!(matches!(
            events[1],
            ClientEvent::ContentBlockStart {
                index: 0,
                content_block: ContentBlockStart::Text { .. }
            }
        ));
        assert!(matches!(
            events[2],
            ClientEvent::ContentBlockDelta {
                index: 0,
                delta: ContentBlockDelta::TextDelta { .. }
            }
        ));
    }

    #[test]
    fn scenario_s5_streaming_with_tool_use() {
        let mut acc = StreamAccumulator::new();
        let mut events = acc.apply(&text_delta("ok "), &registry());

        events.extend(acc.apply(&BackendDelta {
            choices: vec![BackendDeltaChoice {
                delta: BackendDeltaMessage {
                    content: None,
                    tool_calls: Some(vec![ToolCallDelta {
                        index: 0,
                        id: Some("c1".into()),
                        function: Some(FunctionCallDelta {
                            name: Some("edit_file".into()),
                            arguments: Some("{\"pa".into()),
                        }),
                    }]),
                },
                finish_reason: None,
            }],
            usage: None,
        }, &registry()));

        events.extend(acc.apply(&BackendDelta {
            choices: vec![BackendDeltaChoice {
                delta: BackendDeltaMessage {
                    content: None,
                    tool_calls: Some(vec![ToolCallDelta {
                        index: 0,
                        id: None,
                        function: Some(FunctionCallDelta {
                            name: None,
                            arguments: Some(
                                "th\":\"/a\",\"new_string\":\"b\",\"old_string\":\"a\"}".into(),
                            ),
                        }),
                    }]),
                },
                finish_reason: Some("tool_calls".into()),
            }],
            usage: None,
        }, &registry()));

        // message_start, content_block_start(text), content_block_delta(text),
        // content_block_stop(0), content_block_start(tool_use),
        // content_block_delta(full json, exactly once), content_block_stop(1),
        // message_delta, message_stop.
        assert!(matches!(events[0], ClientEvent::MessageStart { .. }));
        assert!(matches!(
            events[1],
            ClientEvent::ContentBlockStart {
                content_block: ContentBlockStart::Text { .. },
                ..
            }
        ));
        assert!(matches!(events[2], ClientEvent::ContentBlockDelta { .. }));
        assert!(matches!(events[3], ClientEvent::ContentBlockStop { index: 0 }));
        assert!(matches!(
            events[4],
            ClientEvent::ContentBlockStart {
                index: 1,
                content_block: ContentBlockStart::ToolUse { .. }
            }
        ));

        let mut json_deltas = 0;
        for event in &events[5..] {
            if let ClientEvent::ContentBlockDelta {
                delta: ContentBlockDelta::InputJsonDelta { partial_json },
                ..
            } = event
            {
                json_deltas += 1;
                assert_eq!(
                    partial_json,
                    &serde_json::json!({"file_path": "/a", "new_string": "b", "old_string": "a"})
                );
            }
        }
        assert_eq!(json_deltas, 1, "tool_use input must be emitted exactly once, never as a fragment");

        assert!(matches!(
            events[events.len() - 3],
            ClientEvent::ContentBlockStop { index: 1 }
        ));
        assert!(matches!(events[events.len() - 2], ClientEvent::MessageDelta { .. }));
        assert!(matches!(events[events.len() - 1], ClientEvent::MessageStop));
    }

    #[test]
    fn never_emits_delta_for_unparseable_partial_json() {
        let mut acc = StreamAccumulator::new();
        let events = acc.apply(&BackendDelta {
            choices: vec![BackendDeltaChoice {
                delta: BackendDeltaMessage {
                    content: None,
                    tool_calls: Some(vec![ToolCallDelta {
                        index: 0,
                        id: Some("c1".into()),
                        function: Some(FunctionCallDelta {
                            name: Some("edit_file".into()),
                            arguments: Some("{\"partial".into()),
                        }),
                    }]),
                },
                finish_reason: None,
            }],
            usage: None,
        }, &registry());
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, ClientEvent::ContentBlockDelta { delta: ContentBlockDelta::InputJsonDelta { .. }, .. }))
        );
    }

    #[test]
    fn abort_with_error_closes_open_blocks_and_sets_error_stop_reason() {
        let mut acc = StreamAccumulator::new();
        acc.apply(&text_delta("partial"), &registry());
        let events = acc.abort_with_error();
        assert!(matches!(events[0], ClientEvent::ContentBlockStop { index: 0 }));
        match &events[1] {
            ClientEvent::MessageDelta { delta, .. } => {
                assert_eq!(delta.stop_reason, StopReason::Error);
            }
            other => panic!("expected message_delta, got {other:?}"),
        }
        assert!(matches!(events[2], ClientEvent::MessageStop));
    }
}
