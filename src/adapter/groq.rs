//! Groq-style adapter (§4.5): passthrough, plus web-search interception.
//!
//! When the Selector raises `web_search_required`, a `web_search`/`browser_search`
//! tool call the backend emits is not returned to the client as-is; instead the
//! adapter resolves it with a secondary non-streaming call and hands back the
//! resolved `tool_result`, per §4.5 and scenario S4 (§8).

use async_trait::async_trait;
use serde_json::Value;

use crate::backend_client::BackendClient;
use crate::backend_schema::{BackendMessage, BackendRequest, BackendResponse, FinishReason};
use crate::client_schema::{ClientMessage, ClientResponse, ContentBlock, Role, StopReason, ToolResultOutcome, Usage};
use crate::os_family::OsFamily;
use crate::registry::ToolRegistry;
use crate::selector::{self, ModelCatalog};
use crate::transform::{synth_tool_use_id, to_backend, to_client_final};

use super::{Adapter, AdapterError, AdapterResponse, relay_stream};

const WEB_SEARCH_TOOL_NAMES: &[&str] = &["web_search", "browser_search"];

pub struct GroqAdapter {
    client: BackendClient,
    registry: ToolRegistry,
    catalog: ModelCatalog,
    os: OsFamily,
    max_tokens_ceiling: u32,
}

/// The adapter's explicit representation of the web-search path's outcome,
/// in place of branching on exceptions (§9 re-architecture note).
enum WebSearchOutcome {
    /// No web-search tool call was present; the primary response stands as-is.
    Plain(BackendResponse),
    /// A web-search tool call was intercepted and resolved into a `tool_result`.
    ToolResultInjected { text_blocks: Vec<ContentBlock>, tool_use_id: String, result_text: String },
    /// The web-search tool call was intercepted but the secondary call failed.
    Error { text_blocks: Vec<ContentBlock>, tool_use_id: String },
}

impl GroqAdapter {
    pub fn new(
        client: BackendClient,
        registry: ToolRegistry,
        catalog: ModelCatalog,
        os: OsFamily,
        max_tokens_ceiling: u32,
    ) -> Self {
        Self {
            client,
            registry,
            catalog,
            os,
            max_tokens_ceiling,
        }
    }

    fn select(&self, request: &ClientMessage) -> selector::Selection {
        let user_text = request
            .messages
            .iter()
            .rev()
            .find(|turn| turn.role == Role::User)
            .map(|turn| turn.content.text_only())
            .unwrap_or_default();
        let tool_names: Vec<&str> = request.tools.iter().map(|t| t.name.as_str()).collect();
        selector::select(&self.catalog, &request.model, &user_text, &tool_names)
    }

    /// Resolves a web-search tool call via a minimal secondary call to the
    /// web-search-capable model, per §4.5 steps 1-5.
    async fn resolve_web_search(&self, query: &str, model: &str) -> Result<String, AdapterError> {
        let request = BackendRequest {
            model: model.to_string(),
            messages: vec![BackendMessage::user(format!("Search the web for: {query}"))],
            tools: None,
            tool_choice: None,
            max_tokens: self.max_tokens_ceiling,
            temperature: None,
            stream: false,
            reasoning_effort: None,
        };
        let response = self.client.send(&request).await?;
        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        Ok(text)
    }

    async fn intercept(&self, response: BackendResponse, web_search_model: &str) -> WebSearchOutcome {
        let Some(choice) = response.choices.first() else {
            return WebSearchOutcome::Plain(response);
        };

        let intercepted = choice
            .message
            .tool_calls
            .iter()
            .flatten()
            .find(|call| WEB_SEARCH_TOOL_NAMES.contains(&call.function.name.as_str()))
            .cloned();

        let Some(call) = intercepted else {
            return WebSearchOutcome::Plain(response);
        };

        let text_blocks = choice
            .message
            .content
            .clone()
            .filter(|t| !t.is_empty())
            .map(|text| vec![ContentBlock::Text { text }])
            .unwrap_or_default();
        let tool_use_id = synth_tool_use_id(&call.id);

        let query = serde_json::from_str::<Value>(&call.function.arguments)
            .ok()
            .and_then(|v| v.get("query").and_then(|q| q.as_str()).map(str::to_string))
            .unwrap_or_default();

        match self.resolve_web_search(&query, web_search_model).await {
            Ok(result_text) => WebSearchOutcome::ToolResultInjected {
                text_blocks,
                tool_use_id,
                result_text,
            },
            Err(e) => {
                tracing::warn!(error = %e, "secondary web-search call failed");
                WebSearchOutcome::Error { text_blocks, tool_use_id }
            }
        }
    }
}

#[async_trait]
impl Adapter for GroqAdapter {
    async fn handle(&self, request: ClientMessage) -> Result<AdapterResponse, AdapterError> {
        let selection = self.select(&request);
        let stream = request.stream;

        let mut backend_request = to_backend(
            &request,
            &self.registry,
            self.os,
            selection.reasoning_effort,
            self.max_tokens_ceiling,
        )?;
        backend_request.model = selection.model_id.clone();

        if stream {
            // Web-search interception is a non-streaming secondary call by
            // construction (§4.5 step 2); a streaming primary response relays
            // as-is, leaving any web_search tool_use for the client to see.
            let deltas = self.client.send_streaming(&backend_request).await?;
            return Ok(AdapterResponse::Stream(relay_stream(
                deltas,
                BackendClient::inter_chunk_timeout(),
                self.registry.clone(),
            )));
        }

        let response = self.client.send(&backend_request).await?;

        if !selection.web_search_required {
            return Ok(AdapterResponse::Final(to_client_final(&response, &self.registry)));
        }

        let Some(web_search_model) = self.catalog.web_search_model.clone() else {
            return Ok(AdapterResponse::Final(to_client_final(&response, &self.registry)));
        };

        let outcome = self.intercept(response, &web_search_model).await;
        Ok(AdapterResponse::Final(render_outcome(outcome)))
    }

    fn tool_count(&self) -> usize {
        self.registry.len()
    }
}

fn render_outcome(outcome: WebSearchOutcome) -> ClientResponse {
    match outcome {
        WebSearchOutcome::Plain(response) => {
            let stop_reason = match response
                .choices
                .first()
                .and_then(|c| c.finish_reason.as_deref())
                .map(FinishReason::parse)
            {
                Some(FinishReason::ToolCalls) => StopReason::ToolUse,
                Some(FinishReason::Length) => StopReason::MaxTokens,
                _ => StopReason::EndTurn,
            };
            let usage = response
                .usage
                .as_ref()
                .map(|u| Usage {
                    input_tokens: u.prompt_tokens,
                    output_tokens: u.completion_tokens,
                })
                .unwrap_or_default();
            let content = response
                .choices
                .first()
                .and_then(|c| c.message.content.clone())
                .filter(|t| !t.is_empty())
                .map(|text| vec![ContentBlock::Text { text }])
                .unwrap_or_default();
            ClientResponse::new(synth_message_id(), content, stop_reason, usage)
        }
        WebSearchOutcome::ToolResultInjected {
            mut text_blocks,
            tool_use_id,
            result_text,
        } => {
            text_blocks.push(ContentBlock::ToolResult {
                tool_use_id,
                content: ToolResultOutcome::Text(result_text),
                is_error: false,
            });
            ClientResponse::new(synth_message_id(), text_blocks, StopReason::EndTurn, Usage::default())
        }
        WebSearchOutcome::Error {
            mut text_blocks,
            tool_use_id,
        } => {
            text_blocks.push(ContentBlock::ToolResult {
                tool_use_id,
                content: ToolResultOutcome::Text("web search unavailable".to_string()),
                is_error: true,
            });
            ClientResponse::new(synth_message_id(), text_blocks, StopReason::EndTurn, Usage::default())
        }
    }
}

fn synth_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}
