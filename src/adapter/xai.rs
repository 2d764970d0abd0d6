//! xAI-style adapter (§4.5): straight passthrough, no web-search interception.

use async_trait::async_trait;

use crate::backend_client::BackendClient;
use crate::client_schema::{ClientMessage, Role};
use crate::os_family::OsFamily;
use crate::registry::ToolRegistry;
use crate::selector::{self, ModelCatalog};
use crate::transform::{to_backend, to_client_final};

use super::{Adapter, AdapterError, AdapterResponse, relay_stream};

pub struct XaiAdapter {
    client: BackendClient,
    registry: ToolRegistry,
    catalog: ModelCatalog,
    os: OsFamily,
    max_tokens_ceiling: u32,
}

impl XaiAdapter {
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
}

#[async_trait]
impl Adapter for XaiAdapter {
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
        backend_request.model = selection.model_id;

        if stream {
            let deltas = self.client.send_streaming(&backend_request).await?;
            Ok(AdapterResponse::Stream(relay_stream(
                deltas,
                BackendClient::inter_chunk_timeout(),
                self.registry.clone(),
            )))
        } else {
            let response = self.client.send(&backend_request).await?;
            Ok(AdapterResponse::Final(to_client_final(&response, &self.registry)))
        }
    }

    fn tool_count(&self) -> usize {
        self.registry.len()
    }
}
