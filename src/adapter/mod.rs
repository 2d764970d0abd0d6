//! Adapter (§4.5): combines Registry, Transformer, Selector, and Client into
//! one backend-specific `handle()` surface.

pub mod groq;
pub mod xai;

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt, stream};
use thiserror::Error;

use crate::backend_client::BackendError;
use crate::backend_schema::BackendDelta;
use crate::client_schema::{ClientEvent, ClientMessage, ClientResponse};
use crate::registry::{RegistryError, ToolRegistry};
use crate::transform::{StreamAccumulator, TransformError};

pub use groq::GroqAdapter;
pub use xai::XaiAdapter;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// What `Adapter::handle` hands back to the server: a whole response, or a
/// stream of client-visible events relayed as `text/event-stream`.
pub enum AdapterResponse {
    Final(ClientResponse),
    Stream(Pin<Box<dyn Stream<Item = ClientEvent> + Send>>),
}

#[async_trait::async_trait]
pub trait Adapter: Send + Sync {
    async fn handle(&self, request: ClientMessage) -> Result<AdapterResponse, AdapterError>;

    fn tool_count(&self) -> usize;
}

/// Drains a stream of backend deltas through a `StreamAccumulator`, enforcing
/// the inter-chunk timeout (§4.4) and translating a stalled/failed backend
/// into a terminal error frame rather than an abrupt close (§7). `registry`
/// is applied to each streamed tool-call the same way as the non-streaming path.
pub(crate) fn relay_stream<S>(
    deltas: S,
    inter_chunk_timeout: Duration,
    registry: ToolRegistry,
) -> Pin<Box<dyn Stream<Item = ClientEvent> + Send>>
where
    S: Stream<Item = Result<BackendDelta, BackendError>> + Send + Unpin + 'static,
{
    struct State<S> {
        deltas: S,
        acc: StreamAccumulator,
        registry: ToolRegistry,
        pending: VecDeque<ClientEvent>,
        done: bool,
    }

    let initial = State {
        deltas,
        acc: StreamAccumulator::new(),
        registry,
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(initial, move |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.done {
                return None;
            }
            match tokio::time::timeout(inter_chunk_timeout, state.deltas.next()).await {
                Ok(Some(Ok(delta))) => {
                    let events = state.acc.apply(&delta, &state.registry);
                    state.pending.extend(events);
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!(error = %e, "backend stream failed mid-flight");
                    state.pending.extend(state.acc.abort_with_error());
                    state.done = true;
                }
                Err(_) => {
                    tracing::warn!("backend stream stalled past the inter-chunk timeout");
                    state.pending.extend(state.acc.abort_with_error());
                    state.done = true;
                }
                Ok(None) => state.done = true,
            }
        }
    }))
}
