//! Proxy Server (§4.6): the HTTP front. Loopback-only by default.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::adapter::{Adapter, AdapterResponse};
use crate::client_schema::{ClientEvent, ClientMessage};
use crate::error::ProxyError;

/// A fixed field identifying this proxy on `/healthz`, used both as a plain
/// health check and as the restart-detection sentinel (§4.6).
pub const HEALTH_SENTINEL_SERVICE: &str = "claudeproxy";

/// RAII guard tracking in-flight requests for the Runtime Console's drain
/// loop, grounded on the teacher's `CallGuard`/`stop_all` pattern.
struct RequestGuard(Arc<AtomicUsize>);

impl RequestGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct AppState {
    pub adapter: Arc<dyn Adapter>,
    pub in_flight: Arc<AtomicUsize>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/messages", post(messages))
        .route("/healthz", get(healthz))
        .fallback(any(not_found))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, router: Router, shutdown: Arc<Notify>) -> anyhow::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.notified().await })
        .await?;
    Ok(())
}

#[derive(Serialize, serde::Deserialize)]
struct HealthBody {
    service: String,
    status: String,
}

async fn healthz() -> Json<HealthBody> {
    Json(HealthBody {
        service: HEALTH_SENTINEL_SERVICE.to_string(),
        status: "ok".to_string(),
    })
}

async fn not_found() -> Response {
    (
        axum::http::StatusCode::NOT_FOUND,
        Json(json!({
            "type": "error",
            "error": {"type": "not_found_error", "message": "no such route"},
        })),
    )
        .into_response()
}

async fn messages(State(state): State<AppState>, body: Bytes) -> Response {
    let _guard = RequestGuard::new(&state.in_flight);

    let request: ClientMessage = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return ProxyError::InvalidClientRequest(format!("malformed request body: {e}")).into_response();
        }
    };

    info!(model = %request.model, stream = request.stream, "handling /v1/messages");

    match state.adapter.handle(request).await {
        Ok(AdapterResponse::Final(response)) => Json(response).into_response(),
        Ok(AdapterResponse::Stream(events)) => stream_response(events).into_response(),
        Err(e) => {
            let err: ProxyError = e.into();
            warn!(error = %err, "request failed");
            err.into_response()
        }
    }
}

fn stream_response(
    events: std::pin::Pin<Box<dyn Stream<Item = ClientEvent> + Send>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let sse_events = events.map(|event| {
        let event_name = event_name(&event);
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().event(event_name).data(data))
    });
    Sse::new(sse_events).keep_alive(axum::response::sse::KeepAlive::new().interval(Duration::from_secs(15)))
}

fn event_name(event: &ClientEvent) -> &'static str {
    match event {
        ClientEvent::MessageStart { .. } => "message_start",
        ClientEvent::ContentBlockStart { .. } => "content_block_start",
        ClientEvent::ContentBlockDelta { .. } => "content_block_delta",
        ClientEvent::ContentBlockStop { .. } => "content_block_stop",
        ClientEvent::MessageDelta { .. } => "message_delta",
        ClientEvent::MessageStop => "message_stop",
    }
}

/// Outcome of probing the configured port before binding (§4.6).
pub enum PortProbe {
    Free,
    OccupiedByEarlierInstance,
    OccupiedByOther,
}

/// Probes `127.0.0.1:{port}/healthz`, distinguishing an earlier instance of
/// this proxy (matched by the sentinel) from an unrelated occupant.
pub async fn probe_port(port: u16) -> PortProbe {
    let url = format!("http://127.0.0.1:{port}/healthz");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(500))
        .build()
        .expect("building a short-timeout probe client never fails");

    match client.get(&url).send().await {
        Ok(response) => match response.json::<HealthBody>().await {
            Ok(body) if body.service == HEALTH_SENTINEL_SERVICE => PortProbe::OccupiedByEarlierInstance,
            _ => PortProbe::OccupiedByOther,
        },
        Err(_) => PortProbe::Free,
    }
}
