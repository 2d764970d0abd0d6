//! Thin per-backend HTTP client (§4.4): auth, timeouts, streaming, and retry.
//!
//! Grounded on the teacher's `backend/http.rs` (timeout + response-mapping
//! style) and on `anthropic-async`'s `client.rs` (status-driven retry
//! decision, `Retry-After` parsing).

use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use sse_stream::SseStream;
use tracing::debug;

use crate::backend_schema::{BackendDelta, BackendRequest, BackendResponse};

use super::error::BackendError;
use super::retry::retry_with_backoff;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const FIRST_BYTE_TIMEOUT: Duration = Duration::from_secs(60);
const INTER_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

/// One backend's HTTP surface: a base URL plus the bearer credential used to
/// authenticate every outgoing request. Credentials are read once at start
/// and never logged (§4.4, §4.8).
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    credential: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, credential: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(32)
            .build()
            .expect("building the shared reqwest client never fails with this configuration");
        Self {
            http,
            base_url: base_url.into(),
            credential: credential.into(),
        }
    }

    /// Sends a non-streaming chat-completions request, retrying idempotent
    /// transport failures, 429s, and 5xx with bounded exponential backoff.
    pub async fn send(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError> {
        retry_with_backoff(|| self.send_once(request)).await
    }

    async fn send_once(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError> {
        let response = tokio::time::timeout(
            FIRST_BYTE_TIMEOUT,
            self.http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.credential)
                .json(request)
                .send(),
        )
        .await
        .map_err(|_| BackendError::network("timed out waiting for the backend's first byte"))?
        .map_err(|e| BackendError::network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<BackendResponse>()
                .await
                .map_err(|e| BackendError::protocol(format!("malformed backend response body: {e}")));
        }

        Err(classify_error_status(status, &response).await)
    }

    /// Opens a streaming chat-completions call. Per §4.4/§9, a stream that
    /// drops mid-flight after any byte has been forwarded is NOT retried here
    /// — only the initial connection/response is subject to retry, via the
    /// same `retry_with_backoff` driver `send()` uses around `send_once`.
    pub async fn send_streaming(
        &self,
        request: &BackendRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<BackendDelta, BackendError>> + Send>>, BackendError> {
        let response = retry_with_backoff(|| self.connect_streaming(request)).await?;

        let byte_stream = SseStream::from_byte_stream(response.bytes_stream());
        Ok(byte_stream
            .filter_map(|frame| async move {
                let frame = match frame {
                    Ok(f) => f,
                    Err(e) => return Some(Err(BackendError::protocol(e.to_string()))),
                };
                let data = frame.data?;
                if data.trim() == "[DONE]" {
                    return None;
                }
                match serde_json::from_str::<BackendDelta>(&data) {
                    Ok(delta) => Some(Ok(delta)),
                    Err(e) => {
                        debug!(error = %e, "dropping unparseable SSE frame");
                        None
                    }
                }
            })
            .boxed())
    }

    /// Per-chunk read timeout while draining a streaming response; the caller
    /// wraps each `.next().await` with this so a stalled backend is detected.
    pub fn inter_chunk_timeout() -> Duration {
        INTER_CHUNK_TIMEOUT
    }

    /// The retryable half of `send_streaming`: connect and classify the opening
    /// response, stopping before any body byte is read.
    async fn connect_streaming(&self, request: &BackendRequest) -> Result<reqwest::Response, BackendError> {
        let response = tokio::time::timeout(
            FIRST_BYTE_TIMEOUT,
            self.http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.credential)
                .json(request)
                .send(),
        )
        .await
        .map_err(|_| BackendError::network("timed out waiting for the backend's first byte"))?
        .map_err(|e| BackendError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_error_status(status, &response).await);
        }
        Ok(response)
    }
}

async fn classify_error_status(status: reqwest::StatusCode, response: &reqwest::Response) -> BackendError {
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);

    match status.as_u16() {
        401 | 403 => BackendError::auth(status.as_u16()),
        429 => BackendError::rate_limited(status.as_u16(), retry_after),
        400..=499 => BackendError::bad_request(status.as_u16(), format!("backend rejected request with {status}")),
        500..=599 => BackendError::server_error(status.as_u16()),
        _ => BackendError::protocol(format!("unexpected backend status {status}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_is_constructed_with_shared_connection_pool() {
        let client = BackendClient::new("https://api.example.com/v1", "secret-token");
        assert_eq!(client.base_url, "https://api.example.com/v1");
    }

    #[test]
    fn inter_chunk_timeout_matches_spec() {
        assert_eq!(BackendClient::inter_chunk_timeout(), Duration::from_secs(30));
    }
}
