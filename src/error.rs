//! Top-level error taxonomy (§7): unifies typed module errors into the HTTP
//! shape the Server renders, never leaking a raw backend error to the client.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::adapter::AdapterError;
use crate::backend_client::{BackendError, BackendErrorKind};
use crate::registry::RegistryError;
use crate::transform::TransformError;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid request: {0}")]
    InvalidClientRequest(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("internal error (incident {incident_id})")]
    Internal { incident_id: String, source: anyhow::Error },
}

impl ProxyError {
    /// Wraps any non-typed failure as `InternalError` with a fresh incident id,
    /// logging the full chain at `error` (§7) without ever returning it to the client.
    pub fn internal(source: anyhow::Error) -> Self {
        let incident_id = Uuid::new_v4().to_string();
        tracing::error!(incident_id = %incident_id, error = format!("{source:#}"), "internal error");
        Self::Internal { incident_id, source }
    }
}

impl From<AdapterError> for ProxyError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Transform(e) => Self::Transform(e),
            AdapterError::Registry(e) => Self::Registry(e),
            AdapterError::Backend(e) => Self::Backend(e),
        }
    }
}

#[derive(Serialize)]
struct ClientErrorBody {
    #[serde(rename = "type")]
    kind: &'static str,
    error: ClientErrorDetail,
}

#[derive(Serialize)]
struct ClientErrorDetail {
    #[serde(rename = "type")]
    kind: &'static str,
    message: String,
}

fn error_response(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ClientErrorBody {
            kind: "error",
            error: ClientErrorDetail {
                kind,
                message: message.into(),
            },
        }),
    )
        .into_response()
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidClientRequest(message) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_request_error", message)
            }
            Self::Transform(TransformError::DanglingToolResult { id }) => error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                format!("tool_result '{id}' has no matching tool_use earlier in the request"),
            ),
            Self::Transform(TransformError::Registry(e)) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_request_error", e.to_string())
            }
            Self::Registry(e) => error_response(StatusCode::BAD_REQUEST, "invalid_request_error", e.to_string()),
            Self::Backend(err) => backend_error_response(err),
            Self::Internal { incident_id, .. } => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "api_error",
                format!("internal error, incident {incident_id}"),
            ),
        }
    }
}

fn backend_error_response(err: BackendError) -> Response {
    match err.kind {
        BackendErrorKind::Auth => error_response(
            StatusCode::UNAUTHORIZED,
            "authentication_error",
            "the backend rejected the configured credential",
        ),
        BackendErrorKind::RateLimited => {
            let mut response = error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_error",
                "backend rate limit exceeded",
            );
            if let Some(retry_after) = err.retry_after
                && let Ok(value) = axum::http::HeaderValue::from_str(&retry_after.as_secs().to_string())
            {
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, value);
            }
            response
        }
        BackendErrorKind::BadRequest => {
            error_response(StatusCode::BAD_GATEWAY, "api_error", err.message)
        }
        BackendErrorKind::ServerError | BackendErrorKind::Network | BackendErrorKind::Protocol => {
            error_response(StatusCode::BAD_GATEWAY, "api_error", "the backend is unavailable")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_maps_to_401() {
        let err = ProxyError::Backend(BackendError::auth(401));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn rate_limited_maps_to_429() {
        let err = ProxyError::Backend(BackendError::rate_limited(429, Some(std::time::Duration::from_secs(2))));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(axum::http::header::RETRY_AFTER).is_some());
    }

    #[test]
    fn server_error_maps_to_502() {
        let err = ProxyError::Backend(BackendError::server_error(500));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn invalid_request_maps_to_400() {
        let err = ProxyError::InvalidClientRequest("missing field".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
