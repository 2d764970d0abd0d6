//! Backend transport error taxonomy (§4.4), grounded on the teacher's `backend/error.rs` style.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    Network,
    Auth,
    RateLimited,
    BadRequest,
    ServerError,
    Protocol,
}

#[derive(Debug, Error)]
#[error("backend error ({kind:?}, status={http_status:?}): {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub http_status: Option<u16>,
    pub retryable: bool,
    pub message: String,
    pub retry_after: Option<std::time::Duration>,
}

impl BackendError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Network,
            http_status: None,
            retryable: true,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn auth(status: u16) -> Self {
        Self {
            kind: BackendErrorKind::Auth,
            http_status: Some(status),
            retryable: false,
            message: "backend rejected the credential".to_string(),
            retry_after: None,
        }
    }

    pub fn rate_limited(status: u16, retry_after: Option<std::time::Duration>) -> Self {
        Self {
            kind: BackendErrorKind::RateLimited,
            http_status: Some(status),
            retryable: true,
            message: "backend rate limit exceeded".to_string(),
            retry_after,
        }
    }

    pub fn bad_request(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::BadRequest,
            http_status: Some(status),
            retryable: false,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn server_error(status: u16) -> Self {
        Self {
            kind: BackendErrorKind::ServerError,
            http_status: Some(status),
            retryable: true,
            message: "backend returned a server error".to_string(),
            retry_after: None,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Protocol,
            http_status: None,
            retryable: false,
            message: message.into(),
            retry_after: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_is_not_retryable() {
        let err = BackendError::auth(401);
        assert!(!err.retryable);
        assert_eq!(err.kind, BackendErrorKind::Auth);
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let err = BackendError::rate_limited(429, Some(std::time::Duration::from_secs(2)));
        assert!(err.retryable);
        assert_eq!(err.retry_after, Some(std::time::Duration::from_secs(2)));
    }

    #[test]
    fn message_mentions_kind_and_status() {
        let err = BackendError::server_error(502);
        let s = err.to_string();
        assert!(s.contains("502"));
    }
}
