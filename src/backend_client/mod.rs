//! HTTP transport to a single OpenAI-chat-completions-shaped backend (§4.4).

pub mod error;
pub mod http;
pub mod retry;

pub use error::{BackendError, BackendErrorKind};
pub use http::BackendClient;
