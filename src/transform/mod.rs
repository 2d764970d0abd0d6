//! Message Transformer (§4.2): pure, side-effect-free translation between the
//! client's Anthropic-messages schema and a backend's chat-completions schema.

pub mod request;
pub mod response;
pub mod stream;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use thiserror::Error;

use crate::registry::RegistryError;

#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("tool_result '{id}' has no matching tool_use earlier in the request")]
    DanglingToolResult { id: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub use request::to_backend;
pub use response::to_client_final;
pub use stream::StreamAccumulator;

/// Derives a stable `call_<hex16>` client-visible id from a backend call id, so
/// the same backend call id always maps to the same client id across retries.
pub fn synth_tool_use_id(backend_call_id: &str) -> String {
    let mut hasher = DefaultHasher::new();
    backend_call_id.hash(&mut hasher);
    format!("call_{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synth_tool_use_id_is_stable() {
        assert_eq!(synth_tool_use_id("abc123"), synth_tool_use_id("abc123"));
    }

    #[test]
    fn synth_tool_use_id_differs_for_different_input() {
        assert_ne!(synth_tool_use_id("abc123"), synth_tool_use_id("xyz789"));
    }
}
