//! Configuration (§6, §10.3): a single immutable `Config`, built once at
//! startup from environment variables and CLI flags. CLI flags win.

use std::sync::Once;

use thiserror::Error;

use crate::cli::{AdapterKind, Cli};
use crate::os_family::OsFamily;
use crate::selector::{HaikuExplainEffort, ModelCatalog};

static DOTENV_ONCE: Once = Once::new();

/// Load `~/.env` into the process environment exactly once.
///
/// Must be called early in `main()` before spawning concurrent tasks.
/// Uses `Once` to guarantee single execution — safe to call multiple times
/// but only the first call has any effect.
pub fn load_dotenv() {
    DOTENV_ONCE.call_once(|| {
        let env_path = dirs::home_dir()
            .map(|h| h.join(".env"))
            .filter(|p| p.is_file());
        if let Some(env_file) = env_path
            && let Ok(contents) = std::fs::read_to_string(&env_file)
        {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    // SAFETY: no user tasks have been spawned yet; `Once` ensures
                    // this runs at most once.
                    unsafe { std::env::set_var(key.trim(), value.trim()) };
                }
            }
        }
    });
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set; the {adapter} adapter needs a backend credential")]
    MissingCredential { adapter: AdapterKind },

    #[error("CLAUDEPROXY_ADAPTER must be 'xai' or 'groq', got '{0}'")]
    InvalidAdapter(String),

    #[error("CLAUDEPROXY_PORT must be a valid port number, got '{0}'")]
    InvalidPort(String),
}

/// Immutable process configuration, built once and shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Config {
    pub adapter: AdapterKind,
    pub port: u16,
    pub base_url: String,
    pub credential: String,
    pub os: OsFamily,
    pub log_level: String,
    pub haiku_explain_effort: HaikuExplainEffort,
    /// Backend max-tokens ceiling (§4.2): 8192 for both backends in scope.
    pub max_tokens_ceiling: u32,
}

impl Config {
    /// Resolves configuration from environment variables, with CLI flags
    /// overriding their environment-variable counterparts (§6).
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let adapter = match cli.adapter {
            Some(adapter) => adapter,
            None => {
                let raw = std::env::var("CLAUDEPROXY_ADAPTER").unwrap_or_else(|_| "xai".to_string());
                AdapterKind::parse(&raw).ok_or(ConfigError::InvalidAdapter(raw))?
            }
        };

        let port = match cli.port {
            Some(port) => port,
            None => match std::env::var("CLAUDEPROXY_PORT") {
                Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?,
                Err(_) => adapter.default_port(),
            },
        };

        let credential_var = adapter.credential_env_var();
        let credential = std::env::var(credential_var).map_err(|_| ConfigError::MissingCredential { adapter })?;

        let os = match std::env::var("CLAUDEPROXY_OS_OVERRIDE").ok().as_deref().and_then(OsFamily::parse) {
            Some(os) => os,
            None => OsFamily::detect(),
        };

        let log_level = std::env::var("CLAUDEPROXY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let haiku_explain_effort = match std::env::var("CLAUDEPROXY_HAIKU_EXPLAIN_EFFORT")
            .unwrap_or_else(|_| "fast".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "high" => HaikuExplainEffort::High,
            _ => HaikuExplainEffort::Fast,
        };

        Ok(Self {
            adapter,
            port,
            base_url: adapter.base_url().to_string(),
            credential,
            os,
            log_level,
            haiku_explain_effort,
            max_tokens_ceiling: 8192,
        })
    }

    /// Builds the model catalog this adapter's Selector chooses between.
    /// Model identifiers are the backend's own naming; no catalog entry is
    /// user-configurable beyond the haiku/explain knob (§4.3).
    pub fn model_catalog(&self) -> ModelCatalog {
        match self.adapter {
            AdapterKind::Xai => ModelCatalog {
                web_search_model: None,
                high_reasoning_model: "grok-4".to_string(),
                fast_coding_model: "grok-code-fast-1".to_string(),
                general_model: "grok-4-fast".to_string(),
                haiku_explain_effort: self.haiku_explain_effort,
            },
            AdapterKind::Groq => ModelCatalog {
                web_search_model: Some("groq/compound".to_string()),
                high_reasoning_model: "openai/gpt-oss-120b".to_string(),
                fast_coding_model: "llama-3.3-70b-versatile".to_string(),
                general_model: "llama-3.1-8b-instant".to_string(),
                haiku_explain_effort: self.haiku_explain_effort,
            },
        }
    }
}
