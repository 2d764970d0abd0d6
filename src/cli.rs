use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(
    name = "claudeproxy",
    version,
    about = "Local proxy translating Anthropic-messages requests into xAI/Groq chat-completions calls"
)]
pub struct Cli {
    /// Which backend to translate to. Overrides CLAUDEPROXY_ADAPTER when set.
    #[arg(long, value_enum)]
    pub adapter: Option<AdapterKind>,

    /// Listening port. Overrides CLAUDEPROXY_PORT when set.
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum AdapterKind {
    Xai,
    Groq,
}

impl AdapterKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "xai" => Some(Self::Xai),
            "groq" => Some(Self::Groq),
            _ => None,
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Xai => 5000,
            Self::Groq => 5003,
        }
    }

    pub fn credential_env_var(self) -> &'static str {
        match self {
            Self::Xai => "CLAUDEPROXY_XAI_API_KEY",
            Self::Groq => "CLAUDEPROXY_GROQ_API_KEY",
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Self::Xai => "https://api.x.ai/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
        }
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Xai => write!(f, "xai"),
            Self::Groq => write!(f, "groq"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(AdapterKind::parse("XAI"), Some(AdapterKind::Xai));
        assert_eq!(AdapterKind::parse("groq"), Some(AdapterKind::Groq));
        assert_eq!(AdapterKind::parse("bogus"), None);
    }

    #[test]
    fn default_ports_match_spec() {
        assert_eq!(AdapterKind::Xai.default_port(), 5000);
        assert_eq!(AdapterKind::Groq.default_port(), 5003);
    }
}
