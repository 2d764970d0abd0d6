//! Host OS family detection, used to template tool descriptions (§4.1).

use std::fmt;

/// One of the three OS families the Registry templates tool descriptions for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Windows,
    Unix,
    Darwin,
}

impl OsFamily {
    /// Detects the host OS family, honoring `CLAUDEPROXY_OS_OVERRIDE` for testability.
    pub fn detect() -> Self {
        if let Ok(raw) = std::env::var("CLAUDEPROXY_OS_OVERRIDE")
            && let Some(parsed) = Self::parse(&raw)
        {
            return parsed;
        }
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Darwin
        } else {
            Self::Unix
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "windows" => Some(Self::Windows),
            "unix" => Some(Self::Unix),
            "darwin" => Some(Self::Darwin),
            _ => None,
        }
    }

    /// Shell example used to template run_bash-style tool descriptions.
    pub fn shell_example(self) -> &'static str {
        match self {
            Self::Windows => r"dir C:\Users",
            Self::Unix | Self::Darwin => "ls -la /home",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Windows => "windows",
            Self::Unix => "unix",
            Self::Darwin => "darwin",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_display() {
        for family in [OsFamily::Windows, OsFamily::Unix, OsFamily::Darwin] {
            let s = family.to_string();
            assert_eq!(OsFamily::parse(&s), Some(family));
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_eq!(OsFamily::parse("plan9"), None);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(OsFamily::parse("WINDOWS"), Some(OsFamily::Windows));
    }
}
