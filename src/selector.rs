//! Model Selector (§4.3): a pure function from request content to `(model_id, reasoning_effort)`.

use crate::backend_schema::ReasoningEffort;

const HIGH_REASONING_MODEL_MARKERS: &[&str] = &["opus", "reasoning", "think"];
const REASONING_KEYWORDS: &[&str] = &[
    "analyse",
    "analyze",
    "prove",
    "derive",
    "explain why",
    "design",
    "architecture",
    "trade-off",
    "tradeoff",
    "complexity",
    "proof",
    "theorem",
];
const CODING_KEYWORDS: &[&str] = &[
    "code",
    "function",
    "compile",
    "refactor",
    "bug",
    "stack trace",
    "test",
    "lint",
    "repo",
];
const WEB_SEARCH_TOOLS: &[&str] = &["web_search", "browser_search"];

/// How the Selector resolves the "fast model with no dedicated explain mode"
/// ambiguity noted in §4.3/§9: a config knob rather than a hardcoded default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaikuExplainEffort {
    Fast,
    High,
}

/// The backend-specific model identifiers the Selector chooses between.
/// One instance per adapter, built once at startup from `Config`.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    pub web_search_model: Option<String>,
    pub high_reasoning_model: String,
    pub fast_coding_model: String,
    pub general_model: String,
    pub haiku_explain_effort: HaikuExplainEffort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub model_id: String,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub web_search_required: bool,
}

/// Chooses `(model_id, reasoning_effort)` per the deterministic priority list in §4.3.
/// Pure function of its inputs; no I/O.
pub fn select(
    catalog: &ModelCatalog,
    client_model: &str,
    user_text: &str,
    tool_names: &[&str],
) -> Selection {
    let lowered_text = user_text.to_ascii_lowercase();
    let lowered_model = client_model.to_ascii_lowercase();

    // Rule 1: web-search tool declared and the backend has a search-capable model.
    if let Some(web_model) = &catalog.web_search_model
        && tool_names.iter().any(|t| WEB_SEARCH_TOOLS.contains(t))
    {
        return Selection {
            model_id: web_model.clone(),
            reasoning_effort: None,
            web_search_required: true,
        };
    }

    // Rule 2: client model string marks high-reasoning intent.
    if HIGH_REASONING_MODEL_MARKERS
        .iter()
        .any(|marker| lowered_model.contains(marker))
    {
        return high_reasoning_or_haiku_explain(catalog, &lowered_model, &lowered_text);
    }

    // Rule 3: text matches a reasoning keyword.
    if REASONING_KEYWORDS.iter().any(|kw| lowered_text.contains(kw)) {
        return Selection {
            model_id: catalog.high_reasoning_model.clone(),
            reasoning_effort: Some(ReasoningEffort::High),
            web_search_required: false,
        };
    }

    // Rule 4: text matches a coding keyword.
    if CODING_KEYWORDS.iter().any(|kw| lowered_text.contains(kw)) {
        return Selection {
            model_id: catalog.fast_coding_model.clone(),
            reasoning_effort: Some(ReasoningEffort::Medium),
            web_search_required: false,
        };
    }

    // Rule 5: default.
    Selection {
        model_id: catalog.general_model.clone(),
        reasoning_effort: Some(ReasoningEffort::Medium),
        web_search_required: false,
    }
}

/// `claude-3-5-haiku` matching the "high-reasoning" marker list only happens
/// via the "think"/"reasoning" substrings, which haiku's name never contains —
/// so this only special-cases haiku's "explain" interaction per the §9 knob.
fn high_reasoning_or_haiku_explain(
    catalog: &ModelCatalog,
    lowered_model: &str,
    lowered_text: &str,
) -> Selection {
    if lowered_model.contains("haiku") && lowered_text.contains("explain") {
        return match catalog.haiku_explain_effort {
            HaikuExplainEffort::Fast => Selection {
                model_id: catalog.fast_coding_model.clone(),
                reasoning_effort: Some(ReasoningEffort::Medium),
                web_search_required: false,
            },
            HaikuExplainEffort::High => Selection {
                model_id: catalog.high_reasoning_model.clone(),
                reasoning_effort: Some(ReasoningEffort::High),
                web_search_required: false,
            },
        };
    }
    Selection {
        model_id: catalog.high_reasoning_model.clone(),
        reasoning_effort: Some(ReasoningEffort::High),
        web_search_required: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ModelCatalog {
        ModelCatalog {
            web_search_model: Some("backend-web-search".into()),
            high_reasoning_model: "backend-high".into(),
            fast_coding_model: "backend-fast".into(),
            general_model: "backend-general".into(),
            haiku_explain_effort: HaikuExplainEffort::Fast,
        }
    }

    #[test]
    fn is_deterministic() {
        let c = catalog();
        let a = select(&c, "claude-3-5-sonnet", "refactor this function", &[]);
        let b = select(&c, "claude-3-5-sonnet", "refactor this function", &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn web_search_tool_wins_over_everything() {
        let c = catalog();
        let s = select(&c, "opus-reasoning", "prove this theorem", &["web_search"]);
        assert_eq!(s.model_id, "backend-web-search");
        assert_eq!(s.reasoning_effort, None);
        assert!(s.web_search_required);
    }

    #[test]
    fn opus_marker_selects_high_reasoning() {
        let c = catalog();
        let s = select(&c, "claude-opus-4", "say hi", &[]);
        assert_eq!(s.model_id, "backend-high");
        assert_eq!(s.reasoning_effort, Some(ReasoningEffort::High));
    }

    #[test]
    fn reasoning_keyword_selects_high_reasoning() {
        let c = catalog();
        let s = select(&c, "claude-3-5-sonnet", "design the architecture", &[]);
        assert_eq!(s.model_id, "backend-high");
        assert_eq!(s.reasoning_effort, Some(ReasoningEffort::High));
    }

    #[test]
    fn coding_keyword_selects_fast_model() {
        let c = catalog();
        let s = select(&c, "claude-3-5-sonnet", "fix this bug in the repo", &[]);
        assert_eq!(s.model_id, "backend-fast");
        assert_eq!(s.reasoning_effort, Some(ReasoningEffort::Medium));
    }

    #[test]
    fn default_is_general_medium() {
        let c = catalog();
        let s = select(&c, "claude-3-5-sonnet", "say hi", &[]);
        assert_eq!(s.model_id, "backend-general");
        assert_eq!(s.reasoning_effort, Some(ReasoningEffort::Medium));
    }

    #[test]
    fn haiku_explain_defaults_to_fast_model() {
        let c = catalog();
        let s = select(&c, "claude-3-5-haiku", "explain this code", &[]);
        assert_eq!(s.model_id, "backend-fast");
    }

    #[test]
    fn haiku_explain_honors_high_knob() {
        let mut c = catalog();
        c.haiku_explain_effort = HaikuExplainEffort::High;
        let s = select(&c, "claude-3-5-haiku", "explain this code", &[]);
        assert_eq!(s.model_id, "backend-high");
    }
}
