//! Placeholder detection for generated configuration values.
//!
//! A guardrail whose configuration says "TODO" is not deployable; drafts
//! containing any of these tokens are demoted to `needs_human_input`.

const PLACEHOLDER_TOKENS: &[&str] = &[
    "todo",
    "tbd",
    "placeholder",
    "fixme",
    "xxx",
    "[value]",
    "<value>",
    "changeme",
    "your_",
    "example.com",
];

/// Case-insensitive substring check against the placeholder token list.
#[must_use]
pub fn contains_placeholder(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let lower = text.to_lowercase();
    PLACEHOLDER_TOKENS.iter().any(|token| lower.contains(token))
}
