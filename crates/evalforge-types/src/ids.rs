//! Identifier generation for runs, suggestions, and drafts.

use chrono::Utc;
use rand::Rng;

fn hex_suffix(len: usize) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}

/// `run_{YYYYmmdd_HHMMSS}_{8 hex}` — sortable by start time, unique per run.
#[must_use]
pub fn new_run_id() -> String {
    format!(
        "run_{}_{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        hex_suffix(8)
    )
}

/// `sugg_{12 hex}`.
#[must_use]
pub fn new_suggestion_id() -> String {
    format!("sugg_{}", hex_suffix(12))
}

/// Draft ids are prefixed per artifact kind, e.g. `eval_{12 hex}`.
#[must_use]
pub fn new_draft_id(prefix: &str) -> String {
    format!("{}_{}", prefix, hex_suffix(12))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique_and_prefixed() {
        let a = new_run_id();
        let b = new_run_id();
        assert!(a.starts_with("run_"));
        assert_ne!(a, b);
    }

    #[test]
    fn suggestion_id_shape() {
        let id = new_suggestion_id();
        assert!(id.starts_with("sugg_"));
        assert_eq!(id.len(), "sugg_".len() + 12);
    }

    #[test]
    fn draft_id_uses_prefix() {
        assert!(new_draft_id("guard").starts_with("guard_"));
    }
}
