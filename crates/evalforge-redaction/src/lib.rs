//! PII detection and redaction for trace payloads and LLM-produced text.
//!
//! Two surfaces share one pattern table: free-text redaction (evidence
//! excerpts, generated draft fields) and structured trace sanitization
//! (dotted-path stripping plus wholesale replacement of prompt/response
//! bodies). User identifiers are never stored raw; they are hashed with a
//! deployment salt so recurrence analysis stays possible without identity.

use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Definition of a PII pattern: the canonical source of truth used for
/// runtime redaction and for test validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PiiPatternDef {
    /// Unique identifier (e.g. "email").
    pub id: &'static str,
    /// The regex pattern string.
    pub regex: &'static str,
    /// Fixed replacement token.
    pub token: &'static str,
}

/// Canonical list of PII patterns.
///
/// Order matters: card numbers are matched before phone numbers so a 16-digit
/// PAN is not partially consumed as a phone match.
pub static PII_PATTERNS: &[PiiPatternDef] = &[
    PiiPatternDef {
        id: "email",
        regex: r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
        token: "[EMAIL_REDACTED]",
    },
    PiiPatternDef {
        id: "payment_card",
        regex: r"\b(?:\d[ -]?){13,16}\b",
        token: "[CARD_REDACTED]",
    },
    PiiPatternDef {
        id: "ssn",
        regex: r"\b\d{3}-\d{2}-\d{4}\b",
        token: "[SSN_REDACTED]",
    },
    PiiPatternDef {
        id: "phone",
        regex: r"(?:\+?\d{1,3}[ .-]?)?\(?\d{3}\)?[ .-]?\d{3}[ .-]?\d{4}\b",
        token: "[PHONE_REDACTED]",
    },
];

/// Dotted paths stripped from structured trace payloads before storage.
pub static PII_FIELDS_TO_STRIP: &[&str] = &[
    "user.email",
    "user.name",
    "user.phone",
    "user.address",
    "user.id",
    "user.user_id",
    "user.ip",
    "client.ip",
    "session_id",
    "request.headers.authorization",
    "request.headers.cookie",
];

/// Free-text keys replaced wholesale: conversation bodies are the highest
/// PII-density fields and are never needed verbatim downstream.
static FREE_TEXT_KEYS: &[&str] = &["input", "output", "prompt", "response"];

const FREE_TEXT_MARKER: &str = "[redacted]";

static COMPILED: Lazy<(RegexSet, Vec<(Regex, &'static str)>)> = Lazy::new(|| {
    let set = RegexSet::new(PII_PATTERNS.iter().map(|p| p.regex))
        .expect("built-in PII patterns must compile");
    let linear = PII_PATTERNS
        .iter()
        .map(|p| {
            (
                Regex::new(p.regex).expect("built-in PII patterns must compile"),
                p.token,
            )
        })
        .collect();
    (set, linear)
});

/// Redactor for free-text strings and structured trace payloads.
#[derive(Debug, Clone)]
pub struct PiiRedactor {
    salt: String,
}

impl PiiRedactor {
    /// Create a redactor with the deployment salt used for user-id hashing.
    #[must_use]
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Replace every PII match in `text` with its bracketed token.
    #[must_use]
    pub fn redact_text(&self, text: &str) -> String {
        let (set, linear) = &*COMPILED;
        let matches = set.matches(text);
        if !matches.matched_any() {
            return text.to_string();
        }
        let mut redacted = text.to_string();
        for index in matches.iter() {
            let (regex, token) = &linear[index];
            redacted = regex.replace_all(&redacted, *token).to_string();
        }
        redacted
    }

    /// Redact then truncate to at most `max_len` characters.
    ///
    /// Used by every generator before persisting LLM-produced text, so a
    /// model echoing PII from its context never reaches the store.
    #[must_use]
    pub fn redact_and_truncate(&self, text: &str, max_len: usize) -> String {
        let redacted = self.redact_text(text);
        truncate_chars(&redacted, max_len)
    }

    /// Hash a user identifier: `hex(sha256(identifier || salt))`.
    #[must_use]
    pub fn hash_user_id(&self, identifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(identifier.as_bytes());
        hasher.update(self.salt.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Sanitize a structured trace payload in place and return the user
    /// hash, if an identifier was present.
    ///
    /// Steps: pull the user id (before stripping removes it), strip the
    /// configured dotted paths, replace free-text conversation keys, and
    /// redact remaining string leaves at the top level.
    pub fn sanitize_payload(&self, payload: &mut Value) -> Option<String> {
        let user_id = extract_user_id(payload);

        for dotted in PII_FIELDS_TO_STRIP {
            strip_nested(payload, dotted);
        }

        if let Value::Object(map) = payload {
            for key in FREE_TEXT_KEYS {
                if map.contains_key(*key) {
                    map.insert((*key).to_string(), Value::String(FREE_TEXT_MARKER.into()));
                }
            }
            for value in map.values_mut() {
                if let Value::String(s) = value {
                    let redacted = self.redact_text(s);
                    if redacted != *s {
                        *value = Value::String(redacted);
                    }
                }
            }
        }

        user_id.map(|id| self.hash_user_id(&id))
    }
}

/// Truncate on a char boundary, keeping the leading `max_len` characters.
fn truncate_chars(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

fn extract_user_id(payload: &Value) -> Option<String> {
    let user = payload.get("user")?;
    let id = user.get("id").or_else(|| user.get("user_id"))?;
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn strip_nested(payload: &mut Value, dotted_path: &str) {
    let parts: Vec<&str> = dotted_path.split('.').collect();
    let mut target = payload;
    for (i, key) in parts.iter().enumerate() {
        if i == parts.len() - 1 {
            if let Value::Object(map) = target {
                map.remove(*key);
            }
            return;
        }
        match target.get_mut(*key) {
            Some(next) => target = next,
            None => return,
        }
    }
}

// Small local hex encoder; avoids a dependency for one call site.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes
            .as_ref()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn redactor() -> PiiRedactor {
        PiiRedactor::new("test-salt")
    }

    #[test]
    fn emails_are_replaced_with_token() {
        let out = redactor().redact_text("contact alice@example.com please");
        assert_eq!(out, "contact [EMAIL_REDACTED] please");
    }

    #[test]
    fn ssn_and_card_and_phone_are_redacted() {
        let out = redactor().redact_text("ssn 123-45-6789 card 4111 1111 1111 1111 tel 555-867-5309");
        assert!(out.contains("[SSN_REDACTED]"));
        assert!(out.contains("[CARD_REDACTED]"));
        assert!(out.contains("[PHONE_REDACTED]"));
        assert!(!out.contains("6789"));
        assert!(!out.contains("4111"));
        assert!(!out.contains("5309"));
    }

    #[test]
    fn clean_text_is_untouched() {
        let text = "the model looped 47 times before stopping";
        assert_eq!(redactor().redact_text(text), text);
    }

    #[test]
    fn redact_and_truncate_caps_length() {
        let text = format!("{} bob@example.com", "x".repeat(600));
        let out = redactor().redact_and_truncate(&text, 500);
        assert_eq!(out.chars().count(), 500);
        assert!(!out.contains("bob@example.com"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "héllo wörld".repeat(10);
        let out = redactor().redact_and_truncate(&text, 7);
        assert_eq!(out.chars().count(), 7);
    }

    #[test]
    fn user_hash_is_salted_sha256() {
        let hash = redactor().hash_user_id("user-42");
        // sha256("user-42" + "test-salt") is stable.
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, PiiRedactor::new("other-salt").hash_user_id("user-42"));
        assert_eq!(hash, redactor().hash_user_id("user-42"));
    }

    #[test]
    fn sanitize_strips_dotted_paths_and_hashes_user() {
        let mut payload = json!({
            "user": {"id": "u-77", "email": "u@example.com", "plan": "pro"},
            "client": {"ip": "10.1.2.3", "version": "2.1"},
            "request": {"headers": {"authorization": "Bearer abc", "accept": "json"}},
            "session_id": "sess-1",
            "prompt": "What is my SSN 123-45-6789?",
            "steps": 3
        });
        let user_hash = redactor().sanitize_payload(&mut payload);

        assert_eq!(user_hash, Some(redactor().hash_user_id("u-77")));
        assert!(payload["user"].get("id").is_none());
        assert!(payload["user"].get("email").is_none());
        assert_eq!(payload["user"]["plan"], "pro");
        assert!(payload["client"].get("ip").is_none());
        assert_eq!(payload["client"]["version"], "2.1");
        assert!(payload["request"]["headers"].get("authorization").is_none());
        assert_eq!(payload["request"]["headers"]["accept"], "json");
        assert!(payload.get("session_id").is_none());
        assert_eq!(payload["prompt"], "[redacted]");
        assert_eq!(payload["steps"], 3);
    }

    #[test]
    fn sanitize_without_user_returns_none() {
        let mut payload = json!({"output": "hello", "service": "chat"});
        assert_eq!(redactor().sanitize_payload(&mut payload), None);
        assert_eq!(payload["output"], "[redacted]");
    }

    #[test]
    fn sanitize_redacts_remaining_top_level_strings() {
        let mut payload = json!({"note": "mail me at eve@example.org"});
        redactor().sanitize_payload(&mut payload);
        assert_eq!(payload["note"], "mail me at [EMAIL_REDACTED]");
    }

    #[test]
    fn numeric_user_id_is_hashed() {
        let mut payload = json!({"user": {"user_id": 1234}});
        let hash = redactor().sanitize_payload(&mut payload);
        assert_eq!(hash, Some(redactor().hash_user_id("1234")));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Redacted output never contains an email-shaped substring.
            #[test]
            fn no_email_survives(local in "[a-z]{1,8}", domain in "[a-z]{1,8}") {
                let email = format!("{local}@{domain}.com");
                let text = format!("reach me at {email} today");
                let out = redactor().redact_text(&text);
                prop_assert!(!out.contains(&email));
            }

            // Truncation never exceeds the requested length.
            #[test]
            fn truncation_bound_holds(text in ".{0,200}", max_len in 0usize..100) {
                let out = redactor().redact_and_truncate(&text, max_len);
                prop_assert!(out.chars().count() <= max_len);
            }
        }
    }
}
