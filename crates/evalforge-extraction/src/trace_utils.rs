//! Trace serialization, size-limiting, and truncation ahead of LLM calls.
//!
//! Oversized payloads are truncated tail-first: long strings keep their
//! last characters and long lists keep their last items, because failures
//! manifest in the most recent context.

use serde_json::{json, Map, Value};

/// Serialized-size threshold above which truncation kicks in.
pub const MAX_PAYLOAD_SIZE_BYTES: usize = 200 * 1024;

/// Target size steering per-string truncation.
const TRUNCATED_SIZE_BYTES: usize = 100 * 1024;

/// Strings longer than this are truncated to a tail.
const MAX_STRING_CHARS: usize = 10_000;

/// Lists longer than this keep only their last entries.
const MAX_LIST_ITEMS: usize = 100;

/// What happened during preparation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepMetadata {
    pub original_size_bytes: usize,
    pub final_size_bytes: usize,
    pub was_truncated: bool,
}

/// Check a raw trace document has what extraction needs.
///
/// Returns `Err(reason)` naming the missing piece; `missing_required_fields`
/// skips are built from this.
pub fn validate_trace_required_fields(trace: &Value) -> Result<(), String> {
    let trace_id = trace.get("trace_id").and_then(Value::as_str).unwrap_or("");
    if trace_id.is_empty() {
        return Err("Missing required fields: trace_id".to_string());
    }
    match trace.get("trace_payload") {
        None | Some(Value::Null) => Err("trace_payload is empty or missing".to_string()),
        Some(Value::Object(map)) if map.is_empty() => {
            Err("trace_payload is empty or missing".to_string())
        }
        Some(Value::Object(_)) => Ok(()),
        Some(other) => Err(format!(
            "trace_payload must be an object, got {}",
            type_name(other)
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn serialized_size(payload: &Value) -> usize {
    serde_json::to_string_pretty(payload)
        .map(|s| s.len())
        .unwrap_or(0)
}

/// Assemble the extraction payload from a raw trace document and truncate
/// it if oversized. Returns the prepared payload and prep metadata.
pub fn prepare_trace_for_extraction(trace: &Value) -> (Value, PrepMetadata) {
    let mut payload = Map::new();
    for key in ["trace_id", "failure_type", "severity", "service_name"] {
        match trace.get(key) {
            Some(Value::Null) | None => {}
            Some(value) => {
                payload.insert(key.to_string(), value.clone());
            }
        }
    }
    payload.insert(
        "trace_payload".to_string(),
        trace.get("trace_payload").cloned().unwrap_or(json!({})),
    );
    let payload = Value::Object(payload);

    let original_size = serialized_size(&payload);
    if original_size <= MAX_PAYLOAD_SIZE_BYTES {
        return (
            payload,
            PrepMetadata {
                original_size_bytes: original_size,
                final_size_bytes: original_size,
                was_truncated: false,
            },
        );
    }

    let truncated = truncate_value(&payload, TRUNCATED_SIZE_BYTES);
    let final_size = serialized_size(&truncated);
    (
        truncated,
        PrepMetadata {
            original_size_bytes: original_size,
            final_size_bytes: final_size,
            was_truncated: true,
        },
    )
}

fn truncate_value(value: &Value, target_size: usize) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), truncate_value(v, target_size)))
                .collect(),
        ),
        Value::Array(items) => {
            let mut truncated: Vec<Value> = items
                .iter()
                .map(|item| truncate_value(item, target_size))
                .collect();
            if truncated.len() > MAX_LIST_ITEMS {
                let dropped = truncated.len() - MAX_LIST_ITEMS;
                let tail = truncated.split_off(dropped);
                let mut result =
                    vec![json!(format!("[...{dropped} earlier items truncated...]"))];
                result.extend(tail);
                Value::Array(result)
            } else {
                Value::Array(truncated)
            }
        }
        Value::String(s) => {
            let char_count = s.chars().count();
            if char_count > MAX_STRING_CHARS {
                let keep = (target_size / 10).clamp(1_000, MAX_STRING_CHARS);
                let dropped = char_count - keep;
                let tail_start = s
                    .char_indices()
                    .nth(char_count - keep)
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                Value::String(format!(
                    "[...truncated {dropped} chars...]{}",
                    &s[tail_start..]
                ))
            } else {
                value.clone()
            }
        }
        other => other.clone(),
    }
}
