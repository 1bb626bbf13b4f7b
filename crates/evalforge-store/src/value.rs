//! Conversion between JSON values and Firestore's typed field encoding,
//! plus the array-union merge helper.

use serde_json::{json, Map, Value};

/// Encode a JSON value as a Firestore REST `Value`.
#[must_use]
pub fn to_firestore_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({"nullValue": null}),
        Value::Bool(b) => json!({"booleanValue": b}),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                // Firestore integers are strings on the wire.
                json!({"integerValue": n.to_string()})
            } else {
                json!({"doubleValue": n.as_f64()})
            }
        }
        Value::String(s) => json!({"stringValue": s}),
        Value::Array(items) => json!({
            "arrayValue": {
                "values": items.iter().map(to_firestore_value).collect::<Vec<_>>()
            }
        }),
        Value::Object(map) => json!({
            "mapValue": {
                "fields": map
                    .iter()
                    .map(|(k, v)| (k.clone(), to_firestore_value(v)))
                    .collect::<Map<String, Value>>()
            }
        }),
    }
}

/// Encode a JSON object as the `fields` map of a Firestore document.
#[must_use]
pub fn to_firestore_fields(doc: &Value) -> Value {
    match doc {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), to_firestore_value(v)))
                .collect(),
        ),
        _ => Value::Object(Map::new()),
    }
}

/// Decode a Firestore REST `Value` back into JSON.
#[must_use]
pub fn from_firestore_value(value: &Value) -> Value {
    let Some(map) = value.as_object() else {
        return Value::Null;
    };
    if map.contains_key("nullValue") {
        return Value::Null;
    }
    if let Some(b) = map.get("booleanValue") {
        return b.clone();
    }
    if let Some(s) = map.get("integerValue") {
        if let Some(raw) = s.as_str() {
            if let Ok(n) = raw.parse::<i64>() {
                return json!(n);
            }
        }
        return s.clone();
    }
    if let Some(d) = map.get("doubleValue") {
        return d.clone();
    }
    if let Some(s) = map.get("stringValue") {
        return s.clone();
    }
    if let Some(ts) = map.get("timestampValue") {
        return ts.clone();
    }
    if let Some(arr) = map.get("arrayValue") {
        let values = arr
            .get("values")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(from_firestore_value).collect())
            .unwrap_or_default();
        return Value::Array(values);
    }
    if let Some(obj) = map.get("mapValue") {
        return from_firestore_fields(obj.get("fields").unwrap_or(&Value::Null));
    }
    Value::Null
}

/// Decode a Firestore `fields` map into a JSON object.
#[must_use]
pub fn from_firestore_fields(fields: &Value) -> Value {
    match fields.as_object() {
        Some(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_firestore_value(v)))
                .collect(),
        ),
        None => json!({}),
    }
}

/// Append `items` to the array at `field`, skipping entries already present
/// (by structural equality). Creates the array if absent.
///
/// This mirrors Firestore's `ArrayUnion` transform so the in-memory store
/// and the transactional read-modify-write path behave identically.
pub fn array_union(doc: &mut Value, field: &str, items: Vec<Value>) {
    let Value::Object(map) = doc else { return };
    let entry = map.entry(field.to_string()).or_insert_with(|| json!([]));
    if !entry.is_array() {
        *entry = json!([]);
    }
    let array = entry.as_array_mut().expect("just ensured array");
    for item in items {
        if !array.contains(&item) {
            array.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip() {
        for value in [
            json!(null),
            json!(true),
            json!(42),
            json!(2.5),
            json!("hello"),
        ] {
            let encoded = to_firestore_value(&value);
            assert_eq!(from_firestore_value(&encoded), value);
        }
    }

    #[test]
    fn integers_encode_as_strings() {
        let encoded = to_firestore_value(&json!(1234));
        assert_eq!(encoded["integerValue"], "1234");
    }

    #[test]
    fn nested_document_round_trip() {
        let doc = json!({
            "trace_id": "t1",
            "recurrence_count": 2,
            "quality_score": 0.35,
            "processed": false,
            "status_history": [
                {"status": "new", "actor": "ingestion"}
            ],
            "trace_payload": {"prompt": "[redacted]", "steps": [1, 2, 3]}
        });
        let fields = to_firestore_fields(&doc);
        assert_eq!(from_firestore_fields(&fields), doc);
    }

    #[test]
    fn array_union_deduplicates() {
        let mut doc = json!({"version_history": [{"status": "approved"}]});
        array_union(
            &mut doc,
            "version_history",
            vec![json!({"status": "approved"}), json!({"status": "rejected"})],
        );
        assert_eq!(doc["version_history"].as_array().unwrap().len(), 2);
        // A second union of the same entries is a no-op.
        array_union(&mut doc, "version_history", vec![json!({"status": "rejected"})]);
        assert_eq!(doc["version_history"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn array_union_creates_missing_field() {
        let mut doc = json!({});
        array_union(&mut doc, "source_traces", vec![json!({"trace_id": "t1"})]);
        assert_eq!(doc["source_traces"].as_array().unwrap().len(), 1);
    }
}
