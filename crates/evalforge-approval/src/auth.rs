//! API-key authentication for mutating approval endpoints.

/// Compare two byte strings in constant time over the shared length.
///
/// Length mismatch still returns false, but the comparison itself never
/// short-circuits on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Validate a presented API key against the configured one.
///
/// Returns an error string suitable for a 401 body when the key is
/// missing, unconfigured, or wrong. A server without a configured key
/// rejects every write.
pub fn verify_api_key(presented: Option<&str>, expected: Option<&str>) -> Result<(), &'static str> {
    let Some(presented) = presented else {
        return Err("Missing API key");
    };
    let Some(expected) = expected else {
        return Err("API key not configured on server");
    };
    if constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err("Invalid API key")
    }
}
