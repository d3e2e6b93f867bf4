//! Call fingerprints: the dedup key of an external generation call.

use crate::utils::{canonical_json, sha256_hex, short_hash};
use serde_json::{Map, Value};

/// Drops null-valued parameters. Key order is irrelevant because the
/// canonical encoding sorts keys.
#[must_use]
pub fn normalize_params(params: &Map<String, Value>) -> Map<String, Value> {
    params
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// First 16 hex chars of the canonical schema hash, or empty without schema.
#[must_use]
pub fn schema_hash(schema: Option<&Value>) -> String {
    schema.map_or_else(String::new, |s| short_hash(&canonical_json(s)))
}

/// Deterministic hash of a call's full semantic input.
#[must_use]
pub fn call_fingerprint(
    model: &str,
    system: &str,
    user: &str,
    params: &Map<String, Value>,
    schema: Option<&Value>,
) -> String {
    let payload = serde_json::json!({
        "model": model,
        "system": system,
        "user": user,
        "params": Value::Object(normalize_params(params)),
        "schema_hash": schema_hash(schema),
    });
    sha256_hex(&canonical_json(&payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let p = params(json!({"temperature": 0.7, "max_tokens": 100}));
        let a = call_fingerprint("gpt-4o-mini", "sys", "user", &p, None);
        let b = call_fingerprint("gpt-4o-mini", "sys", "user", &p, None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_param_order_and_nulls_ignored() {
        let a = params(json!({"temperature": 0.7, "max_tokens": 100}));
        let b = params(json!({"max_tokens": 100, "stop": null, "temperature": 0.7}));
        assert_eq!(
            call_fingerprint("m", "s", "u", &a, None),
            call_fingerprint("m", "s", "u", &b, None)
        );
    }

    #[test]
    fn test_every_input_changes_fingerprint() {
        let p = params(json!({"temperature": 0.7}));
        let base = call_fingerprint("m", "s", "u", &p, None);
        assert_ne!(base, call_fingerprint("m2", "s", "u", &p, None));
        assert_ne!(base, call_fingerprint("m", "s2", "u", &p, None));
        assert_ne!(base, call_fingerprint("m", "s", "u2", &p, None));
        assert_ne!(base, call_fingerprint("m", "s", "u", &params(json!({"temperature": 0.2})), None));
        assert_ne!(base, call_fingerprint("m", "s", "u", &p, Some(&json!({"type": "object"}))));
    }

    #[test]
    fn test_schema_hash() {
        assert_eq!(schema_hash(None), "");
        let a = schema_hash(Some(&json!({"type": "object", "required": ["a"]})));
        let b = schema_hash(Some(&json!({"required": ["a"], "type": "object"})));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }
}
