//! JSON-mode response handling: fence stripping, parsing and a structural
//! schema check (`type`, `required`, `properties.*.type`, `items`).

use crate::errors::GenerationError;
use serde_json::Value;

/// Strips a surrounding markdown code fence (with optional language tag).
#[must_use]
pub fn clean_json_response(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.find('\n').map_or(rest, |idx| &rest[idx + 1..]);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses a provider response as JSON.
pub fn parse_json_response(text: &str) -> Result<Value, GenerationError> {
    serde_json::from_str(clean_json_response(text))
        .map_err(|e| GenerationError::InvalidResponse(format!("invalid JSON: {e}")))
}

/// Validates `value` against the subset of JSON Schema the pipeline uses.
pub fn validate_schema(value: &Value, schema: &Value) -> Result<(), GenerationError> {
    validate_at("$", value, schema).map_err(GenerationError::SchemaValidation)
}

fn validate_at(path: &str, value: &Value, schema: &Value) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(value, expected) {
            return Err(format!("{path}: expected {expected}, got {}", type_name(value)));
        }
    }

    if let (Some(object), Some(required)) = (value.as_object(), schema.get("required")) {
        for field in required.as_array().into_iter().flatten().filter_map(Value::as_str) {
            if !object.contains_key(field) {
                return Err(format!("{path}: missing required field '{field}'"));
            }
        }
    }

    if let (Some(object), Some(properties)) = (
        value.as_object(),
        schema.get("properties").and_then(Value::as_object),
    ) {
        for (name, sub_schema) in properties {
            if let Some(field) = object.get(name) {
                validate_at(&format!("{path}.{name}"), field, sub_schema)?;
            }
        }
    }

    if let (Some(items), Some(item_schema)) = (value.as_array(), schema.get("items")) {
        for (idx, item) in items.iter().enumerate() {
            validate_at(&format!("{path}[{idx}]"), item, item_schema)?;
        }
    }

    Ok(())
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_json_fences() {
        assert_eq!(clean_json_response("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(clean_json_response("```\n[1]\n```\n"), "[1]");
        assert_eq!(clean_json_response("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = parse_json_response("not json").unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse(_)));
    }

    #[test]
    fn test_schema_validation() {
        let schema = json!({
            "type": "object",
            "required": ["title", "sections"],
            "properties": {
                "title": {"type": "string"},
                "sections": {"type": "array", "items": {"type": "object", "required": ["key"]}}
            }
        });

        assert!(validate_schema(&json!({"title": "T", "sections": [{"key": "a"}]}), &schema).is_ok());

        let err = validate_schema(&json!({"title": "T"}), &schema).unwrap_err();
        assert_eq!(
            err,
            GenerationError::SchemaValidation("$: missing required field 'sections'".into())
        );

        let err = validate_schema(&json!({"title": 1, "sections": []}), &schema).unwrap_err();
        assert!(err.to_string().contains("$.title: expected string"));

        let err = validate_schema(&json!({"title": "T", "sections": [{}]}), &schema).unwrap_err();
        assert!(err.to_string().contains("$.sections[0]"));
    }
}
