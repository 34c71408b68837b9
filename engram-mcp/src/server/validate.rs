//! Parameter validation against per-operation schemas.
//!
//! Supports the JSON-schema subset the operation registry uses: object
//! shapes with `required` and `properties`, scalar types, string enums,
//! numeric minimum/maximum, and typed arrays. Failures name the offending
//! field by JSON path.

use serde_json::Value;

use engram_core::error::{Error, Result};

fn invalid(path: &str, message: impl Into<String>) -> Error {
    Error::InvalidParams {
        path: path.to_string(),
        message: message.into(),
    }
}

/// Validate `value` against `schema`, reporting paths under `path`.
pub fn validate(schema: &Value, value: &Value, path: &str) -> Result<()> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        check_type(expected, value, path)?;
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(ToString::to_string).collect();
            return Err(invalid(path, format!("must be one of {}", options.join(", "))));
        }
    }

    if let Some(minimum) = schema.get("minimum").and_then(Value::as_i64) {
        if value.as_i64().is_some_and(|v| v < minimum) {
            return Err(invalid(path, format!("must be >= {minimum}")));
        }
    }
    if let Some(maximum) = schema.get("maximum").and_then(Value::as_i64) {
        if value.as_i64().is_some_and(|v| v > maximum) {
            return Err(invalid(path, format!("must be <= {maximum}")));
        }
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if value.get(field).is_none() || value.get(field) == Some(&Value::Null) {
                return Err(invalid(&format!("{path}.{field}"), "required field is missing"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        if let Some(object) = value.as_object() {
            for (field, field_schema) in properties {
                if let Some(field_value) = object.get(field) {
                    if field_value != &Value::Null {
                        validate(field_schema, field_value, &format!("{path}.{field}"))?;
                    }
                }
            }
        }
    }

    if let Some(items) = schema.get("items") {
        if let Some(array) = value.as_array() {
            for (index, item) in array.iter().enumerate() {
                validate(items, item, &format!("{path}[{index}]"))?;
            }
        }
    }

    Ok(())
}

fn check_type(expected: &str, value: &Value, path: &str) -> Result<()> {
    let ok = match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        other => return Err(invalid(path, format!("unknown schema type '{other}'"))),
    };
    if ok {
        Ok(())
    } else {
        Err(invalid(path, format!("expected {expected}")))
    }
}

/// Cross-field constraint: when both epoch bounds are present, the window
/// must be non-empty.
pub fn validate_epoch_window(params: &Value, path: &str) -> Result<()> {
    let gt = params.get("epoch_gt").and_then(Value::as_i64);
    let lt = params.get("epoch_lt").and_then(Value::as_i64);
    if let (Some(gt), Some(lt)) = (gt, lt) {
        if lt <= gt {
            return Err(invalid(
                &format!("{path}.epoch_lt"),
                "must be greater than epoch_gt",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": { "type": "string" },
                "k": { "type": "integer", "minimum": 1, "maximum": 100 },
                "type": {
                    "type": "string",
                    "enum": ["problem", "solution"]
                },
                "tags": { "type": "array", "items": { "type": "string" } }
            }
        })
    }

    #[test]
    fn accepts_valid_params() {
        let params = json!({ "query": "pooling", "k": 5, "tags": ["db"] });
        validate(&schema(), &params, "parameters").expect("valid");
    }

    #[test]
    fn missing_required_field_names_the_path() {
        let err = validate(&schema(), &json!({ "k": 5 }), "parameters").expect_err("invalid");
        let Error::InvalidParams { path, .. } = err else {
            panic!("wrong error kind");
        };
        assert_eq!(path, "parameters.query");
    }

    #[test]
    fn wrong_type_is_rejected_with_path() {
        let err = validate(&schema(), &json!({ "query": 7 }), "parameters").expect_err("invalid");
        let Error::InvalidParams { path, .. } = err else {
            panic!("wrong error kind");
        };
        assert_eq!(path, "parameters.query");
    }

    #[test]
    fn enum_violations_are_rejected() {
        let params = json!({ "query": "x", "type": "poetry" });
        assert!(validate(&schema(), &params, "parameters").is_err());
    }

    #[test]
    fn numeric_bounds_are_enforced() {
        assert!(validate(&schema(), &json!({ "query": "x", "k": 0 }), "parameters").is_err());
        assert!(validate(&schema(), &json!({ "query": "x", "k": 101 }), "parameters").is_err());
    }

    #[test]
    fn array_items_are_validated() {
        let params = json!({ "query": "x", "tags": ["ok", 3] });
        let err = validate(&schema(), &params, "parameters").expect_err("invalid");
        let Error::InvalidParams { path, .. } = err else {
            panic!("wrong error kind");
        };
        assert_eq!(path, "parameters.tags[1]");
    }

    #[test]
    fn epoch_window_must_be_non_empty() {
        let params = json!({ "epoch_gt": 100, "epoch_lt": 100 });
        assert!(validate_epoch_window(&params, "parameters").is_err());
        let params = json!({ "epoch_gt": 100, "epoch_lt": 101 });
        assert!(validate_epoch_window(&params, "parameters").is_ok());
    }
}
