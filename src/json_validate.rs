//! Minimal JSON-Schema instance validation.
//!
//! Rather than pull in a schema crate for instance validation, this
//! implements the structural subset the spec actually exercises: `type` and
//! `required`, walked recursively through `properties`. This covers the
//! round-trip property in spec §8 ("when schema is applied and `json_valid`
//! is true, `parse(result.json_text) == result.json_obj`") without claiming
//! full JSON Schema draft compliance.

use serde_json::Value;

/// Returns true if `value` structurally matches `schema`'s declared `type`
/// and, when `schema` is an object schema, all of its `required` properties
/// are present and themselves valid against their own sub-schema.
pub fn validates(value: &Value, schema: &Value) -> bool {
    let Some(schema_obj) = schema.as_object() else {
        return true;
    };
    // Some callers pass a wrapper `{name, schema, strict}`; unwrap if the
    // inner `schema` key looks like the actual JSON Schema object.
    let schema_obj = schema_obj
        .get("schema")
        .and_then(Value::as_object)
        .unwrap_or(schema_obj);

    if let Some(ty) = schema_obj.get("type").and_then(Value::as_str) {
        if !type_matches(value, ty) {
            return false;
        }
    }

    if ty_is_object(schema_obj, value) {
        let Some(obj) = value.as_object() else {
            return false;
        };
        if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
            for key in required {
                let Some(key) = key.as_str() else { continue };
                let Some(field_value) = obj.get(key) else {
                    return false;
                };
                if let Some(props) = schema_obj.get("properties").and_then(Value::as_object) {
                    if let Some(field_schema) = props.get(key) {
                        if !validates(field_value, field_schema) {
                            return false;
                        }
                    }
                }
            }
        }
    }

    true
}

fn ty_is_object(schema_obj: &serde_json::Map<String, Value>, value: &Value) -> bool {
    match schema_obj.get("type").and_then(Value::as_str) {
        Some("object") => true,
        Some(_) => false,
        None => value.is_object(),
    }
}

fn type_matches(value: &Value, ty: &str) -> bool {
    match ty {
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validates_required_fields_present() {
        let schema = json!({
            "type": "object",
            "properties": {"k": {"type": "number"}},
            "required": ["k"]
        });
        assert!(validates(&json!({"k": 1}), &schema));
        assert!(!validates(&json!({}), &schema));
    }

    #[test]
    fn validates_rejects_wrong_type() {
        let schema = json!({"type": "object", "properties": {}, "required": []});
        assert!(!validates(&json!("not an object"), &schema));
    }

    #[test]
    fn unwraps_name_schema_strict_wrapper() {
        let descriptor = json!({
            "name": "x",
            "schema": {"type": "object", "properties": {"a": {"type": "string"}}, "required": ["a"]},
            "strict": true
        });
        assert!(validates(&json!({"a": "hi"}), &descriptor));
    }
}
