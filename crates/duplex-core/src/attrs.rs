//! Loosely typed attribute maps and the coercions used to read them.
//!
//! Records travel between the store, the watch pipelines and external
//! clusters as untyped JSON objects. Producers are not consistent about
//! scalar types (a port range may arrive as `22` or `"22"`, a flag as
//! `true` or `"true"`), so every reader goes through these helpers instead
//! of strict `serde` deserialization.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{DecodeError, Result};

/// Untyped attribute map a record is decoded from.
pub type Attributes = Map<String, Value>;

fn join(parent: &str, field: &str) -> String {
    if parent.is_empty() {
        field.to_string()
    } else {
        format!("{parent}.{field}")
    }
}

/// Render a scalar as a string. Returns `None` for null, arrays and objects.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Required nested object.
pub fn required_object<'a>(attrs: &'a Attributes, field: &str, parent: &str) -> Result<&'a Attributes> {
    match attrs.get(field) {
        Some(Value::Object(map)) => Ok(map),
        None | Some(Value::Null) => Err(DecodeError::missing_field(join(parent, field))),
        Some(other) => Err(DecodeError::invalid_value(
            join(parent, field),
            format!("expected object, found {}", type_name(other)),
        )),
    }
}

/// Optional nested object; absent or null yields `None`.
pub fn optional_object<'a>(
    attrs: &'a Attributes,
    field: &str,
    parent: &str,
) -> Result<Option<&'a Attributes>> {
    match attrs.get(field) {
        Some(Value::Object(map)) => Ok(Some(map)),
        None | Some(Value::Null) => Ok(None),
        Some(other) => Err(DecodeError::invalid_value(
            join(parent, field),
            format!("expected object, found {}", type_name(other)),
        )),
    }
}

/// Required non-empty string; numbers and booleans are coerced.
pub fn required_string(attrs: &Attributes, field: &str, parent: &str) -> Result<String> {
    match optional_string(attrs, field, parent)? {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(DecodeError::missing_field(join(parent, field))),
    }
}

/// Optional string; numbers and booleans are coerced, null is absent.
pub fn optional_string(attrs: &Attributes, field: &str, parent: &str) -> Result<Option<String>> {
    match attrs.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar_to_string(value).map(Some).ok_or_else(|| {
            DecodeError::invalid_value(
                join(parent, field),
                format!("expected scalar, found {}", type_name(value)),
            )
        }),
    }
}

/// String field defaulting to empty.
pub fn string_or_default(attrs: &Attributes, field: &str, parent: &str) -> Result<String> {
    Ok(optional_string(attrs, field, parent)?.unwrap_or_default())
}

/// Unsigned integer from a number or a numeric string; absent yields 0.
pub fn u64_or_default(attrs: &Attributes, field: &str, parent: &str) -> Result<u64> {
    let invalid = |msg: String| DecodeError::invalid_value(join(parent, field), msg);
    match attrs.get(field) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| invalid(format!("expected unsigned integer, found {n}"))),
        Some(Value::String(s)) if s.is_empty() => Ok(0),
        Some(Value::String(s)) => s
            .parse::<u64>()
            .map_err(|e| invalid(format!("'{s}' is not an unsigned integer: {e}"))),
        Some(other) => Err(invalid(format!(
            "expected unsigned integer, found {}",
            type_name(other)
        ))),
    }
}

/// Boolean from a bool, `"true"`/`"false"` or `0`/`1`; absent yields false.
pub fn bool_or_default(attrs: &Attributes, field: &str, parent: &str) -> Result<bool> {
    let invalid = |msg: String| DecodeError::invalid_value(join(parent, field), msg);
    match attrs.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            _ => Err(invalid(format!("'{s}' is not a boolean"))),
        },
        Some(Value::Number(n)) => match n.as_u64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(invalid(format!("{n} is not a boolean"))),
        },
        Some(other) => Err(invalid(format!("expected boolean, found {}", type_name(other)))),
    }
}

/// String-keyed map with scalar values coerced to strings. Null entries are dropped.
pub fn string_map(attrs: &Attributes, field: &str, parent: &str) -> Result<HashMap<String, String>> {
    let Some(map) = optional_object(attrs, field, parent)? else {
        return Ok(HashMap::new());
    };
    let path = join(parent, field);
    let mut out = HashMap::with_capacity(map.len());
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        let value = scalar_to_string(value).ok_or_else(|| {
            DecodeError::invalid_value(
                join(&path, key),
                format!("expected scalar, found {}", type_name(value)),
            )
        })?;
        out.insert(key.clone(), value);
    }
    Ok(out)
}

/// Sequence of objects; absent or null yields an empty sequence.
pub fn object_seq<'a>(attrs: &'a Attributes, field: &str, parent: &str) -> Result<Vec<&'a Attributes>> {
    let path = join(parent, field);
    match attrs.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(map),
                other => Err(DecodeError::invalid_value(
                    format!("{path}[{i}]"),
                    format!("expected object, found {}", type_name(other)),
                )),
            })
            .collect(),
        Some(other) => Err(DecodeError::invalid_value(
            path,
            format!("expected array, found {}", type_name(other)),
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
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

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_scalar_coercion() {
        assert_eq!(scalar_to_string(&json!("22/22")), Some("22/22".to_string()));
        assert_eq!(scalar_to_string(&json!(22)), Some("22".to_string()));
        assert_eq!(scalar_to_string(&json!(true)), Some("true".to_string()));
        assert_eq!(scalar_to_string(&json!(null)), None);
        assert_eq!(scalar_to_string(&json!([1])), None);
    }

    #[test]
    fn test_required_string_reports_path() {
        let a = attrs(json!({"name": ""}));
        let err = required_string(&a, "name", "metadata").unwrap_err();
        assert_eq!(err, DecodeError::missing_field("metadata.name"));
    }

    #[test]
    fn test_u64_accepts_numeric_strings() {
        let a = attrs(json!({"a": 7, "b": "42", "c": "x"}));
        assert_eq!(u64_or_default(&a, "a", "").unwrap(), 7);
        assert_eq!(u64_or_default(&a, "b", "").unwrap(), 42);
        assert_eq!(u64_or_default(&a, "missing", "").unwrap(), 0);
        assert!(u64_or_default(&a, "c", "").is_err());
    }

    #[test]
    fn test_bool_variants() {
        let a = attrs(json!({"a": true, "b": "false", "c": 1, "d": "maybe"}));
        assert!(bool_or_default(&a, "a", "").unwrap());
        assert!(!bool_or_default(&a, "b", "").unwrap());
        assert!(bool_or_default(&a, "c", "").unwrap());
        assert!(bool_or_default(&a, "d", "").is_err());
    }

    #[test]
    fn test_string_map_coerces_values() {
        let a = attrs(json!({"labels": {"tier": 3, "workspace": "ws-1", "gone": null}}));
        let labels = string_map(&a, "labels", "metadata").unwrap();
        assert_eq!(labels.get("tier").map(String::as_str), Some("3"));
        assert_eq!(labels.get("workspace").map(String::as_str), Some("ws-1"));
        assert!(!labels.contains_key("gone"));
    }

    #[test]
    fn test_object_seq_null_is_empty() {
        let a = attrs(json!({"ingress": null, "bad": [1]}));
        assert!(object_seq(&a, "ingress", "spec").unwrap().is_empty());
        assert!(object_seq(&a, "egress", "spec").unwrap().is_empty());
        let err = object_seq(&a, "bad", "spec").unwrap_err();
        assert_eq!(err.field(), Some("spec.bad[0]"));
    }
}
