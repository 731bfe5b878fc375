//! Dotted field paths over attribute maps (`spec.status`, `metadata.isDelete`).

use duplex_core::Attributes;
use serde_json::{Map, Value};

pub(crate) fn lookup<'a>(attrs: &'a Attributes, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = attrs.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate objects. `None` removes the leaf.
pub(crate) fn assign(target: &mut Attributes, path: &str, value: Option<Value>) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return;
    };

    let mut current = target;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry.as_object_mut() {
            Some(map) => map,
            None => return,
        };
    }

    match value {
        Some(value) => {
            current.insert(leaf.to_string(), value);
        }
        None => {
            current.remove(*leaf);
        }
    }
}

/// Copies the value at `path` from `source` into `target`.
pub(crate) fn copy(target: &mut Attributes, source: &Attributes, path: &str) {
    assign(target, path, lookup(source, path).cloned());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => Attributes::new(),
        }
    }

    #[test]
    fn test_lookup_nested() {
        let a = attrs(json!({"spec": {"status": "INIT"}}));
        assert_eq!(lookup(&a, "spec.status"), Some(&json!("INIT")));
        assert_eq!(lookup(&a, "spec.missing"), None);
        assert_eq!(lookup(&a, "spec.status.deeper"), None);
    }

    #[test]
    fn test_copy_overwrites_and_removes() {
        let mut target = attrs(json!({"spec": {"status": "INIT", "message": "old"}}));
        let source = attrs(json!({"spec": {"status": "active"}}));

        copy(&mut target, &source, "spec.status");
        copy(&mut target, &source, "spec.message");

        assert_eq!(target, attrs(json!({"spec": {"status": "active"}})));
    }

    #[test]
    fn test_assign_creates_parents() {
        let mut target = Attributes::new();
        assign(&mut target, "metadata.isDelete", Some(json!(false)));
        assert_eq!(target, attrs(json!({"metadata": {"isDelete": false}})));
    }
}
