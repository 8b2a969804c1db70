//! Structural flattening of functor output.
//!
//! A functor may return one object, a list, or any nested bundle
//! (`{ "primary": ..., "related": [...] }`). Every embedded value carrying
//! both a string `id` and a string `type` is collected exactly once.

use std::collections::HashSet;

use serde_json::Value;
use tracing::warn;

use crate::object::SymbolicObject;

/// Depth-first worklist traversal collecting symbolic objects.
///
/// Objects are returned in pre-order, de-duplicated by id
/// with the first occurrence kept. Owned JSON trees are acyclic, so the
/// traversal always terminates.
pub fn flatten_symbolic_objects(value: &Value) -> Vec<SymbolicObject> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut found = Vec::new();
    let mut stack: Vec<&Value> = vec![value];

    while let Some(current) = stack.pop() {
        match current {
            Value::Object(map) => {
                if let Some(id) = symbolic_id(current) {
                    if seen.insert(id) {
                        found.push(to_object(id, current));
                    }
                }
                // Reverse so children pop in declaration order
                let children: Vec<&Value> = map.values().collect();
                stack.extend(children.into_iter().rev());
            }
            Value::Array(items) => stack.extend(items.iter().rev()),
            _ => {}
        }
    }

    found
}

/// Header fields are read leniently; anything still unreadable keeps the
/// object with its id and type only.
fn to_object(id: &str, value: &Value) -> SymbolicObject {
    serde_json::from_value(value.clone()).unwrap_or_else(|e| {
        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
        warn!(id = %id, error = %e, "Unreadable symbolic object header, keeping id and type");
        let mut object = SymbolicObject::with_id(id, kind);
        object.root_id = None;
        object
    })
}

/// The id of a value that looks like a symbolic object.
pub(crate) fn symbolic_id(value: &Value) -> Option<&str> {
    let id = value.get("id")?.as_str()?;
    let kind = value.get("type")?.as_str()?;
    (!id.is_empty() && !kind.is_empty()).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(objects: &[SymbolicObject]) -> Vec<&str> {
        objects.iter().map(|o| o.id.as_str()).collect()
    }

    #[test]
    fn test_single_object() {
        let out = flatten_symbolic_objects(&json!({"id": "o1", "type": "T"}));
        assert_eq!(ids(&out), vec!["o1"]);
    }

    #[test]
    fn test_nested_bundle_pre_order() {
        let bundle = json!({
            "primary": {"id": "p", "type": "T", "children": [{"id": "c1", "type": "C"}]},
            "related": [{"id": "r1", "type": "R"}, {"id": "r2", "type": "R"}],
            "note": "plain data"
        });
        let out = flatten_symbolic_objects(&bundle);
        assert_eq!(ids(&out), vec!["p", "c1", "r1", "r2"]);
    }

    #[test]
    fn test_duplicates_collected_once() {
        let value = json!([
            {"id": "a", "type": "T"},
            {"wrapper": {"id": "a", "type": "T"}},
            {"id": "b", "type": "T", "peer": {"id": "a", "type": "T"}}
        ]);
        let out = flatten_symbolic_objects(&value);
        assert_eq!(ids(&out), vec!["a", "b"]);
    }

    #[test]
    fn test_requires_id_and_type() {
        let value = json!([
            {"id": "no-type"},
            {"type": "NoId"},
            {"id": "", "type": "T"},
            {"id": 5, "type": "T"},
            null,
            42
        ]);
        assert!(flatten_symbolic_objects(&value).is_empty());
    }

    #[test]
    fn test_loosely_typed_objects_are_kept() {
        let value = json!([
            {"id": "ok", "type": "T"},
            {"id": "null-status", "type": "T", "status": null},
            {"id": "string-tick", "type": "T", "tick": "3"},
            {"id": "date-created", "type": "T", "createdAt": "2024-01-01"},
            {"id": "null-metadata", "type": "T", "metadata": null}
        ]);
        let out = flatten_symbolic_objects(&value);
        assert_eq!(
            ids(&out),
            vec!["ok", "null-status", "string-tick", "date-created", "null-metadata"]
        );
        assert_eq!(out[1].status, "active");
        assert_eq!(out[2].tick, Some(3));
        assert!(out[4].metadata.is_empty());
    }

    #[test]
    fn test_flatten_is_stable_under_repetition() {
        let value = json!({
            "a": {"id": "x", "type": "T", "inner": {"id": "y", "type": "T"}},
            "b": [{"id": "z", "type": "T"}]
        });
        let once = flatten_symbolic_objects(&value);
        let again = flatten_symbolic_objects(&serde_json::to_value(&once).unwrap());

        let mut first: Vec<_> = ids(&once);
        let mut second: Vec<_> = ids(&again);
        first.sort();
        second.sort();
        assert_eq!(first, second);
    }
}
