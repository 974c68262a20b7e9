//! Node value shapes
//!
//! The engine-internal representation of a transformed snapshot: absence,
//! a single keyed entry, or an element-keyed collection. Children read
//! their values out of the parent entry; collection parents fan their
//! children out once per entry.

use serde_json::Value;

use crate::query::QueryNode;
use crate::store::Snapshot;

use super::errors::{EngineError, EngineResult};
use super::scope::Scope;

/// One element of a node value: the store key (when known) and the value
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Store key of this element; None for array elements and plain values
    pub key: Option<String>,
    /// The element's value
    pub value: Value,
}

impl Entry {
    /// Entry with no key
    pub fn keyless(value: Value) -> Self {
        Self { key: None, value }
    }

    /// Entry with a store key
    pub fn keyed(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: Some(key.into()),
            value,
        }
    }
}

/// The transformed value a node holds between snapshots
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    /// Nothing at the bound location
    Absent,
    /// A single record
    Single(Entry),
    /// An element-keyed collection
    Collection(Vec<Entry>),
}

impl NodeValue {
    /// Transform a store snapshot into the shape this node evaluates
    /// children against.
    ///
    /// Leaf nodes take the snapshot as-is (no wrapping). JSON arrays are
    /// always collections with keyless entries; objects become keyed
    /// collections when the node is in collection mode.
    pub fn from_snapshot(snapshot: Snapshot, node: &QueryNode) -> NodeValue {
        match snapshot {
            Snapshot::Absent => NodeValue::Absent,
            Snapshot::Scalar(Value::Null) => NodeValue::Absent,
            Snapshot::Collection(pairs) => {
                if node.is_leaf() {
                    NodeValue::Single(Entry::keyless(
                        Snapshot::Collection(pairs).into_value(),
                    ))
                } else {
                    NodeValue::Collection(
                        pairs
                            .into_iter()
                            .map(|(key, value)| Entry::keyed(key, value))
                            .collect(),
                    )
                }
            }
            Snapshot::Scalar(value) => Self::from_value(value, node),
        }
    }

    /// Wrap a plain value (an unbound node's derived value, or an
    /// unordered scalar snapshot) for child evaluation.
    pub fn from_value(value: Value, node: &QueryNode) -> NodeValue {
        match value {
            Value::Null => NodeValue::Absent,
            Value::Array(items) if !node.is_leaf() => NodeValue::Collection(
                items.into_iter().map(Entry::keyless).collect(),
            ),
            Value::Object(map) if node.is_collection() => NodeValue::Collection(
                map.into_iter()
                    .map(|(key, value)| Entry::keyed(key, value))
                    .collect(),
            ),
            other => NodeValue::Single(Entry::keyless(other)),
        }
    }

    /// The value a leaf node emits for this shape
    pub fn leaf_output(&self) -> Value {
        match self {
            NodeValue::Absent => Value::Null,
            NodeValue::Single(entry) => entry.value.clone(),
            NodeValue::Collection(entries) => Value::Array(
                entries.iter().map(|entry| entry.value.clone()).collect(),
            ),
        }
    }

    /// Entries for child fan-out, with the index to tag emissions with
    /// when this value is a collection.
    pub fn fan_out(&self) -> Vec<(Option<usize>, Option<Entry>)> {
        match self {
            NodeValue::Absent => vec![(None, None)],
            NodeValue::Single(entry) => vec![(None, Some(entry.clone()))],
            NodeValue::Collection(entries) => entries
                .iter()
                .enumerate()
                .map(|(idx, entry)| (Some(idx), Some(entry.clone())))
                .collect(),
        }
    }
}

/// Derive an unbound node's value synchronously from its parent entry.
///
/// Never touches the store: key read, raw value read, imported-name read,
/// the reserved type-name marker, or a direct field lookup.
pub fn derive_unbound(
    node: &QueryNode,
    parent: Option<&Entry>,
    parent_type: Option<&str>,
    scope: &Scope,
) -> EngineResult<Value> {
    if let Some(import) = &node.import_name {
        if node.export_name.as_deref() == Some(import.as_str()) {
            return Err(EngineError::CircularImport(import.clone()));
        }
        return Ok(scope.lookup(import).unwrap_or(Value::Null));
    }

    if node.is_type_name() {
        return Ok(parent_type
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null));
    }

    let Some(entry) = parent else {
        return Ok(Value::Null);
    };

    if node.is_key_selector {
        return Ok(entry
            .key
            .as_ref()
            .map(|k| Value::String(k.clone()))
            .unwrap_or(Value::Null));
    }
    if node.is_value_selector {
        return Ok(entry.value.clone());
    }

    Ok(entry.value.get(&node.name).cloned().unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_leaf_snapshot_unwrapped() {
        let node = QueryNode::field("title");
        let value = NodeValue::from_snapshot(Snapshot::Scalar(json!("hello")), &node);
        assert_eq!(value, NodeValue::Single(Entry::keyless(json!("hello"))));
        assert_eq!(value.leaf_output(), json!("hello"));
    }

    #[test]
    fn test_ordered_snapshot_keeps_order() {
        let node = QueryNode::field("posts").with_child(QueryNode::field("title"));
        let snapshot = Snapshot::Collection(vec![
            ("p2".to_string(), json!({"title": "b"})),
            ("p1".to_string(), json!({"title": "a"})),
        ]);
        match NodeValue::from_snapshot(snapshot, &node) {
            NodeValue::Collection(entries) => {
                assert_eq!(entries[0].key.as_deref(), Some("p2"));
                assert_eq!(entries[1].key.as_deref(), Some("p1"));
            }
            other => panic!("Expected collection, got {:?}", other),
        }
    }

    #[test]
    fn test_object_snapshot_collection_mode() {
        let node = QueryNode::field("posts")
            .array()
            .with_child(QueryNode::field("title"));
        let snapshot = Snapshot::Scalar(json!({"p1": {"title": "a"}}));
        match NodeValue::from_snapshot(snapshot, &node) {
            NodeValue::Collection(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].key.as_deref(), Some("p1"));
            }
            other => panic!("Expected collection, got {:?}", other),
        }
    }

    #[test]
    fn test_object_snapshot_single_mode() {
        let node = QueryNode::field("post").with_child(QueryNode::field("title"));
        let snapshot = Snapshot::Scalar(json!({"title": "a"}));
        assert_eq!(
            NodeValue::from_snapshot(snapshot, &node),
            NodeValue::Single(Entry::keyless(json!({"title": "a"})))
        );
    }

    #[test]
    fn test_array_snapshot_always_collection() {
        let node = QueryNode::field("items").with_child(QueryNode::field("x"));
        let snapshot = Snapshot::Scalar(json!([{"x": 1}, {"x": 2}]));
        match NodeValue::from_snapshot(snapshot, &node) {
            NodeValue::Collection(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].key, None);
            }
            other => panic!("Expected collection, got {:?}", other),
        }
    }

    #[test]
    fn test_derive_field_read() {
        let node = QueryNode::field("x");
        let entry = Entry::keyless(json!({"x": 5, "y": 6}));
        let scope = Scope::root(HashMap::new());
        assert_eq!(
            derive_unbound(&node, Some(&entry), None, &scope).unwrap(),
            json!(5)
        );
    }

    #[test]
    fn test_derive_missing_field_is_null() {
        let node = QueryNode::field("z");
        let entry = Entry::keyless(json!({"x": 5}));
        let scope = Scope::root(HashMap::new());
        assert_eq!(
            derive_unbound(&node, Some(&entry), None, &scope).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_derive_key_and_value() {
        let key_node = QueryNode::key_selector("id");
        let value_node = QueryNode::value_selector("raw");
        let entry = Entry::keyed("p1", json!({"x": 1}));
        let scope = Scope::root(HashMap::new());

        assert_eq!(
            derive_unbound(&key_node, Some(&entry), None, &scope).unwrap(),
            json!("p1")
        );
        assert_eq!(
            derive_unbound(&value_node, Some(&entry), None, &scope).unwrap(),
            json!({"x": 1})
        );
    }

    #[test]
    fn test_derive_import() {
        let node = QueryNode::field("author").importing("uid");
        let scope = Scope::root(HashMap::new());
        scope.export("uid", json!("u1"));
        assert_eq!(
            derive_unbound(&node, None, None, &scope).unwrap(),
            json!("u1")
        );
    }

    #[test]
    fn test_derive_circular_import_fails() {
        let node = QueryNode::field("a").exported("x").importing("x");
        let scope = Scope::root(HashMap::new());
        let result = derive_unbound(&node, None, None, &scope);
        assert!(matches!(result, Err(EngineError::CircularImport(_))));
    }

    #[test]
    fn test_derive_type_name() {
        let node = QueryNode::field("__typename");
        let scope = Scope::root(HashMap::new());
        assert_eq!(
            derive_unbound(&node, None, Some("Post"), &scope).unwrap(),
            json!("Post")
        );
        assert_eq!(
            derive_unbound(&node, None, None, &scope).unwrap(),
            Value::Null
        );
    }
}
