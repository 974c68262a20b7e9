//! Change relevance detection
//!
//! Live updates from the store are change-agnostic: every delivery carries
//! the full current value at the path. This module decides whether the
//! difference between two successive node values touches anything the
//! query actually selects, so unrelated sibling-field writes never trigger
//! downstream recomputation or redundant emissions.
//!
//! Collections are diffed positionally: a length change is always
//! relevant, otherwise corresponding index pairs are compared under the
//! same selected-subtree filter.

use serde_json::Value;

use crate::query::QueryNode;

use super::value::NodeValue;

/// Decide whether the difference between two successive values for a node
/// is relevant to its selection.
pub fn is_relevant_change(old: &NodeValue, new: &NodeValue, node: &QueryNode) -> bool {
    match (old, new) {
        (NodeValue::Absent, NodeValue::Absent) => false,
        (NodeValue::Single(a), NodeValue::Single(b)) => {
            value_change_relevant(&a.value, &b.value, node)
        }
        (NodeValue::Collection(a), NodeValue::Collection(b)) => {
            if a.len() != b.len() {
                return true;
            }
            a.iter()
                .zip(b.iter())
                .any(|(ea, eb)| value_change_relevant(&ea.value, &eb.value, node))
        }
        // Shape changed (appeared, vanished, single <-> collection)
        _ => true,
    }
}

fn value_change_relevant(old: &Value, new: &Value, node: &QueryNode) -> bool {
    let mut changed_paths = Vec::new();
    collect_changes(old, new, &mut Vec::new(), &mut changed_paths);
    changed_paths
        .iter()
        .any(|path| selection_contains(node, path, 0))
}

/// Collect the paths at which two values differ structurally.
fn collect_changes(
    old: &Value,
    new: &Value,
    prefix: &mut Vec<String>,
    out: &mut Vec<Vec<String>>,
) {
    if old == new {
        return;
    }
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, old_child) in a {
                match b.get(key) {
                    Some(new_child) => {
                        prefix.push(key.clone());
                        collect_changes(old_child, new_child, prefix, out);
                        prefix.pop();
                    }
                    None => {
                        prefix.push(key.clone());
                        out.push(prefix.clone());
                        prefix.pop();
                    }
                }
            }
            for key in b.keys() {
                if !a.contains_key(key) {
                    prefix.push(key.clone());
                    out.push(prefix.clone());
                    prefix.pop();
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                out.push(prefix.clone());
                return;
            }
            for (idx, (old_item, new_item)) in a.iter().zip(b.iter()).enumerate() {
                prefix.push(idx.to_string());
                collect_changes(old_item, new_item, prefix, out);
                prefix.pop();
            }
        }
        _ => out.push(prefix.clone()),
    }
}

/// Does a changed path fall inside this node's selected subtree?
///
/// A leaf selects everything beneath it. Children selecting the entry key
/// or an imported name do not depend on the parent's data and never match;
/// a child selecting the raw value matches any change.
fn selection_contains(node: &QueryNode, path: &[String], idx: usize) -> bool {
    if node.children.is_empty() {
        return true;
    }
    if node
        .children
        .iter()
        .any(|child| child.is_value_selector)
    {
        return true;
    }
    // The change replaced this entire position; some selected child is
    // under it.
    if idx >= path.len() {
        return true;
    }
    let segment = &path[idx];
    node.children
        .iter()
        .filter(|child| !child.is_key_selector && child.import_name.is_none())
        .find(|child| &child.name == segment)
        .map(|child| selection_contains(child, path, idx + 1))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::value::Entry;
    use serde_json::json;

    fn single(value: Value) -> NodeValue {
        NodeValue::Single(Entry::keyless(value))
    }

    fn two_field_node() -> QueryNode {
        QueryNode::field("parent")
            .with_child(QueryNode::field("x"))
            .with_child(QueryNode::field("id"))
    }

    #[test]
    fn test_unselected_field_change_is_irrelevant() {
        let node = two_field_node();
        let old = single(json!({"id": "k1", "x": 5, "z": 1}));
        let new = single(json!({"id": "k1", "x": 5, "z": 2}));
        assert!(!is_relevant_change(&old, &new, &node));
    }

    #[test]
    fn test_selected_field_change_is_relevant() {
        let node = two_field_node();
        let old = single(json!({"id": "k1", "x": 5}));
        let new = single(json!({"id": "k1", "x": 6}));
        assert!(is_relevant_change(&old, &new, &node));
    }

    #[test]
    fn test_identical_values_are_irrelevant() {
        let node = two_field_node();
        let old = single(json!({"id": "k1", "x": 5}));
        assert!(!is_relevant_change(&old, &old.clone(), &node));
    }

    #[test]
    fn test_nested_selection_filter() {
        let node = QueryNode::field("post").with_child(
            QueryNode::field("meta").with_child(QueryNode::field("views")),
        );
        let old = single(json!({"meta": {"views": 1, "likes": 0}}));
        let irrelevant = single(json!({"meta": {"views": 1, "likes": 9}}));
        let relevant = single(json!({"meta": {"views": 2, "likes": 0}}));

        assert!(!is_relevant_change(&old, &irrelevant, &node));
        assert!(is_relevant_change(&old, &relevant, &node));
    }

    #[test]
    fn test_leaf_selects_everything() {
        let node = QueryNode::field("raw");
        let old = single(json!({"anything": 1}));
        let new = single(json!({"anything": 2}));
        assert!(is_relevant_change(&old, &new, &node));
    }

    #[test]
    fn test_field_appearing_is_a_change() {
        let node = two_field_node();
        let old = single(json!({"id": "k1"}));
        let new = single(json!({"id": "k1", "x": 1}));
        assert!(is_relevant_change(&old, &new, &node));
    }

    #[test]
    fn test_collection_length_change_is_relevant() {
        let node = two_field_node();
        let old = NodeValue::Collection(vec![Entry::keyed("a", json!({"x": 1}))]);
        let new = NodeValue::Collection(vec![
            Entry::keyed("a", json!({"x": 1})),
            Entry::keyed("b", json!({"x": 2})),
        ]);
        assert!(is_relevant_change(&old, &new, &node));
    }

    #[test]
    fn test_collection_positional_diff() {
        let node = two_field_node();
        let old = NodeValue::Collection(vec![
            Entry::keyed("a", json!({"x": 1, "z": 1})),
            Entry::keyed("b", json!({"x": 2, "z": 2})),
        ]);
        let unselected = NodeValue::Collection(vec![
            Entry::keyed("a", json!({"x": 1, "z": 9})),
            Entry::keyed("b", json!({"x": 2, "z": 2})),
        ]);
        let selected = NodeValue::Collection(vec![
            Entry::keyed("a", json!({"x": 1, "z": 1})),
            Entry::keyed("b", json!({"x": 7, "z": 2})),
        ]);

        assert!(!is_relevant_change(&old, &unselected, &node));
        assert!(is_relevant_change(&old, &selected, &node));
    }

    #[test]
    fn test_value_identical_reorder_suppressed() {
        // Positional policy: swapping entries whose selected content is
        // identical does not re-emit; keys are not diffed.
        let node = two_field_node();
        let old = NodeValue::Collection(vec![
            Entry::keyed("a", json!({"id": "k", "x": 1})),
            Entry::keyed("b", json!({"id": "k", "x": 1})),
        ]);
        let reordered = NodeValue::Collection(vec![
            Entry::keyed("b", json!({"id": "k", "x": 1})),
            Entry::keyed("a", json!({"id": "k", "x": 1})),
        ]);
        assert!(!is_relevant_change(&old, &reordered, &node));
    }

    #[test]
    fn test_shape_change_is_relevant() {
        let node = two_field_node();
        let old = NodeValue::Absent;
        let new = single(json!({"x": 1}));
        assert!(is_relevant_change(&old, &new, &node));
    }

    #[test]
    fn test_value_selector_child_matches_everything() {
        let node = QueryNode::field("items")
            .with_child(QueryNode::key_selector("id"))
            .with_child(QueryNode::value_selector("raw"));
        let old = NodeValue::Collection(vec![Entry::keyed("a", json!({"any": 1}))]);
        let new = NodeValue::Collection(vec![Entry::keyed("a", json!({"any": 2}))]);
        assert!(is_relevant_change(&old, &new, &node));
    }
}
