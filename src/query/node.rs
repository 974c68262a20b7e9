//! Query-tree node
//!
//! One named field selection, optionally bound to a store location, with
//! export/import annotations, key/value selection and collection hints.
//!
//! Trees are immutable once built. The runtime keeps no parent back-pointer:
//! variable lookup walks the execution scope chain instead, which keeps
//! ownership strictly top-down.

use std::rc::Rc;

use super::binding::QueryBinding;

/// Reserved field name that derives the parent node's type hint
pub(crate) const TYPE_NAME_FIELD: &str = "__typename";

/// A single node of a compiled query tree
#[derive(Debug, Clone, Default)]
pub struct QueryNode {
    /// Field name (the key in the assembled result)
    pub name: String,

    /// Nested selections, in declaration order
    pub children: Vec<Rc<QueryNode>>,

    /// Publish this node's resolved value under a name visible to
    /// descendants and later siblings
    pub export_name: Option<String>,

    /// Read a previously exported name instead of the parent value
    pub import_name: Option<String>,

    /// Select the parent entry's store key
    pub is_key_selector: bool,

    /// Select the parent entry's raw value
    pub is_value_selector: bool,

    /// Force element-keyed collection interpretation of the bound snapshot
    pub is_array_hint: bool,

    /// Emit a placeholder null before the first live value arrives
    pub defer_initial: bool,

    /// Type marker exposed to `__typename` child selections
    pub type_hint: Option<String>,

    /// Store binding, or None for a value derived from the parent
    pub binding: Option<QueryBinding>,
}

impl QueryNode {
    /// Create an unbound field selection
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create a field selection bound to a store location
    pub fn bound(name: impl Into<String>, binding: QueryBinding) -> Self {
        Self {
            name: name.into(),
            binding: Some(binding),
            ..Self::default()
        }
    }

    /// Create a selection of the parent entry's key
    pub fn key_selector(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_key_selector: true,
            ..Self::default()
        }
    }

    /// Create a selection of the parent entry's raw value
    pub fn value_selector(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_value_selector: true,
            ..Self::default()
        }
    }

    /// Add a nested selection
    pub fn with_child(mut self, child: QueryNode) -> Self {
        self.children.push(Rc::new(child));
        self
    }

    /// Export this node's resolved value under a name
    pub fn exported(mut self, name: impl Into<String>) -> Self {
        self.export_name = Some(name.into());
        self
    }

    /// Redirect this node to a previously exported name
    pub fn importing(mut self, name: impl Into<String>) -> Self {
        self.import_name = Some(name.into());
        self
    }

    /// Force collection interpretation of the bound snapshot
    pub fn array(mut self) -> Self {
        self.is_array_hint = true;
        self
    }

    /// Emit a placeholder null before the first live value
    pub fn deferred(mut self) -> Self {
        self.defer_initial = true;
        self
    }

    /// Set the type marker exposed to `__typename` children
    pub fn with_type_hint(mut self, type_hint: impl Into<String>) -> Self {
        self.type_hint = Some(type_hint.into());
        self
    }

    /// Wrap for tree sharing
    pub fn into_rc(self) -> Rc<QueryNode> {
        Rc::new(self)
    }

    /// Returns true if this node has no nested selections
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Collection interpretation, inferred bottom-up: an explicit array
    /// hint, or any direct child selecting the entry key or raw value,
    /// forces collection mode.
    pub fn is_collection(&self) -> bool {
        self.is_array_hint
            || self
                .children
                .iter()
                .any(|child| child.is_key_selector || child.is_value_selector)
    }

    /// Returns true if this node selects the reserved type-name field
    pub fn is_type_name(&self) -> bool {
        self.name == TYPE_NAME_FIELD
    }
}
