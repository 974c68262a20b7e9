//! Store binding for a query-tree node
//!
//! Ties a node to a location/query in the external store: a path template
//! plus ordering, limit and range modifiers. String-typed values (the path
//! and any string modifier) may carry `$name$` placeholders resolved at
//! execution time against exported values and operation parameters.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

/// Data-dependent path rewriting hook.
///
/// Called with the parent entry's key and value once the path template has
/// been resolved; a returned subpath is appended to the resolved path.
pub type SubpathFn = Rc<dyn Fn(Option<&str>, &Value) -> Option<String>>;

/// Binding of a query node to a store location
#[derive(Clone, Default)]
pub struct QueryBinding {
    /// Path template, may contain `$name$` placeholders
    pub path: String,

    /// Order the collection by a child field
    pub order_by_field: Option<String>,
    /// Order the collection by entry key
    pub order_by_key: bool,
    /// Order the collection by entry value
    pub order_by_value: bool,

    /// Keep only the first N entries (numeric, or a placeholder string)
    pub limit_first: Option<Value>,
    /// Keep only the last N entries (numeric, or a placeholder string)
    pub limit_last: Option<Value>,

    /// Lower bound on the ordered dimension
    pub range_start: Option<Value>,
    /// Upper bound on the ordered dimension
    pub range_end: Option<Value>,
    /// Exact match on the ordered dimension
    pub equal_to: Option<Value>,

    /// Optional data-dependent subpath hook
    pub derive_subpath: Option<SubpathFn>,
}

impl QueryBinding {
    /// Create a binding for a path template
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Order by a child field
    pub fn order_by_field(mut self, field: impl Into<String>) -> Self {
        self.order_by_field = Some(field.into());
        self
    }

    /// Order by entry key
    pub fn order_by_key(mut self) -> Self {
        self.order_by_key = true;
        self
    }

    /// Order by entry value
    pub fn order_by_value(mut self) -> Self {
        self.order_by_value = true;
        self
    }

    /// Keep only the first N entries
    pub fn limit_first(mut self, limit: impl Into<Value>) -> Self {
        self.limit_first = Some(limit.into());
        self
    }

    /// Keep only the last N entries
    pub fn limit_last(mut self, limit: impl Into<Value>) -> Self {
        self.limit_last = Some(limit.into());
        self
    }

    /// Lower bound on the ordered dimension
    pub fn range_start(mut self, value: impl Into<Value>) -> Self {
        self.range_start = Some(value.into());
        self
    }

    /// Upper bound on the ordered dimension
    pub fn range_end(mut self, value: impl Into<Value>) -> Self {
        self.range_end = Some(value.into());
        self
    }

    /// Exact match on the ordered dimension
    pub fn equal_to(mut self, value: impl Into<Value>) -> Self {
        self.equal_to = Some(value.into());
        self
    }

    /// Attach a data-dependent subpath hook
    pub fn derive_subpath<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&str>, &Value) -> Option<String> + 'static,
    {
        self.derive_subpath = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for QueryBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBinding")
            .field("path", &self.path)
            .field("order_by_field", &self.order_by_field)
            .field("order_by_key", &self.order_by_key)
            .field("order_by_value", &self.order_by_value)
            .field("limit_first", &self.limit_first)
            .field("limit_last", &self.limit_last)
            .field("range_start", &self.range_start)
            .field("range_end", &self.range_end)
            .field("equal_to", &self.equal_to)
            .field("derive_subpath", &self.derive_subpath.as_ref().map(|_| "<hook>"))
            .finish()
    }
}
