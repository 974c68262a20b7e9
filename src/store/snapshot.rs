//! Snapshots delivered by store backends
//!
//! A snapshot is the full current value at a queried location: a scalar
//! (any JSON value), an ordered sequence of key/value pairs when the query
//! carried ordering or range modifiers, or absence.

use serde_json::Value;

/// The value delivered for one read or watch callback
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// Nothing exists at the queried location
    Absent,
    /// The raw value at the location
    Scalar(Value),
    /// An ordered sequence of key/value pairs
    Collection(Vec<(String, Value)>),
}

impl Snapshot {
    /// Returns true if nothing exists at the location
    pub fn is_absent(&self) -> bool {
        matches!(self, Snapshot::Absent)
            || matches!(self, Snapshot::Scalar(Value::Null))
    }

    /// Collapse into a plain JSON value.
    ///
    /// Collections become an object keyed by entry key; order is lost,
    /// which is acceptable for leaf reads that never asked for ordering
    /// of their own fields.
    pub fn into_value(self) -> Value {
        match self {
            Snapshot::Absent => Value::Null,
            Snapshot::Scalar(value) => value,
            Snapshot::Collection(pairs) => {
                let mut map = serde_json::Map::new();
                for (key, value) in pairs {
                    map.insert(key, value);
                }
                Value::Object(map)
            }
        }
    }
}
