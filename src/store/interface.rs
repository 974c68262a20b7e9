//! Store-binding traits
//!
//! The seam between the engine and a concrete store backend. The engine
//! asks the [`Store`] for a query object per resolved binding; the
//! per-execution reference cache guarantees that identical bindings share
//! one query object, so a backend can dedupe its server-side work per
//! distinct path + modifier set.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use super::errors::StoreResult;
use super::snapshot::Snapshot;

/// Callback through which a store delivers snapshots.
///
/// Shared (`Rc`) so a backend can re-deliver to the same watcher on every
/// change; state mutation happens through interior mutability on the
/// engine side.
pub type SnapshotFn = Rc<dyn Fn(Snapshot)>;

/// Fully resolved query modifiers handed to the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modifiers {
    /// Order the collection by a child field
    pub order_by_field: Option<String>,
    /// Order the collection by entry key
    pub order_by_key: bool,
    /// Order the collection by entry value
    pub order_by_value: bool,
    /// Keep only the first N entries
    pub limit_first: Option<u64>,
    /// Keep only the last N entries
    pub limit_last: Option<u64>,
    /// Lower bound on the ordered dimension
    pub range_start: Option<Value>,
    /// Upper bound on the ordered dimension
    pub range_end: Option<Value>,
    /// Exact match on the ordered dimension
    pub equal_to: Option<Value>,
}

impl Modifiers {
    /// Returns true if any modifier requests ordered-collection evaluation
    pub fn is_query(&self) -> bool {
        self.order_by_field.is_some()
            || self.order_by_key
            || self.order_by_value
            || self.limit_first.is_some()
            || self.limit_last.is_some()
            || self.range_start.is_some()
            || self.range_end.is_some()
            || self.equal_to.is_some()
    }
}

/// A constructed store query: one path plus one set of modifiers
pub trait StoreQuery {
    /// One-shot read; invokes `deliver` exactly once when the snapshot is
    /// available.
    fn read(&self, deliver: SnapshotFn) -> StoreResult<()>;

    /// Live watch; invokes `deliver` with the current snapshot and again
    /// on every subsequent change, until the handle is unwatched.
    fn watch(&self, deliver: SnapshotFn) -> StoreResult<WatchHandle>;
}

/// A store backend that can construct query objects
pub trait Store {
    /// Build a query object for a path and modifier set
    fn query(&self, path: &str, modifiers: &Modifiers) -> StoreResult<Rc<dyn StoreQuery>>;
}

/// Handle for detaching a live watch.
///
/// `unwatch` is idempotent: the detach closure runs at most once.
pub struct WatchHandle {
    detach: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl WatchHandle {
    /// Wrap a detach closure
    pub fn new(detach: impl FnOnce() + 'static) -> Self {
        Self {
            detach: RefCell::new(Some(Box::new(detach))),
        }
    }

    /// Detach the watch; safe to call multiple times
    pub fn unwatch(&self) {
        if let Some(detach) = self.detach.borrow_mut().take() {
            detach();
        }
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let detached = self.detach.borrow().is_none();
        f.debug_struct("WatchHandle")
            .field("detached", &detached)
            .finish()
    }
}
