//! Per-execution reference cache
//!
//! Memoizes constructed store query objects by canonical cache key, so
//! sibling or repeated-array-element nodes that resolve to an identical
//! query share exactly one underlying handle (one physical listener).
//!
//! Scoped to a single top-level execute call and discarded with it; never
//! shared across executions, so a plain map suffices.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::store::{Store, StoreQuery, StoreResult};

use super::resolve::ResolvedBinding;

/// Memoized store query handles for one execution pass
#[derive(Default)]
pub struct ReferenceCache {
    entries: RefCell<HashMap<String, Rc<dyn StoreQuery>>>,
}

impl ReferenceCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the handle for a resolved binding, constructing it on miss
    pub fn get_or_create(
        &self,
        store: &dyn Store,
        resolved: &ResolvedBinding,
    ) -> StoreResult<Rc<dyn StoreQuery>> {
        if let Some(handle) = self.entries.borrow().get(&resolved.cache_key) {
            return Ok(handle.clone());
        }

        let handle = store.query(&resolved.path, &resolved.modifiers)?;
        self.entries
            .borrow_mut()
            .insert(resolved.cache_key.clone(), handle.clone());
        Ok(handle)
    }

    /// Number of distinct handles constructed so far
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Returns true if no handle has been constructed yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
