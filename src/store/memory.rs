//! In-memory store backend
//!
//! A JSON tree addressed by `/`-separated paths, with synchronous live
//! watchers and full modifier evaluation (ordering, ranges, limits). Used
//! by the test suite as the reference backend; `hold`/`flush` let a test
//! stage writes and control exactly when watchers hear about them, which
//! is how network latency is simulated.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use super::interface::{Modifiers, SnapshotFn, Store, StoreQuery, WatchHandle};
use super::snapshot::Snapshot;

struct Watcher {
    path: String,
    modifiers: Modifiers,
    deliver: SnapshotFn,
}

struct PendingDelivery {
    path: String,
    modifiers: Modifiers,
    deliver: SnapshotFn,
}

struct StoreInner {
    root: RefCell<Value>,
    watchers: RefCell<HashMap<u64, Watcher>>,
    next_watcher: Cell<u64>,
    denied: RefCell<HashSet<String>>,
    held: Cell<bool>,
    pending: RefCell<Vec<PendingDelivery>>,
}

/// In-memory hierarchical store with live watchers
#[derive(Clone)]
pub struct MemoryStore {
    inner: Rc<StoreInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            inner: Rc::new(StoreInner {
                root: RefCell::new(Value::Null),
                watchers: RefCell::new(HashMap::new()),
                next_watcher: Cell::new(0),
                denied: RefCell::new(HashSet::new()),
                held: Cell::new(false),
                pending: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Create a store seeded with a value at a path
    pub fn with_data(path: &str, value: Value) -> Self {
        let store = Self::new();
        store.put(path, value);
        store
    }

    /// Write a value at a path and notify every related watcher.
    ///
    /// Writing `Value::Null` deletes the location.
    pub fn put(&self, path: &str, value: Value) {
        let segments = split_path(path);
        {
            let mut root = self.inner.root.borrow_mut();
            set_at(&mut root, &segments, value);
        }
        self.notify(&segments);
    }

    /// Mark a path as permission-denied; reads and watches on it fail
    pub fn deny(&self, path: &str) {
        self.inner.denied.borrow_mut().insert(normalize(path));
    }

    /// Stop delivering snapshots; deliveries queue until [`flush`](Self::flush)
    pub fn hold(&self) {
        self.inner.held.set(true);
    }

    /// Deliver every queued snapshot, in queue order, and resume
    /// synchronous delivery
    pub fn flush(&self) {
        self.inner.held.set(false);
        let drained: Vec<PendingDelivery> =
            self.inner.pending.borrow_mut().drain(..).collect();
        for delivery in drained {
            let snapshot = self.evaluate(&delivery.path, &delivery.modifiers);
            (delivery.deliver)(snapshot);
        }
    }

    /// Number of live watchers; tests use this to check listener cleanup
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.borrow().len()
    }

    fn deliver_or_queue(&self, path: &str, modifiers: &Modifiers, deliver: SnapshotFn) {
        if self.inner.held.get() {
            self.inner.pending.borrow_mut().push(PendingDelivery {
                path: path.to_string(),
                modifiers: modifiers.clone(),
                deliver,
            });
        } else {
            let snapshot = self.evaluate(path, modifiers);
            deliver(snapshot);
        }
    }

    /// Re-deliver to every watcher whose path is an ancestor, descendant,
    /// or equal of the written path.
    fn notify(&self, written: &[String]) {
        // Collect ids first: delivery callbacks may attach or detach
        // watchers re-entrantly.
        let candidates: Vec<u64> = {
            let watchers = self.inner.watchers.borrow();
            watchers
                .iter()
                .filter(|(_, w)| paths_related(&split_path(&w.path), written))
                .map(|(id, _)| *id)
                .collect()
        };

        for id in candidates {
            let watcher = {
                let watchers = self.inner.watchers.borrow();
                watchers
                    .get(&id)
                    .map(|w| (w.path.clone(), w.modifiers.clone(), w.deliver.clone()))
            };
            // Skip watchers detached by an earlier delivery in this pass
            if let Some((path, modifiers, deliver)) = watcher {
                self.deliver_or_queue(&path, &modifiers, deliver);
            }
        }
    }

    fn evaluate(&self, path: &str, modifiers: &Modifiers) -> Snapshot {
        let segments = split_path(path);
        let value = {
            let root = self.inner.root.borrow();
            value_at(&root, &segments).cloned()
        };

        let Some(value) = value else {
            return Snapshot::Absent;
        };
        if value.is_null() {
            return Snapshot::Absent;
        }
        if !modifiers.is_query() {
            return Snapshot::Scalar(value);
        }

        let mut entries: Vec<(String, Value)> = match value {
            Value::Object(map) => map.into_iter().collect(),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(idx, item)| (idx.to_string(), item))
                .collect(),
            // Scalar at an ordered query: nothing to order
            other => return Snapshot::Scalar(other),
        };

        // Ordered dimension: child field, key, or value; key when only
        // range/limit modifiers are present.
        let dimension = |entry: &(String, Value)| -> Value {
            if let Some(field) = &modifiers.order_by_field {
                entry.1.get(field).cloned().unwrap_or(Value::Null)
            } else if modifiers.order_by_value {
                entry.1.clone()
            } else {
                Value::String(entry.0.clone())
            }
        };

        entries.sort_by(|a, b| compare_values(&dimension(a), &dimension(b)));

        if let Some(target) = &modifiers.equal_to {
            entries.retain(|e| &dimension(e) == target);
        } else {
            if let Some(start) = &modifiers.range_start {
                entries.retain(|e| compare_values(&dimension(e), start) != Ordering::Less);
            }
            if let Some(end) = &modifiers.range_end {
                entries.retain(|e| compare_values(&dimension(e), end) != Ordering::Greater);
            }
        }

        if let Some(first) = modifiers.limit_first {
            entries.truncate(first as usize);
        }
        if let Some(last) = modifiers.limit_last {
            let len = entries.len();
            if len > last as usize {
                entries.drain(0..len - last as usize);
            }
        }

        Snapshot::Collection(entries)
    }
}

impl Store for MemoryStore {
    fn query(&self, path: &str, modifiers: &Modifiers) -> StoreResult<Rc<dyn StoreQuery>> {
        Ok(Rc::new(MemoryQuery {
            store: self.clone(),
            path: normalize(path),
            modifiers: modifiers.clone(),
        }))
    }
}

struct MemoryQuery {
    store: MemoryStore,
    path: String,
    modifiers: Modifiers,
}

impl MemoryQuery {
    fn check_access(&self) -> StoreResult<()> {
        if self.store.inner.denied.borrow().contains(&self.path) {
            return Err(StoreError::PermissionDenied(self.path.clone()));
        }
        Ok(())
    }
}

impl StoreQuery for MemoryQuery {
    fn read(&self, deliver: SnapshotFn) -> StoreResult<()> {
        self.check_access()?;
        self.store.deliver_or_queue(&self.path, &self.modifiers, deliver);
        Ok(())
    }

    fn watch(&self, deliver: SnapshotFn) -> StoreResult<WatchHandle> {
        self.check_access()?;

        let id = self.store.inner.next_watcher.get();
        self.store.inner.next_watcher.set(id + 1);
        self.store.inner.watchers.borrow_mut().insert(
            id,
            Watcher {
                path: self.path.clone(),
                modifiers: self.modifiers.clone(),
                deliver: deliver.clone(),
            },
        );

        self.store
            .deliver_or_queue(&self.path, &self.modifiers, deliver);

        let inner = self.store.inner.clone();
        Ok(WatchHandle::new(move || {
            inner.watchers.borrow_mut().remove(&id);
        }))
    }
}

fn normalize(path: &str) -> String {
    split_path(path).join("/")
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// True if one path is a (non-strict) prefix of the other
fn paths_related(a: &[String], b: &[String]) -> bool {
    let common = a.len().min(b.len());
    a[..common] == b[..common]
}

fn value_at<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn set_at(root: &mut Value, segments: &[String], value: Value) {
    if segments.is_empty() {
        *root = value;
        return;
    }
    if !root.is_object() {
        *root = Value::Object(serde_json::Map::new());
    }
    let Some(map) = root.as_object_mut() else {
        return;
    };
    if segments.len() == 1 {
        if value.is_null() {
            map.remove(&segments[0]);
        } else {
            map.insert(segments[0].clone(), value);
        }
        return;
    }
    let child = map
        .entry(segments[0].clone())
        .or_insert(Value::Object(serde_json::Map::new()));
    set_at(child, &segments[1..], value);
}

/// Total order over JSON values: null < bool < number < string, natural
/// ordering within a type; arrays and objects compare equal.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    let type_order = |v: &Value| -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    };

    let a_type = type_order(a);
    let b_type = type_order(b);
    if a_type != b_type {
        return a_type.cmp(&b_type);
    }

    match (a, b) {
        (Value::Bool(a_b), Value::Bool(b_b)) => a_b.cmp(b_b),
        (Value::Number(a_n), Value::Number(b_n)) => {
            let a_f = a_n.as_f64().unwrap_or(0.0);
            let b_f = b_n.as_f64().unwrap_or(0.0);
            a_f.partial_cmp(&b_f).unwrap_or(Ordering::Equal)
        }
        (Value::String(a_s), Value::String(b_s)) => a_s.cmp(b_s),
        _ => Ordering::Equal,
    }
}
