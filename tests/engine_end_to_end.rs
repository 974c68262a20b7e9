//! End-to-End Execution Tests
//!
//! Full-stack tests driving query trees through the engine against the
//! in-memory store:
//! - One-shot assembly and completion
//! - Live updates through the change-relevance gate
//! - Variable export/import across siblings
//! - Listener lifecycle (cancel, error, deferred initial)

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{json, Value};

use canopy::engine::{Engine, EngineConfig, EngineEvent, EngineError, Mode};
use canopy::query::{QueryBinding, QueryNode};
use canopy::store::{
    MemoryStore, Modifiers, SnapshotFn, Store, StoreQuery, StoreResult, WatchHandle,
};

fn run(
    store: &MemoryStore,
    tree: Vec<Rc<QueryNode>>,
    params: HashMap<String, Value>,
    mode: Mode,
) -> (canopy::engine::Execution, Vec<EngineEvent>) {
    let engine = Engine::new(Rc::new(store.clone()));
    let execution = engine.execute(&tree, params, mode);
    let events = drain(&execution);
    (execution, events)
}

fn drain(execution: &canopy::engine::Execution) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Some(event) = execution.try_next_event() {
        out.push(event);
    }
    out
}

fn emitted(events: &[EngineEvent]) -> Vec<Value> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::Value(emission) => Some(emission.data.clone()),
            _ => None,
        })
        .collect()
}

fn completed(events: &[EngineEvent]) -> bool {
    events
        .iter()
        .any(|event| matches!(event, EngineEvent::Complete))
}

// =============================================================================
// One-Shot Execution
// =============================================================================

/// An import-only leaf resolves from parameters without touching the store.
#[test]
fn test_unbound_import_needs_no_store() {
    let store = MemoryStore::new();
    let tree = vec![QueryNode::field("me").importing("viewer").into_rc()];
    let params = HashMap::from([("viewer".to_string(), json!("u1"))]);

    let (_execution, events) = run(&store, tree, params, Mode::Once);

    assert_eq!(emitted(&events), vec![json!({"me": "u1"})]);
    assert!(completed(&events));
    assert_eq!(store.watcher_count(), 0);
}

/// A bound record node assembles its selected fields; unknown fields
/// settle to null.
#[test]
fn test_once_single_record() {
    let store = MemoryStore::with_data("/users/k1", json!({"x": 5, "z": 1}));
    let tree = vec![QueryNode::bound("user", QueryBinding::path("/users/k1"))
        .with_child(QueryNode::field("x"))
        .with_child(QueryNode::field("y"))
        .into_rc()];

    let (_execution, events) = run(&store, tree, HashMap::new(), Mode::Once);

    assert_eq!(emitted(&events), vec![json!({"user": {"x": 5, "y": null}})]);
    assert!(completed(&events));
}

/// A single-record tree with an exported field consumed by an importing
/// sibling assembles in one emission and completes.
#[test]
fn test_record_export_import_once() {
    let store = MemoryStore::with_data("/users/k1", json!({"id": "k1", "x": 5, "z": 1}));
    let tree = vec![QueryNode::bound("parent", QueryBinding::path("/users/k1"))
        .with_child(QueryNode::field("id").exported("uid"))
        .with_child(QueryNode::field("x"))
        .with_child(QueryNode::field("y").importing("uid"))
        .into_rc()];

    let (_execution, events) = run(&store, tree, HashMap::new(), Mode::Once);

    assert_eq!(
        emitted(&events),
        vec![json!({"parent": {"id": "k1", "x": 5, "y": "k1"}})]
    );
    assert!(completed(&events));
}

/// A key selector forces collection mode, and its export is visible to
/// later siblings in the same element.
#[test]
fn test_collection_key_export_import() {
    let store = MemoryStore::with_data("/users", json!({"k1": {"x": 5}}));
    let tree = vec![QueryNode::bound("users", QueryBinding::path("/users"))
        .with_child(QueryNode::key_selector("id").exported("uid"))
        .with_child(QueryNode::field("x"))
        .with_child(QueryNode::field("echo").importing("uid"))
        .into_rc()];

    let (_execution, events) = run(&store, tree, HashMap::new(), Mode::Once);

    assert_eq!(
        emitted(&events),
        vec![json!({"users": [{"id": "k1", "x": 5, "echo": "k1"}]})]
    );
    assert!(completed(&events));
}

/// A sibling's exported field value feeds a later sibling's path template.
#[test]
fn test_exported_field_resolves_sibling_path() {
    let store = MemoryStore::new();
    store.put("/posts", json!({"p1": {"title": "t", "author": "u1"}}));
    store.put("/users/u1", json!({"name": "amy"}));

    let tree = vec![QueryNode::bound("posts", QueryBinding::path("/posts"))
        .with_child(QueryNode::key_selector("id"))
        .with_child(QueryNode::field("author").exported("authorId"))
        .with_child(
            QueryNode::bound("author_info", QueryBinding::path("/users/$authorId$"))
                .with_child(QueryNode::field("name")),
        )
        .into_rc()];

    let (_execution, events) = run(&store, tree, HashMap::new(), Mode::Once);

    assert_eq!(
        emitted(&events),
        vec![json!({
            "posts": [{
                "id": "p1",
                "author": "u1",
                "author_info": {"name": "amy"}
            }]
        })]
    );
    assert!(completed(&events));
}

/// An unresolvable placeholder nulls the whole path, and the node falls
/// back to a null emission instead of erroring.
#[test]
fn test_unresolved_placeholder_nulls_binding() {
    let store = MemoryStore::with_data("/users/u1", json!({"name": "amy"}));
    let tree = vec![QueryNode::bound("user", QueryBinding::path("/users/$missing$"))
        .with_child(QueryNode::field("name"))
        .into_rc()];

    let (_execution, events) = run(&store, tree, HashMap::new(), Mode::Once);

    assert_eq!(emitted(&events), vec![json!({"user": null})]);
    assert!(completed(&events));
    assert_eq!(store.watcher_count(), 0);
}

/// An empty collection settles to an empty array, not a stalled branch.
#[test]
fn test_empty_collection_emits_empty_array() {
    let store = MemoryStore::with_data("/posts", json!({}));
    let tree = vec![QueryNode::bound("posts", QueryBinding::path("/posts"))
        .with_child(QueryNode::key_selector("id"))
        .into_rc()];

    let (_execution, events) = run(&store, tree, HashMap::new(), Mode::Once);

    assert_eq!(emitted(&events), vec![json!({"posts": []})]);
    assert!(completed(&events));
}

// =============================================================================
// Query Modifiers
// =============================================================================

/// Ordering and limits shape the delivered collection.
#[test]
fn test_order_by_value_with_limit() {
    let store = MemoryStore::with_data("/scores", json!({"a": 3, "b": 1, "c": 2}));
    let tree = vec![QueryNode::bound(
        "top",
        QueryBinding::path("/scores").order_by_value().limit_first(2),
    )
    .with_child(QueryNode::value_selector("score"))
    .into_rc()];

    let (_execution, events) = run(&store, tree, HashMap::new(), Mode::Once);

    assert_eq!(
        emitted(&events),
        vec![json!({"top": [{"score": 1}, {"score": 2}]})]
    );
    assert!(completed(&events));
}

/// Limits resolve through variable templates.
#[test]
fn test_limit_from_variable() {
    let store = MemoryStore::with_data("/scores", json!({"a": 3, "b": 1, "c": 2}));
    let tree = vec![QueryNode::bound(
        "first",
        QueryBinding::path("/scores").limit_first("$n$"),
    )
    .with_child(QueryNode::value_selector("v"))
    .into_rc()];
    let params = HashMap::from([("n".to_string(), json!("2"))]);

    let (_execution, events) = run(&store, tree, params, Mode::Once);

    // Default ordering is by key: a, b
    assert_eq!(
        emitted(&events),
        vec![json!({"first": [{"v": 3}, {"v": 1}]})]
    );
}

/// A limit that resolves to a non-integer fails the execution.
#[test]
fn test_invalid_limit_is_error() {
    let store = MemoryStore::with_data("/scores", json!({"a": 3}));
    let tree = vec![QueryNode::bound(
        "first",
        QueryBinding::path("/scores").limit_first("lots"),
    )
    .with_child(QueryNode::value_selector("v"))
    .into_rc()];

    let (execution, events) = run(&store, tree, HashMap::new(), Mode::Once);

    assert!(emitted(&events).is_empty());
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::Error(EngineError::InvalidModifier { .. }))));
    assert!(execution.is_terminated());
}

// =============================================================================
// Continuous Execution
// =============================================================================

/// Unselected-field writes are swallowed; selected-field writes re-emit
/// exactly once.
#[test]
fn test_relevance_gate_filters_updates() {
    let store = MemoryStore::with_data("/users/k1", json!({"x": 5, "z": 1}));
    let tree = vec![QueryNode::bound("user", QueryBinding::path("/users/k1"))
        .with_child(QueryNode::field("x"))
        .into_rc()];

    let (execution, events) = run(&store, tree, HashMap::new(), Mode::Continuous);
    assert_eq!(emitted(&events), vec![json!({"user": {"x": 5}})]);
    assert!(!completed(&events));

    store.put("/users/k1/z", json!(2));
    let events = drain(&execution);
    assert!(emitted(&events).is_empty(), "unselected change leaked");

    store.put("/users/k1/x", json!(6));
    let events = drain(&execution);
    assert_eq!(emitted(&events), vec![json!({"user": {"x": 6}})]);

    execution.cancel();
    assert_eq!(store.watcher_count(), 0);
}

/// Live updates on the export/import record tree: an unselected-field
/// write is suppressed, a selected-field write re-emits exactly once with
/// the imported value intact.
#[test]
fn test_record_live_update_keeps_import() {
    let store = MemoryStore::with_data("/users/k1", json!({"id": "k1", "x": 5, "z": 1}));
    let tree = vec![QueryNode::bound("parent", QueryBinding::path("/users/k1"))
        .with_child(QueryNode::field("id").exported("uid"))
        .with_child(QueryNode::field("x"))
        .with_child(QueryNode::field("y").importing("uid"))
        .into_rc()];

    let (execution, events) = run(&store, tree, HashMap::new(), Mode::Continuous);
    assert_eq!(
        emitted(&events),
        vec![json!({"parent": {"id": "k1", "x": 5, "y": "k1"}})]
    );
    assert!(!completed(&events));

    store.put("/users/k1/z", json!(2));
    let events = drain(&execution);
    assert!(emitted(&events).is_empty(), "unselected change leaked");

    store.put("/users/k1/x", json!(6));
    let events = drain(&execution);
    assert_eq!(
        emitted(&events),
        vec![json!({"parent": {"id": "k1", "x": 6, "y": "k1"}})]
    );

    execution.cancel();
    assert_eq!(store.watcher_count(), 0);
}

/// A record vanishing mid-stream collapses its branch to null.
#[test]
fn test_deleted_record_emits_null() {
    let store = MemoryStore::with_data("/users/k1", json!({"x": 5}));
    let tree = vec![QueryNode::bound("user", QueryBinding::path("/users/k1"))
        .with_child(QueryNode::field("x"))
        .into_rc()];

    let (execution, events) = run(&store, tree, HashMap::new(), Mode::Continuous);
    assert_eq!(emitted(&events), vec![json!({"user": {"x": 5}})]);

    store.put("/users/k1", Value::Null);
    let events = drain(&execution);
    assert_eq!(emitted(&events), vec![json!({"user": null})]);

    execution.cancel();
}

/// A deferred node shows up as null before the store answers.
#[test]
fn test_defer_initial_emits_null_placeholder() {
    let store = MemoryStore::with_data("/users/k1", json!({"x": 5}));
    store.hold();

    let tree = vec![QueryNode::bound("user", QueryBinding::path("/users/k1"))
        .deferred()
        .with_child(QueryNode::field("x"))
        .into_rc()];

    let (execution, events) = run(&store, tree, HashMap::new(), Mode::Once);
    assert_eq!(emitted(&events), vec![json!({"user": null})]);
    assert!(!completed(&events));

    store.flush();
    let events = drain(&execution);
    assert_eq!(emitted(&events), vec![json!({"user": {"x": 5}})]);
    assert!(completed(&events));
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Cancel detaches every listener; calling it again is a no-op.
#[test]
fn test_cancel_detaches_all_watchers() {
    let store = MemoryStore::new();
    store.put("/items/i1", json!(1));
    store.put("/items/i2", json!(2));

    let tree = vec![
        QueryNode::bound("a", QueryBinding::path("/items/i1")).into_rc(),
        QueryNode::bound("b", QueryBinding::path("/items/i2")).into_rc(),
    ];

    let (execution, events) = run(&store, tree, HashMap::new(), Mode::Continuous);
    assert_eq!(emitted(&events), vec![json!({"a": 1, "b": 2})]);
    assert_eq!(store.watcher_count(), 2);

    execution.cancel();
    assert_eq!(store.watcher_count(), 0);
    assert!(execution.is_terminated());

    execution.cancel();
    assert_eq!(store.watcher_count(), 0);
}

/// Store wrapper tracking concurrent watch registrations.
struct WatchCountingStore {
    inner: MemoryStore,
    active: Rc<Cell<usize>>,
    peak: Rc<Cell<usize>>,
}

struct CountingQuery {
    inner: Rc<dyn StoreQuery>,
    active: Rc<Cell<usize>>,
    peak: Rc<Cell<usize>>,
}

impl Store for WatchCountingStore {
    fn query(&self, path: &str, modifiers: &Modifiers) -> StoreResult<Rc<dyn StoreQuery>> {
        Ok(Rc::new(CountingQuery {
            inner: self.inner.query(path, modifiers)?,
            active: self.active.clone(),
            peak: self.peak.clone(),
        }))
    }
}

impl StoreQuery for CountingQuery {
    fn read(&self, deliver: SnapshotFn) -> StoreResult<()> {
        self.inner.read(deliver)
    }

    fn watch(&self, deliver: SnapshotFn) -> StoreResult<WatchHandle> {
        let handle = self.inner.watch(deliver)?;
        self.active.set(self.active.get() + 1);
        self.peak.set(self.peak.get().max(self.active.get()));
        let active = self.active.clone();
        Ok(WatchHandle::new(move || {
            handle.unwatch();
            active.set(active.get() - 1);
        }))
    }
}

/// A child-subtree rebuild detaches the previous generation of listeners
/// before attaching the next one; the two never overlap.
#[test]
fn test_child_rebuild_does_not_overlap_listeners() {
    let memory = MemoryStore::new();
    memory.put("/users/k1", json!({"x": 5}));
    memory.put("/meta/m1", json!({"note": "n"}));

    let active = Rc::new(Cell::new(0));
    let peak = Rc::new(Cell::new(0));
    let store = WatchCountingStore {
        inner: memory.clone(),
        active: active.clone(),
        peak: peak.clone(),
    };

    let engine = Engine::new(Rc::new(store));
    let tree = vec![QueryNode::bound("parent", QueryBinding::path("/users/k1"))
        .with_child(QueryNode::field("x"))
        .with_child(
            QueryNode::bound("info", QueryBinding::path("/meta/m1"))
                .with_child(QueryNode::field("note")),
        )
        .into_rc()];

    let execution = engine.execute(&tree, HashMap::new(), Mode::Continuous);
    let events = drain(&execution);
    assert_eq!(
        emitted(&events),
        vec![json!({"parent": {"x": 5, "info": {"note": "n"}}})]
    );
    assert_eq!(active.get(), 2);

    memory.put("/users/k1/x", json!(6));
    let events = drain(&execution);
    assert_eq!(
        emitted(&events),
        vec![json!({"parent": {"x": 6, "info": {"note": "n"}}})]
    );
    assert_eq!(peak.get(), 2, "listener generations overlapped");

    execution.cancel();
    assert_eq!(active.get(), 0);
}

/// Dropping an execution without an explicit cancel still detaches its
/// listeners.
#[test]
fn test_drop_detaches_watchers() {
    let store = MemoryStore::with_data("/items/i1", json!(1));
    let engine = Engine::new(Rc::new(store.clone()));
    let tree = vec![QueryNode::bound("a", QueryBinding::path("/items/i1")).into_rc()];

    {
        let execution = engine.execute(&tree, HashMap::new(), Mode::Continuous);
        let events = drain(&execution);
        assert_eq!(emitted(&events), vec![json!({"a": 1})]);
        assert_eq!(store.watcher_count(), 1);
    }

    assert_eq!(store.watcher_count(), 0);
}

/// One failing branch fails the execution and tears siblings down.
#[test]
fn test_branch_error_cancels_siblings() {
    let store = MemoryStore::with_data("/items/i1", json!(1));
    store.deny("/secret");

    let tree = vec![
        QueryNode::bound("ok", QueryBinding::path("/items/i1")).into_rc(),
        QueryNode::bound("secret", QueryBinding::path("/secret")).into_rc(),
    ];

    let (execution, events) = run(&store, tree, HashMap::new(), Mode::Continuous);

    assert!(emitted(&events).is_empty());
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::Error(EngineError::Store(_)))));
    assert!(execution.is_terminated());
    assert_eq!(store.watcher_count(), 0);
}

/// Executions over one store are independent: canceling one leaves the
/// other's listeners attached.
#[test]
fn test_executions_are_isolated() {
    let store = MemoryStore::with_data("/items/i1", json!(1));
    let engine = Engine::new(Rc::new(store.clone()));
    let tree = vec![QueryNode::bound("a", QueryBinding::path("/items/i1")).into_rc()];

    let first = engine.execute(&tree, HashMap::new(), Mode::Continuous);
    let second = engine.execute(&tree, HashMap::new(), Mode::Continuous);
    assert_ne!(first.id(), second.id());
    assert_eq!(store.watcher_count(), 2);

    first.cancel();
    assert_eq!(store.watcher_count(), 1);
    assert!(!second.is_terminated());

    second.cancel();
    assert_eq!(store.watcher_count(), 0);
}

/// Logging-enabled config changes nothing about delivery.
#[test]
fn test_logging_config_does_not_change_results() {
    let store = MemoryStore::with_data("/users/k1", json!({"x": 5}));
    let engine = Engine::with_config(Rc::new(store.clone()), EngineConfig::with_logging());
    let tree = vec![QueryNode::bound("user", QueryBinding::path("/users/k1"))
        .with_child(QueryNode::field("x"))
        .into_rc()];

    let execution = engine.execute(&tree, HashMap::new(), Mode::Once);
    let events = drain(&execution);

    assert_eq!(emitted(&events), vec![json!({"user": {"x": 5}})]);
    assert!(completed(&events));
}

// =============================================================================
// Async Consumption
// =============================================================================

/// Events buffered in the channel are consumable from an async task.
#[tokio::test]
async fn test_events_consumed_async() {
    let store = MemoryStore::with_data("/users/k1", json!({"x": 5}));
    let engine = Engine::new(Rc::new(store));
    let tree = vec![QueryNode::bound("user", QueryBinding::path("/users/k1"))
        .with_child(QueryNode::field("x"))
        .into_rc()];

    let execution = engine.execute(&tree, HashMap::new(), Mode::Once);
    let mut rx = execution.take_events().expect("events already taken");

    match rx.recv().await {
        Some(EngineEvent::Value(emission)) => {
            assert_eq!(emission.sequence, 0);
            assert_eq!(emission.data, json!({"user": {"x": 5}}));
        }
        other => panic!("Expected value event, got {:?}", other),
    }
    assert!(matches!(rx.recv().await, Some(EngineEvent::Complete)));
}
