//! Node executor
//!
//! Runs one query-tree node: resolves its binding, performs the one-shot
//! read or attaches the live listener, gates deliveries through the change
//! detector, and re-executes children against each new value. Sibling
//! groups are joined by the result combinator; the whole construction is a
//! tree of cancelable streams whose teardown cascades children-first.
//!
//! Streams are lazy: binding resolution happens at subscribe time, after
//! earlier siblings in the group have subscribed and published their
//! exports, so declaration order is also export-visibility order.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::observability::{Event, Logger};
use crate::query::QueryNode;
use crate::store::{Snapshot, SnapshotFn, Store, WatchHandle};

use super::cache::ReferenceCache;
use super::combine::{combine_group, GroupShape, NodeEmission};
use super::diff::is_relevant_change;
use super::engine::{EngineConfig, Mode};
use super::errors::EngineError;
use super::resolve::{resolve_binding, ResolvedBinding};
use super::scope::Scope;
use super::stream::{Canceler, StreamHandle, StreamObserver, ValueStream};
use super::value::{derive_unbound, Entry, NodeValue};

/// Shared state of one top-level execute call
pub(crate) struct ExecCtx {
    pub store: Rc<dyn Store>,
    pub mode: Mode,
    pub cache: ReferenceCache,
    pub config: EngineConfig,
    pub execution_id: String,
}

impl ExecCtx {
    pub(crate) fn log(&self, event: Event, extra: &[(&str, &str)]) {
        if !self.config.log_events {
            return;
        }
        let mut fields: Vec<(&str, &str)> = vec![("execution_id", &self.execution_id)];
        fields.extend_from_slice(extra);
        Logger::info(event.as_str(), &fields);
    }
}

/// Per-node live state while its stream is active
#[derive(Default)]
struct BoundState {
    last: RefCell<Option<NodeValue>>,
    child: RefCell<Option<StreamHandle>>,
    watch: RefCell<Option<WatchHandle>>,
}

/// Execute one sibling group against a parent value.
///
/// `parent` is `None` at the root. Each collection element gets its own
/// export scope; the group assembles an object, or an index-aligned array
/// when the parent value is a collection.
pub(crate) fn execute_group(
    ctx: &Rc<ExecCtx>,
    nodes: &[Rc<QueryNode>],
    parent: Option<(&NodeValue, Option<&str>)>,
    scope: &Rc<Scope>,
) -> ValueStream<Value> {
    if scope.depth() >= ctx.config.max_scope_depth {
        return ValueStream::failed(EngineError::DepthExceeded(ctx.config.max_scope_depth));
    }

    let (fan, shape) = match parent {
        None => (vec![(None, None)], GroupShape::Object),
        Some((value, _)) => {
            let shape = match value {
                NodeValue::Collection(entries) => GroupShape::Array(entries.len()),
                _ => GroupShape::Object,
            };
            (value.fan_out(), shape)
        }
    };
    let parent_type = parent.and_then(|(_, type_hint)| type_hint).map(String::from);

    let mut streams = Vec::with_capacity(fan.len() * nodes.len());
    for (parent_index, entry) in fan {
        let element_scope = scope.child();
        for node in nodes {
            streams.push(execute_node(
                ctx,
                node.clone(),
                entry.clone(),
                parent_index,
                parent_type.clone(),
                element_scope.clone(),
            ));
        }
    }

    combine_group(streams, shape, ctx.mode)
}

/// Execute one node instance, yielding its stream of partial results.
fn execute_node(
    ctx: &Rc<ExecCtx>,
    node: Rc<QueryNode>,
    parent_entry: Option<Entry>,
    parent_index: Option<usize>,
    parent_type: Option<String>,
    scope: Rc<Scope>,
) -> ValueStream<NodeEmission> {
    let ctx = ctx.clone();
    ValueStream::new(move |observer| {
        if let Some(binding) = &node.binding {
            match resolve_binding(binding, &scope, parent_entry.as_ref()) {
                Err(error) => {
                    observer.error(error);
                    return Canceler::noop();
                }
                Ok(Some(resolved)) => {
                    return produce_bound(&ctx, &node, parent_index, resolved, &scope, observer)
                }
                // Path template nulled out: fall back to direct derivation
                Ok(None) => {}
            }
        }
        produce_unbound(
            &ctx,
            &node,
            parent_entry.as_ref(),
            parent_index,
            parent_type.as_deref(),
            &scope,
            observer,
        )
    })
}

/// A node without a usable binding: derive synchronously from the parent
/// value, recurse if it has children.
fn produce_unbound(
    ctx: &Rc<ExecCtx>,
    node: &Rc<QueryNode>,
    parent_entry: Option<&Entry>,
    parent_index: Option<usize>,
    parent_type: Option<&str>,
    scope: &Rc<Scope>,
    observer: StreamObserver<NodeEmission>,
) -> Canceler {
    let derived = match derive_unbound(node, parent_entry, parent_type, scope) {
        Ok(value) => value,
        Err(error) => {
            observer.error(error);
            return Canceler::noop();
        }
    };

    if let Some(export) = &node.export_name {
        scope.export(export, derived.clone());
    }

    if node.is_leaf() || derived.is_null() {
        observer.next(NodeEmission {
            name: node.name.clone(),
            parent_index,
            value: derived,
        });
        if ctx.mode == Mode::Once {
            observer.complete();
        }
        return Canceler::noop();
    }

    let value = NodeValue::from_value(derived, node);
    let handle = subscribe_children(ctx, node, parent_index, &value, scope, &observer);
    Canceler::new(move || handle.cancel())
}

/// A node with a resolved binding: read or watch the store, gate on the
/// change detector, rebuild children per relevant snapshot.
fn produce_bound(
    ctx: &Rc<ExecCtx>,
    node: &Rc<QueryNode>,
    parent_index: Option<usize>,
    resolved: ResolvedBinding,
    scope: &Rc<Scope>,
    observer: StreamObserver<NodeEmission>,
) -> Canceler {
    let handle = match ctx.cache.get_or_create(ctx.store.as_ref(), &resolved) {
        Ok(handle) => handle,
        Err(error) => {
            observer.error(error.into());
            return Canceler::noop();
        }
    };

    let state = Rc::new(BoundState::default());

    if node.defer_initial {
        observer.next(NodeEmission {
            name: node.name.clone(),
            parent_index,
            value: Value::Null,
        });
    }

    let deliver: SnapshotFn = {
        let ctx = ctx.clone();
        let node = node.clone();
        let scope = scope.clone();
        let observer = observer.clone();
        let state = state.clone();
        Rc::new(move |snapshot: Snapshot| {
            handle_snapshot(&ctx, &node, parent_index, &scope, &observer, &state, snapshot);
        })
    };

    let attached = match ctx.mode {
        Mode::Once => handle.read(deliver).map(|_| None),
        Mode::Continuous => {
            ctx.log(Event::WatchAttach, &[("path", &resolved.path)]);
            handle.watch(deliver).map(Some)
        }
    };
    match attached {
        Ok(watch) => *state.watch.borrow_mut() = watch,
        Err(error) => {
            observer.error(error.into());
            return Canceler::noop();
        }
    }

    let teardown = state;
    Canceler::new(move || {
        // Children first, then this node's own listener
        if let Some(child) = teardown.child.borrow_mut().take() {
            child.cancel();
        }
        if let Some(watch) = teardown.watch.borrow_mut().take() {
            watch.unwatch();
        }
    })
}

/// One store delivery for a bound node.
#[allow(clippy::too_many_arguments)]
fn handle_snapshot(
    ctx: &Rc<ExecCtx>,
    node: &Rc<QueryNode>,
    parent_index: Option<usize>,
    scope: &Rc<Scope>,
    observer: &StreamObserver<NodeEmission>,
    state: &Rc<BoundState>,
    snapshot: Snapshot,
) {
    if observer.is_closed() {
        return;
    }

    let value = NodeValue::from_snapshot(snapshot, node);

    {
        let last = state.last.borrow();
        if let Some(previous) = last.as_ref() {
            if !is_relevant_change(previous, &value, node) {
                return;
            }
        }
    }
    *state.last.borrow_mut() = Some(value.clone());

    if node.is_leaf() || matches!(value, NodeValue::Absent) {
        // A vanished subtree takes its children down with it
        if let Some(previous) = state.child.borrow_mut().take() {
            previous.cancel();
        }
        observer.next(NodeEmission {
            name: node.name.clone(),
            parent_index,
            value: value.leaf_output(),
        });
        if ctx.mode == Mode::Once {
            observer.complete();
        }
        return;
    }

    // Tear the previous subtree down before attaching the new one, so the
    // store never sees both generations of listeners at once
    if let Some(previous) = state.child.borrow_mut().take() {
        previous.cancel();
    }
    let new_child = subscribe_children(ctx, node, parent_index, &value, scope, observer);
    *state.child.borrow_mut() = Some(new_child);
}

/// Execute a node's children against its current value and forward the
/// assembled results under the node's name.
fn subscribe_children(
    ctx: &Rc<ExecCtx>,
    node: &Rc<QueryNode>,
    parent_index: Option<usize>,
    value: &NodeValue,
    scope: &Rc<Scope>,
    observer: &StreamObserver<NodeEmission>,
) -> StreamHandle {
    let child_stream = execute_group(
        ctx,
        &node.children,
        Some((value, node.type_hint.as_deref())),
        scope,
    );

    let name = node.name.clone();
    let next_observer = observer.clone();
    let error_observer = observer.clone();
    let complete_observer = observer.clone();
    let mode = ctx.mode;

    child_stream.subscribe(
        move |assembled| {
            next_observer.next(NodeEmission {
                name: name.clone(),
                parent_index,
                value: assembled,
            });
        },
        move |error| error_observer.error(error),
        move || {
            if mode == Mode::Once {
                complete_observer.complete();
            }
        },
    )
}
