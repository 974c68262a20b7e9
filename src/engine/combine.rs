//! Result combinator
//!
//! Joins the per-node streams of one sibling group into a single stream of
//! assembled values. Nothing is emitted until every sibling has produced
//! at least one value; after that, any single sibling's update re-assembles
//! and re-emits using the latest held value for every sibling. A failure in
//! any sibling fails the joint stream and tears the rest down.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::Value;

use super::engine::Mode;
use super::stream::{Canceler, StreamHandle, ValueStream};

/// One partial result from a node executor
#[derive(Debug, Clone)]
pub struct NodeEmission {
    /// Field name in the assembled result
    pub name: String,
    /// Element index when the parent value is a collection
    pub parent_index: Option<usize>,
    /// The node's current value
    pub value: Value,
}

/// How a sibling group assembles: one record, or an array of records
/// index-aligned to the parent collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupShape {
    /// Assemble a single object keyed by field name
    Object,
    /// Assemble an index-aligned array of objects
    Array(usize),
}

/// Join a sibling group's streams into one stream of assembled values.
///
/// Once mode completes when every sibling completes; continuous mode stays
/// open until canceled.
pub fn combine_group(
    streams: Vec<ValueStream<NodeEmission>>,
    shape: GroupShape,
    mode: Mode,
) -> ValueStream<Value> {
    ValueStream::new(move |observer| {
        let total = streams.len();
        if total == 0 {
            // An empty group (empty collection) settles immediately; the
            // assembly is its empty shape.
            observer.next(assemble(&[], shape));
            if mode == Mode::Once {
                observer.complete();
            }
            return Canceler::noop();
        }

        let latest: Rc<RefCell<Vec<Option<NodeEmission>>>> =
            Rc::new(RefCell::new(vec![None; total]));
        let produced = Rc::new(Cell::new(0usize));
        let completed = Rc::new(RefCell::new(vec![false; total]));
        let completed_count = Rc::new(Cell::new(0usize));
        let handles: Rc<RefCell<Vec<StreamHandle>>> =
            Rc::new(RefCell::new(Vec::with_capacity(total)));

        for (idx, stream) in streams.into_iter().enumerate() {
            let slots = latest.clone();
            let produced_count = produced.clone();
            let next_observer = observer.clone();
            let on_next = move |emission: NodeEmission| {
                let assembled = {
                    let mut slots = slots.borrow_mut();
                    if slots[idx].is_none() {
                        produced_count.set(produced_count.get() + 1);
                    }
                    slots[idx] = Some(emission);
                    if produced_count.get() == total {
                        Some(assemble(&slots, shape))
                    } else {
                        None
                    }
                };
                if let Some(value) = assembled {
                    next_observer.next(value);
                }
            };

            let error_observer = observer.clone();
            let on_error = move |error| error_observer.error(error);

            let done = completed.clone();
            let done_count = completed_count.clone();
            let complete_observer = observer.clone();
            let on_complete = move || {
                {
                    let mut done = done.borrow_mut();
                    if done[idx] {
                        return;
                    }
                    done[idx] = true;
                    done_count.set(done_count.get() + 1);
                }
                if done_count.get() == total {
                    complete_observer.complete();
                }
            };

            let handle = stream.subscribe(on_next, on_error, on_complete);
            handles.borrow_mut().push(handle);
        }

        let teardown = handles.clone();
        Canceler::new(move || {
            for handle in teardown.borrow().iter() {
                handle.cancel();
            }
        })
    })
}

fn assemble(slots: &[Option<NodeEmission>], shape: GroupShape) -> Value {
    match shape {
        GroupShape::Object => {
            let mut map = serde_json::Map::new();
            for emission in slots.iter().flatten() {
                map.insert(emission.name.clone(), emission.value.clone());
            }
            Value::Object(map)
        }
        GroupShape::Array(len) => {
            let mut records = vec![serde_json::Map::new(); len];
            for emission in slots.iter().flatten() {
                if let Some(idx) = emission.parent_index {
                    if let Some(record) = records.get_mut(idx) {
                        record.insert(emission.name.clone(), emission.value.clone());
                    }
                }
            }
            Value::Array(records.into_iter().map(Value::Object).collect())
        }
    }
}
