//! # Store Binding
//!
//! The interface the engine uses to talk to an external hierarchical
//! key-value store, plus an in-memory reference backend.
//!
//! A store constructs query objects from a path and a set of modifiers;
//! a query object supports a one-shot `read` and a live `watch`, both
//! delivering [`Snapshot`]s through a registered callback on the engine
//! thread. Watches are detached through an idempotent [`WatchHandle`].

mod errors;
mod interface;
mod memory;
mod snapshot;

pub use errors::{StoreError, StoreResult};
pub use interface::{Modifiers, SnapshotFn, Store, StoreQuery, WatchHandle};
pub use memory::MemoryStore;
pub use snapshot::Snapshot;
