//! # Query Tree Execution Engine
//!
//! Executes declarative field-selection trees against a hierarchical
//! store. A tree is planned into a tree of cancelable streams: bound
//! nodes read or watch store locations through a per-execution reference
//! cache, unbound nodes derive their value from the parent, and sibling
//! groups are joined into nested objects (or index-aligned arrays under
//! collections). Variable placeholders in paths and modifiers resolve
//! against a chain of export scopes, and live deliveries pass a
//! change-relevance gate before children are rebuilt.

mod cache;
mod combine;
mod diff;
#[allow(clippy::module_inception)]
mod engine;
mod errors;
mod executor;
mod resolve;
mod scope;
mod stream;
mod value;

pub use cache::ReferenceCache;
pub use engine::{Emission, Engine, EngineConfig, EngineEvent, Execution, Mode};
pub use errors::{EngineError, EngineResult};
pub use resolve::{resolve_template, ResolvedBinding};
pub use scope::Scope;
pub use stream::{Canceler, StreamHandle, StreamObserver, ValueStream};
