//! # Query Tree
//!
//! The compiled, read-only representation of a nested field-selection query.
//!
//! Trees are produced by an external compiler and consumed by the engine;
//! this module only defines the node/binding types and builder helpers. The
//! engine never re-validates selection-set legality.

mod binding;
mod node;

pub use binding::{QueryBinding, SubpathFn};
pub use node::QueryNode;
