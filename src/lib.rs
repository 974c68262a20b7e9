//! canopy - a live, tree-shaped query execution engine for hierarchical
//! key-value stores
//!
//! A caller hands the engine a compiled query tree (nested field selections,
//! each optionally bound to a store location with ordering/range/limit
//! modifiers and cross-field variable references) and receives a stream of
//! aggregate values shaped like that tree: one-shot, or live until canceled.

pub mod engine;
pub mod observability;
pub mod query;
pub mod store;
