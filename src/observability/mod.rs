//! # Observability
//!
//! Structured logging for the execution engine: a synchronous JSON
//! logger and the typed lifecycle events it records.
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. No async or background threads
//! 4. Deterministic output

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};
