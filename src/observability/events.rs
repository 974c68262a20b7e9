//! Observable execution lifecycle events
//!
//! Events are explicit and typed; the engine emits them through the
//! structured logger when logging is enabled.

use std::fmt;

/// Observable events in an execution's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// An execution was planned and its root group subscribed
    ExecuteStart,
    /// A live listener was attached to a store location
    WatchAttach,
    /// A branch failed; the whole execution fails with it
    BranchError,
    /// The caller detached the execution
    ExecuteCancel,
    /// A one-shot execution settled
    ExecuteComplete,
}

impl Event {
    /// Returns the canonical event name used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ExecuteStart => "EXECUTE_START",
            Event::WatchAttach => "WATCH_ATTACH",
            Event::BranchError => "BRANCH_ERROR",
            Event::ExecuteCancel => "EXECUTE_CANCEL",
            Event::ExecuteComplete => "EXECUTE_COMPLETE",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
