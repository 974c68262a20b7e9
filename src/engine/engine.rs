//! # Engine Facade
//!
//! Ties a query tree to a store: `Engine::execute` plans the root sibling
//! group, subscribes it, and hands back an [`Execution`] whose events
//! arrive on an unbounded channel. Each execution owns its own reference
//! cache and export-scope chain, so concurrent executions over one store
//! never share listener state.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::observability::Event;
use crate::query::QueryNode;
use crate::store::Store;

use super::cache::ReferenceCache;
use super::errors::EngineError;
use super::executor::{execute_group, ExecCtx};
use super::scope::Scope;
use super::stream::StreamHandle;

/// Delivery discipline of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Resolve every branch once, emit the settled result, terminate.
    Once,
    /// Keep listeners attached and re-emit on every relevant change.
    Continuous,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Once => "once",
            Mode::Continuous => "continuous",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Emit structured log lines for execution lifecycle events.
    pub log_events: bool,
    /// Hard ceiling on export-scope nesting, guards runaway recursion.
    pub max_scope_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_events: false,
            max_scope_depth: 64,
        }
    }
}

impl EngineConfig {
    pub fn with_logging() -> Self {
        Self {
            log_events: true,
            ..Self::default()
        }
    }
}

/// One assembled result, stamped for ordering.
#[derive(Debug, Clone, Serialize)]
pub struct Emission {
    pub sequence: u64,
    pub at: DateTime<Utc>,
    pub data: Value,
}

/// What an execution delivers on its channel.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Value(Emission),
    Error(EngineError),
    Complete,
}

/// Executes query trees against a store.
pub struct Engine {
    store: Rc<dyn Store>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(store: Rc<dyn Store>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Rc<dyn Store>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Run `tree` with the given parameters. The returned execution is
    /// already live: synchronous branches may have delivered into the
    /// channel before this returns.
    pub fn execute(
        &self,
        tree: &[Rc<QueryNode>],
        params: HashMap<String, Value>,
        mode: Mode,
    ) -> Execution {
        let id = Uuid::new_v4();
        let ctx = Rc::new(ExecCtx {
            store: self.store.clone(),
            mode,
            cache: ReferenceCache::new(),
            config: self.config.clone(),
            execution_id: id.to_string(),
        });
        ctx.log(Event::ExecuteStart, &[("mode", mode.as_str())]);

        let scope = Scope::root(params);
        let stream = execute_group(&ctx, tree, None, &scope);

        let (tx, rx) = mpsc::unbounded_channel();
        let sequence = Cell::new(0u64);

        let handle = {
            let next_tx = tx.clone();
            let error_tx = tx.clone();
            let complete_tx = tx;
            let error_ctx = ctx.clone();
            let complete_ctx = ctx.clone();
            stream.subscribe(
                move |data| {
                    let emission = Emission {
                        sequence: sequence.get(),
                        at: Utc::now(),
                        data,
                    };
                    sequence.set(sequence.get() + 1);
                    send(&next_tx, EngineEvent::Value(emission));
                },
                move |error| {
                    error_ctx.log(Event::BranchError, &[("error", &error.to_string())]);
                    send(&error_tx, EngineEvent::Error(error));
                },
                move || {
                    complete_ctx.log(Event::ExecuteComplete, &[]);
                    send(&complete_tx, EngineEvent::Complete);
                },
            )
        };

        Execution {
            id,
            ctx,
            handle,
            events: RefCell::new(Some(rx)),
        }
    }
}

fn send(tx: &UnboundedSender<EngineEvent>, event: EngineEvent) {
    // The receiver side may already be gone; nothing useful to do then.
    let _ = tx.send(event);
}

/// A running (or finished) execution.
pub struct Execution {
    id: Uuid,
    ctx: Rc<ExecCtx>,
    handle: StreamHandle,
    events: RefCell<Option<UnboundedReceiver<EngineEvent>>>,
}

impl Execution {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Take the event receiver. Yields `None` on the second call.
    pub fn take_events(&self) -> Option<UnboundedReceiver<EngineEvent>> {
        self.events.borrow_mut().take()
    }

    /// Pop the next buffered event without waiting. Yields `None` when
    /// the buffer is empty or the receiver was taken.
    pub fn try_next_event(&self) -> Option<EngineEvent> {
        self.events
            .borrow_mut()
            .as_mut()
            .and_then(|rx| rx.try_recv().ok())
    }

    /// Whether the root stream has terminated, by completion, error, or
    /// cancellation.
    pub fn is_terminated(&self) -> bool {
        self.handle.is_closed()
    }

    /// Detach every listener this execution attached. Idempotent; a no-op
    /// after completion or error.
    pub fn cancel(&self) {
        if !self.handle.is_closed() {
            self.ctx.log(Event::ExecuteCancel, &[]);
        }
        self.handle.cancel();
    }
}

/// Dropping an execution cancels it: store listeners otherwise keep the
/// delivery closures (and through them the context) alive.
impl Drop for Execution {
    fn drop(&mut self) {
        self.cancel();
    }
}
