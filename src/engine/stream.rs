//! Cancelable push-streams
//!
//! The engine models every asynchronous source (store listeners, child
//! subtree executions, sibling joins) as a [`ValueStream`]: a lazy producer
//! that, once subscribed, pushes values into an observer until it completes,
//! errors, or the subscription is canceled. Cancellation runs the producer's
//! teardown exactly once, which is what makes cascade-cancellation
//! composable.
//!
//! Single-threaded by design; all sharing is `Rc`/`Cell` interior state.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::errors::EngineError;

/// Teardown returned by a stream producer
pub struct Canceler {
    teardown: Option<Box<dyn FnOnce()>>,
}

impl Canceler {
    /// Wrap a teardown closure
    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// A teardown that does nothing
    pub fn noop() -> Self {
        Self { teardown: None }
    }

    fn run(mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

struct ObserverState<T> {
    closed: Cell<bool>,
    on_next: Box<dyn Fn(T)>,
    on_error: Box<dyn Fn(EngineError)>,
    on_complete: Box<dyn Fn()>,
    teardown: RefCell<Option<Canceler>>,
}

impl<T> ObserverState<T> {
    /// Close the stream and run teardown; at most once.
    fn close(&self) -> bool {
        if self.closed.get() {
            return false;
        }
        self.closed.set(true);
        true
    }

    fn run_teardown(&self) {
        if let Some(canceler) = self.teardown.borrow_mut().take() {
            canceler.run();
        }
    }
}

trait Cancelable {
    fn cancel(&self);
    fn is_closed(&self) -> bool;
}

impl<T> Cancelable for ObserverState<T> {
    fn cancel(&self) {
        // Not an error, not a completion: just stop and tear down.
        if self.close() {
            self.run_teardown();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

/// The producer-facing side of a subscription
pub struct StreamObserver<T> {
    state: Rc<ObserverState<T>>,
}

impl<T> Clone for StreamObserver<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> StreamObserver<T> {
    /// Push a value downstream; ignored once closed
    pub fn next(&self, value: T) {
        if !self.state.closed.get() {
            (self.state.on_next)(value);
        }
    }

    /// Fail the stream and tear down; at most one terminal event fires
    pub fn error(&self, error: EngineError) {
        if self.state.close() {
            (self.state.on_error)(error);
            self.state.run_teardown();
        }
    }

    /// Complete the stream and tear down; at most one terminal event fires
    pub fn complete(&self) {
        if self.state.close() {
            (self.state.on_complete)();
            self.state.run_teardown();
        }
    }

    /// Returns true once the stream has terminated or been canceled
    pub fn is_closed(&self) -> bool {
        self.state.closed.get()
    }
}

/// Handle for canceling an active subscription; idempotent
pub struct StreamHandle {
    state: Rc<dyn Cancelable>,
}

impl StreamHandle {
    /// Cancel the subscription and run teardown; safe to call repeatedly
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// Returns true once the stream has terminated or been canceled
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }
}

/// A lazy, cancelable push-stream of values
pub struct ValueStream<T> {
    producer: Box<dyn FnOnce(StreamObserver<T>) -> Canceler>,
}

impl<T: 'static> ValueStream<T> {
    /// Create a stream from a producer. The producer runs on subscribe,
    /// pushes through the observer, and returns its teardown.
    pub fn new(producer: impl FnOnce(StreamObserver<T>) -> Canceler + 'static) -> Self {
        Self {
            producer: Box::new(producer),
        }
    }

    /// A stream that fails immediately
    pub fn failed(error: EngineError) -> Self {
        Self::new(move |observer| {
            observer.error(error);
            Canceler::noop()
        })
    }

    /// Subscribe, consuming the stream.
    ///
    /// If the producer terminates the stream synchronously, its teardown
    /// runs before this returns.
    pub fn subscribe(
        self,
        on_next: impl Fn(T) + 'static,
        on_error: impl Fn(EngineError) + 'static,
        on_complete: impl Fn() + 'static,
    ) -> StreamHandle {
        let state = Rc::new(ObserverState {
            closed: Cell::new(false),
            on_next: Box::new(on_next),
            on_error: Box::new(on_error),
            on_complete: Box::new(on_complete),
            teardown: RefCell::new(None),
        });

        let observer = StreamObserver {
            state: state.clone(),
        };
        let canceler = (self.producer)(observer);

        if state.closed.get() {
            canceler.run();
        } else {
            *state.teardown.borrow_mut() = Some(canceler);
        }

        StreamHandle { state }
    }
}
