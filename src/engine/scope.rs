//! Export scopes
//!
//! One scope per sibling group per invocation, linked to its parent scope
//! as an explicit read-only chain (dynamic-scope lookup without any global
//! mechanism). Exported values land in the sibling group's own frame;
//! lookup walks outward and falls back to the caller-supplied operation
//! parameters at the root.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

/// One frame of the export chain
#[derive(Debug)]
pub struct Scope {
    exports: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
    /// Operation parameters; only the root frame carries them
    params: HashMap<String, Value>,
}

impl Scope {
    /// Create the root frame over caller-supplied operation parameters
    pub fn root(params: HashMap<String, Value>) -> Rc<Scope> {
        Rc::new(Scope {
            exports: RefCell::new(HashMap::new()),
            parent: None,
            params,
        })
    }

    /// Create a child frame for one sibling group
    pub fn child(self: &Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            exports: RefCell::new(HashMap::new()),
            parent: Some(self.clone()),
            params: HashMap::new(),
        })
    }

    /// Publish a value under a name, visible to this frame and descendants
    pub fn export(&self, name: &str, value: Value) {
        self.exports.borrow_mut().insert(name.to_string(), value);
    }

    /// Look up a name: this frame's exports, then ancestors, then the root
    /// frame's operation parameters.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut current = self;
        loop {
            if let Some(value) = current.exports.borrow().get(name) {
                return Some(value.clone());
            }
            match &current.parent {
                Some(parent) => current = parent.as_ref(),
                None => return current.params.get(name).cloned(),
            }
        }
    }

    /// Frames between this one and the root, inclusive
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self;
        while let Some(parent) = &current.parent {
            depth += 1;
            current = parent.as_ref();
        }
        depth
    }
}
