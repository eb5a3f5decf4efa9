//! Exception dispatch (C5, spec §4.5): given a raised error of class `E`,
//! walk `E`'s ancestry (most specific first, ending at the root `Error`
//! class) and invoke the first registered handler found; fall back to a
//! default handler if none of the ancestors have one registered.
//!
//! Implemented as "an ordered table of `(predicate, handler)` pairs sorted
//! by specificity" per spec §4.5/§9, specialized here to a `HashMap`
//! keyed by [`crate::error::ErrorClass`] plus an ancestry walk, which is
//! the semantically equivalent and cheaper form the spec explicitly
//! allows for a tagged-variant error taxonomy.

use crate::error::ErrorClass;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub struct ExceptionTable<H: ?Sized> {
    handlers: RwLock<HashMap<ErrorClass, Arc<H>>>,
    default: Arc<H>,
}

impl<H: ?Sized> ExceptionTable<H> {
    pub fn new(default: Arc<H>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            default,
        }
    }

    /// Registers (or replaces) the handler for one error class. Registering
    /// for [`ErrorClass::Error`] replaces the terminal default.
    pub fn register(&self, class: ErrorClass, handler: Arc<H>) {
        self.handlers
            .write()
            .expect("exception table lock poisoned")
            .insert(class, handler);
    }

    /// The handler for the most specific registered ancestor of `class`,
    /// or the default if none of its ancestors have one registered.
    pub fn resolve(&self, class: ErrorClass) -> Arc<H> {
        let map = self.handlers.read().expect("exception table lock poisoned");
        for ancestor in class.ancestry() {
            if let Some(handler) = map.get(ancestor) {
                return Arc::clone(handler);
            }
        }
        Arc::clone(&self.default)
    }
}
