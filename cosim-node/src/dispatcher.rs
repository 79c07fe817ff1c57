//! Per-object write callbacks

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use cosim_common::ObjectId;

use crate::Error;

/// A callback run after an object is written
pub type WriteCallback = Rc<dyn Fn() -> Result<(), Error>>;

/// Routes write events to the callback registered for the written object
#[derive(Default)]
pub struct WriteDispatcher {
    callbacks: RefCell<BTreeMap<ObjectId, WriteCallback>>,
}

impl core::fmt::Debug for WriteDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WriteDispatcher")
            .field("objects", &self.callbacks.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl WriteDispatcher {
    /// Create a dispatcher with no callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the callback for `id`, replacing any existing one
    pub fn on_write(&self, id: ObjectId, callback: WriteCallback) {
        if self.callbacks.borrow_mut().insert(id, callback).is_some() {
            log::debug!("Replaced write callback for {id}");
        }
    }

    /// Run the callback registered for `id`, if there is one
    ///
    /// Errors from the callback are returned unchanged. The callback is free to write objects
    /// (re-entering this method) or to install new callbacks.
    pub fn notify(&self, id: ObjectId) -> Result<(), Error> {
        let callback = self.callbacks.borrow().get(&id).cloned();
        match callback {
            Some(callback) => callback(),
            None => Ok(()),
        }
    }

    /// The number of objects with a callback
    pub fn len(&self) -> usize {
        self.callbacks.borrow().len()
    }

    /// True if no callbacks are installed
    pub fn is_empty(&self) -> bool {
        self.callbacks.borrow().is_empty()
    }

    /// Check whether `id` has a callback
    pub fn contains(&self, id: ObjectId) -> bool {
        self.callbacks.borrow().contains_key(&id)
    }
}
