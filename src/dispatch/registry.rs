//! id → handle registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::handle::QueryHandle;

/// The only place that decides which handle receives an inbound frame.
///
/// Handles are keyed by their statement id and, once the server assigns
/// one, by the server-side message id as well.
#[derive(Default)]
pub(crate) struct HandleRegistry {
    map: RwLock<HashMap<String, Arc<QueryHandle>>>,
}

impl HandleRegistry {
    pub fn insert(&self, handle: &Arc<QueryHandle>) {
        self.map
            .write()
            .insert(handle.id().to_owned(), Arc::clone(handle));
    }

    /// Adds a second key for a server-assigned message id.
    pub fn alias(&self, msg_id: &str, handle: &Arc<QueryHandle>) {
        self.map
            .write()
            .insert(msg_id.to_owned(), Arc::clone(handle));
    }

    pub fn find(&self, id: &str) -> Option<Arc<QueryHandle>> {
        self.map.read().get(id).cloned()
    }

    /// Drops both keys of `handle`.
    pub fn remove(&self, handle: &QueryHandle) {
        let mut map = self.map.write();
        map.remove(handle.id());
        map.remove(&handle.last_msg_id());
    }

    /// Empties the registry, returning each handle once.
    pub fn drain(&self) -> Vec<Arc<QueryHandle>> {
        let mut handles: Vec<Arc<QueryHandle>> = Vec::new();
        for (_, handle) in self.map.write().drain() {
            if !handles.iter().any(|known| Arc::ptr_eq(known, &handle)) {
                handles.push(handle);
            }
        }
        handles
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }
}
