//! # Request registry: routine id → pending request.
//!
//! The correlation table consulted for every inbound message.
//!
//! ## Rules
//! - Entries are inserted right before the outbound send and removed by the
//!   request's completion callback (or rolled back when the send fails).
//! - One unfinished request per routine id; a duplicate is refused.
//! - Removal checks ownership, so a finishing request never evicts another
//!   request that reused its id.
//! - Lookups return a **cloned** handle; no shard guard is held while a
//!   message is pushed, so the completion callback may remove the entry.
//! - Transient requests are never registered.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::rpc::RequestHandle;

/// Sharded map of in-flight requests.
#[derive(Default)]
pub(crate) struct Registry {
    entries: DashMap<String, RequestHandle>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` under its routine id.
    ///
    /// Returns `false` when another unfinished request already owns the id.
    pub(crate) fn insert(&self, handle: RequestHandle) -> bool {
        match self.entries.entry(handle.routine_id().to_string()) {
            Entry::Occupied(mut e) if e.get().is_finished() => {
                e.insert(handle);
                true
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(handle);
                true
            }
        }
    }

    pub(crate) fn get(&self, routine_id: &str) -> Option<RequestHandle> {
        self.entries.get(routine_id).map(|e| e.value().clone())
    }

    /// Removes the entry only if it belongs to `handle`.
    pub(crate) fn remove_entry(&self, handle: &RequestHandle) -> bool {
        self.entries
            .remove_if(handle.routine_id(), |_, h| h.same_request(handle))
            .is_some()
    }

    /// Removes the entry for `routine_id` if its request has finished.
    pub(crate) fn remove_finished(&self, routine_id: &str) -> bool {
        self.entries
            .remove_if(routine_id, |_, h| h.is_finished())
            .is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Removes and returns every entry.
    pub(crate) fn drain(&self) -> Vec<RequestHandle> {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.iter()
            .filter_map(|id| self.entries.remove(id).map(|(_, handle)| handle))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{PendingRequest, RoutineParameters};

    #[tokio::test]
    async fn test_insert_get_remove() {
        let registry = Registry::new();
        let req = PendingRequest::new(&RoutineParameters::with_identity("r-1", "now"));
        assert!(registry.insert(req.handle()));

        assert_eq!(registry.len(), 1);
        assert!(registry.get("r-1").is_some());
        assert!(registry.get("r-2").is_none());
        assert!(registry.remove_entry(&req.handle()));
        assert!(!registry.remove_entry(&req.handle()));
    }

    #[tokio::test]
    async fn test_duplicate_live_id_is_refused() {
        let registry = Registry::new();
        let params = RoutineParameters::with_identity("dup", "now");
        let first = PendingRequest::new(&params);
        let second = PendingRequest::new(&params);

        assert!(registry.insert(first.handle()));
        assert!(!registry.insert(second.handle()));
        assert!(registry.get("dup").unwrap().same_request(&first.handle()));

        // A finished owner may be replaced.
        first.raise_timeout();
        assert!(registry.insert(second.handle()));
        assert!(registry.get("dup").unwrap().same_request(&second.handle()));
    }

    #[tokio::test]
    async fn test_removal_checks_ownership() {
        let registry = Registry::new();
        let params = RoutineParameters::with_identity("dup", "now");
        let first = PendingRequest::new(&params);
        let second = PendingRequest::new(&params);
        first.raise_timeout();
        assert!(registry.insert(second.handle()));

        assert!(!registry.remove_entry(&first.handle()));
        assert!(!registry.remove_finished("dup"));
        assert_eq!(registry.len(), 1);

        second.raise_timeout();
        assert!(registry.remove_finished("dup"));
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_drain_empties_the_table() {
        let registry = Registry::new();
        let a = PendingRequest::new(&RoutineParameters::new());
        let b = PendingRequest::new(&RoutineParameters::new());
        registry.insert(a.handle());
        registry.insert(b.handle());

        assert_eq!(registry.drain().len(), 2);
        assert_eq!(registry.len(), 0);
    }
}
