use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;

use crate::container::{ContainerID, ContainerSnapshot};

/// Binds a running container to the cancellation token of its introspection server.
#[derive(Debug, Clone)]
pub struct WatcherHandle {
    id: ContainerID,
    snapshot: Arc<ContainerSnapshot>,
    cancel: CancellationToken,
}

impl WatcherHandle {
    /// Creates a handle with a fresh cancellation token.
    pub fn new(snapshot: Arc<ContainerSnapshot>) -> Self {
        Self::with_token(snapshot, CancellationToken::new())
    }

    /// Creates a handle around an existing token, typically a child of a wider scope.
    pub fn with_token(snapshot: Arc<ContainerSnapshot>, cancel: CancellationToken) -> Self {
        Self {
            id: snapshot.id.clone(),
            snapshot,
            cancel,
        }
    }

    pub fn id(&self) -> &ContainerID {
        &self.id
    }

    pub fn snapshot(&self) -> &Arc<ContainerSnapshot> {
        &self.snapshot
    }

    /// Token observed by the introspection server.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signals the introspection server to terminate.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Tracks the active introspection server of every running container.
///
/// Holds at most one [`WatcherHandle`] per container. All operations are safe to call
/// concurrently from any number of tasks.
#[derive(Debug, Default)]
pub struct Registry {
    handles: DashMap<ContainerID, WatcherHandle>,
}

impl Registry {
    /// Inserts `handle` unless a handle for `id` is already registered.
    ///
    /// Returns whether the insertion happened.
    pub fn register(&self, id: ContainerID, handle: WatcherHandle) -> bool {
        match self.handles.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(handle);
                true
            }
        }
    }

    /// Removes and returns the handle registered for `id`, if any.
    ///
    /// Cancelling the returned handle is up to the caller.
    pub fn unregister(&self, id: &ContainerID) -> Option<WatcherHandle> {
        self.handles.remove(id).map(|(_, handle)| handle)
    }

    pub fn lookup(&self, id: &ContainerID) -> Option<WatcherHandle> {
        self.handles.get(id).map(|handle| handle.value().clone())
    }

    pub fn contains(&self, id: &ContainerID) -> bool {
        self.handles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Removes and returns every registered handle.
    pub fn drain(&self) -> Vec<WatcherHandle> {
        let ids: Vec<ContainerID> = self.handles.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter_map(|id| self.unregister(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn handle(id: &str) -> WatcherHandle {
        WatcherHandle::new(Arc::new(ContainerSnapshot {
            id: ContainerID::new(id).unwrap(),
            name: id.to_owned(),
            image: "busybox".to_owned(),
            created: String::new(),
            running: true,
            pid: 1,
            labels: HashMap::default(),
        }))
    }

    #[test]
    fn test_register_only_once() {
        let registry = Registry::default();
        let first = handle("a");
        let second = handle("a");
        assert!(registry.register(first.id().clone(), first.clone()));
        assert!(!registry.register(second.id().clone(), second));
        assert_eq!(registry.len(), 1);

        let stored = registry.lookup(first.id()).unwrap();
        stored.cancel();
        assert!(first.is_cancelled(), "lookup must return the first handle");
    }

    #[test]
    fn test_unregister_missing_is_noop() {
        let registry = Registry::default();
        let kept = handle("kept");
        registry.register(kept.id().clone(), kept);

        assert!(registry.unregister(&ContainerID::new("missing").unwrap()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_returns_handle() {
        let registry = Registry::default();
        let h = handle("a");
        registry.register(h.id().clone(), h.clone());

        let removed = registry.unregister(h.id()).unwrap();
        assert_eq!(removed.id(), h.id());
        assert!(!removed.is_cancelled());
        assert!(!registry.contains(h.id()));
        assert!(registry.unregister(h.id()).is_none());
    }

    #[test]
    fn test_drain() {
        let registry = Registry::default();
        for id in ["a", "b", "c"] {
            let h = handle(id);
            registry.register(h.id().clone(), h);
        }
        let drained = registry.drain();
        assert_eq!(drained.len(), 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_register() {
        let registry = Arc::new(Registry::default());
        let threads: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let h = handle("same");
                    registry.register(h.id().clone(), h)
                })
            })
            .collect();
        let inserted = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|inserted| *inserted)
            .count();
        assert_eq!(inserted, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_parent_token_cancels_handle() {
        let parent = CancellationToken::new();
        let h = WatcherHandle::with_token(handle("a").snapshot().clone(), parent.child_token());
        assert!(!h.is_cancelled());
        parent.cancel();
        assert!(h.is_cancelled());
    }
}
