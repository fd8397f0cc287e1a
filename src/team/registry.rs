//! Registry mapping live worker threads to the region they belong to
//!
//! This is the only way a construct finds its team: a thread with no entry is
//! not part of any region.

use super::context::ExecutionContext;
use dashmap::DashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::debug;

/// Concurrent map of worker thread to execution context
#[derive(Default)]
pub struct ThreadRegistry {
    contexts: DashMap<ThreadId, Arc<ExecutionContext>>,
}

impl ThreadRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            contexts: DashMap::new(),
        }
    }

    /// Bind a thread to a context, replacing any previous binding
    pub fn bind(&self, thread: ThreadId, context: Arc<ExecutionContext>) {
        debug!(?thread, region = %context.id(), "Binding worker to region");
        self.contexts.insert(thread, context);
    }

    /// Remove a thread's binding
    pub fn unbind(&self, thread: ThreadId) -> Option<Arc<ExecutionContext>> {
        self.contexts.remove(&thread).map(|(_, context)| context)
    }

    /// Context the thread is bound to, if any
    pub fn context_of(&self, thread: ThreadId) -> Option<Arc<ExecutionContext>> {
        self.contexts.get(&thread).map(|entry| Arc::clone(entry.value()))
    }

    /// Context of the calling thread, if any
    pub fn current(&self) -> Option<Arc<ExecutionContext>> {
        self.context_of(thread::current().id())
    }

    pub fn is_bound(&self, thread: ThreadId) -> bool {
        self.contexts.contains_key(&thread)
    }

    /// Number of bound threads across all live regions
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_REGISTRY: ThreadRegistry = ThreadRegistry::new();
}

/// The process-wide registry
pub fn registry() -> &'static ThreadRegistry {
    &GLOBAL_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::context::RegionSettings;

    #[test]
    fn test_bind_and_unbind() {
        let registry = ThreadRegistry::new();
        let context = Arc::new(ExecutionContext::new(&RegionSettings::for_team(2)).unwrap());
        let me = thread::current().id();

        assert!(registry.context_of(me).is_none());
        assert!(registry.current().is_none());

        registry.bind(me, Arc::clone(&context));
        assert!(registry.is_bound(me));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.current().unwrap().id(), context.id());

        let removed = registry.unbind(me).unwrap();
        assert!(Arc::ptr_eq(&removed, &context));
        assert!(registry.is_empty());
        assert!(registry.unbind(me).is_none());
    }

    #[test]
    fn test_bindings_are_per_thread() {
        let registry = Arc::new(ThreadRegistry::new());
        let context = Arc::new(ExecutionContext::new(&RegionSettings::for_team(1)).unwrap());

        let other = {
            let registry = Arc::clone(&registry);
            let context = Arc::clone(&context);
            thread::spawn(move || {
                registry.bind(thread::current().id(), context);
                thread::current().id()
            })
            .join()
            .unwrap()
        };

        assert!(registry.is_bound(other));
        assert!(registry.current().is_none());
    }
}
