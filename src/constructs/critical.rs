use crate::core::errors::Result;
use crate::team::context::current_context;
use crate::team::position;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// One lock per `critical` call site of a region
pub(crate) struct CriticalContext {
    locks: DashMap<usize, Arc<Mutex<()>>>,
}

impl CriticalContext {
    pub(crate) fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Lock guarding call site `position`, created by whichever member gets there first
    pub(crate) fn lock_for(&self, position: usize) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(position)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    #[cfg(test)]
    pub(crate) fn call_sites(&self) -> usize {
        self.locks.len()
    }
}

/// Run `body` under the mutual-exclusion lock of this call site.
///
/// Call sites are identified by the calling worker's count of `critical` calls
/// so far, so every member must reach its `critical` blocks in the same order.
/// The lock is released even if `body` panics. There is no implied barrier.
pub fn critical<T, F: FnOnce() -> T>(body: F) -> Result<T> {
    let context = current_context("critical")?;
    let lock = context.critical().lock_for(position::next_critical());
    let _guard = lock.lock();
    Ok(body())
}
