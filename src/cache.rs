//! Bounded LRU of live emulators keyed by project. Emulators are large, so
//! the cache bounds memory; the transaction log is the source of truth, so
//! eviction is silent and cheap (the next access reconstructs via replay).

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::common::ProjectId;
use crate::runtime::Emulator;

/// A cached emulator plus the number of transactions it has absorbed
/// (seed + replayed + executed). Freshness on a hit is `applied ==
/// persisted transaction count`.
pub struct CachedInstance {
    pub emu: Box<dyn Emulator>,
    pub applied: u64,
}

pub struct EmulatorCache {
    inner: Mutex<LruCache<ProjectId, CachedInstance>>,
}

impl EmulatorCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Remove and return the entry, transferring sole ownership to the
    /// caller. Removal (rather than a borrow) is what enforces the ownership
    /// invariant: an emulator is referenced by the cache, the pool, or one
    /// in-flight call, never two of them.
    pub fn take(&self, project: &ProjectId) -> Option<CachedInstance> {
        self.inner.lock().pop(project)
    }

    /// (Re-)insert the instance for a project, evicting the least recently
    /// used entry on overflow. Evicted instances are dropped.
    pub fn put(&self, project: ProjectId, instance: CachedInstance) {
        self.inner.lock().put(project, instance);
    }

    /// Remove without handing the instance back; used on project reset and
    /// when replay detects divergence.
    pub fn invalidate(&self, project: &ProjectId) {
        self.inner.lock().pop(project);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{EmulatorFactory, MemChainFactory};

    fn instance() -> CachedInstance {
        CachedInstance {
            emu: MemChainFactory.bootstrap().unwrap(),
            applied: 0,
        }
    }

    #[test]
    fn test_take_removes_entry() {
        let cache = EmulatorCache::new(4);
        let p = ProjectId::new(1);
        cache.put(p, instance());
        assert!(cache.take(&p).is_some());
        assert!(cache.take(&p).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_lru_eviction_on_overflow() {
        let cache = EmulatorCache::new(2);
        let (a, b, c) = (ProjectId::new(1), ProjectId::new(2), ProjectId::new(3));
        cache.put(a, instance());
        cache.put(b, instance());
        // touch `a` so `b` is the eviction candidate
        let got = cache.take(&a).unwrap();
        cache.put(a, got);
        cache.put(c, instance());
        assert_eq!(cache.len(), 2);
        assert!(cache.take(&b).is_none());
        assert!(cache.take(&a).is_some());
        assert!(cache.take(&c).is_some());
    }

    #[test]
    fn test_invalidate() {
        let cache = EmulatorCache::new(4);
        let p = ProjectId::new(7);
        cache.put(p, instance());
        cache.invalidate(&p);
        assert!(cache.take(&p).is_none());
    }
}
