//! Reference-counted per-project reader/writer locks. Entries are allocated
//! on first use and removed when the last holder releases, so the table's
//! size tracks the concurrent working set rather than the project
//! population. Two projects always hold two independent locks; one tenant's
//! long-running transaction never blocks another tenant.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::common::ProjectId;

struct LockEntry {
    lock: Arc<RwLock<()>>,
    refs: usize,
}

#[derive(Default)]
pub struct LockTable {
    inner: Mutex<HashMap<ProjectId, LockEntry>>,
}

enum Guard {
    Read(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Write(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// Holds a project's lock; dropping it releases the lock and de-retains the
/// table entry.
pub struct LockHandle<'a> {
    table: &'a LockTable,
    project: ProjectId,
    guard: Option<Guard>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the project's write lock, creating the table entry on first
    /// access. May suspend while a concurrent holder finishes.
    pub async fn write(&self, project: ProjectId) -> LockHandle<'_> {
        let lock = self.retain(project);
        let guard = Guard::Write(lock.write_owned().await);
        LockHandle {
            table: self,
            project,
            guard: Some(guard),
        }
    }

    /// Acquire the project's read lock. Concurrent readers interleave.
    pub async fn read(&self, project: ProjectId) -> LockHandle<'_> {
        let lock = self.retain(project);
        let guard = Guard::Read(lock.read_owned().await);
        LockHandle {
            table: self,
            project,
            guard: Some(guard),
        }
    }

    /// Number of live entries; zero when no operation is in flight.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// `{lookup, create, refs += 1}` as one critical section.
    fn retain(&self, project: ProjectId) -> Arc<RwLock<()>> {
        let mut table = self.inner.lock();
        let entry = table.entry(project).or_insert_with(|| LockEntry {
            lock: Arc::new(RwLock::new(())),
            refs: 0,
        });
        entry.refs += 1;
        entry.lock.clone()
    }

    /// `{refs -= 1, delete at zero}` as one critical section.
    fn release(&self, project: &ProjectId) {
        let mut table = self.inner.lock();
        if let Some(entry) = table.get_mut(project) {
            entry.refs -= 1;
            if entry.refs == 0 {
                table.remove(project);
            }
        }
    }
}

impl Drop for LockHandle<'_> {
    fn drop(&mut self) {
        // release the rwlock before de-retaining the entry
        self.guard.take();
        self.table.release(&self.project);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc as StdArc;

    use super::*;

    #[tokio::test]
    async fn test_entry_lifecycle() {
        let table = LockTable::new();
        assert_eq!(table.len(), 0);
        {
            let _w = table.write(ProjectId::new(1)).await;
            assert_eq!(table.len(), 1);
        }
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_readers_share_one_entry() {
        let table = LockTable::new();
        let p = ProjectId::new(9);
        let r1 = table.read(p).await;
        let r2 = table.read(p).await;
        assert_eq!(table.len(), 1);
        drop(r1);
        assert_eq!(table.len(), 1);
        drop(r2);
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_projects_do_not_contend() {
        let table = StdArc::new(LockTable::new());
        // hold a write lock on project 1; project 2 must still acquire
        let _w = table.write(ProjectId::new(1)).await;
        let other = table.write(ProjectId::new(2)).await;
        assert_eq!(table.len(), 2);
        drop(other);
        assert_eq!(table.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_writer_excludes_writer() {
        let table = StdArc::new(LockTable::new());
        let counter = StdArc::new(parking_lot::Mutex::new(0u32));
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let table = table.clone();
            let counter = counter.clone();
            tasks.push(tokio::spawn(async move {
                let _w = table.write(ProjectId::new(5)).await;
                let mut c = counter.lock();
                *c += 1;
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(*counter.lock(), 16);
        assert_eq!(table.len(), 0);
    }
}
