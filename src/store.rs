//! The persistence seam. The engine consumes the [Store] trait and nothing
//! else about the backend; [MemStore] is the bundled in-memory
//! implementation used by tests and embedded setups.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::common::{ProjectId, Result};
use crate::record::{ScriptExecution, TransactionExecution};

/// Durable storage for execution records. Every call may block on I/O and
/// may fail; failures propagate as engine errors. Index assignment for
/// transaction executions is the store's job (row count, zero-based), done
/// atomically so that concurrent replicas sharing one store serialize on it.
#[async_trait]
pub trait Store: Send + Sync {
    /// All transaction executions for the project in ascending index order.
    async fn transaction_executions(
        &self, project: ProjectId,
    ) -> Result<Vec<TransactionExecution>>;

    /// Atomically assign the next per-project index (ignoring the incoming
    /// value) and insert. Returns the record as persisted.
    async fn insert_transaction_execution(
        &self, exe: TransactionExecution,
    ) -> Result<TransactionExecution>;

    /// All script executions for the project, oldest first.
    async fn script_executions(
        &self, project: ProjectId,
    ) -> Result<Vec<ScriptExecution>>;

    async fn insert_script_execution(&self, exe: ScriptExecution) -> Result<()>;

    /// Atomically delete all transaction and script executions for the
    /// project.
    async fn reset_project_state(&self, project: ProjectId) -> Result<()>;
}

#[derive(Default)]
struct ProjectRows {
    transactions: Vec<TransactionExecution>,
    scripts: Vec<ScriptExecution>,
}

/// In-memory store. All operations resolve immediately; the async interface
/// exists so the engine is written against the suspending contract real
/// backends have.
#[derive(Default)]
pub struct MemStore {
    rows: Mutex<HashMap<ProjectId, ProjectRows>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn transaction_executions(
        &self, project: ProjectId,
    ) -> Result<Vec<TransactionExecution>> {
        let rows = self.rows.lock();
        Ok(rows
            .get(&project)
            .map(|r| r.transactions.clone())
            .unwrap_or_default())
    }

    async fn insert_transaction_execution(
        &self, mut exe: TransactionExecution,
    ) -> Result<TransactionExecution> {
        let mut rows = self.rows.lock();
        let project = rows.entry(exe.project_id).or_default();
        exe.index = project.transactions.len() as u64;
        project.transactions.push(exe.clone());
        Ok(exe)
    }

    async fn script_executions(
        &self, project: ProjectId,
    ) -> Result<Vec<ScriptExecution>> {
        let rows = self.rows.lock();
        Ok(rows
            .get(&project)
            .map(|r| r.scripts.clone())
            .unwrap_or_default())
    }

    async fn insert_script_execution(&self, exe: ScriptExecution) -> Result<()> {
        let mut rows = self.rows.lock();
        rows.entry(exe.project_id).or_default().scripts.push(exe);
        Ok(())
    }

    async fn reset_project_state(&self, project: ProjectId) -> Result<()> {
        let mut rows = self.rows.lock();
        rows.remove(&project);
        Ok(())
    }
}
