//! The project engine: the only component with externally visible
//! semantics. It owns the emulator population and keeps it coherent with the
//! persisted transaction log under concurrent requests and restarts.
//!
//! Every operation follows the same shape: acquire the project's lock
//! (write for mutations, read for queries), obtain the project's emulator
//! (cached and fresh, or rebuilt by replaying the log through a pooled
//! instance), run the operation with a fresh log interceptor, persist the
//! resulting record, hand the instance back to the cache, release the lock.
//!
//! The engine is a value with no global state; a process may host many.

use std::sync::Arc;

use log::{debug, warn};

use crate::cache::{CachedInstance, EmulatorCache};
use crate::common::{Address, Error, ProjectId, Result};
use crate::locks::LockTable;
use crate::logcap::LogCapture;
use crate::pool::InstancePool;
use crate::record::{
    Account, NewScriptExecution, NewTransactionExecution, Project,
    ScriptExecution, TransactionExecution,
};
use crate::runtime::{AccountSnapshot, EmulatorFactory, CREATE_ACCOUNT_SOURCE};
use crate::store::Store;

#[derive(Copy, Clone, Debug)]
pub struct EngineConfig {
    /// Warm emulator instances kept ready for cache misses.
    pub pool_capacity: usize,
    /// Maximum number of live per-project emulators.
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 4,
            cache_capacity: 256,
        }
    }
}

pub struct ProjectEngine {
    store: Arc<dyn Store>,
    pool: InstancePool,
    cache: EmulatorCache,
    locks: LockTable,
}

impl ProjectEngine {
    pub fn new(
        store: Arc<dyn Store>, factory: Arc<dyn EmulatorFactory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            pool: InstancePool::new(factory, config.pool_capacity),
            cache: EmulatorCache::new(config.cache_capacity),
            locks: LockTable::new(),
        }
    }

    /// Execute a transaction against the project's emulator and persist the
    /// resulting record. Program errors (parse, check, run time) live inside
    /// the returned record; an `Err` is always infrastructure.
    pub async fn execute_transaction(
        &self, new: NewTransactionExecution,
    ) -> Result<TransactionExecution> {
        let project = new.project_id;
        let _lock = self.locks.write(project).await;
        let mut instance = self.obtain(project).await?;

        let mut capture = LogCapture::new();
        // a runtime Err leaves the instance undefined: drop it uncached
        let (result, meta) = instance.emu.execute_transaction(
            &new.script,
            &new.arguments,
            &new.signers,
            &mut capture,
        )?;

        let exe = TransactionExecution {
            project_id: project,
            index: 0, // assigned by the store
            script: new.script,
            arguments: new.arguments,
            signers: meta.signers,
            errors: result.errors,
            events: result.events,
            logs: capture.extract(),
        };
        let stored = match self.store.insert_transaction_execution(exe).await {
            Ok(stored) => stored,
            Err(e) => {
                // the emulator has advanced past the log; dropping it (it is
                // already out of the cache) forces the next access to replay
                warn!(
                    "persisting transaction for project {} failed: {}",
                    project, e
                );
                return Err(e)
            }
        };
        instance.applied += 1;
        self.cache.put(project, instance);
        Ok(stored)
    }

    /// Evaluate a read-only script and persist its record. The emulator is
    /// not mutated, so a persistence failure here keeps the cache entry.
    pub async fn execute_script(
        &self, new: NewScriptExecution,
    ) -> Result<ScriptExecution> {
        let project = new.project_id;
        let _lock = self.locks.read(project).await;
        let instance = self.obtain(project).await?;

        let mut capture = LogCapture::new();
        let (value, result) = instance
            .emu
            .execute_script(&new.script, &new.arguments, &mut capture)?;
        self.cache.put(project, instance);

        let exe = ScriptExecution {
            project_id: project,
            script: new.script,
            arguments: new.arguments,
            value,
            errors: result.errors,
            logs: capture.extract(),
        };
        self.store.insert_script_execution(exe.clone()).await?;
        Ok(exe)
    }

    /// Create one account through the canonical create-account transaction
    /// and persist its record, so replay on any replica recreates the
    /// account at the same address.
    pub async fn create_account(&self, project: ProjectId) -> Result<Account> {
        let _lock = self.locks.write(project).await;
        let mut instance = self.obtain(project).await?;

        let mut capture = LogCapture::new();
        let (address, result, meta) = instance.emu.create_account(&mut capture)?;
        let exe = TransactionExecution {
            project_id: project,
            index: 0,
            script: CREATE_ACCOUNT_SOURCE.to_string(),
            arguments: Vec::new(),
            signers: meta.signers,
            errors: result.errors,
            events: result.events,
            logs: capture.extract(),
        };
        if let Err(e) = self.store.insert_transaction_execution(exe).await {
            warn!(
                "persisting account creation for project {} failed: {}",
                project, e
            );
            return Err(e)
        }
        instance.applied += 1;

        let snapshot = instance.emu.get_account(&address)?;
        self.cache.put(project, instance);
        export_account(snapshot)
    }

    /// Install a contract on `address` as a persisted transaction and return
    /// the updated account, read under the same lock.
    pub async fn deploy_contract(
        &self, project: ProjectId, address: Address, script: &str,
    ) -> Result<Account> {
        let _lock = self.locks.write(project).await;
        let mut instance = self.obtain(project).await?;

        let mut capture = LogCapture::new();
        let (result, meta) =
            instance.emu.deploy_contract(&address, script, &mut capture)?;
        let exe = TransactionExecution {
            project_id: project,
            index: 0,
            script: script.to_string(),
            arguments: Vec::new(),
            signers: meta.signers,
            errors: result.errors,
            events: result.events,
            logs: capture.extract(),
        };
        if let Err(e) = self.store.insert_transaction_execution(exe).await {
            warn!(
                "persisting deployment for project {} failed: {}",
                project, e
            );
            return Err(e)
        }
        instance.applied += 1;

        let snapshot = instance.emu.get_account(&address)?;
        self.cache.put(project, instance);
        export_account(snapshot)
    }

    /// Read an account and its storage, serialized as JSON.
    pub async fn get_account(
        &self, project: ProjectId, address: Address,
    ) -> Result<Account> {
        let _lock = self.locks.read(project).await;
        let instance = self.obtain(project).await?;
        let snapshot = instance.emu.get_account(&address);
        // a missing account is not a reason to discard a coherent emulator
        self.cache.put(project, instance);
        export_account(snapshot?)
    }

    /// Drop the project back to its baseline: delete every persisted
    /// execution, then seed `number_of_accounts` fresh accounts whose
    /// creation transactions are persisted so replays reproduce them.
    pub async fn reset(&self, project: &Project) -> Result<()> {
        let _lock = self.locks.write(project.id).await;
        self.cache.invalidate(&project.id);
        self.store.reset_project_state(project.id).await?;

        let mut emu = self.pool.take()?;
        let mut applied = 0;
        for _ in 0..project.number_of_accounts {
            let mut capture = LogCapture::new();
            let (_, result, meta) = emu.create_account(&mut capture)?;
            let exe = TransactionExecution {
                project_id: project.id,
                index: 0,
                script: CREATE_ACCOUNT_SOURCE.to_string(),
                arguments: Vec::new(),
                signers: meta.signers,
                errors: result.errors,
                events: result.events,
                logs: capture.extract(),
            };
            self.store.insert_transaction_execution(exe).await?;
            applied += 1;
        }
        self.cache.put(project.id, CachedInstance { emu, applied });
        Ok(())
    }

    /// Latest block height of the project's emulator; equals the persisted
    /// transaction count when the instance is coherent.
    pub async fn latest_block_height(&self, project: ProjectId) -> Result<u64> {
        let _lock = self.locks.read(project).await;
        let instance = self.obtain(project).await?;
        let height = instance.emu.latest_block_height();
        self.cache.put(project, instance);
        Ok(height)
    }

    /// Drop the project's cached emulator, forcing the next access to
    /// rebuild via replay.
    pub fn invalidate(&self, project: ProjectId) {
        self.cache.invalidate(&project);
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn lock_table_len(&self) -> usize {
        self.locks.len()
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Obtain sole ownership of the project's emulator: the cached instance
    /// when it has absorbed exactly the persisted transaction count, or a
    /// pooled instance brought up to date by replay. The caller must hold
    /// the project lock.
    async fn obtain(&self, project: ProjectId) -> Result<CachedInstance> {
        // one store read serves both the staleness check and replay input
        let persisted = self.store.transaction_executions(project).await?;
        if let Some(instance) = self.cache.take(&project) {
            if instance.applied == persisted.len() as u64 {
                return Ok(instance)
            }
            // a sibling replica wrote to this project (or reset it) behind
            // our back; the instance no longer matches the log
            debug!(
                "stale emulator for project {}: {} applied vs {} persisted; rebuilding",
                project,
                instance.applied,
                persisted.len()
            );
        }
        self.replay(project, &persisted)
    }

    /// Fold the persisted log, in index order, through a fresh instance. A
    /// record that persisted without errors but fails now means emulator
    /// version skew or non-determinism; the call fails, nothing is cached,
    /// and the log is left untouched for auditing.
    fn replay(
        &self, project: ProjectId, executions: &[TransactionExecution],
    ) -> Result<CachedInstance> {
        let mut emu = self.pool.take()?;
        for exe in executions {
            let mut capture = LogCapture::new();
            let (result, _) = emu.execute_transaction(
                &exe.script,
                &exe.arguments,
                &exe.signers,
                &mut capture,
            )?;
            if !result.succeeded() && exe.succeeded() {
                warn!(
                    "replay divergence in project {} at index {}",
                    project, exe.index
                );
                return Err(Error::ReplayDivergence {
                    project,
                    index: exe.index,
                })
            }
        }
        Ok(CachedInstance {
            emu,
            applied: executions.len() as u64,
        })
    }
}

fn export_account(snapshot: AccountSnapshot) -> Result<Account> {
    let state = serde_json::to_string(&snapshot.storage)
        .map_err(|e| Error::Emulator(format!("storage serialization: {}", e)))?;
    Ok(Account {
        address: snapshot.address,
        deployed_contracts: snapshot
            .contracts
            .iter()
            .map(|(name, _)| name.clone())
            .collect(),
        deployed_code: snapshot
            .contracts
            .iter()
            .map(|(_, source)| source.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        state,
    })
}
