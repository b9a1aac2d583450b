//! # sandbox-engine: multi-tenant project execution engine
//!
//! This crate runs user-submitted programs against per-project blockchain
//! emulator instances and keeps every project's state durable, isolated and
//! reconstructible. A *project* is a tenant sandbox; the only durable truth
//! about it is its ordered log of transaction execution records. Emulator
//! instances are disposable materializations of that log: any instance can be
//! dropped at any time and rebuilt by replaying the log, in index order,
//! through a fresh instance.
//!
//! # Design Overview
//! The crate consists of a few modules that can also be used standalone:
//! - [engine]: the orchestrator. Each operation locks the project, obtains
//!   its emulator (cached, or rebuilt by replay), runs the program with a
//!   fresh log interceptor, persists the record, and re-caches the instance.
//! - [pool]: a warm supply of bootstrapped, empty emulators. Bootstrap is the
//!   dominant cold-start cost, so instances are prepared ahead of demand on
//!   background threads and handed out in O(1).
//! - [cache]: a bounded LRU of live per-project emulators. `take()` removes
//!   the entry, which is what makes the single-owner rule structural: an
//!   instance is referenced by the cache, the pool, or one in-flight
//!   operation, never two of them.
//! - [locks]: reference-counted per-project reader/writer locks. Writes
//!   (transactions, deployments, resets) are exclusive per project; reads
//!   (scripts, account queries) interleave. Entries vanish when the last
//!   holder releases, so the table tracks the in-flight working set.
//! - [store]: the persistence seam ([Store](store::Store)) and a bundled
//!   in-memory backend. The store assigns each transaction record its
//!   zero-based per-project index; that index fixes the replay order.
//! - [runtime]: the emulator seam ([Emulator](runtime::Emulator),
//!   [EmulatorFactory](runtime::EmulatorFactory)) and [MemChain](runtime::MemChain),
//!   a deterministic in-memory chain that interprets a small scripting
//!   language (logging, account creation, contract installation, storage
//!   writes, read-only scripts).
//! - [record]: the durable record shapes, [common]: identifiers and errors,
//!   [logcap]: the per-execution log interceptor.
//!
//! Determinism is the load-bearing property: a fresh instance fed the same
//! records in the same order reaches the same state, including the same
//! account addresses and block heights. Everything that mutates state is
//! persisted as a transaction record, account creation and contract
//! deployment included, so the log alone reconstructs any project anywhere.
//!
//! # Data Flow
//! ```notrust
//!        execute_transaction / create_account / deploy_contract (write)
//!        execute_script / get_account                            (read)
//!                                |
//!                        [ LockTable (per-project rwlock) ]
//!                                |
//!                        [ ProjectEngine::obtain ]
//!                          |               |
//!                  cache hit, fresh    miss or stale
//!                          |               |
//!                   [EmulatorCache]   [InstancePool] --replay log--> instance
//!                          |               |
//!                          `-----. .-------'
//!                                | |
//!                        run with [LogCapture]
//!                                |
//!                        [ Store ] (record persisted, index assigned)
//!                                |
//!                        instance back into [EmulatorCache]
//! ```
//!
//! A failed program is not a failed call: parse, check and runtime errors
//! travel inside the returned record, and the record is persisted like any
//! other. `Err` from the engine always means infrastructure: storage,
//! emulator internals, or a replay divergence.

pub mod cache;
pub mod common;
pub mod engine;
pub mod locks;
pub mod logcap;
pub mod pool;
pub mod record;
pub mod runtime;
pub mod store;

pub use common::{Address, Error, ProjectId, Result};
pub use engine::{EngineConfig, ProjectEngine};
pub use record::{
    Account, Event, NewScriptExecution, NewTransactionExecution, ProgramError,
    Project, ScriptExecution, TransactionExecution,
};
pub use runtime::{Emulator, EmulatorFactory, MemChain, MemChainFactory};
pub use store::{MemStore, Store};
