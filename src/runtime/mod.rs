//! The emulator seam. [Emulator] and [EmulatorFactory] are the complete
//! contract the engine requires from the underlying blockchain runtime;
//! swapping the runtime means re-implementing the factory and nothing else.
//!
//! Determinism is the load-bearing requirement: a freshly bootstrapped
//! instance receiving the same sequence of inputs must produce byte-identical
//! results (same addresses allocated, same event payloads), because the
//! engine reconstitutes state by replaying the persisted transaction log.
//! Address allocation is the ordinal count of accounts created since
//! bootstrap.
//!
//! [MemChain] is the bundled deterministic in-memory runtime.

use std::io;

mod chain;
mod lang;

pub use chain::{MemChain, MemChainFactory};

use crate::common::{Address, Result};
use crate::record::{Event, ProgramError};

/// Gas limit stamped on every transaction; the bundled runtime meters gas
/// per interpreted operation and never reaches it.
pub const TX_GAS_LIMIT: u64 = 9999;

/// Event type emitted once per account creation. Its payload carries the new
/// address as fixed-width hex.
pub const ACCOUNT_CREATED_EVENT: &str = "AccountCreated";

/// The canonical create-account transaction. `create_account` executes this
/// source signed by the service account, and the engine persists exactly this
/// triple so replay on any replica recreates the account deterministically.
pub const CREATE_ACCOUNT_SOURCE: &str =
    "transaction { prepare(signer: AuthAccount) { AuthAccount(payer: signer) } }";

/// Outcome of one execution: structured program errors, emitted events and
/// metered gas. Program errors are data, not `Err`; the engine persists the
/// record either way.
#[derive(Clone, Debug)]
pub struct TxResult {
    pub errors: Vec<ProgramError>,
    pub events: Vec<Event>,
    pub gas_used: u64,
}

impl TxResult {
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Transaction metadata: deterministic hash, gas limit and the final signer
/// list.
#[derive(Clone, Debug)]
pub struct TxMeta {
    pub hash: String,
    pub gas_limit: u64,
    pub signers: Vec<Address>,
}

/// One account as the emulator sees it: deployed contracts (name, source)
/// in deployment order, plus the storage tree.
#[derive(Clone, Debug)]
pub struct AccountSnapshot {
    pub address: Address,
    pub contracts: Vec<(String, String)>,
    pub storage: serde_json::Value,
}

/// A deterministic single-node blockchain emulator. Instances are owned by
/// exactly one of the pool, the cache, or an in-flight engine call; nothing
/// here is internally synchronized.
pub trait Emulator: Send {
    /// Execute a transaction. Advances the chain by exactly one block whether
    /// or not the user program failed; only an `Err` (runtime failure) leaves
    /// the instance in an undefined state.
    fn execute_transaction(
        &mut self, script: &str, arguments: &[String], signers: &[Address],
        logger: &mut dyn io::Write,
    ) -> Result<(TxResult, TxMeta)>;

    /// Evaluate a read-only script; never mutates state. Returns the opaque
    /// result value alongside the execution outcome.
    fn execute_script(
        &self, script: &str, arguments: &[String], logger: &mut dyn io::Write,
    ) -> Result<(String, TxResult)>;

    /// Create one account via the canonical create-account transaction,
    /// signed by the service account. Advances the chain by one block.
    fn create_account(
        &mut self, logger: &mut dyn io::Write,
    ) -> Result<(Address, TxResult, TxMeta)>;

    /// Install one contract on `address`; equivalent to executing `source` as
    /// a transaction signed by `address`. The contract name is parsed from
    /// the source. Advances the chain by one block.
    fn deploy_contract(
        &mut self, address: &Address, source: &str,
        logger: &mut dyn io::Write,
    ) -> Result<(TxResult, TxMeta)>;

    /// Pure read of an account and its storage.
    fn get_account(&self, address: &Address) -> Result<AccountSnapshot>;

    /// Pure read; equals the number of transactions executed since bootstrap.
    fn latest_block_height(&self) -> u64;
}

/// Produces bootstrapped, empty emulator instances (service account seeded,
/// height zero). Bootstrap is the expensive step the pool amortizes.
pub trait EmulatorFactory: Send + Sync {
    fn bootstrap(&self) -> Result<Box<dyn Emulator>>;
}
