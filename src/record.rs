//! Durable execution records and the read-time account shape. The engine
//! produces these; the [Store](crate::store::Store) persists them. A
//! project's transaction executions, sorted by `index`, are the exact
//! sequence replayed to reconstitute emulator state.

use serde::{Deserialize, Serialize};

use crate::common::{Address, ProjectId};

/// A structured error raised by user code at parse, check or run time. Never
/// an engine error; it travels inside the record it belongs to.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ProgramError {
    pub message: String,
}

impl ProgramError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An event emitted by the runtime during one execution. Address-valued
/// payload fields are fixed-width hex strings.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub typ: String,
    pub values: serde_json::Value,
}

/// Input to [ProjectEngine::execute_transaction](crate::engine::ProjectEngine::execute_transaction).
#[derive(Clone, Debug)]
pub struct NewTransactionExecution {
    pub project_id: ProjectId,
    pub script: String,
    pub arguments: Vec<String>,
    pub signers: Vec<Address>,
}

/// Input to [ProjectEngine::execute_script](crate::engine::ProjectEngine::execute_script).
#[derive(Clone, Debug)]
pub struct NewScriptExecution {
    pub project_id: ProjectId,
    pub script: String,
    pub arguments: Vec<String>,
}

/// The durable record of one transaction execution. `index` is assigned by
/// the store, monotonically per project, and fixes the replay order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionExecution {
    pub project_id: ProjectId,
    pub index: u64,
    pub script: String,
    pub arguments: Vec<String>,
    pub signers: Vec<Address>,
    pub errors: Vec<ProgramError>,
    pub events: Vec<Event>,
    pub logs: Vec<String>,
}

impl TransactionExecution {
    /// True iff the execution completed without program errors. Used by the
    /// replay divergence check.
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The durable record of one read-only script execution. Never replayed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScriptExecution {
    pub project_id: ProjectId,
    pub script: String,
    pub arguments: Vec<String>,
    pub value: String,
    pub errors: Vec<ProgramError>,
    pub logs: Vec<String>,
}

/// Account shape exported to callers; derived from the emulator at read time
/// and never stored. `state` is the account storage serialized as JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub deployed_contracts: Vec<String>,
    pub deployed_code: String,
    pub state: String,
}

/// The engine-facing view of a tenant: its identifier plus the number of
/// accounts seeded on reset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub number_of_accounts: u64,
}
