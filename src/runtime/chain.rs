//! The bundled deterministic in-memory emulator. One instance is one
//! single-node chain: a vector of accounts (ordinal position is the address)
//! plus a block height that advances by exactly one per transaction.

use std::collections::BTreeMap;
use std::io;

use serde_json::{json, Value};
use sha3::Digest;

use super::lang::{self, ReturnExpr};
use super::{
    AccountSnapshot, Emulator, EmulatorFactory, TxMeta, TxResult,
    ACCOUNT_CREATED_EVENT, CREATE_ACCOUNT_SOURCE, TX_GAS_LIMIT,
};
use crate::common::{Address, Error, Result};
use crate::logcap::USER_LOG_PREFIX;
use crate::record::{Event, ProgramError};

struct AccountState {
    address: Address,
    /// (name, source) in deployment order; redeploying a name updates it.
    contracts: Vec<(String, String)>,
    storage: BTreeMap<String, Value>,
}

impl AccountState {
    fn new(address: Address) -> Self {
        Self {
            address,
            contracts: Vec::new(),
            storage: BTreeMap::new(),
        }
    }
}

/// Deterministic single-node chain. Bootstraps with the service account at
/// ordinal zero; user accounts take the following ordinals, so the k-th
/// created account always lands on address `k` regardless of which replica
/// replays the log.
pub struct MemChain {
    height: u64,
    accounts: Vec<AccountState>,
}

impl MemChain {
    /// Cold bootstrap: empty chain with the service account seeded.
    pub fn bootstrap() -> Self {
        Self {
            height: 0,
            accounts: vec![AccountState::new(*Address::service())],
        }
    }

    fn account(&self, address: &Address) -> Option<&AccountState> {
        self.accounts.iter().find(|a| a.address == *address)
    }

    fn account_mut(&mut self, address: &Address) -> Option<&mut AccountState> {
        self.accounts.iter_mut().find(|a| a.address == *address)
    }

    fn allocate_account(&mut self) -> Address {
        let address = Address::from_ordinal(self.accounts.len() as u64);
        self.accounts.push(AccountState::new(address));
        address
    }

    fn tx_hash(&self, script: &str, arguments: &[String], signers: &[Address]) -> String {
        let mut hasher = sha3::Keccak256::new();
        hasher.update(self.height.to_be_bytes());
        hasher.update(script.as_bytes());
        for arg in arguments {
            hasher.update(arg.as_bytes());
        }
        for signer in signers {
            hasher.update(signer.raw().to_be_bytes());
        }
        format!("0x{}", hex::encode(hasher.finalize()))
    }

    fn emit_logs(src: &str, logger: &mut dyn io::Write) -> Result<u64> {
        let mut gas = 0;
        for line in lang::log_lines(src) {
            writeln!(logger, "{} {}", USER_LOG_PREFIX, line)
                .map_err(|e| Error::Emulator(format!("log sink: {}", e)))?;
            gas += 1;
        }
        Ok(gas)
    }
}

impl Emulator for MemChain {
    fn execute_transaction(
        &mut self, script: &str, arguments: &[String], signers: &[Address],
        logger: &mut dyn io::Write,
    ) -> Result<(TxResult, TxMeta)> {
        let meta = TxMeta {
            hash: self.tx_hash(script, arguments, signers),
            gas_limit: TX_GAS_LIMIT,
            signers: signers.to_vec(),
        };
        // The block seals whether or not the program below fails; replaying
        // |L| records always lands on height |L|.
        self.height += 1;

        let fail = |message: String| TxResult {
            errors: vec![ProgramError::new(message)],
            events: Vec::new(),
            gas_used: 1,
        };

        if let Some(message) = lang::panic_message(script) {
            return Ok((fail(format!("panic: {}", message)), meta))
        }

        let creations = lang::account_creations(script);
        let contract = lang::contract_name(script);
        let saves = lang::saves(script);
        if (contract.is_some() || !saves.is_empty()) && signers.is_empty() {
            return Ok((fail("transaction requires a signer".to_string()), meta))
        }
        if let Some(signer) = signers.first() {
            if self.account(signer).is_none() {
                return Ok((fail(format!("no account with address {}", signer)), meta))
            }
        }

        let mut gas = 0;
        let mut events = Vec::new();
        for _ in 0..creations {
            let address = self.allocate_account();
            events.push(Event {
                typ: ACCOUNT_CREATED_EVENT.to_string(),
                values: json!({ "address": address.to_hex() }),
            });
            gas += 1;
        }
        if let Some(name) = contract {
            // unwrap is safe: a missing signer bailed out above
            let account = self.account_mut(&signers[0]).unwrap();
            match account.contracts.iter_mut().find(|(n, _)| *n == name) {
                Some(slot) => slot.1 = script.to_string(),
                None => account.contracts.push((name, script.to_string())),
            }
            gas += 1;
        }
        for (key, value) in saves {
            let account = self.account_mut(&signers[0]).unwrap();
            account.storage.insert(key, value);
            gas += 1;
        }
        gas += Self::emit_logs(script, logger)?;

        Ok((
            TxResult {
                errors: Vec::new(),
                events,
                gas_used: gas.max(1),
            },
            meta,
        ))
    }

    fn execute_script(
        &self, script: &str, _arguments: &[String], logger: &mut dyn io::Write,
    ) -> Result<(String, TxResult)> {
        if let Some(message) = lang::panic_message(script) {
            return Ok((
                String::new(),
                TxResult {
                    errors: vec![ProgramError::new(format!("panic: {}", message))],
                    events: Vec::new(),
                    gas_used: 1,
                },
            ))
        }
        let mut gas = Self::emit_logs(script, logger)?;
        let value = match lang::script_return(script) {
            None => "()".to_string(),
            Some(ReturnExpr::Literal(lit)) => lit,
            Some(ReturnExpr::Height) => self.height.to_string(),
            Some(ReturnExpr::Storage(address, key)) => self
                .account(&address)
                .and_then(|a| a.storage.get(&key))
                .map(|v| v.to_string())
                .unwrap_or_else(|| "nil".to_string()),
        };
        gas += 1;
        Ok((
            value,
            TxResult {
                errors: Vec::new(),
                events: Vec::new(),
                gas_used: gas,
            },
        ))
    }

    fn create_account(
        &mut self, logger: &mut dyn io::Write,
    ) -> Result<(Address, TxResult, TxMeta)> {
        let next = Address::from_ordinal(self.accounts.len() as u64);
        let (result, meta) = self.execute_transaction(
            CREATE_ACCOUNT_SOURCE,
            &[],
            &[*Address::service()],
            logger,
        )?;
        Ok((next, result, meta))
    }

    fn deploy_contract(
        &mut self, address: &Address, source: &str, logger: &mut dyn io::Write,
    ) -> Result<(TxResult, TxMeta)> {
        self.execute_transaction(source, &[], &[*address], logger)
    }

    fn get_account(&self, address: &Address) -> Result<AccountSnapshot> {
        let account = self
            .account(address)
            .ok_or_else(|| Error::NotFound(format!("account {}", address)))?;
        Ok(AccountSnapshot {
            address: account.address,
            contracts: account.contracts.clone(),
            storage: Value::Object(
                account
                    .storage
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        })
    }

    fn latest_block_height(&self) -> u64 {
        self.height
    }
}

/// Factory for the bundled runtime.
#[derive(Default)]
pub struct MemChainFactory;

impl EmulatorFactory for MemChainFactory {
    fn bootstrap(&self) -> Result<Box<dyn Emulator>> {
        Ok(Box::new(MemChain::bootstrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logcap::LogCapture;

    #[test]
    fn test_bootstrap_state() {
        let chain = MemChain::bootstrap();
        assert_eq!(chain.latest_block_height(), 0);
        assert!(chain.get_account(Address::service()).is_ok());
        assert!(chain.get_account(&Address::from(1)).is_err());
    }

    #[test]
    fn test_deterministic_account_allocation() {
        let run = || {
            let mut chain = MemChain::bootstrap();
            let mut out = Vec::new();
            for _ in 0..3 {
                let mut logs = LogCapture::new();
                let (addr, result, meta) = chain.create_account(&mut logs).unwrap();
                out.push((addr, result.events, meta.hash));
            }
            out
        };
        let a = run();
        let b = run();
        assert_eq!(a.len(), 3);
        assert_eq!(a[0].0, Address::from(1));
        assert_eq!(a[2].0, Address::from(3));
        for ((aa, ae, ah), (ba, be, bh)) in a.into_iter().zip(b) {
            assert_eq!(aa, ba);
            assert_eq!(ae, be);
            assert_eq!(ah, bh);
        }
    }

    #[test]
    fn test_failed_transaction_still_seals_a_block() {
        let mut chain = MemChain::bootstrap();
        let mut logs = LogCapture::new();
        let (result, _) = chain
            .execute_transaction(
                r#"transaction { execute { panic("boom") } }"#,
                &[],
                &[],
                &mut logs,
            )
            .unwrap();
        assert!(!result.succeeded());
        assert_eq!(chain.latest_block_height(), 1);
        assert!(logs.extract().is_empty());
    }

    #[test]
    fn test_script_is_pure() {
        let chain = MemChain::bootstrap();
        let mut logs = LogCapture::new();
        let (value, result) = chain
            .execute_script("pub fun main(): UInt64 { return height() }", &[], &mut logs)
            .unwrap();
        assert!(result.succeeded());
        assert_eq!(value, "0");
        assert_eq!(chain.latest_block_height(), 0);
    }

    #[test]
    fn test_deploy_and_read_back() {
        let mut chain = MemChain::bootstrap();
        let mut logs = LogCapture::new();
        let (owner, ..) = chain.create_account(&mut logs).unwrap();
        let source = "access(all) contract Greeter { }";
        let mut logs = LogCapture::new();
        let (result, _) = chain.deploy_contract(&owner, source, &mut logs).unwrap();
        assert!(result.succeeded());
        let snapshot = chain.get_account(&owner).unwrap();
        assert_eq!(snapshot.contracts.len(), 1);
        assert_eq!(snapshot.contracts[0].0, "Greeter");
    }

    #[test]
    fn test_storage_save_and_script_read() {
        let mut chain = MemChain::bootstrap();
        let mut logs = LogCapture::new();
        let (owner, ..) = chain.create_account(&mut logs).unwrap();
        let save = "transaction { prepare(signer: AuthAccount) { signer.save(42, to: /storage/answer) } }";
        let mut logs = LogCapture::new();
        let (result, _) = chain
            .execute_transaction(save, &[], &[owner], &mut logs)
            .unwrap();
        assert!(result.succeeded());
        let mut logs = LogCapture::new();
        let (value, _) = chain
            .execute_script(
                r#"pub fun main(): Int { return getStorage(0x01, "answer") }"#,
                &[],
                &mut logs,
            )
            .unwrap();
        assert_eq!(value, "42");
    }
}
