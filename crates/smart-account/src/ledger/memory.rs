//! A journaled, in-memory [`Ledger`].

use core::fmt::Debug;
use std::sync::Arc;

use alloy_primitives::{map::HashMap, Address, Bytes, Log, B256, U256};

use super::{CallResult, Ledger, LedgerCheckpoint};
use crate::LedgerError;

/// Code living at an address of the [`InMemoryLedger`].
///
/// A contract only touches the ledger through its [`ContractContext`], so every change it makes
/// is journaled and disappears if the call fails.
pub trait NativeContract: Debug + Send + Sync {
    /// Handles a call. `Err` carries the revert data returned to the caller.
    fn call(&self, ctx: &mut ContractContext<'_>, input: &Bytes) -> CallResult;
}

/// The view of the ledger handed to a [`NativeContract`] during a call.
#[derive(derive_more::Debug)]
pub struct ContractContext<'a> {
    #[debug(ignore)]
    ledger: &'a mut InMemoryLedger,
    address: Address,
    caller: Address,
    value: U256,
}

impl ContractContext<'_> {
    /// The address of the executing contract.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// The immediate caller.
    pub const fn caller(&self) -> Address {
        self.caller
    }

    /// The value transferred with the call.
    pub const fn value(&self) -> U256 {
        self.value
    }

    /// The current block timestamp.
    pub fn timestamp(&self) -> u64 {
        self.ledger.timestamp
    }

    /// Reads a storage slot of the executing contract.
    pub fn sload(&self, slot: B256) -> B256 {
        self.ledger.storage_at(self.address, slot)
    }

    /// Writes a storage slot of the executing contract.
    pub fn sstore(&mut self, slot: B256, value: B256) {
        let address = self.address;
        self.ledger.set_storage_journaled(address, slot, value);
    }

    /// Emits a log from the executing contract.
    pub fn emit(&mut self, log: Log) {
        self.ledger.emit(log);
    }

    /// Calls another address from the executing contract.
    pub fn call(&mut self, target: Address, value: U256, input: Bytes) -> CallResult {
        let address = self.address;
        self.ledger.call(address, target, value, input)
    }
}

#[derive(Debug, Clone)]
enum JournalEntry {
    BalanceChanged { address: Address, previous: U256 },
    RecordChanged { address: Address, namespace: B256, previous: Option<Bytes> },
    StorageChanged { address: Address, slot: B256, previous: B256 },
}

/// A journaled in-memory ledger.
///
/// Setup methods (`set_*`, `with_*`, [`Self::deploy`]) write outside of the journal and are
/// meant to prepare a scenario. Everything reached through the [`Ledger`] trait is journaled.
/// Committing the outermost open checkpoint makes its changes final and drops the journal.
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    timestamp: u64,
    chain_id: u64,
    balances: HashMap<Address, U256>,
    records: HashMap<(Address, B256), Bytes>,
    storage: HashMap<(Address, B256), B256>,
    contracts: HashMap<Address, Arc<dyn NativeContract>>,
    logs: Vec<Log>,
    journal: Vec<JournalEntry>,
    open_checkpoints: usize,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(1)
    }
}

impl InMemoryLedger {
    /// Creates an empty ledger for `chain_id`, at timestamp zero.
    pub fn new(chain_id: u64) -> Self {
        Self {
            timestamp: 0,
            chain_id,
            balances: HashMap::default(),
            records: HashMap::default(),
            storage: HashMap::default(),
            contracts: HashMap::default(),
            logs: Vec::new(),
            journal: Vec::new(),
            open_checkpoints: 0,
        }
    }

    /// Sets the current timestamp.
    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    /// Sets the current timestamp.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.set_timestamp(timestamp);
        self
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance_time(&mut self, seconds: u64) {
        self.timestamp += seconds;
    }

    /// Sets the balance of `address`.
    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.balances.insert(address, balance);
    }

    /// Sets the balance of `address`.
    pub fn with_balance(mut self, address: Address, balance: U256) -> Self {
        self.set_balance(address, balance);
        self
    }

    /// Installs `contract` at `address`.
    pub fn deploy(&mut self, address: Address, contract: impl NativeContract + 'static) {
        self.contracts.insert(address, Arc::new(contract));
    }

    /// Installs `contract` at `address`.
    pub fn with_contract(
        mut self,
        address: Address,
        contract: impl NativeContract + 'static,
    ) -> Self {
        self.deploy(address, contract);
        self
    }

    /// Reads a storage slot of the contract at `address`.
    pub fn storage_at(&self, address: Address, slot: B256) -> B256 {
        self.storage.get(&(address, slot)).copied().unwrap_or_default()
    }

    /// Returns every log emitted and not reverted.
    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    /// Returns the number of journal entries, i.e. the number of undoable changes.
    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    fn set_balance_journaled(&mut self, address: Address, balance: U256) {
        let previous = self.balances.insert(address, balance).unwrap_or_default();
        self.journal.push(JournalEntry::BalanceChanged { address, previous });
    }

    fn set_storage_journaled(&mut self, address: Address, slot: B256, value: B256) {
        let previous = self.storage.insert((address, slot), value).unwrap_or_default();
        self.journal.push(JournalEntry::StorageChanged { address, slot, previous });
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::BalanceChanged { address, previous } => {
                self.balances.insert(address, previous);
            }
            JournalEntry::RecordChanged { address, namespace, previous } => match previous {
                Some(record) => {
                    self.records.insert((address, namespace), record);
                }
                None => {
                    self.records.remove(&(address, namespace));
                }
            },
            JournalEntry::StorageChanged { address, slot, previous } => {
                self.storage.insert((address, slot), previous);
            }
        }
    }
}

impl Ledger for InMemoryLedger {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> Result<(), LedgerError> {
        let available = self.balance(from);
        if available < value {
            return Err(LedgerError::InsufficientBalance {
                address: from,
                available,
                required: value,
            });
        }
        if value.is_zero() || from == to {
            return Ok(());
        }
        self.set_balance_journaled(from, available - value);
        let credited = self.balance(to).saturating_add(value);
        self.set_balance_journaled(to, credited);
        Ok(())
    }

    fn load_record(&self, address: Address, namespace: B256) -> Option<Bytes> {
        self.records.get(&(address, namespace)).cloned()
    }

    fn store_record(&mut self, address: Address, namespace: B256, record: Bytes) {
        let previous = self.records.insert((address, namespace), record);
        self.journal.push(JournalEntry::RecordChanged { address, namespace, previous });
    }

    fn call(&mut self, caller: Address, target: Address, value: U256, input: Bytes) -> CallResult {
        let checkpoint = self.checkpoint();

        if self.transfer(caller, target, value).is_err() {
            self.checkpoint_revert(checkpoint);
            return Err(Bytes::new());
        }

        // Plain value transfer to an address without code.
        let Some(contract) = self.contracts.get(&target).cloned() else {
            self.checkpoint_commit(checkpoint);
            return Ok(Bytes::new());
        };

        let mut ctx = ContractContext { ledger: self, address: target, caller, value };
        let result = contract.call(&mut ctx, &input);
        match result {
            Ok(_) => self.checkpoint_commit(checkpoint),
            Err(_) => self.checkpoint_revert(checkpoint),
        }
        result
    }

    fn emit(&mut self, log: Log) {
        self.logs.push(log);
    }

    fn checkpoint(&mut self) -> LedgerCheckpoint {
        self.open_checkpoints += 1;
        LedgerCheckpoint { journal_len: self.journal.len(), logs_len: self.logs.len() }
    }

    fn checkpoint_commit(&mut self, _checkpoint: LedgerCheckpoint) {
        self.open_checkpoints = self.open_checkpoints.saturating_sub(1);
        // Below an open checkpoint, entries stay so that the enclosing one can still undo them.
        if self.open_checkpoints == 0 {
            self.journal.clear();
        }
    }

    fn checkpoint_revert(&mut self, checkpoint: LedgerCheckpoint) {
        while self.journal.len() > checkpoint.journal_len {
            if let Some(entry) = self.journal.pop() {
                self.undo(entry);
            }
        }
        self.logs.truncate(checkpoint.logs_len);
        self.open_checkpoints = self.open_checkpoints.saturating_sub(1);
    }
}
