//! The host ledger the smart account runs against.
//!
//! The account never owns global state. Everything it reads or mutates (balances, its
//! namespaced state record, external calls, event logs, the current time) goes through the
//! [`Ledger`] trait, which stands for the execution environment of the surrounding chain. That
//! environment is assumed to run one state transition per account at a time; the trait offers
//! journal checkpoints so that a multi-step transition can be rolled back as a unit.
//!
//! [`InMemoryLedger`] is a journaled reference implementation used by the tests and the
//! benchmarks.

use core::fmt::Debug;

use alloy_primitives::{Address, Bytes, Log, B256, U256};
use auto_impl::auto_impl;

use crate::LedgerError;

mod memory;
pub use memory::*;

/// Result of an external call: the callee's output on success, its revert data on failure.
pub type CallResult = Result<Bytes, Bytes>;

/// A position in the ledger journal.
///
/// Obtained from [`Ledger::checkpoint`] and consumed by [`Ledger::checkpoint_commit`] or
/// [`Ledger::checkpoint_revert`]. Checkpoints nest: reverting an outer checkpoint also discards
/// everything committed under inner ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerCheckpoint {
    /// Length of the journal when the checkpoint was taken.
    pub journal_len: usize,
    /// Number of logs emitted when the checkpoint was taken.
    pub logs_len: usize,
}

/// The execution environment invoked by the account and the factory.
#[auto_impl(&mut, Box)]
pub trait Ledger: Debug {
    /// The current block timestamp, in seconds.
    fn timestamp(&self) -> u64;

    /// The chain id mixed into operation hashes.
    fn chain_id(&self) -> u64;

    /// Returns the native balance of `address`.
    fn balance(&self, address: Address) -> U256;

    /// Moves `value` from `from` to `to`. Fails without side effects if `from` cannot cover it.
    fn transfer(&mut self, from: Address, to: Address, value: U256) -> Result<(), LedgerError>;

    /// Reads the record stored by `address` under `namespace`.
    fn load_record(&self, address: Address, namespace: B256) -> Option<Bytes>;

    /// Writes the record stored by `address` under `namespace`.
    fn store_record(&mut self, address: Address, namespace: B256, record: Bytes);

    /// Performs an external call from `caller` to `target` carrying `value`.
    ///
    /// A failed call leaves no state change behind, including the value transfer.
    fn call(&mut self, caller: Address, target: Address, value: U256, input: Bytes) -> CallResult;

    /// Appends an event log.
    fn emit(&mut self, log: Log);

    /// Opens a journal checkpoint.
    fn checkpoint(&mut self) -> LedgerCheckpoint;

    /// Keeps every change made since `checkpoint`.
    fn checkpoint_commit(&mut self, checkpoint: LedgerCheckpoint);

    /// Undoes every change made since `checkpoint`.
    fn checkpoint_revert(&mut self, checkpoint: LedgerCheckpoint);
}
