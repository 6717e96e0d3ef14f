//! Deterministic account deployment.
//!
//! An account address is a content-addressed function of `(factory, owner, salt, code)`:
//! `create2(factory, keccak256(abi.encode(owner, salt)), code_hash)`. Deployment writes the
//! initial [`AccountRecord`] at that address and is idempotent.

use alloy_primitives::{keccak256, Address, Log, B256, U256};
use alloy_sol_types::{SolEvent, SolValue};
use smart_account_abi::IAccountFactory;
use tracing::{debug, info};

use crate::{
    constants::factory::{DEFAULT_FACTORY_ADDRESS, SMART_ACCOUNT_CODE_HASH},
    AccountRecord, FactoryError, Ledger,
};

/// The account factory deployed at `address`, materializing accounts of `code_hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountFactory {
    address: Address,
    code_hash: B256,
}

impl Default for AccountFactory {
    fn default() -> Self {
        Self::new(DEFAULT_FACTORY_ADDRESS)
    }
}

impl AccountFactory {
    /// A factory at `address` for the current account implementation.
    pub fn new(address: Address) -> Self {
        Self { address, code_hash: *SMART_ACCOUNT_CODE_HASH }
    }

    /// A factory at `address` for the account implementation identified by `code_hash`.
    pub const fn with_code_hash(address: Address, code_hash: B256) -> Self {
        Self { address, code_hash }
    }

    /// The factory address.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// The identity of the account implementation.
    pub const fn code_hash(&self) -> B256 {
        self.code_hash
    }

    /// Derives the address of the account of `owner` with `salt`. Pure.
    pub fn compute_address(&self, owner: Address, salt: U256) -> Address {
        let salt = keccak256((owner, salt).abi_encode());
        self.address.create2(salt, self.code_hash)
    }

    /// Same as [`Self::compute_address`]; the name of the side-effect free factory surface.
    pub fn get_address(&self, owner: Address, salt: U256) -> Address {
        self.compute_address(owner, salt)
    }

    /// Deploys the account of `owner` with `salt` and returns its address.
    ///
    /// If the account already exists it is returned unchanged: its owner, nonce and sessions
    /// are not reinitialized and no event is emitted.
    pub fn create_account<L: Ledger>(
        &self,
        ledger: &mut L,
        owner: Address,
        salt: U256,
    ) -> Result<Address, FactoryError> {
        if owner.is_zero() {
            return Err(FactoryError::InvalidOwner);
        }

        let account = self.compute_address(owner, salt);
        if AccountRecord::load(ledger, account)?.is_some() {
            debug!(%account, %owner, "account already deployed");
            return Ok(account);
        }

        AccountRecord::new(owner).store(ledger, account);
        let event = IAccountFactory::AccountCreated { account, owner, salt };
        ledger.emit(Log { address: self.address, data: event.encode_log_data() });
        info!(%account, %owner, %salt, "account created");

        Ok(account)
    }
}
