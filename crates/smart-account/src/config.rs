//! Configuration of the reference entry-point driver.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        entry_point::{DEFAULT_INCLUSION_MARGIN, ENTRY_POINT_V07_ADDRESS},
        factory::DEFAULT_FACTORY_ADDRESS,
    },
    AccountFactory,
};

/// Settings of an [`EntryPointHandler`](crate::EntryPointHandler).
///
/// Every field is optional in JSON and falls back to its [`Default`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HandlerConfig {
    /// Address the handler acts as when calling accounts.
    pub entry_point: Address,
    /// Chain id mixed into operation hashes. Must match the ledger.
    pub chain_id: u64,
    /// The only factory accepted in `initCode`.
    pub factory: Address,
    /// Overrides the account implementation identity used for address derivation.
    pub account_code_hash: Option<B256>,
    /// Windows closing within this many seconds of now are not included.
    pub inclusion_margin: u64,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            entry_point: ENTRY_POINT_V07_ADDRESS,
            chain_id: 1,
            factory: DEFAULT_FACTORY_ADDRESS,
            account_code_hash: None,
            inclusion_margin: DEFAULT_INCLUSION_MARGIN,
        }
    }
}

impl HandlerConfig {
    /// Parses a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets the chain id.
    pub const fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Sets the entry point address.
    pub const fn with_entry_point(mut self, entry_point: Address) -> Self {
        self.entry_point = entry_point;
        self
    }

    /// Sets the inclusion margin.
    pub const fn with_inclusion_margin(mut self, inclusion_margin: u64) -> Self {
        self.inclusion_margin = inclusion_margin;
        self
    }

    /// The factory described by this configuration.
    pub fn account_factory(&self) -> AccountFactory {
        match self.account_code_hash {
            Some(code_hash) => AccountFactory::with_code_hash(self.factory, code_hash),
            None => AccountFactory::new(self.factory),
        }
    }
}
