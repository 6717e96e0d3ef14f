//! The versioned account state record.
//!
//! Every account keeps one record under [`ACCOUNT_STORAGE_NAMESPACE`]. Layout changes only
//! append fields: a record written by an older version decodes with the appended fields set to
//! their defaults and is rewritten in the current layout on the next store.

use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{
    constants::storage::{ACCOUNT_STORAGE_NAMESPACE, CURRENT_STATE_VERSION, STATE_VERSION_V1},
    Ledger, SessionKey, StorageError,
};

/// The persistent state of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    /// Layout version the record was written with.
    pub version: u32,
    /// The root authorizing identity.
    pub owner: Address,
    /// The replay-protection nonce. Never decreases.
    pub nonce: U256,
    /// Issued sessions by id. Appended in v2.
    #[serde(default)]
    pub sessions: BTreeMap<B256, SessionKey>,
    /// Number of sessions issued so far to each key. Appended in v2.
    #[serde(default)]
    pub session_issuance: BTreeMap<Address, u64>,
}

#[derive(Deserialize)]
struct RecordHeader {
    version: u32,
}

impl AccountRecord {
    /// A fresh record for a newly deployed account.
    pub const fn new(owner: Address) -> Self {
        Self {
            version: CURRENT_STATE_VERSION,
            owner,
            nonce: U256::ZERO,
            sessions: BTreeMap::new(),
            session_issuance: BTreeMap::new(),
        }
    }

    /// Decodes a stored record of `account`, migrating older layouts.
    pub fn decode(account: Address, bytes: &[u8]) -> Result<Self, StorageError> {
        let malformed = |err: serde_json::Error| StorageError::Malformed {
            account,
            message: err.to_string(),
        };

        let RecordHeader { version } = serde_json::from_slice(bytes).map_err(malformed)?;
        if version > CURRENT_STATE_VERSION {
            return Err(StorageError::UnsupportedVersion {
                account,
                version,
                supported: CURRENT_STATE_VERSION,
            });
        }
        if version < STATE_VERSION_V1 {
            return Err(StorageError::Malformed {
                account,
                message: format!("invalid record version {version}"),
            });
        }

        let mut record: Self = serde_json::from_slice(bytes).map_err(malformed)?;
        record.version = CURRENT_STATE_VERSION;
        Ok(record)
    }

    /// Encodes the record in the current layout.
    pub fn encode(&self) -> Bytes {
        let record = Self { version: CURRENT_STATE_VERSION, ..self.clone() };
        // Serializing plain maps and primitives cannot fail.
        serde_json::to_vec(&record).unwrap_or_default().into()
    }

    /// Loads the record of `account`. Returns `Ok(None)` if the account is not deployed.
    pub fn load<L: Ledger>(ledger: &L, account: Address) -> Result<Option<Self>, StorageError> {
        ledger
            .load_record(account, *ACCOUNT_STORAGE_NAMESPACE)
            .map(|bytes| Self::decode(account, &bytes))
            .transpose()
    }

    /// Stores the record of `account`.
    pub fn store<L: Ledger>(&self, ledger: &mut L, account: Address) {
        ledger.store_record(account, *ACCOUNT_STORAGE_NAMESPACE, self.encode());
    }
}
