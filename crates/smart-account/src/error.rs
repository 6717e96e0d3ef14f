//! Error types for the smart account protocol.
//!
//! Only hard failures live here. A bad signature, a revoked or out-of-window session, or a
//! disallowed target is not an error: it is reported as a failed
//! [`ValidationData`](crate::ValidationData) so that callers can discard the operation without
//! aborting a batch.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolError;
use smart_account_abi::{IAccountFactory, ISmartAccount};

/// Errors raised by a [`Ledger`](crate::Ledger) implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The sender of a value transfer cannot cover it.
    #[error("insufficient balance for {address}: available {available}, required {required}")]
    InsufficientBalance {
        /// The account that was debited.
        address: Address,
        /// Its balance before the transfer.
        available: U256,
        /// The amount requested.
        required: U256,
    },
}

/// Errors raised while loading or storing the versioned account record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The stored blob is not a valid account record.
    #[error("malformed account record for {account}: {message}")]
    Malformed {
        /// The account owning the record.
        account: Address,
        /// The decoder message.
        message: String,
    },
    /// The stored record was written by a newer layout than this code understands.
    #[error("account record for {account} has version {version}, newest supported is {supported}")]
    UnsupportedVersion {
        /// The account owning the record.
        account: Address,
        /// The version found in storage.
        version: u32,
        /// The newest version this code can read.
        supported: u32,
    },
}

impl StorageError {
    /// The account whose record failed to load.
    pub const fn account(&self) -> Address {
        match self {
            Self::Malformed { account, .. } | Self::UnsupportedVersion { account, .. } => *account,
        }
    }
}

/// Hard failures of the smart account.
///
/// These abort the attempted call and must be surfaced to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    /// The caller failed the entry-point or owner capability check.
    #[error("caller {caller} is not authorized")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
    },
    /// The account has no deployed state.
    #[error("account {0} is not deployed")]
    NotDeployed(Address),
    /// The account cannot pay the prefund requested by the entry point.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// The missing funds requested by the caller.
        required: U256,
        /// The account balance.
        available: U256,
    },
    /// The operation nonce is not the current account nonce.
    #[error("invalid nonce: expected {expected}, provided {provided}")]
    InvalidNonce {
        /// The account nonce.
        expected: U256,
        /// The nonce carried by the operation.
        provided: U256,
    },
    /// `execute_batch` received arrays of different lengths.
    #[error("array length mismatch: {targets} targets, {values} values, {payloads} payloads")]
    ArrayLengthMismatch {
        /// Number of targets.
        targets: usize,
        /// Number of values.
        values: usize,
        /// Number of payloads.
        payloads: usize,
    },
    /// The requested session window is empty or already over.
    #[error("invalid session window [{valid_after}, {valid_until})")]
    InvalidSessionWindow {
        /// Requested start of the window.
        valid_after: u64,
        /// Requested end of the window.
        valid_until: u64,
    },
    /// The session key is the null identity.
    #[error("session key is the null identity")]
    InvalidSessionKey,
    /// No session with this id was issued by the account.
    #[error("session {0} not found")]
    SessionNotFound(B256),
    /// An external call made by the account reverted. `output` is the callee's revert data,
    /// unchanged.
    #[error("call{} reverted with {output}", .index.map(|i| format!(" #{i}")).unwrap_or_default())]
    CallReverted {
        /// Position of the failing call inside a batch, `None` for a single call.
        index: Option<usize>,
        /// The callee's revert data.
        output: Bytes,
    },
    /// The account record could not be read.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AccountError {
    /// Renders the error as revert data.
    ///
    /// Call reverts are re-raised verbatim; every other failure is ABI-encoded with the
    /// matching [`ISmartAccount`] error.
    pub fn revert_data(&self) -> Bytes {
        match self {
            Self::Unauthorized { caller } => {
                ISmartAccount::Unauthorized { caller: *caller }.abi_encode().into()
            }
            Self::NotDeployed(account) => {
                ISmartAccount::NotDeployed { account: *account }.abi_encode().into()
            }
            Self::InsufficientFunds { required, available } => {
                ISmartAccount::InsufficientFunds { required: *required, available: *available }
                    .abi_encode()
                    .into()
            }
            Self::InvalidNonce { expected, provided } => {
                ISmartAccount::InvalidNonce { expected: *expected, provided: *provided }
                    .abi_encode()
                    .into()
            }
            Self::ArrayLengthMismatch { targets, values, payloads } => {
                ISmartAccount::ArrayLengthMismatch {
                    targets: U256::from(*targets),
                    values: U256::from(*values),
                    payloads: U256::from(*payloads),
                }
                .abi_encode()
                .into()
            }
            Self::InvalidSessionWindow { valid_after, valid_until } => {
                ISmartAccount::InvalidSessionWindow {
                    validAfter: *valid_after,
                    validUntil: *valid_until,
                }
                .abi_encode()
                .into()
            }
            Self::InvalidSessionKey => ISmartAccount::InvalidSessionKey {}.abi_encode().into(),
            Self::SessionNotFound(session_id) => {
                ISmartAccount::SessionNotFound { sessionId: *session_id }.abi_encode().into()
            }
            Self::CallReverted { output, .. } => output.clone(),
            Self::Storage(err) => {
                ISmartAccount::CorruptState { account: err.account() }.abi_encode().into()
            }
        }
    }
}

/// Hard failures of the account factory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FactoryError {
    /// The owner is the null identity.
    #[error("owner is the null identity")]
    InvalidOwner,
    /// The record at the derived address could not be read.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl FactoryError {
    /// Renders the error as revert data using the [`IAccountFactory`] and [`ISmartAccount`]
    /// error types.
    pub fn revert_data(&self) -> Bytes {
        match self {
            Self::InvalidOwner => IAccountFactory::InvalidOwner {}.abi_encode().into(),
            Self::Storage(err) => {
                ISmartAccount::CorruptState { account: err.account() }.abi_encode().into()
            }
        }
    }
}

/// Hard failures of the reference entry-point driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// The account rejected the call with a hard failure (nonce, funding, authorization).
    #[error(transparent)]
    Account(#[from] AccountError),
    /// Lazy deployment failed.
    #[error(transparent)]
    Factory(#[from] FactoryError),
    /// The ledger runs on another chain than the handler is configured for.
    #[error("chain mismatch: configured {configured}, ledger {ledger}")]
    ChainMismatch {
        /// The configured chain id.
        configured: u64,
        /// The ledger's chain id.
        ledger: u64,
    },
    /// `initCode` does not start with a 20-byte factory address followed by a
    /// `createAccount` call.
    #[error("malformed init code")]
    MalformedInitCode,
    /// `initCode` names a factory other than the configured one.
    #[error("unknown factory {0}")]
    UnknownFactory(Address),
    /// The factory derived a different address than the operation sender.
    #[error("sender mismatch: operation sender {sender}, derived {derived}")]
    SenderMismatch {
        /// The operation sender.
        sender: Address,
        /// The address the factory derived from `initCode`.
        derived: Address,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_reverted_is_passed_through_verbatim() {
        let output = Bytes::from_static(&[0x08, 0xc3, 0x79, 0xa0, 0x01]);
        let err = AccountError::CallReverted { index: Some(2), output: output.clone() };
        assert_eq!(err.revert_data(), output);
    }

    #[test]
    fn test_unauthorized_decodes_as_sol_error() {
        let caller = Address::repeat_byte(0x11);
        let data = AccountError::Unauthorized { caller }.revert_data();
        let decoded = ISmartAccount::Unauthorized::abi_decode(&data, true).unwrap();
        assert_eq!(decoded.caller, caller);
    }

    #[test]
    fn test_storage_error_maps_to_corrupt_state() {
        let account = Address::repeat_byte(0x22);
        let err = AccountError::from(StorageError::Malformed {
            account,
            message: "eof".to_string(),
        });
        let decoded = ISmartAccount::CorruptState::abi_decode(&err.revert_data(), true).unwrap();
        assert_eq!(decoded.account, account);
    }

    #[test]
    fn test_display_includes_batch_index() {
        let err = AccountError::CallReverted { index: Some(1), output: Bytes::new() };
        assert_eq!(err.to_string(), "call #1 reverted with 0x");
    }
}
