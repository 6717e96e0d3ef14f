//! Constants for the smart account protocol.
//!
//! It groups the constants by the component that owns them.

/// Constants shared with the entry point calling contract.
pub mod entry_point {
    use alloy_primitives::{address, Address};

    /// The canonical ERC-4337 v0.7 entry point address, used as the default trusted caller.
    pub const ENTRY_POINT_V07_ADDRESS: Address =
        address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");

    /// Packed validation data value signalling a successful, unrestricted validation.
    pub const SIG_VALIDATION_SUCCESS: u8 = 0;

    /// Packed validation data value signalling a signature failure.
    pub const SIG_VALIDATION_FAILED: u8 = 1;

    /// Default number of seconds before `validUntil` inside which an operation is treated as
    /// unsafe to include.
    pub const DEFAULT_INCLUSION_MARGIN: u64 = 60;
}

/// Constants for the account state record.
pub mod storage {
    use alloy_primitives::{keccak256, B256};
    use once_cell::sync::Lazy;

    /// Label hashed into [`ACCOUNT_STORAGE_NAMESPACE`].
    pub const ACCOUNT_STORAGE_LABEL: &str = "smart.account.storage";

    /// The fixed logical namespace key under which every account stores its state record.
    pub static ACCOUNT_STORAGE_NAMESPACE: Lazy<B256> =
        Lazy::new(|| keccak256(ACCOUNT_STORAGE_LABEL.as_bytes()));

    /// Record layout holding `owner` and `nonce` only.
    pub const STATE_VERSION_V1: u32 = 1;

    /// Record layout that appends session keys and their issuance counters.
    pub const STATE_VERSION_V2: u32 = 2;

    /// The record layout written by this code.
    pub const CURRENT_STATE_VERSION: u32 = STATE_VERSION_V2;
}

/// Constants for deterministic account deployment.
pub mod factory {
    use alloy_primitives::{address, keccak256, Address, B256};
    use once_cell::sync::Lazy;

    /// The default factory address.
    pub const DEFAULT_FACTORY_ADDRESS: Address =
        address!("0x5a0a000000000000000000000000000000000001");

    /// Identity of the account implementation that the factory materializes. Any change to the
    /// account semantics must bump this label so that addresses never alias across versions.
    pub const SMART_ACCOUNT_CODE_LABEL: &str = "smart-account/v1";

    /// The code identity hash mixed into every derived account address.
    pub static SMART_ACCOUNT_CODE_HASH: Lazy<B256> =
        Lazy::new(|| keccak256(SMART_ACCOUNT_CODE_LABEL.as_bytes()));
}

/// Constants for the tagged signature encoding.
pub mod signature {
    /// Tag byte of a signature produced by the account owner.
    pub const OWNER_SIGNATURE_TAG: u8 = 0x00;

    /// Tag byte of a signature produced by a session key.
    pub const SESSION_SIGNATURE_TAG: u8 = 0x01;

    /// Length of a raw secp256k1 `r || s || v` signature.
    pub const ECDSA_SIGNATURE_LENGTH: usize = 65;

    /// Length of the session id carried by a session-key signature.
    pub const SESSION_ID_LENGTH: usize = 32;
}
