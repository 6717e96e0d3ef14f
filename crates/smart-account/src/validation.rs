//! The outcome of operation validation.
//!
//! Validation never throws for authorization problems. The account returns a
//! [`ValidationData`] whose `sig_failed` flag tells the caller to discard the operation, and
//! whose [`ValidityWindow`] tells the caller when the authorization may be included.

use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};

use crate::constants::entry_point::{SIG_VALIDATION_FAILED, SIG_VALIDATION_SUCCESS};

/// Largest value representable in the 6-byte window fields of the packed encoding.
const MAX_PACKED_TIMESTAMP: u64 = (1 << 48) - 1;

/// The `[valid_after, valid_until)` interval during which an authorization is accepted.
///
/// `valid_until == 0` means the window never closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityWindow {
    /// First accepted timestamp.
    pub valid_after: u64,
    /// First rejected timestamp, or `0` for no upper bound.
    pub valid_until: u64,
}

impl ValidityWindow {
    /// The window of an owner-signed operation.
    pub const UNBOUNDED: Self = Self { valid_after: 0, valid_until: 0 };

    /// Creates a window.
    pub const fn new(valid_after: u64, valid_until: u64) -> Self {
        Self { valid_after, valid_until }
    }

    /// Returns `true` if the window has no bounds.
    pub const fn is_unbounded(&self) -> bool {
        self.valid_after == 0 && self.valid_until == 0
    }

    /// Returns `true` if `now` lies inside the window.
    pub const fn contains(&self, now: u64) -> bool {
        now >= self.valid_after && (self.valid_until == 0 || now < self.valid_until)
    }

    /// Returns `true` if the window closes within `margin` seconds of `now`. Such a window is
    /// unsafe to include because inclusion may happen after it closes.
    pub const fn expires_within(&self, now: u64, margin: u64) -> bool {
        self.valid_until != 0 && now.saturating_add(margin) >= self.valid_until
    }
}

/// Who authorized an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum Authorizer {
    /// No identity was established (malformed signature, unknown session).
    #[display("none")]
    None,
    /// The account owner.
    #[display("owner")]
    Owner,
    /// The session key with the given id.
    #[display("session {_0}")]
    SessionKey(B256),
}

/// Result of `validate_user_op`. Produced by the account, consumed by the entry point, never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationData {
    /// `true` if the operation must be discarded.
    pub sig_failed: bool,
    /// When the authorization may be included.
    pub window: ValidityWindow,
    /// The identity that authorized, or tried to authorize, the operation.
    pub authorizer: Authorizer,
}

impl ValidationData {
    /// A successful validation.
    pub const fn success(window: ValidityWindow, authorizer: Authorizer) -> Self {
        Self { sig_failed: false, window, authorizer }
    }

    /// A failed validation.
    pub const fn failure(window: ValidityWindow, authorizer: Authorizer) -> Self {
        Self { sig_failed: true, window, authorizer }
    }

    /// Returns `true` if the operation passed validation.
    pub const fn is_success(&self) -> bool {
        !self.sig_failed
    }

    /// Packs into the ERC-4337 word `sigFailed | validUntil << 160 | validAfter << 208`.
    ///
    /// Timestamps beyond 48 bits saturate. The authorizer tag is not part of the packed form.
    pub fn pack(&self) -> U256 {
        let sig = if self.sig_failed { SIG_VALIDATION_FAILED } else { SIG_VALIDATION_SUCCESS };
        let sig = U256::from(sig);
        let until = U256::from(self.window.valid_until.min(MAX_PACKED_TIMESTAMP)) << 160;
        let after = U256::from(self.window.valid_after.min(MAX_PACKED_TIMESTAMP)) << 208;
        sig | until | after
    }

    /// Unpacks an ERC-4337 validation word. The authorizer is reported as [`Authorizer::None`].
    pub fn unpack(packed: U256) -> Self {
        let mask = U256::from(MAX_PACKED_TIMESTAMP);
        let authorizer_field = packed & ((U256::from(1) << 160) - U256::from(1));
        let valid_until = ((packed >> 160usize) & mask).to::<u64>();
        let valid_after = ((packed >> 208usize) & mask).to::<u64>();
        Self {
            sig_failed: authorizer_field == U256::from(SIG_VALIDATION_FAILED),
            window: ValidityWindow { valid_after, valid_until },
            authorizer: Authorizer::None,
        }
    }
}
