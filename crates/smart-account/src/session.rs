//! Session keys: owner-issued, time-bounded delegate keys restricted to a target allow-list.
//!
//! Sessions live inside the account record and are looked up by id. They are never deleted:
//! an expired session is rejected by time comparison and a revoked one keeps `revoked = true`
//! forever.

use std::collections::BTreeSet;

use alloy_primitives::{keccak256, Address, Log, B256};
use alloy_sol_types::{SolEvent, SolValue};
use serde::{Deserialize, Serialize};
use smart_account_abi::ISmartAccount;

use crate::{AccountError, AccountRecord, CallPayload, ValidityWindow};

/// A delegate signing key issued by the account owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    /// The identity that signs with this session.
    pub key_address: Address,
    /// First accepted timestamp.
    pub valid_after: u64,
    /// First rejected timestamp. Always greater than `valid_after`.
    pub valid_until: u64,
    /// The only targets the key may call.
    pub allowed_targets: BTreeSet<Address>,
    /// Set once, never cleared.
    pub revoked: bool,
}

impl SessionKey {
    /// The `[valid_after, valid_until)` window of the session.
    pub const fn window(&self) -> ValidityWindow {
        ValidityWindow::new(self.valid_after, self.valid_until)
    }

    /// Returns `true` if the session may call `target`.
    pub fn allows(&self, target: &Address) -> bool {
        self.allowed_targets.contains(target)
    }
}

/// Why a session-key signature did not authorize an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SessionRejection {
    /// No session with this id exists.
    #[display("unknown session")]
    Unknown,
    /// The session was revoked.
    #[display("session revoked")]
    Revoked,
    /// The current time is outside the session window.
    #[display("outside session window")]
    OutsideWindow,
    /// The signature was not produced by the session key.
    #[display("signer is not the session key")]
    SignerMismatch,
    /// The operation calls nothing, or its call data does not decode.
    #[display("no callable payload")]
    NoPayload,
    /// A call in the payload targets the account itself. Management is owner only, whatever
    /// the allow-list says.
    #[display("session keys cannot call the account itself")]
    SelfCall,
    /// A call in the payload targets an address outside the allow-list.
    #[display("target {_0} not allowed")]
    TargetNotAllowed(Address),
}

/// Derives the id of the `issuance`-th session issued to `key` by `account`.
///
/// The issuance counter makes reissuing a session to the same key produce a fresh id.
pub fn derive_session_id(account: Address, key: Address, issuance: u64) -> B256 {
    keccak256((account, key, issuance).abi_encode())
}

/// Checks that a session-key signature authorizes `payload` of `account` at `now`.
///
/// `signer` is the identity recovered from the inner signature, or `None` if recovery failed.
/// Revocation is read from the record as it is now, never from an earlier snapshot.
pub fn authorize_session(
    account: Address,
    record: &AccountRecord,
    session_id: B256,
    signer: Option<Address>,
    payload: Option<&CallPayload>,
    now: u64,
) -> Result<ValidityWindow, SessionRejection> {
    let session = record.sessions.get(&session_id).ok_or(SessionRejection::Unknown)?;
    if session.revoked {
        return Err(SessionRejection::Revoked);
    }
    let window = session.window();
    if !window.contains(now) {
        return Err(SessionRejection::OutsideWindow);
    }
    if signer != Some(session.key_address) {
        return Err(SessionRejection::SignerMismatch);
    }

    let payload = match payload {
        Some(CallPayload::Empty) | None => return Err(SessionRejection::NoPayload),
        Some(payload) => payload,
    };
    // Every call of a batch is checked, not only the first one.
    if payload.targets().any(|target| target == account) {
        return Err(SessionRejection::SelfCall);
    }
    if let Some(target) = payload.targets().find(|target| !session.allows(target)) {
        return Err(SessionRejection::TargetNotAllowed(target));
    }

    Ok(window)
}

impl AccountRecord {
    /// Returns the session registered under `session_id`.
    pub fn session(&self, session_id: &B256) -> Option<&SessionKey> {
        self.sessions.get(session_id)
    }

    /// Registers a new session for `key` and returns its id.
    ///
    /// Requires a non-null key and a non-empty window that has not ended at `now`.
    pub fn issue_session(
        &mut self,
        account: Address,
        key: Address,
        window: ValidityWindow,
        allowed_targets: impl IntoIterator<Item = Address>,
        now: u64,
    ) -> Result<B256, AccountError> {
        if key.is_zero() {
            return Err(AccountError::InvalidSessionKey);
        }
        let ValidityWindow { valid_after, valid_until } = window;
        if valid_until <= valid_after || valid_until <= now {
            return Err(AccountError::InvalidSessionWindow { valid_after, valid_until });
        }

        let issuance = self.session_issuance.entry(key).or_default();
        let session_id = derive_session_id(account, key, *issuance);
        *issuance += 1;

        self.sessions.insert(
            session_id,
            SessionKey {
                key_address: key,
                valid_after,
                valid_until,
                allowed_targets: allowed_targets.into_iter().collect(),
                revoked: false,
            },
        );
        Ok(session_id)
    }

    /// Revokes a session. Returns `false` if it was already revoked.
    pub fn revoke_session(&mut self, session_id: B256) -> Result<bool, AccountError> {
        let session =
            self.sessions.get_mut(&session_id).ok_or(AccountError::SessionNotFound(session_id))?;
        Ok(!core::mem::replace(&mut session.revoked, true))
    }
}

/// The `SessionCreated` log emitted by `account`.
pub(crate) fn session_created_log(account: Address, session_id: B256, session: &SessionKey) -> Log {
    let event = ISmartAccount::SessionCreated {
        sessionId: session_id,
        key: session.key_address,
        validAfter: session.valid_after,
        validUntil: session.valid_until,
    };
    Log { address: account, data: event.encode_log_data() }
}

/// The `SessionRevoked` log emitted by `account`.
pub(crate) fn session_revoked_log(account: Address, session_id: B256) -> Log {
    let event = ISmartAccount::SessionRevoked { sessionId: session_id };
    Log { address: account, data: event.encode_log_data() }
}
