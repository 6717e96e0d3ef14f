//! The smart account state machine.
//!
//! A [`SmartAccount`] is a stateless handle: an address, the trusted entry point and a
//! signature verifier. All state lives in the [`AccountRecord`] stored on the [`Ledger`], and is
//! loaded fresh on every call.
//!
//! Authorization is composed from two capability checks instead of an inheritance chain:
//! [`SmartAccount::is_entry_point`] guards validation and execution, and
//! [`SmartAccount::is_owner`] guards session management.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolInterface};
use smart_account_abi::ISmartAccount::{self, ISmartAccountCalls};
use tracing::{debug, info, trace, warn};

use crate::{
    constants::storage::ACCOUNT_STORAGE_NAMESPACE,
    session::{authorize_session, session_created_log, session_revoked_log},
    AccountError, AccountRecord, AccountSignature, Authorizer, CallPayload, EcdsaVerifier, Ledger,
    SessionKey, SignatureVerifier, UserOperation, ValidationData, ValidityWindow,
};

/// A handle on the account deployed at `address`.
#[derive(Debug, Clone)]
pub struct SmartAccount<V = EcdsaVerifier> {
    address: Address,
    entry_point: Address,
    verifier: V,
}

impl SmartAccount {
    /// Creates a handle using raw secp256k1 recovery.
    pub const fn new(address: Address, entry_point: Address) -> Self {
        Self { address, entry_point, verifier: EcdsaVerifier }
    }
}

impl<V: SignatureVerifier> SmartAccount<V> {
    /// Creates a handle using `verifier` to recover signers.
    pub const fn with_verifier(address: Address, entry_point: Address, verifier: V) -> Self {
        Self { address, entry_point, verifier }
    }

    /// The account address.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// The only caller allowed to validate and execute.
    pub const fn entry_point(&self) -> Address {
        self.entry_point
    }

    /// The signature verifier.
    pub const fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Returns `true` if `caller` is the trusted entry point.
    pub fn is_entry_point(&self, caller: Address) -> bool {
        caller == self.entry_point
    }

    /// Returns `true` if `caller` may manage the account: the owner itself, or the account
    /// calling itself from an executed operation.
    pub fn is_owner(&self, record: &AccountRecord, caller: Address) -> bool {
        caller == record.owner || caller == self.address
    }

    /// Returns `true` if the account has deployed state.
    pub fn is_deployed<L: Ledger>(&self, ledger: &L) -> bool {
        ledger.load_record(self.address, *ACCOUNT_STORAGE_NAMESPACE).is_some()
    }

    /// Loads the account record.
    pub fn record<L: Ledger>(&self, ledger: &L) -> Result<AccountRecord, AccountError> {
        AccountRecord::load(ledger, self.address)?.ok_or(AccountError::NotDeployed(self.address))
    }

    /// The root authorizing identity.
    pub fn owner<L: Ledger>(&self, ledger: &L) -> Result<Address, AccountError> {
        Ok(self.record(ledger)?.owner)
    }

    /// The nonce the next operation must carry.
    pub fn nonce<L: Ledger>(&self, ledger: &L) -> Result<U256, AccountError> {
        Ok(self.record(ledger)?.nonce)
    }

    /// The session registered under `session_id`.
    pub fn session<L: Ledger>(
        &self,
        ledger: &L,
        session_id: B256,
    ) -> Result<Option<SessionKey>, AccountError> {
        Ok(self.record(ledger)?.session(&session_id).cloned())
    }

    fn require_entry_point(&self, caller: Address) -> Result<(), AccountError> {
        if self.is_entry_point(caller) {
            Ok(())
        } else {
            debug!(account = %self.address, %caller, "caller is not the entry point");
            Err(AccountError::Unauthorized { caller })
        }
    }

    fn require_owner(&self, record: &AccountRecord, caller: Address) -> Result<(), AccountError> {
        if self.is_owner(record, caller) {
            Ok(())
        } else {
            debug!(account = %self.address, %caller, "caller is not the owner");
            Err(AccountError::Unauthorized { caller })
        }
    }

    /// Validates `op` on behalf of the entry point and pays `missing_funds` to it.
    ///
    /// A signature that does not authorize the operation is reported through
    /// [`ValidationData::sig_failed`] and leaves the account untouched. On success the prefund
    /// is transferred to `caller` and the nonce is incremented by one.
    ///
    /// # Errors
    ///
    /// - [`AccountError::Unauthorized`] if `caller` is not the entry point.
    /// - [`AccountError::NotDeployed`] if the account has no state.
    /// - [`AccountError::InvalidNonce`] if `op.nonce` is not the current nonce.
    /// - [`AccountError::InsufficientFunds`] if the account cannot cover `missing_funds`.
    pub fn validate_user_op<L: Ledger>(
        &self,
        ledger: &mut L,
        caller: Address,
        op: &UserOperation,
        op_hash: B256,
        missing_funds: U256,
    ) -> Result<ValidationData, AccountError> {
        self.require_entry_point(caller)?;
        let mut record = self.record(ledger)?;

        if op.nonce != record.nonce {
            debug!(
                account = %self.address,
                expected = %record.nonce,
                provided = %op.nonce,
                "nonce mismatch"
            );
            return Err(AccountError::InvalidNonce { expected: record.nonce, provided: op.nonce });
        }

        let validation = self.check_signature(&record, op, op_hash, ledger.timestamp());
        if !validation.is_success() {
            return Ok(validation);
        }

        if !missing_funds.is_zero() {
            let available = ledger.balance(self.address);
            if available < missing_funds {
                warn!(
                    account = %self.address,
                    %available,
                    required = %missing_funds,
                    "cannot pay prefund"
                );
                return Err(AccountError::InsufficientFunds { required: missing_funds, available });
            }
            ledger.transfer(self.address, caller, missing_funds).map_err(|_| {
                AccountError::InsufficientFunds { required: missing_funds, available }
            })?;
        }

        record.nonce += U256::from(1);
        record.store(ledger, self.address);
        trace!(
            account = %self.address,
            nonce = %record.nonce,
            authorizer = %validation.authorizer,
            "operation validated"
        );

        Ok(validation)
    }

    /// Decides whether the signature of `op` authorizes it at `now`.
    fn check_signature(
        &self,
        record: &AccountRecord,
        op: &UserOperation,
        op_hash: B256,
        now: u64,
    ) -> ValidationData {
        let Some(signature) = AccountSignature::decode(&op.signature) else {
            debug!(account = %self.address, "undecodable signature");
            return ValidationData::failure(ValidityWindow::UNBOUNDED, Authorizer::None);
        };

        match signature {
            AccountSignature::Owner(signature) => {
                match self.verifier.recover_signer(op_hash, &signature) {
                    Ok(signer) if signer == record.owner => {
                        ValidationData::success(ValidityWindow::UNBOUNDED, Authorizer::Owner)
                    }
                    Ok(signer) => {
                        debug!(
                            account = %self.address,
                            %signer,
                            "owner signature from another identity"
                        );
                        ValidationData::failure(ValidityWindow::UNBOUNDED, Authorizer::Owner)
                    }
                    Err(err) => {
                        debug!(account = %self.address, %err, "owner signature did not recover");
                        ValidationData::failure(ValidityWindow::UNBOUNDED, Authorizer::Owner)
                    }
                }
            }
            AccountSignature::SessionKey { session_id, signature } => {
                let authorizer = Authorizer::SessionKey(session_id);
                let signer = self.verifier.recover_signer(op_hash, &signature).ok();
                let payload = CallPayload::decode(&op.call_data).ok();
                let payload = payload.as_ref();
                match authorize_session(self.address, record, session_id, signer, payload, now) {
                    Ok(window) => ValidationData::success(window, authorizer),
                    Err(reason) => {
                        debug!(account = %self.address, %session_id, %reason, "session rejected");
                        let window = record
                            .session(&session_id)
                            .map_or(ValidityWindow::UNBOUNDED, SessionKey::window);
                        ValidationData::failure(window, authorizer)
                    }
                }
            }
        }
    }

    /// Performs one call from the account on behalf of the entry point.
    ///
    /// A failing callee's revert data is returned unchanged in [`AccountError::CallReverted`].
    pub fn execute<L: Ledger>(
        &self,
        ledger: &mut L,
        caller: Address,
        target: Address,
        value: U256,
        data: Bytes,
    ) -> Result<Bytes, AccountError> {
        self.require_entry_point(caller)?;
        self.record(ledger)?;
        self.dispatch(ledger, target, value, data)
            .map_err(|output| AccountError::CallReverted { index: None, output })
    }

    /// Performs the calls in order. If any call fails, every effect of the batch is undone.
    pub fn execute_batch<L: Ledger>(
        &self,
        ledger: &mut L,
        caller: Address,
        targets: &[Address],
        values: &[U256],
        payloads: &[Bytes],
    ) -> Result<Vec<Bytes>, AccountError> {
        self.require_entry_point(caller)?;
        if targets.len() != values.len() || targets.len() != payloads.len() {
            return Err(AccountError::ArrayLengthMismatch {
                targets: targets.len(),
                values: values.len(),
                payloads: payloads.len(),
            });
        }
        self.record(ledger)?;

        let checkpoint = ledger.checkpoint();
        let mut outputs = Vec::with_capacity(targets.len());
        let calls = targets.iter().zip(values).zip(payloads);
        for (index, ((target, value), data)) in calls.enumerate() {
            match self.dispatch(ledger, *target, *value, data.clone()) {
                Ok(output) => outputs.push(output),
                Err(output) => {
                    ledger.checkpoint_revert(checkpoint);
                    debug!(account = %self.address, index, "batch call reverted");
                    return Err(AccountError::CallReverted { index: Some(index), output });
                }
            }
        }
        ledger.checkpoint_commit(checkpoint);

        Ok(outputs)
    }

    /// Executes a decoded operation payload.
    pub fn execute_payload<L: Ledger>(
        &self,
        ledger: &mut L,
        caller: Address,
        payload: &CallPayload,
    ) -> Result<Vec<Bytes>, AccountError> {
        match payload {
            CallPayload::Empty => {
                self.require_entry_point(caller)?;
                Ok(Vec::new())
            }
            CallPayload::Single(call) => self
                .execute(ledger, caller, call.target, call.value, call.data.clone())
                .map(|output| vec![output]),
            CallPayload::Batch(calls) => {
                let targets: Vec<_> = calls.iter().map(|call| call.target).collect();
                let values: Vec<_> = calls.iter().map(|call| call.value).collect();
                let payloads: Vec<_> = calls.iter().map(|call| call.data.clone()).collect();
                self.execute_batch(ledger, caller, &targets, &values, &payloads)
            }
        }
    }

    /// Routes a call made by the account. A call to the account itself runs the account's own
    /// management surface with the account as caller.
    fn dispatch<L: Ledger>(
        &self,
        ledger: &mut L,
        target: Address,
        value: U256,
        data: Bytes,
    ) -> Result<Bytes, Bytes> {
        trace!(account = %self.address, %target, %value, "dispatching call");
        if target == self.address {
            return self.self_call(ledger, &data);
        }
        ledger.call(self.address, target, value, data)
    }

    fn self_call<L: Ledger>(&self, ledger: &mut L, data: &[u8]) -> Result<Bytes, Bytes> {
        if data.is_empty() {
            return Ok(Bytes::new());
        }
        let call = ISmartAccountCalls::abi_decode(data, true).map_err(|_| Bytes::new())?;
        let caller = self.address;
        let result = match call {
            ISmartAccountCalls::createSession(call) => self
                .create_session(
                    ledger,
                    caller,
                    call.key,
                    call.validAfter,
                    call.validUntil,
                    call.allowedTargets,
                )
                .map(|session_id| {
                    ISmartAccount::createSessionCall::abi_encode_returns(&(session_id,)).into()
                }),
            ISmartAccountCalls::revokeSession(call) => {
                self.revoke_session(ledger, caller, call.sessionId).map(|()| Bytes::new())
            }
            ISmartAccountCalls::getNonce(_) => self.nonce(ledger).map(|nonce| {
                ISmartAccount::getNonceCall::abi_encode_returns(&(nonce,)).into()
            }),
            ISmartAccountCalls::owner(_) => self
                .owner(ledger)
                .map(|owner| ISmartAccount::ownerCall::abi_encode_returns(&(owner,)).into()),
            // Validation and execution are reserved to the entry point.
            _ => Err(AccountError::Unauthorized { caller }),
        };
        result.map_err(|err| err.revert_data())
    }

    /// Issues a session key restricted to `allowed_targets` during
    /// `[valid_after, valid_until)`. Owner only.
    ///
    /// # Errors
    ///
    /// - [`AccountError::Unauthorized`] if `caller` is neither the owner nor the account.
    /// - [`AccountError::InvalidSessionKey`] if `key` is the null identity.
    /// - [`AccountError::InvalidSessionWindow`] if the window is empty or already over.
    pub fn create_session<L: Ledger>(
        &self,
        ledger: &mut L,
        caller: Address,
        key: Address,
        valid_after: u64,
        valid_until: u64,
        allowed_targets: impl IntoIterator<Item = Address>,
    ) -> Result<B256, AccountError> {
        let mut record = self.record(ledger)?;
        self.require_owner(&record, caller)?;

        let window = ValidityWindow::new(valid_after, valid_until);
        let session_id =
            record.issue_session(self.address, key, window, allowed_targets, ledger.timestamp())?;
        let log = record
            .session(&session_id)
            .map(|session| session_created_log(self.address, session_id, session));

        record.store(ledger, self.address);
        if let Some(log) = log {
            ledger.emit(log);
        }
        info!(
            account = %self.address,
            %session_id,
            %key,
            valid_after,
            valid_until,
            "session created"
        );

        Ok(session_id)
    }

    /// Revokes a session permanently. Owner only. Revoking twice is a no-op.
    ///
    /// # Errors
    ///
    /// - [`AccountError::Unauthorized`] if `caller` is neither the owner nor the account.
    /// - [`AccountError::SessionNotFound`] if no such session was issued.
    pub fn revoke_session<L: Ledger>(
        &self,
        ledger: &mut L,
        caller: Address,
        session_id: B256,
    ) -> Result<(), AccountError> {
        let mut record = self.record(ledger)?;
        self.require_owner(&record, caller)?;

        if record.revoke_session(session_id)? {
            record.store(ledger, self.address);
            ledger.emit(session_revoked_log(self.address, session_id));
            info!(account = %self.address, %session_id, "session revoked");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::entry_point::ENTRY_POINT_V07_ADDRESS,
        test_utils::{CounterContract, TestSigner},
        Call, InMemoryLedger,
    };
    use alloy_primitives::address;

    const ACCOUNT: Address = address!("0x00000000000000000000000000000000000000ac");
    const COUNTER: Address = address!("0x00000000000000000000000000000000000000c0");

    fn setup() -> (InMemoryLedger, SmartAccount, TestSigner) {
        let owner = TestSigner::from_seed(7);
        let mut ledger = InMemoryLedger::default()
            .with_timestamp(1_000)
            .with_contract(COUNTER, CounterContract);
        AccountRecord::new(owner.address()).store(&mut ledger, ACCOUNT);
        (ledger, SmartAccount::new(ACCOUNT, ENTRY_POINT_V07_ADDRESS), owner)
    }

    fn owner_op(signer: &TestSigner, nonce: u64) -> (UserOperation, B256) {
        let mut op = UserOperation {
            sender: ACCOUNT,
            nonce: U256::from(nonce),
            call_data: CallPayload::Single(Call::new(COUNTER, U256::ZERO, Bytes::new())).encode(),
            ..Default::default()
        };
        let hash = op.hash(ENTRY_POINT_V07_ADDRESS, 1);
        op.signature = AccountSignature::Owner(signer.sign_bytes(hash)).encode();
        (op, hash)
    }

    #[test]
    fn test_owner_signature_succeeds_unbounded() {
        let (mut ledger, account, owner) = setup();
        let (op, hash) = owner_op(&owner, 0);

        let validation = account
            .validate_user_op(&mut ledger, ENTRY_POINT_V07_ADDRESS, &op, hash, U256::ZERO)
            .unwrap();
        assert!(validation.is_success());
        assert_eq!(validation.window, ValidityWindow::UNBOUNDED);
        assert_eq!(validation.authorizer, Authorizer::Owner);
        assert_eq!(account.nonce(&ledger).unwrap(), U256::from(1));
    }

    #[test]
    fn test_failed_validation_leaves_no_trace() {
        let (mut ledger, account, _) = setup();
        let (op, hash) = owner_op(&TestSigner::from_seed(8), 0);
        ledger.set_balance(ACCOUNT, U256::from(100));
        let journal = ledger.journal_len();

        let validation = account
            .validate_user_op(&mut ledger, ENTRY_POINT_V07_ADDRESS, &op, hash, U256::from(10))
            .unwrap();
        assert!(validation.sig_failed);
        assert_eq!(ledger.journal_len(), journal);
        assert_eq!(ledger.balance(ACCOUNT), U256::from(100));
        assert_eq!(account.nonce(&ledger).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_only_entry_point_may_validate_and_execute() {
        let (mut ledger, account, owner) = setup();
        let (op, hash) = owner_op(&owner, 0);
        let intruder = owner.address();

        assert_eq!(
            account.validate_user_op(&mut ledger, intruder, &op, hash, U256::ZERO),
            Err(AccountError::Unauthorized { caller: intruder })
        );
        assert_eq!(
            account.execute(&mut ledger, intruder, COUNTER, U256::ZERO, Bytes::new()),
            Err(AccountError::Unauthorized { caller: intruder })
        );
        assert_eq!(
            account.execute_batch(&mut ledger, intruder, &[], &[], &[]),
            Err(AccountError::Unauthorized { caller: intruder })
        );
    }

    #[test]
    fn test_prefund_is_paid_to_entry_point() {
        let (mut ledger, account, owner) = setup();
        ledger.set_balance(ACCOUNT, U256::from(50));
        let (op, hash) = owner_op(&owner, 0);

        account
            .validate_user_op(&mut ledger, ENTRY_POINT_V07_ADDRESS, &op, hash, U256::from(20))
            .unwrap();
        assert_eq!(ledger.balance(ACCOUNT), U256::from(30));
        assert_eq!(ledger.balance(ENTRY_POINT_V07_ADDRESS), U256::from(20));
    }

    #[test]
    fn test_unpaid_prefund_is_a_hard_failure() {
        let (mut ledger, account, owner) = setup();
        ledger.set_balance(ACCOUNT, U256::from(5));
        let (op, hash) = owner_op(&owner, 0);

        assert_eq!(
            account.validate_user_op(
                &mut ledger,
                ENTRY_POINT_V07_ADDRESS,
                &op,
                hash,
                U256::from(6)
            ),
            Err(AccountError::InsufficientFunds {
                required: U256::from(6),
                available: U256::from(5)
            })
        );
        assert_eq!(account.nonce(&ledger).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_wrong_nonce_is_rejected() {
        let (mut ledger, account, owner) = setup();
        let (op, hash) = owner_op(&owner, 1);
        assert_eq!(
            account.validate_user_op(&mut ledger, ENTRY_POINT_V07_ADDRESS, &op, hash, U256::ZERO),
            Err(AccountError::InvalidNonce { expected: U256::ZERO, provided: U256::from(1) })
        );
    }

    #[test]
    fn test_undeployed_account() {
        let ledger = InMemoryLedger::default();
        let account = SmartAccount::new(ACCOUNT, ENTRY_POINT_V07_ADDRESS);
        assert!(!account.is_deployed(&ledger));
        assert_eq!(account.nonce(&ledger), Err(AccountError::NotDeployed(ACCOUNT)));
    }

    #[test]
    fn test_session_management_requires_owner_or_self() {
        let (mut ledger, account, owner) = setup();
        let key = TestSigner::from_seed(9).address();
        let stranger = Address::repeat_byte(0x55);

        assert_eq!(
            account.create_session(&mut ledger, stranger, key, 1_000, 2_000, [COUNTER]),
            Err(AccountError::Unauthorized { caller: stranger })
        );
        let id = account
            .create_session(&mut ledger, owner.address(), key, 1_000, 2_000, [COUNTER])
            .unwrap();
        let self_issued =
            account.create_session(&mut ledger, ACCOUNT, key, 1_000, 2_000, [COUNTER]).unwrap();
        assert_ne!(id, self_issued);

        assert_eq!(
            account.revoke_session(&mut ledger, stranger, id),
            Err(AccountError::Unauthorized { caller: stranger })
        );
        account.revoke_session(&mut ledger, owner.address(), id).unwrap();
        account.revoke_session(&mut ledger, owner.address(), id).unwrap();
        assert!(account.session(&ledger, id).unwrap().unwrap().revoked);

        // created, created, revoked once
        assert_eq!(ledger.logs().len(), 3);
    }

    #[test]
    fn test_self_call_manages_sessions() {
        let (mut ledger, account, _) = setup();
        let key = TestSigner::from_seed(10).address();
        let call = ISmartAccount::createSessionCall {
            key,
            validAfter: 0,
            validUntil: 5_000,
            allowedTargets: vec![COUNTER],
        };

        let output = account
            .execute(
                &mut ledger,
                ENTRY_POINT_V07_ADDRESS,
                ACCOUNT,
                U256::ZERO,
                call.abi_encode().into(),
            )
            .unwrap();
        let session_id = ISmartAccount::createSessionCall::abi_decode_returns(&output, true)
            .unwrap()
            .sessionId;
        assert_eq!(account.session(&ledger, session_id).unwrap().unwrap().key_address, key);

        let forbidden = ISmartAccount::executeCall {
            dest: COUNTER,
            value: U256::ZERO,
            func: Bytes::new(),
        };
        let err = account
            .execute(
                &mut ledger,
                ENTRY_POINT_V07_ADDRESS,
                ACCOUNT,
                U256::ZERO,
                forbidden.abi_encode().into(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            AccountError::CallReverted {
                index: None,
                output: AccountError::Unauthorized { caller: ACCOUNT }.revert_data()
            }
        );
    }
}
