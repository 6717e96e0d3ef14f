//! A minimal entry-point driver.
//!
//! [`EntryPointHandler`] honours the calling contract between the entry point and the account:
//! hash the operation, deploy the sender on first use, validate as the entry point, refuse to
//! include failed or soon-expiring authorizations, then execute. It does no gas accounting and
//! knows nothing about paymasters or bundling.

use alloy_primitives::{Address, Bytes, B256, U256};
use tracing::{debug, info, trace};

use crate::{
    AccountError, AccountFactory, AccountRecord, CallPayload, DeploymentPayload, EcdsaVerifier,
    HandlerConfig, HandlerError, Ledger, SignatureVerifier, SmartAccount, UserOperation,
    ValidationData,
};

/// Why an operation was discarded before execution. A rejected operation leaves no state
/// change behind.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum RejectReason {
    /// The call data is neither empty, `execute` nor `executeBatch`.
    #[display("malformed call data: {_0}")]
    MalformedCallData(String),
    /// The signature does not authorize the operation.
    #[display("signature validation failed")]
    SignatureFailed,
    /// The authorization window has not opened yet.
    #[display("not valid before {_0}")]
    NotYetValid(u64),
    /// The authorization window has closed.
    #[display("expired at {_0}")]
    Expired(u64),
    /// The authorization window closes within the inclusion margin.
    #[display("expires too soon, at {_0}")]
    ExpiresSoon(u64),
}

/// What happened to an operation that passed the hard checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpStatus {
    /// Validated and executed. One output per executed call.
    Executed(Vec<Bytes>),
    /// Validated, then execution reverted. The nonce and prefund stay consumed.
    ExecutionReverted {
        /// Position of the failing call in a batch.
        index: Option<usize>,
        /// The revert data, unchanged.
        output: Bytes,
    },
    /// Discarded without any state change.
    Rejected(RejectReason),
}

/// The outcome of [`EntryPointHandler::handle_op`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpOutcome {
    /// The canonical operation hash.
    pub op_hash: B256,
    /// The account's validation result, if validation ran.
    pub validation: Option<ValidationData>,
    /// What happened.
    pub status: OpStatus,
}

impl OpOutcome {
    /// Returns `true` if the operation executed without revert.
    pub const fn is_executed(&self) -> bool {
        matches!(self.status, OpStatus::Executed(_))
    }

    /// Returns `true` if the operation was discarded.
    pub const fn is_rejected(&self) -> bool {
        matches!(self.status, OpStatus::Rejected(_))
    }
}

/// Drives operations through deployment, validation and execution.
#[derive(Debug, Clone)]
pub struct EntryPointHandler<V = EcdsaVerifier> {
    config: HandlerConfig,
    factory: AccountFactory,
    verifier: V,
}

impl EntryPointHandler {
    /// A handler verifying signatures with raw secp256k1 recovery.
    pub fn new(config: HandlerConfig) -> Self {
        Self::with_verifier(config, EcdsaVerifier)
    }
}

impl<V: SignatureVerifier> EntryPointHandler<V> {
    /// A handler verifying signatures with `verifier`.
    pub fn with_verifier(config: HandlerConfig, verifier: V) -> Self {
        Self { factory: config.account_factory(), config, verifier }
    }

    /// The handler configuration.
    pub const fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// The factory used for lazy deployment.
    pub const fn factory(&self) -> &AccountFactory {
        &self.factory
    }

    /// A handle on the account at `address`, called through this entry point.
    pub fn account(&self, address: Address) -> SmartAccount<&V> {
        SmartAccount::with_verifier(address, self.config.entry_point, &self.verifier)
    }

    /// The canonical hash of `op` for this entry point and chain.
    pub fn op_hash(&self, op: &UserOperation) -> B256 {
        op.hash(self.config.entry_point, self.config.chain_id)
    }

    /// The nonce the next operation of `account` must carry.
    pub fn get_nonce<L: Ledger>(&self, ledger: &L, account: Address) -> Result<U256, AccountError> {
        self.account(account).nonce(ledger)
    }

    /// Deploys (if requested), validates and executes `op`.
    ///
    /// Hard failures (wrong chain, bad `initCode`, wrong nonce, unpaid prefund, corrupt state)
    /// are returned as errors and leave no state change. Everything else is described by the
    /// returned [`OpOutcome`].
    pub fn handle_op<L: Ledger>(
        &self,
        ledger: &mut L,
        op: &UserOperation,
        missing_funds: U256,
    ) -> Result<OpOutcome, HandlerError> {
        self.check_chain(ledger)?;
        let op_hash = self.op_hash(op);

        let payload = match CallPayload::decode(&op.call_data) {
            Ok(payload) => payload,
            Err(err) => {
                debug!(sender = %op.sender, %op_hash, %err, "rejecting undecodable call data");
                let reason = RejectReason::MalformedCallData(err.to_string());
                let status = OpStatus::Rejected(reason);
                return Ok(OpOutcome { op_hash, validation: None, status });
            }
        };

        let checkpoint = ledger.checkpoint();
        let validation = match self.deploy_and_validate(ledger, op, op_hash, missing_funds) {
            Ok(validation) => validation,
            Err(err) => {
                ledger.checkpoint_revert(checkpoint);
                return Err(err);
            }
        };
        if let Some(reason) = self.inclusion_check(&validation, ledger.timestamp()) {
            ledger.checkpoint_revert(checkpoint);
            debug!(sender = %op.sender, %op_hash, %reason, "operation rejected");
            return Ok(OpOutcome {
                op_hash,
                validation: Some(validation),
                status: OpStatus::Rejected(reason),
            });
        }
        ledger.checkpoint_commit(checkpoint);

        let account = self.account(op.sender);
        let status = match account.execute_payload(ledger, self.config.entry_point, &payload) {
            Ok(outputs) => OpStatus::Executed(outputs),
            Err(AccountError::CallReverted { index, output }) => {
                OpStatus::ExecutionReverted { index, output }
            }
            Err(err) => OpStatus::ExecutionReverted { index: None, output: err.revert_data() },
        };
        let executed = matches!(status, OpStatus::Executed(_));
        info!(sender = %op.sender, %op_hash, executed, "operation handled");

        Ok(OpOutcome { op_hash, validation: Some(validation), status })
    }

    /// Handles each `(operation, missing_funds)` pair in order. A failing operation does not
    /// affect the others.
    pub fn handle_ops<'a, L: Ledger>(
        &self,
        ledger: &mut L,
        ops: impl IntoIterator<Item = (&'a UserOperation, U256)>,
    ) -> Vec<Result<OpOutcome, HandlerError>> {
        let mut results = Vec::new();
        for (index, (op, missing_funds)) in ops.into_iter().enumerate() {
            let result = self.handle_op(&mut *ledger, op, missing_funds);
            if let Err(err) = &result {
                debug!(index, sender = %op.sender, %err, "operation failed");
            }
            results.push(result);
        }
        results
    }

    /// Runs deployment and validation of `op`, then undoes them. Returns the validation result
    /// the operation would get now.
    pub fn simulate_validation<L: Ledger>(
        &self,
        ledger: &mut L,
        op: &UserOperation,
        missing_funds: U256,
    ) -> Result<ValidationData, HandlerError> {
        self.check_chain(ledger)?;
        let op_hash = self.op_hash(op);
        let checkpoint = ledger.checkpoint();
        let result = self.deploy_and_validate(ledger, op, op_hash, missing_funds);
        ledger.checkpoint_revert(checkpoint);
        trace!(sender = %op.sender, %op_hash, ok = result.is_ok(), "validation simulated");
        result
    }

    fn check_chain<L: Ledger>(&self, ledger: &L) -> Result<(), HandlerError> {
        let ledger_chain = ledger.chain_id();
        if ledger_chain == self.config.chain_id {
            Ok(())
        } else {
            Err(HandlerError::ChainMismatch {
                configured: self.config.chain_id,
                ledger: ledger_chain,
            })
        }
    }

    fn deploy_and_validate<L: Ledger>(
        &self,
        ledger: &mut L,
        op: &UserOperation,
        op_hash: B256,
        missing_funds: U256,
    ) -> Result<ValidationData, HandlerError> {
        self.deploy_if_requested(ledger, op)?;
        let validation = self.account(op.sender).validate_user_op(
            ledger,
            self.config.entry_point,
            op,
            op_hash,
            missing_funds,
        )?;
        Ok(validation)
    }

    /// Deploys the sender from `initCode`. An already deployed sender ignores `initCode`.
    fn deploy_if_requested<L: Ledger>(
        &self,
        ledger: &mut L,
        op: &UserOperation,
    ) -> Result<(), HandlerError> {
        if op.init_code.is_empty() {
            return Ok(());
        }
        if AccountRecord::load(ledger, op.sender).map_err(AccountError::from)?.is_some() {
            trace!(sender = %op.sender, "sender already deployed, ignoring init code");
            return Ok(());
        }

        let Some(deployment) =
            DeploymentPayload::decode(&op.init_code).map_err(|_| HandlerError::MalformedInitCode)?
        else {
            return Ok(());
        };
        if deployment.factory != self.factory.address() {
            return Err(HandlerError::UnknownFactory(deployment.factory));
        }
        let derived = self.factory.compute_address(deployment.owner, deployment.salt);
        if derived != op.sender {
            return Err(HandlerError::SenderMismatch { sender: op.sender, derived });
        }
        self.factory.create_account(ledger, deployment.owner, deployment.salt)?;
        Ok(())
    }

    /// Decides whether a validation result may be included at `now`.
    fn inclusion_check(&self, validation: &ValidationData, now: u64) -> Option<RejectReason> {
        let window = validation.window;
        if validation.sig_failed {
            Some(RejectReason::SignatureFailed)
        } else if now < window.valid_after {
            Some(RejectReason::NotYetValid(window.valid_after))
        } else if !window.contains(now) {
            Some(RejectReason::Expired(window.valid_until))
        } else if window.expires_within(now, self.config.inclusion_margin) {
            Some(RejectReason::ExpiresSoon(window.valid_until))
        } else {
            None
        }
    }
}
