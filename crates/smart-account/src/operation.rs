//! The canonical operation and the payloads carried inside it.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolInterface, SolValue};
use serde::{Deserialize, Serialize};
use smart_account_abi::{
    IAccountFactory,
    ISmartAccount::{self, ISmartAccountCalls},
    PackedUserOperation,
};

use crate::constants::signature::{OWNER_SIGNATURE_TAG, SESSION_ID_LENGTH, SESSION_SIGNATURE_TAG};

const ADDRESS_LENGTH: usize = 20;

/// A user operation in the ERC-4337 v0.7 packed layout.
///
/// An operation is consumed exactly once and never persisted beyond its execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The account the operation acts for.
    pub sender: Address,
    /// The replay-protection nonce.
    pub nonce: U256,
    /// Factory address followed by the `createAccount` call, present only for first use.
    pub init_code: Bytes,
    /// The `execute` or `executeBatch` call performed by the account.
    pub call_data: Bytes,
    /// `verificationGasLimit (16 bytes) || callGasLimit (16 bytes)`.
    pub account_gas_limits: B256,
    /// Gas paid for the submitter's overhead.
    pub pre_verification_gas: U256,
    /// `maxPriorityFeePerGas (16 bytes) || maxFeePerGas (16 bytes)`.
    pub gas_fees: B256,
    /// Paymaster address and data, opaque to the account.
    pub paymaster_and_data: Bytes,
    /// The tagged signature, see [`AccountSignature`].
    pub signature: Bytes,
}

impl UserOperation {
    /// Computes the canonical hash signed by the submitter.
    ///
    /// `keccak256(abi.encode(keccak256(pack(op)), entryPoint, chainId))`, where `pack(op)` is the
    /// ABI encoding of the operation fields with the dynamic ones replaced by their hashes and
    /// the signature left out.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let packed = (
            self.sender,
            self.nonce,
            keccak256(&self.init_code),
            keccak256(&self.call_data),
            self.account_gas_limits,
            self.pre_verification_gas,
            self.gas_fees,
            keccak256(&self.paymaster_and_data),
        )
            .abi_encode();
        keccak256((keccak256(packed), entry_point, U256::from(chain_id)).abi_encode())
    }

    /// The gas limit of the validation phase.
    pub fn verification_gas_limit(&self) -> u128 {
        high_u128(self.account_gas_limits)
    }

    /// The gas limit of the execution phase.
    pub fn call_gas_limit(&self) -> u128 {
        low_u128(self.account_gas_limits)
    }

    /// The priority fee cap.
    pub fn max_priority_fee_per_gas(&self) -> u128 {
        high_u128(self.gas_fees)
    }

    /// The fee cap.
    pub fn max_fee_per_gas(&self) -> u128 {
        low_u128(self.gas_fees)
    }
}

/// Packs two 128-bit values into the `high || low` word used by `accountGasLimits` and
/// `gasFees`.
pub fn pack_u128_pair(high: u128, low: u128) -> B256 {
    let mut word = [0u8; 32];
    word[..16].copy_from_slice(&high.to_be_bytes());
    word[16..].copy_from_slice(&low.to_be_bytes());
    B256::from(word)
}

fn high_u128(word: B256) -> u128 {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&word[..16]);
    u128::from_be_bytes(bytes)
}

fn low_u128(word: B256) -> u128 {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&word[16..]);
    u128::from_be_bytes(bytes)
}

impl From<PackedUserOperation> for UserOperation {
    fn from(op: PackedUserOperation) -> Self {
        Self {
            sender: op.sender,
            nonce: op.nonce,
            init_code: op.initCode,
            call_data: op.callData,
            account_gas_limits: op.accountGasLimits,
            pre_verification_gas: op.preVerificationGas,
            gas_fees: op.gasFees,
            paymaster_and_data: op.paymasterAndData,
            signature: op.signature,
        }
    }
}

impl From<UserOperation> for PackedUserOperation {
    fn from(op: UserOperation) -> Self {
        Self {
            sender: op.sender,
            nonce: op.nonce,
            initCode: op.init_code,
            callData: op.call_data,
            accountGasLimits: op.account_gas_limits,
            preVerificationGas: op.pre_verification_gas,
            gasFees: op.gas_fees,
            paymasterAndData: op.paymaster_and_data,
            signature: op.signature,
        }
    }
}

/// Errors raised while decoding the payloads of an operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    /// The data does not start with a known selector or does not decode.
    #[error("undecodable payload: {0}")]
    Undecodable(String),
    /// `executeBatch` arrays differ in length.
    #[error("batch length mismatch: {targets} targets, {values} values, {payloads} payloads")]
    LengthMismatch {
        /// Number of targets.
        targets: usize,
        /// Number of values.
        values: usize,
        /// Number of payloads.
        payloads: usize,
    },
    /// `initCode` is shorter than a factory address.
    #[error("init code too short: {0} bytes")]
    InitCodeTooShort(usize),
}

/// One external call performed by the account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Call {
    /// The callee.
    pub target: Address,
    /// The value sent along.
    pub value: U256,
    /// The calldata.
    pub data: Bytes,
}

impl Call {
    /// Creates a call.
    pub fn new(target: Address, value: U256, data: impl Into<Bytes>) -> Self {
        Self { target, value, data: data.into() }
    }
}

/// What an operation asks the account to do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallPayload {
    /// Nothing: the operation only consumes a nonce.
    Empty,
    /// `execute(dest, value, func)`.
    Single(Call),
    /// `executeBatch(dest[], value[], func[])`.
    Batch(Vec<Call>),
}

impl CallPayload {
    /// Decodes the `callData` of an operation.
    pub fn decode(call_data: &[u8]) -> Result<Self, PayloadError> {
        if call_data.is_empty() {
            return Ok(Self::Empty);
        }
        let call = ISmartAccountCalls::abi_decode(call_data, true)
            .map_err(|err| PayloadError::Undecodable(err.to_string()))?;
        match call {
            ISmartAccountCalls::execute(call) => {
                Ok(Self::Single(Call::new(call.dest, call.value, call.func)))
            }
            ISmartAccountCalls::executeBatch(batch) => {
                let ISmartAccount::executeBatchCall { dest, value, func } = batch;
                if dest.len() != value.len() || dest.len() != func.len() {
                    return Err(PayloadError::LengthMismatch {
                        targets: dest.len(),
                        values: value.len(),
                        payloads: func.len(),
                    });
                }
                let calls = dest
                    .into_iter()
                    .zip(value)
                    .zip(func)
                    .map(|((target, value), data)| Call::new(target, value, data))
                    .collect();
                Ok(Self::Batch(calls))
            }
            other => Err(PayloadError::Undecodable(format!(
                "unsupported account call {:?}",
                other.selector()
            ))),
        }
    }

    /// Encodes the payload as operation `callData`.
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Single(call) => ISmartAccount::executeCall {
                dest: call.target,
                value: call.value,
                func: call.data.clone(),
            }
            .abi_encode()
            .into(),
            Self::Batch(calls) => ISmartAccount::executeBatchCall {
                dest: calls.iter().map(|call| call.target).collect(),
                value: calls.iter().map(|call| call.value).collect(),
                func: calls.iter().map(|call| call.data.clone()).collect(),
            }
            .abi_encode()
            .into(),
        }
    }

    /// Every target the payload calls, in order.
    pub fn targets(&self) -> impl Iterator<Item = Address> + '_ {
        let calls: &[Call] = match self {
            Self::Empty => &[],
            Self::Single(call) => core::slice::from_ref(call),
            Self::Batch(calls) => calls,
        };
        calls.iter().map(|call| call.target)
    }
}

/// The lazy-deployment request carried in `initCode`: the factory address followed by an
/// ABI-encoded `createAccount(owner, salt)` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentPayload {
    /// The factory that derives and materializes the account.
    pub factory: Address,
    /// The owner of the new account.
    pub owner: Address,
    /// The deployment salt.
    pub salt: U256,
}

impl DeploymentPayload {
    /// Decodes `initCode`. Returns `Ok(None)` when it is empty.
    pub fn decode(init_code: &[u8]) -> Result<Option<Self>, PayloadError> {
        if init_code.is_empty() {
            return Ok(None);
        }
        if init_code.len() < ADDRESS_LENGTH {
            return Err(PayloadError::InitCodeTooShort(init_code.len()));
        }
        let (factory, call) = init_code.split_at(ADDRESS_LENGTH);
        let call = IAccountFactory::createAccountCall::abi_decode(call, true)
            .map_err(|err| PayloadError::Undecodable(err.to_string()))?;
        Ok(Some(Self { factory: Address::from_slice(factory), owner: call.owner, salt: call.salt }))
    }

    /// Encodes the request as `initCode`.
    pub fn encode(&self) -> Bytes {
        let call = IAccountFactory::createAccountCall { owner: self.owner, salt: self.salt };
        let mut init_code = self.factory.to_vec();
        init_code.extend_from_slice(&call.abi_encode());
        init_code.into()
    }
}

/// The authorization context carried in the operation signature.
///
/// The first byte selects the signer: `0x00 || signature` for the owner,
/// `0x01 || sessionId || signature` for a session key. The inner signature is opaque here and
/// interpreted by the account's verifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccountSignature {
    /// Signed by the account owner.
    Owner(Bytes),
    /// Signed by the session key registered under `session_id`.
    SessionKey {
        /// The session the key was issued under.
        session_id: B256,
        /// The key's signature.
        signature: Bytes,
    },
}

impl AccountSignature {
    /// Decodes a tagged signature. Returns `None` for an unknown tag or a truncated payload.
    pub fn decode(signature: &[u8]) -> Option<Self> {
        let (&tag, rest) = signature.split_first()?;
        match tag {
            OWNER_SIGNATURE_TAG => Some(Self::Owner(Bytes::copy_from_slice(rest))),
            SESSION_SIGNATURE_TAG => {
                if rest.len() < SESSION_ID_LENGTH {
                    return None;
                }
                let (session_id, inner) = rest.split_at(SESSION_ID_LENGTH);
                Some(Self::SessionKey {
                    session_id: B256::from_slice(session_id),
                    signature: Bytes::copy_from_slice(inner),
                })
            }
            _ => None,
        }
    }

    /// Encodes the tagged signature.
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::new();
        match self {
            Self::Owner(signature) => {
                out.push(OWNER_SIGNATURE_TAG);
                out.extend_from_slice(signature);
            }
            Self::SessionKey { session_id, signature } => {
                out.push(SESSION_SIGNATURE_TAG);
                out.extend_from_slice(session_id.as_slice());
                out.extend_from_slice(signature);
            }
        }
        out.into()
    }
}
