use alloy_primitives::{Address, Bytes, B256, U256};

use crate::{
    constants::entry_point::ENTRY_POINT_V07_ADDRESS, AccountSignature, Call, CallPayload,
    DeploymentPayload, UserOperation,
};

use super::TestSigner;

/// Builds and signs [`UserOperation`]s.
#[derive(Debug, Clone)]
pub struct OperationBuilder {
    op: UserOperation,
    entry_point: Address,
    chain_id: u64,
}

impl OperationBuilder {
    /// Starts an operation for `sender` with `nonce`, bound to the v0.7 entry point on chain 1.
    pub fn new(sender: Address, nonce: u64) -> Self {
        Self {
            op: UserOperation { sender, nonce: U256::from(nonce), ..Default::default() },
            entry_point: ENTRY_POINT_V07_ADDRESS,
            chain_id: 1,
        }
    }

    /// Binds the hash to another entry point.
    pub const fn entry_point(mut self, entry_point: Address) -> Self {
        self.entry_point = entry_point;
        self
    }

    /// Binds the hash to another chain.
    pub const fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Sets the call payload.
    pub fn payload(mut self, payload: CallPayload) -> Self {
        self.op.call_data = payload.encode();
        self
    }

    /// Calls `target` once.
    pub fn execute(self, target: Address, value: U256, data: impl Into<Bytes>) -> Self {
        self.payload(CallPayload::Single(Call::new(target, value, data)))
    }

    /// Calls every entry of `calls` in order.
    pub fn batch(self, calls: Vec<Call>) -> Self {
        self.payload(CallPayload::Batch(calls))
    }

    /// Sets raw call data.
    pub fn call_data(mut self, call_data: impl Into<Bytes>) -> Self {
        self.op.call_data = call_data.into();
        self
    }

    /// Requests lazy deployment through `factory`.
    pub fn init_code(mut self, factory: Address, owner: Address, salt: U256) -> Self {
        self.op.init_code = DeploymentPayload { factory, owner, salt }.encode();
        self
    }

    /// The canonical hash of the operation built so far.
    pub fn hash(&self) -> B256 {
        self.op.hash(self.entry_point, self.chain_id)
    }

    /// Finishes with an owner signature by `signer`.
    pub fn sign_owner(mut self, signer: &TestSigner) -> UserOperation {
        let signature = signer.sign_bytes(self.hash());
        self.op.signature = AccountSignature::Owner(signature).encode();
        self.op
    }

    /// Finishes with a session-key signature by `signer` under `session_id`.
    pub fn sign_session(mut self, session_id: B256, signer: &TestSigner) -> UserOperation {
        let signature = signer.sign_bytes(self.hash());
        self.op.signature = AccountSignature::SessionKey { session_id, signature }.encode();
        self.op
    }

    /// Finishes with raw signature bytes.
    pub fn signature(mut self, signature: impl Into<Bytes>) -> UserOperation {
        self.op.signature = signature.into();
        self.op
    }
}
