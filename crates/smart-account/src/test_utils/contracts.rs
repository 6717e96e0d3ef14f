use alloy_primitives::{Address, Bytes, B256, U256};

use crate::{CallResult, ContractContext, InMemoryLedger, NativeContract};

/// Increments slot zero on every successful call and returns the new count.
///
/// A call whose input is exactly `0xff` reverts after incrementing, so that tests can observe
/// the rollback.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterContract;

impl CounterContract {
    /// Input that makes the counter revert.
    pub const REVERT_INPUT: [u8; 1] = [0xff];

    /// Reads the count of the counter deployed at `address`.
    pub fn count(ledger: &InMemoryLedger, address: Address) -> U256 {
        U256::from_be_bytes(ledger.storage_at(address, B256::ZERO).0)
    }
}

impl NativeContract for CounterContract {
    fn call(&self, ctx: &mut ContractContext<'_>, input: &Bytes) -> CallResult {
        let count = U256::from_be_bytes(ctx.sload(B256::ZERO).0) + U256::from(1);
        ctx.sstore(B256::ZERO, B256::from(count.to_be_bytes::<32>()));
        if input.as_ref() == Self::REVERT_INPUT.as_slice() {
            return Err(Bytes::from_static(b"counter: revert requested"));
        }
        Ok(Bytes::copy_from_slice(&count.to_be_bytes::<32>()))
    }
}

/// Always reverts with the configured data.
#[derive(Debug, Clone, Default)]
pub struct RevertingContract(pub Bytes);

impl NativeContract for RevertingContract {
    fn call(&self, _ctx: &mut ContractContext<'_>, _input: &Bytes) -> CallResult {
        Err(self.0.clone())
    }
}
