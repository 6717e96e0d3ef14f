//! Tests for the entry-point driver: batches of operations, execution reverts, simulation
//! and inclusion margins.

use alloy_primitives::{address, Address, Bytes, U256};
use smart_account::{
    test_utils::{init_tracing, CounterContract, OperationBuilder, RevertingContract, TestSigner},
    AccountError, AccountFactory, EntryPointHandler, HandlerConfig, HandlerError, InMemoryLedger,
    Ledger, OpStatus, RejectReason, UserOperation,
};

const COUNTER: Address = address!("0x1000000000000000000000000000000000000001");
const REVERTER: Address = address!("0x1000000000000000000000000000000000000003");
const T0: u64 = 1_700_000_000;

struct Fixture {
    ledger: InMemoryLedger,
    handler: EntryPointHandler,
    owner: TestSigner,
    sender: Address,
}

fn fixture() -> Fixture {
    init_tracing();
    let owner = TestSigner::from_seed(41);
    let mut ledger = InMemoryLedger::default()
        .with_timestamp(T0)
        .with_contract(COUNTER, CounterContract)
        .with_contract(REVERTER, RevertingContract(Bytes::from_static(b"denied")));
    let sender =
        AccountFactory::default().create_account(&mut ledger, owner.address(), U256::ZERO).unwrap();
    ledger.set_balance(sender, U256::from(1_000));
    Fixture { ledger, handler: EntryPointHandler::new(HandlerConfig::default()), owner, sender }
}

impl Fixture {
    fn counter_op(&self, nonce: u64) -> UserOperation {
        OperationBuilder::new(self.sender, nonce)
            .execute(COUNTER, U256::ZERO, Bytes::new())
            .sign_owner(&self.owner)
    }
}

#[test]
fn test_execution_revert_keeps_nonce_and_prefund_consumed() {
    let mut f = fixture();
    let entry_point = f.handler.config().entry_point;
    let op = OperationBuilder::new(f.sender, 0)
        .execute(REVERTER, U256::from(5), Bytes::new())
        .sign_owner(&f.owner);

    let outcome = f.handler.handle_op(&mut f.ledger, &op, U256::from(100)).unwrap();

    assert_eq!(
        outcome.status,
        OpStatus::ExecutionReverted { index: None, output: Bytes::from_static(b"denied") }
    );
    assert!(outcome.validation.unwrap().is_success());
    assert_eq!(f.handler.get_nonce(&f.ledger, f.sender).unwrap(), U256::from(1));
    assert_eq!(f.ledger.balance(entry_point), U256::from(100));
    assert_eq!(f.ledger.balance(f.sender), U256::from(900));
}

#[test]
fn test_handle_ops_reports_each_operation() {
    let mut f = fixture();
    let good = f.counter_op(0);
    let replay = good.clone();
    let forged = OperationBuilder::new(f.sender, 1)
        .execute(COUNTER, U256::ZERO, Bytes::new())
        .sign_owner(&TestSigner::from_seed(42));
    let next = f.counter_op(1);

    let ops = [good, replay, forged, next];
    let results = f.handler.handle_ops(&mut f.ledger, ops.iter().map(|op| (op, U256::ZERO)));

    assert_eq!(results.len(), 4);
    assert!(results[0].as_ref().unwrap().is_executed());
    assert!(matches!(
        results[1],
        Err(HandlerError::Account(AccountError::InvalidNonce { .. }))
    ));
    assert_eq!(
        results[2].as_ref().unwrap().status,
        OpStatus::Rejected(RejectReason::SignatureFailed)
    );
    assert!(results[3].as_ref().unwrap().is_executed());
    assert_eq!(CounterContract::count(&f.ledger, COUNTER), U256::from(2));
    assert_eq!(f.handler.get_nonce(&f.ledger, f.sender).unwrap(), U256::from(2));
}

#[test]
fn test_simulation_has_no_side_effects() {
    let mut f = fixture();
    let op = f.counter_op(0);
    let journal = f.ledger.journal_len();

    let validation = f.handler.simulate_validation(&mut f.ledger, &op, U256::from(10)).unwrap();

    assert!(validation.is_success());
    assert_eq!(f.ledger.journal_len(), journal);
    assert_eq!(f.ledger.balance(f.sender), U256::from(1_000));
    assert_eq!(f.handler.get_nonce(&f.ledger, f.sender).unwrap(), U256::ZERO);

    let unfunded = f.handler.simulate_validation(&mut f.ledger, &op, U256::from(5_000));
    assert!(matches!(
        unfunded,
        Err(HandlerError::Account(AccountError::InsufficientFunds { .. }))
    ));
}

#[test]
fn test_session_expiring_within_margin_is_not_included() {
    let mut f = fixture();
    let key = TestSigner::from_seed(43);
    let session_id = f
        .handler
        .account(f.sender)
        .create_session(&mut f.ledger, f.owner.address(), key.address(), T0, T0 + 100, [COUNTER])
        .unwrap();
    let op = OperationBuilder::new(f.sender, 0)
        .execute(COUNTER, U256::ZERO, Bytes::new())
        .sign_session(session_id, &key);

    f.ledger.set_timestamp(T0 + 50);
    let outcome = f.handler.handle_op(&mut f.ledger, &op, U256::ZERO).unwrap();
    assert_eq!(outcome.status, OpStatus::Rejected(RejectReason::ExpiresSoon(T0 + 100)));
    assert!(outcome.validation.unwrap().is_success());
    assert_eq!(f.handler.get_nonce(&f.ledger, f.sender).unwrap(), U256::ZERO);

    let relaxed = EntryPointHandler::new(HandlerConfig::default().with_inclusion_margin(10));
    assert!(relaxed.handle_op(&mut f.ledger, &op, U256::ZERO).unwrap().is_executed());
}

#[test]
fn test_zero_margin_includes_last_valid_second() {
    let mut f = fixture();
    let key = TestSigner::from_seed(44);
    let session_id = f
        .handler
        .account(f.sender)
        .create_session(&mut f.ledger, f.owner.address(), key.address(), T0, T0 + 100, [COUNTER])
        .unwrap();
    let handler = EntryPointHandler::new(HandlerConfig::default().with_inclusion_margin(0));
    let op = |nonce| {
        OperationBuilder::new(f.sender, nonce)
            .execute(COUNTER, U256::ZERO, Bytes::new())
            .sign_session(session_id, &key)
    };

    f.ledger.set_timestamp(T0 + 99);
    let first = op(0);
    assert!(handler.handle_op(&mut f.ledger, &first, U256::ZERO).unwrap().is_executed());
    assert_eq!(CounterContract::count(&f.ledger, COUNTER), U256::from(1));

    f.ledger.set_timestamp(T0 + 100);
    let second = op(1);
    let outcome = handler.handle_op(&mut f.ledger, &second, U256::ZERO).unwrap();
    assert_eq!(outcome.status, OpStatus::Rejected(RejectReason::SignatureFailed));
    assert_eq!(handler.get_nonce(&f.ledger, f.sender).unwrap(), U256::from(1));
}

#[test]
fn test_hash_binds_entry_point() {
    let mut f = fixture();
    let other = address!("0x5000000000000000000000000000000000000005");
    let handler = EntryPointHandler::new(HandlerConfig::default().with_entry_point(other));
    let op = f.counter_op(0);

    assert_ne!(handler.op_hash(&op), f.handler.op_hash(&op));
    let outcome = handler.handle_op(&mut f.ledger, &op, U256::ZERO).unwrap();
    assert_eq!(outcome.status, OpStatus::Rejected(RejectReason::SignatureFailed));
    assert_eq!(CounterContract::count(&f.ledger, COUNTER), U256::ZERO);
}
