//! Tests for deterministic deployment, directly and lazily from `initCode`.

use alloy_primitives::{address, Address, Bytes, U256};
use smart_account::{
    test_utils::{CounterContract, OperationBuilder, TestSigner},
    AccountError, AccountFactory, EntryPointHandler, FactoryError, HandlerConfig, HandlerError,
    InMemoryLedger, Ledger, UserOperation,
};

const COUNTER: Address = address!("0x1000000000000000000000000000000000000001");

fn handler() -> EntryPointHandler {
    EntryPointHandler::new(HandlerConfig::default())
}

#[test]
fn test_create_account_twice_keeps_state() {
    let owner = TestSigner::from_seed(31);
    let factory = AccountFactory::default();
    let mut ledger = InMemoryLedger::default().with_contract(COUNTER, CounterContract);
    let handler = handler();

    let account = factory.create_account(&mut ledger, owner.address(), U256::from(1)).unwrap();
    let op = OperationBuilder::new(account, 0)
        .execute(COUNTER, U256::ZERO, Bytes::new())
        .sign_owner(&owner);
    handler.handle_op(&mut ledger, &op, U256::ZERO).unwrap();

    assert_eq!(factory.create_account(&mut ledger, owner.address(), U256::from(1)), Ok(account));
    assert_eq!(handler.get_nonce(&ledger, account).unwrap(), U256::from(1));
}

#[test]
fn test_null_owner_is_rejected() {
    let mut ledger = InMemoryLedger::default();
    assert_eq!(
        AccountFactory::default().create_account(&mut ledger, Address::ZERO, U256::ZERO),
        Err(FactoryError::InvalidOwner)
    );
    assert_eq!(FactoryError::InvalidOwner.revert_data().len(), 4);
}

#[test]
fn test_first_operation_deploys_sender() {
    let owner = TestSigner::from_seed(32);
    let handler = handler();
    let mut ledger = InMemoryLedger::default().with_contract(COUNTER, CounterContract);
    let sender = handler.factory().get_address(owner.address(), U256::from(9));
    let factory = handler.factory().address();

    assert!(!handler.account(sender).is_deployed(&ledger));
    let op = OperationBuilder::new(sender, 0)
        .init_code(factory, owner.address(), U256::from(9))
        .execute(COUNTER, U256::ZERO, Bytes::new())
        .sign_owner(&owner);
    let outcome = handler.handle_op(&mut ledger, &op, U256::ZERO).unwrap();

    assert!(outcome.is_executed());
    assert!(handler.account(sender).is_deployed(&ledger));
    assert_eq!(handler.account(sender).owner(&ledger).unwrap(), owner.address());
    assert_eq!(CounterContract::count(&ledger, COUNTER), U256::from(1));

    // A deployed sender ignores init code, even a stale one.
    let op = OperationBuilder::new(sender, 1)
        .init_code(factory, owner.address(), U256::from(9))
        .execute(COUNTER, U256::ZERO, Bytes::new())
        .sign_owner(&owner);
    assert!(handler.handle_op(&mut ledger, &op, U256::ZERO).unwrap().is_executed());
    assert_eq!(CounterContract::count(&ledger, COUNTER), U256::from(2));
}

#[test]
fn test_init_code_must_derive_sender() {
    let owner = TestSigner::from_seed(33);
    let handler = handler();
    let mut ledger = InMemoryLedger::default();
    let factory = handler.factory().address();
    let sender = handler.factory().get_address(owner.address(), U256::from(1));
    let derived = handler.factory().get_address(owner.address(), U256::from(2));

    let op = OperationBuilder::new(sender, 0)
        .init_code(factory, owner.address(), U256::from(2))
        .sign_owner(&owner);
    assert_eq!(
        handler.handle_op(&mut ledger, &op, U256::ZERO),
        Err(HandlerError::SenderMismatch { sender, derived })
    );
    assert_eq!(ledger.journal_len(), 0);
}

#[test]
fn test_init_code_must_name_configured_factory() {
    let owner = TestSigner::from_seed(34);
    let handler = handler();
    let mut ledger = InMemoryLedger::default();
    let rogue = address!("0x9000000000000000000000000000000000000009");
    let sender = AccountFactory::new(rogue).get_address(owner.address(), U256::ZERO);

    let op = OperationBuilder::new(sender, 0)
        .init_code(rogue, owner.address(), U256::ZERO)
        .sign_owner(&owner);
    assert_eq!(
        handler.handle_op(&mut ledger, &op, U256::ZERO),
        Err(HandlerError::UnknownFactory(rogue))
    );

    let garbage = OperationBuilder::new(sender, 0).sign_owner(&owner);
    let garbage = UserOperation { init_code: Bytes::from_static(&[0xab; 24]), ..garbage };
    assert_eq!(
        handler.handle_op(&mut ledger, &garbage, U256::ZERO),
        Err(HandlerError::MalformedInitCode)
    );
}

#[test]
fn test_deployment_is_undone_when_validation_fails_hard() {
    let owner = TestSigner::from_seed(35);
    let handler = handler();
    let mut ledger = InMemoryLedger::default();
    let sender = handler.factory().get_address(owner.address(), U256::ZERO);

    let op = OperationBuilder::new(sender, 3)
        .init_code(handler.factory().address(), owner.address(), U256::ZERO)
        .sign_owner(&owner);
    assert_eq!(
        handler.handle_op(&mut ledger, &op, U256::ZERO),
        Err(HandlerError::Account(AccountError::InvalidNonce {
            expected: U256::ZERO,
            provided: U256::from(3)
        }))
    );
    assert!(!handler.account(sender).is_deployed(&ledger));
    assert!(ledger.logs().is_empty());
}

#[test]
fn test_deployment_is_undone_when_signature_fails() {
    let owner = TestSigner::from_seed(36);
    let handler = handler();
    let mut ledger = InMemoryLedger::default();
    let sender = handler.factory().get_address(owner.address(), U256::ZERO);

    let op = OperationBuilder::new(sender, 0)
        .init_code(handler.factory().address(), owner.address(), U256::ZERO)
        .sign_owner(&TestSigner::from_seed(37));
    let outcome = handler.handle_op(&mut ledger, &op, U256::ZERO).unwrap();
    assert!(outcome.is_rejected());
    assert!(!handler.account(sender).is_deployed(&ledger));
    assert_eq!(ledger.balance(sender), U256::ZERO);
}
