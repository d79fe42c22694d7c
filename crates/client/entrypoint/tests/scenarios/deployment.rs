//! Counterfactual deployment through a factory.

use base_entrypoint::Host;
use rstest::rstest;

use super::*;

fn deploying_op(harness: &TestHarness, owner: &TestAccount, salt: u64, signer: &TestAccount) -> UserOperation {
    let sender = harness.counterfactual_address(owner);
    let call = SimpleAccount::execute_call(COUNTER, U256::ZERO, Counter::increment_call());
    let factory_data = SimpleAccountFactory::create_account_call(owner.address, U256::from(salt));
    harness.sign(harness.op(sender).factory(FACTORY, factory_data).call_data(call), signer)
}

#[test]
fn test_factory_deploys_sender() {
    let mut harness = TestHarness::new();
    let sender = harness.counterfactual_address(&ALICE);
    harness.deposit(sender, U256::from(ETHER));
    let op = deploying_op(&harness, &ALICE, 0, &ALICE);
    let op_hash = harness.entry_point.get_user_op_hash(&op).unwrap();

    let result = harness.process(&[op]);

    let outcome = &result.outcomes[0];
    assert!(outcome.success, "{:?}", outcome.error);
    assert!(harness.host.account(sender).is_some());
    assert_eq!(harness.counter(), U256::from(1));

    let events = events_for(&result.events, op_hash);
    assert_eq!(
        events[0],
        &EntryPointEvent::AccountDeployed {
            user_op_hash: op_hash,
            sender,
            factory: FACTORY,
            paymaster: Address::ZERO,
        }
    );
    assert!(matches!(events[1], EntryPointEvent::UserOperationEvent { success: true, .. }));

    // The deployed account keeps working without initCode.
    let next = harness.increment_op(sender, &ALICE, 1);
    assert!(harness.process(&[next]).outcomes[0].success);
    assert_eq!(harness.counter(), U256::from(2));
}

#[test]
fn test_deployment_unwound_when_account_rejects() {
    let mut harness = TestHarness::new();
    let sender = harness.counterfactual_address(&ALICE);
    harness.deposit(sender, U256::from(ETHER));
    let op = deploying_op(&harness, &ALICE, 0, &CHARLIE);

    let result = harness.process(&[op]);

    assert_eq!(result.outcomes[0].error, Some(OperationError::SignatureInvalid));
    assert!(harness.host.account(sender).is_none());
    assert!(result.events.is_empty());
}

#[rstest]
#[case::wrong_salt(1, "AA14")]
#[case::already_deployed(0, "AA10")]
fn test_deployment_rejected(#[case] salt: u64, #[case] code: &str) {
    let mut harness = TestHarness::new();
    let sender = harness.counterfactual_address(&ALICE);
    if code == "AA10" {
        harness.deploy_account(&ALICE);
    }
    harness.deposit(sender, U256::from(ETHER));
    let op = deploying_op(&harness, &ALICE, salt, &ALICE);

    let result = harness.process(&[op]);

    let outcome = &result.outcomes[0];
    assert_eq!(outcome.error.as_ref().and_then(OperationError::code), Some(code));
    assert_eq!(outcome.actual_gas_cost, U256::ZERO);
    assert_eq!(harness.balance_of(sender), U256::from(ETHER));
}

#[test]
fn test_unknown_factory() {
    let mut harness = TestHarness::new();
    let sender = harness.counterfactual_address(&ALICE);
    let nowhere = address!("00000000000000000000000000000000deadbeef");
    let factory_data = SimpleAccountFactory::create_account_call(ALICE.address, U256::ZERO);
    let op = harness.sign(harness.op(sender).factory(nowhere, factory_data), &ALICE);

    let result = harness.process(&[op]);

    assert_eq!(result.outcomes[0].error, Some(OperationError::InvalidFactory(nowhere)));
}

#[test]
fn test_missing_account_without_factory() {
    let mut harness = TestHarness::new();
    let sender = harness.counterfactual_address(&ALICE);
    let op = harness.increment_op(sender, &ALICE, 0);

    let result = harness.process(&[op]);

    assert_eq!(result.outcomes[0].error, Some(OperationError::AccountNotDeployed(sender)));
    assert_eq!(result.outcomes[0].error.as_ref().and_then(OperationError::code), Some("AA20"));
}
