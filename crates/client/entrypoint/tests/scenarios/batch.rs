//! Account-paid operations: settlement, authorization order and failure isolation.

use base_entrypoint::{RevertReason, nonce::join_nonce};
use rstest::rstest;

use super::*;

const NOW: u64 = 1_700_000_000;

#[test]
fn test_counter_increment_settles() {
    init_test_tracing();
    let mut harness = TestHarness::new();
    let sender = funded_account(&mut harness, &ALICE);
    let op = harness.increment_op(sender, &ALICE, 0);
    let op_hash = harness.entry_point.get_user_op_hash(&op).unwrap();

    let result = harness.process(&[op]);

    let outcome = &result.outcomes[0];
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(
        outcome.transitions,
        vec![
            OperationState::Decoded,
            OperationState::Validating,
            OperationState::Validated,
            OperationState::Executing,
            OperationState::Executed,
            OperationState::Settled,
        ]
    );
    // pvg + ecrecover, call + sload + fresh sstore, 10% of the unused call gas
    let gas = 21_000 + 3_000 + (2_600 + 2_100 + 20_000) + (200_000 - 24_700) / 10;
    assert_eq!(outcome.gas_used, gas);
    assert_eq!(outcome.actual_gas_cost, U256::from(gas as u128 * GWEI));

    assert_eq!(harness.counter(), U256::from(1));
    assert_eq!(harness.balance_of(sender), U256::from(ETHER) - outcome.actual_gas_cost);
    assert_eq!(result.collected, outcome.actual_gas_cost);
    assert_eq!(harness.native_balance(COLLECTOR), result.collected);
    assert_eq!(harness.state.nonces.get_nonce(sender, U256::ZERO), U256::from(1));
    assert_eq!(harness.surplus(), U256::ZERO);

    let events = events_for(&result.events, op_hash);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        EntryPointEvent::UserOperationEvent { success: true, actual_gas_used, .. } if *actual_gas_used == gas
    ));
}

#[test]
fn test_operations_observe_earlier_operations() {
    let mut harness = TestHarness::new();
    let sender = funded_account(&mut harness, &ALICE);
    let ops = [harness.increment_op(sender, &ALICE, 0), harness.increment_op(sender, &ALICE, 1)];

    let result = harness.process(&ops);

    assert_eq!(result.succeeded(), 2);
    assert_eq!(harness.counter(), U256::from(2));
    // The second write resets a slot the first one set.
    assert_eq!(result.outcomes[1].gas_used, 21_000 + 3_000 + 7_600 + (200_000 - 7_600) / 10);
}

#[test]
fn test_deposit_drained_by_earlier_operation() {
    let mut harness = TestHarness::new();
    let sender = harness.deploy_account(&ALICE);
    let prefund = U256::from((21_000 + 150_000 + 200_000) * GWEI);
    harness.deposit(sender, prefund);
    let ops = [harness.increment_op(sender, &ALICE, 0), harness.increment_op(sender, &ALICE, 1)];

    let result = harness.process(&ops);

    assert!(result.outcomes[0].success);
    let second = &result.outcomes[1];
    assert!(matches!(
        second.error,
        Some(OperationError::InsufficientBalance { entity: Entity::Account, .. })
    ));
    assert_eq!(second.error.as_ref().and_then(OperationError::code), Some("AA21"));
    assert_eq!(
        second.transitions,
        vec![OperationState::Decoded, OperationState::Validating, OperationState::Reverted]
    );
    // The account tried to top up from an empty balance before giving up.
    assert_eq!(second.gas_used, 21_000 + 3_000 + 11_600);
    assert_eq!(harness.counter(), U256::from(1));
    assert_eq!(harness.state.nonces.get_nonce(sender, U256::ZERO), U256::from(2));
    assert_eq!(harness.surplus(), U256::ZERO);
}

#[test]
fn test_missing_funds_paid_from_account_balance() {
    let mut harness = TestHarness::new();
    let sender = harness.deploy_account(&ALICE);
    harness.fund(sender, U256::from(ETHER));
    let op = harness.increment_op(sender, &ALICE, 0);

    let result = harness.process(&[op]);

    let outcome = &result.outcomes[0];
    assert!(outcome.success, "{:?}", outcome.error);
    let prefund = U256::from((21_000 + 150_000 + 200_000) * GWEI);
    assert_eq!(harness.native_balance(sender), U256::from(ETHER) - prefund);
    assert_eq!(harness.balance_of(sender), prefund - outcome.actual_gas_cost);
    assert!(result.events.iter().any(|event| matches!(
        event,
        EntryPointEvent::Deposited { account, .. } if *account == sender
    )));
    assert_eq!(harness.surplus(), U256::ZERO);
}

#[test]
fn test_wrong_signer_leaves_no_trace() {
    let mut harness = TestHarness::new();
    let sender = funded_account(&mut harness, &ALICE);
    let forged = harness.increment_op(sender, &BOB, 0);

    let result = harness.process(&[forged]);

    let outcome = &result.outcomes[0];
    assert_eq!(outcome.error, Some(OperationError::SignatureInvalid));
    assert_eq!(outcome.actual_gas_cost, U256::ZERO);
    assert_eq!(harness.balance_of(sender), U256::from(ETHER));
    assert_eq!(harness.state.nonces.get_nonce(sender, U256::ZERO), U256::ZERO);
    assert!(result.events.is_empty());
    assert_eq!(result.collected, U256::ZERO);
}

#[rstest]
#[case::not_yet_due(NOW, 0, Some("AA22"))]
#[case::expired(0, NOW - 1, Some("AA22"))]
#[case::last_valid_second(NOW - 1, NOW, None)]
#[case::unbounded(0, 0, None)]
fn test_validity_window(#[case] after: u64, #[case] until: u64, #[case] code: Option<&str>) {
    let mut harness = TestHarness::new();
    let sender = address!("00000000000000000000000000000000000a11ce");
    harness.install_account(sender, Arc::new(SimpleAccount::new(ALICE.address).with_window(after, until)));
    harness.deposit(sender, U256::from(ETHER));
    let op = harness.increment_op(sender, &ALICE, 0);

    let result = harness.process(&[op]);

    let outcome = &result.outcomes[0];
    assert_eq!(outcome.error.as_ref().and_then(OperationError::code), code);
    assert_eq!(outcome.success, code.is_none());
}

#[test]
fn test_replay_across_batches_rejected() {
    let mut harness = TestHarness::new();
    let sender = funded_account(&mut harness, &ALICE);
    let op = harness.increment_op(sender, &ALICE, 0);

    assert!(harness.process(std::slice::from_ref(&op)).outcomes[0].success);
    let deposit = harness.balance_of(sender);
    let replay = harness.process(&[op]);

    assert_eq!(replay.outcomes[0].error, Some(OperationError::NonceInvalid));
    assert_eq!(harness.balance_of(sender), deposit);
    assert_eq!(harness.counter(), U256::from(1));
}

#[test]
fn test_nonce_keys_are_independent() {
    let mut harness = TestHarness::new();
    let sender = funded_account(&mut harness, &ALICE);
    let call = SimpleAccount::execute_call(COUNTER, U256::ZERO, Counter::increment_call());
    let key = U256::from(7);
    let keyed = harness.sign(harness.op(sender).keyed_nonce(key, 0).call_data(call.clone()), &ALICE);
    let plain = harness.sign(harness.op(sender).call_data(call), &ALICE);

    let result = harness.process(&[keyed, plain]);

    assert_eq!(result.succeeded(), 2);
    assert_eq!(harness.state.nonces.get_nonce(sender, key), join_nonce(key, 1));
    assert_eq!(harness.state.nonces.get_nonce(sender, U256::ZERO), U256::from(1));
}

#[test]
fn test_batch_call_is_atomic() {
    let mut harness = TestHarness::new();
    let sender = funded_account(&mut harness, &ALICE);
    let increment = Call { target: COUNTER, value: U256::ZERO, data: Counter::increment_call() };
    let fail = Call { target: COUNTER, value: U256::ZERO, data: Counter::fail_call() };
    let call = SimpleAccount::execute_batch_call(vec![increment.clone(), fail, increment]);
    let op = harness.sign(harness.op(sender).call_data(call), &ALICE);
    let op_hash = harness.entry_point.get_user_op_hash(&op).unwrap();

    let result = harness.process(&[op]);

    let outcome = &result.outcomes[0];
    assert_eq!(outcome.state, OperationState::Reverted);
    let reason = outcome.revert_reason().expect("execution revert is recorded");
    assert_eq!(RevertReason::decode(reason), RevertReason::Message("Counter: fail".into()));
    assert_eq!(harness.counter(), U256::ZERO);
    assert!(!outcome.actual_gas_cost.is_zero());
    assert_eq!(harness.state.nonces.get_nonce(sender, U256::ZERO), U256::from(1));

    let events = events_for(&result.events, op_hash);
    assert!(matches!(events[0], EntryPointEvent::UserOperationRevertReason { .. }));
    assert!(matches!(events[1], EntryPointEvent::UserOperationEvent { success: false, .. }));
}

#[test]
fn test_execution_out_of_gas_burns_call_limit() {
    let mut harness = TestHarness::new();
    let sender = address!("00000000000000000000000000000000000b0b00");
    let account = MisbehavingAccount { execution: Behavior::Loop, ..Default::default() };
    harness.install_account(sender, Arc::new(account));
    harness.deposit(sender, U256::from(ETHER));
    let op = harness.op(sender).build();

    let result = harness.process(&[op]);

    let outcome = &result.outcomes[0];
    assert_eq!(outcome.error, Some(OperationError::ExecutionReverted(Bytes::new())));
    // Nothing left unused, so no penalty.
    assert_eq!(outcome.gas_used, 21_000 + 200_000);
    assert_eq!(harness.surplus(), U256::ZERO);
}

#[rstest]
#[case::out_of_gas(Behavior::Loop, "AA26")]
#[case::revert(Behavior::Revert, "AA23")]
#[case::panic(Behavior::Panic, "AA23")]
fn test_misbehaving_validation_is_free(#[case] behavior: Behavior, #[case] code: &str) {
    let mut harness = TestHarness::new();
    let sender = address!("00000000000000000000000000000000000b0b00");
    harness.install_account(sender, Arc::new(MisbehavingAccount { validation: behavior, ..Default::default() }));
    harness.deposit(sender, U256::from(ETHER));
    let honest = funded_account(&mut harness, &ALICE);
    let ops = [harness.op(sender).build(), harness.increment_op(honest, &ALICE, 0)];

    let result = harness.process(&ops);

    let outcome = &result.outcomes[0];
    assert_eq!(outcome.error.as_ref().and_then(OperationError::code), Some(code));
    assert_eq!(outcome.actual_gas_cost, U256::ZERO);
    assert_eq!(harness.balance_of(sender), U256::from(ETHER));
    assert_eq!(harness.state.nonces.get_nonce(sender, U256::ZERO), U256::ZERO);
    assert!(result.outcomes[1].success);
    assert_eq!(harness.counter(), U256::from(1));
}

#[test]
fn test_out_of_bounds_gas_is_not_charged() {
    let mut harness = TestHarness::new();
    let sender = funded_account(&mut harness, &ALICE);
    let op = harness.sign(harness.op(sender).call_gas(30_000_000), &ALICE);

    let result = harness.process(&[op]);

    let outcome = &result.outcomes[0];
    assert!(matches!(outcome.error, Some(OperationError::MalformedOperation(_))));
    assert_eq!(outcome.state, OperationState::BatchAborted);
    assert_eq!(outcome.sender, Some(sender));
    assert_eq!(outcome.actual_gas_cost, U256::ZERO);
    assert_eq!(harness.balance_of(sender), U256::from(ETHER));
    assert_eq!(harness.state.nonces.get_nonce(sender, U256::ZERO), U256::ZERO);
}

#[test]
fn test_unsigned_malformed_operation_cannot_drain_deposit() {
    let mut harness = TestHarness::new();
    let victim = funded_account(&mut harness, &ALICE);
    let junk = harness
        .op(victim)
        .call_gas(30_000_000)
        .pre_verification_gas(10_000_000)
        .fees(u128::MAX / 2, u128::MAX / 2)
        .build();

    let result = harness.process(&[junk]);

    assert!(matches!(result.outcomes[0].error, Some(OperationError::MalformedOperation(_))));
    assert_eq!(result.collected, U256::ZERO);
    assert_eq!(harness.balance_of(victim), U256::from(ETHER));
    assert_eq!(harness.native_balance(COLLECTOR), U256::ZERO);
    assert_eq!(harness.surplus(), U256::ZERO);
}

#[test]
fn test_corrupt_element_does_not_stop_batch() {
    let mut harness = TestHarness::new();
    let sender = funded_account(&mut harness, &ALICE);
    let op = harness.increment_op(sender, &ALICE, 0);
    let envelope = encode_batch(&[Bytes::from_static(&[0xde, 0xad]), encode_operation(&op).unwrap()]);

    let result = harness.process_encoded(&envelope);

    assert_eq!(result.outcomes[0].state, OperationState::BatchAborted);
    assert!(result.outcomes[1].success);
    assert_eq!(harness.counter(), U256::from(1));
}

#[test]
fn test_corrupt_envelope_rejects_batch() {
    let mut harness = TestHarness::new();
    let err = harness
        .entry_point
        .process_encoded_batch(&mut harness.state, &mut harness.host, &[0xff; 7], COLLECTOR)
        .unwrap_err();
    assert!(matches!(err, BatchError::Envelope(_)));
}

#[test]
fn test_zero_collector_rejects_batch() {
    let mut harness = TestHarness::new();
    let sender = funded_account(&mut harness, &ALICE);
    let op = harness.increment_op(sender, &ALICE, 0);

    let err = harness
        .entry_point
        .process_batch(&mut harness.state, &mut harness.host, &[op], Address::ZERO)
        .unwrap_err();

    assert_eq!(err, BatchError::InvalidCollector(Address::ZERO));
    assert_eq!(harness.counter(), U256::ZERO);
    assert_eq!(harness.balance_of(sender), U256::from(ETHER));
}

#[rstest]
#[case::no_penalty(0, 48_700)]
#[case::default_penalty(10, 48_700 + 17_530)]
#[case::full_penalty(100, 48_700 + 175_300)]
fn test_unused_gas_penalty_follows_config(#[case] percent: u64, #[case] gas: u64) {
    let config = EntryPointConfig::default().with_unused_gas_penalty_percent(percent);
    let mut harness = TestHarness::with_config(config);
    let sender = funded_account(&mut harness, &ALICE);
    let op = harness.increment_op(sender, &ALICE, 0);

    let result = harness.process(&[op]);

    assert_eq!(result.outcomes[0].gas_used, gas);
    assert_eq!(result.collected, U256::from(gas as u128 * GWEI));
}
