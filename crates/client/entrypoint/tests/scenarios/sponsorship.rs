//! Paymaster-sponsored operations.

use super::*;

const NOW: u64 = 1_700_000_000;

fn sponsored_op(harness: &TestHarness, sender: Address) -> UserOperation {
    let call = SimpleAccount::execute_call(COUNTER, U256::ZERO, Counter::increment_call());
    harness.sign(harness.op(sender).call_data(call).paymaster(PAYMASTER), &ALICE)
}

fn policy(sender: Address) -> Arc<PolicyPaymaster> {
    Arc::new(PolicyPaymaster::new([sender], U256::from(ETHER)))
}

#[test]
fn test_sponsor_pays_for_operation() {
    let mut harness = TestHarness::new();
    let sender = harness.deploy_account(&ALICE);
    harness.register_paymaster(PAYMASTER, policy(sender), U256::from(ETHER));
    let op = sponsored_op(&harness, sender);

    let result = harness.process(&[op]);

    let outcome = &result.outcomes[0];
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(harness.counter(), U256::from(1));
    assert_eq!(harness.balance_of(sender), U256::ZERO);
    assert_eq!(harness.balance_of(PAYMASTER), U256::from(ETHER) - outcome.actual_gas_cost);

    // account and sponsor validation, then execution, then settlement
    let pre_op = 21_000 + 3_000 + 2_100;
    let execution = 2_600 + 2_100 + 20_000;
    let post_op = 2_100 + 20_000;
    let penalty = (200_000 + 60_000 - execution - post_op) / 10;
    assert_eq!(outcome.gas_used, pre_op + execution + post_op + penalty);

    // Settlement sees the cost up to the end of execution.
    let settled = PolicyPaymaster::spent(&harness.host, PAYMASTER, sender);
    assert_eq!(settled, U256::from((pre_op + execution) as u128 * GWEI));
    assert_eq!(harness.surplus(), U256::ZERO);
}

#[test]
fn test_sponsor_declines_unknown_sender() {
    let mut harness = TestHarness::new();
    let sender = funded_account(&mut harness, &ALICE);
    harness.register_paymaster(PAYMASTER, policy(BOB.address), U256::from(ETHER));
    let op = sponsored_op(&harness, sender);

    let result = harness.process(&[op]);

    let outcome = &result.outcomes[0];
    assert_eq!(outcome.error, Some(OperationError::SponsorRejected));
    assert_eq!(harness.balance_of(PAYMASTER), U256::from(ETHER));
    assert_eq!(harness.counter(), U256::ZERO);
    // Authorized by the account, so the nonce is spent and the sender pays for validation.
    assert_eq!(harness.state.nonces.get_nonce(sender, U256::ZERO), U256::from(1));
    assert_eq!(
        harness.balance_of(sender),
        U256::from(ETHER) - U256::from(outcome.gas_used as u128 * GWEI)
    );
    assert_eq!(harness.surplus(), U256::ZERO);
}

#[test]
fn test_spend_cap_reverts_sponsor_validation() {
    let mut harness = TestHarness::new();
    let sender = harness.deploy_account(&ALICE);
    let paymaster = PolicyPaymaster::new([sender], U256::from(1_000 * GWEI));
    harness.register_paymaster(PAYMASTER, Arc::new(paymaster), U256::from(ETHER));
    let op = sponsored_op(&harness, sender);

    let result = harness.process(&[op]);

    let error = result.outcomes[0].error.as_ref().expect("sponsor should revert");
    assert_eq!(error.code(), Some("AA33"));
    assert!(error.to_string().contains("paymaster: spend cap reached"));
    assert_eq!(harness.balance_of(PAYMASTER), U256::from(ETHER));
}

#[test]
fn test_sponsor_window_expired() {
    let mut harness = TestHarness::new();
    let sender = harness.deploy_account(&ALICE);
    let paymaster = PolicyPaymaster::new([sender], U256::from(ETHER)).with_window(0, NOW - 1);
    harness.register_paymaster(PAYMASTER, Arc::new(paymaster), U256::from(ETHER));
    let op = sponsored_op(&harness, sender);

    let result = harness.process(&[op]);

    assert_eq!(
        result.outcomes[0].error,
        Some(OperationError::OperationExpired { entity: Entity::Sponsor })
    );
    assert_eq!(harness.balance_of(PAYMASTER), U256::from(ETHER));
}

#[test]
fn test_sponsor_deposit_too_low() {
    let mut harness = TestHarness::new();
    let sender = harness.deploy_account(&ALICE);
    harness.register_paymaster(PAYMASTER, policy(sender), U256::from(GWEI));
    let op = sponsored_op(&harness, sender);

    let result = harness.process(&[op]);

    let error = result.outcomes[0].error.as_ref().expect("sponsor cannot cover prefund");
    assert!(matches!(error, OperationError::InsufficientBalance { entity: Entity::Sponsor, .. }));
    assert_eq!(error.code(), Some("AA31"));
    assert_eq!(harness.balance_of(PAYMASTER), U256::from(GWEI));
}

#[test]
fn test_sponsor_without_stake_is_invalid() {
    let mut harness = TestHarness::new();
    let sender = harness.deploy_account(&ALICE);
    harness.install_paymaster(PAYMASTER, policy(sender));
    harness.deposit(PAYMASTER, U256::from(ETHER));
    let op = sponsored_op(&harness, sender);

    let result = harness.process(&[op]);

    assert!(matches!(
        result.outcomes[0].error,
        Some(OperationError::InvalidSponsor { sponsor, .. }) if sponsor == PAYMASTER
    ));
    assert_eq!(harness.balance_of(PAYMASTER), U256::from(ETHER));
}

#[test]
fn test_unlocking_sponsor_is_invalid() {
    let mut harness = TestHarness::new();
    let sender = harness.deploy_account(&ALICE);
    harness.register_paymaster(PAYMASTER, policy(sender), U256::from(ETHER));
    harness.entry_point.unlock_stake(&mut harness.state, &harness.host, PAYMASTER).unwrap();
    let op = sponsored_op(&harness, sender);

    let result = harness.process(&[op]);

    assert_eq!(result.outcomes[0].error.as_ref().and_then(OperationError::code), Some("AA30"));
}

#[test]
fn test_undeployed_sponsor_is_invalid() {
    let mut harness = TestHarness::new();
    let sender = funded_account(&mut harness, &ALICE);
    let op = sponsored_op(&harness, sender);

    let result = harness.process(&[op]);

    assert_eq!(
        result.outcomes[0].error,
        Some(OperationError::InvalidSponsor { sponsor: PAYMASTER, reason: "not deployed" })
    );
}

#[test]
fn test_settlement_revert_unwinds_execution() {
    let mut harness = TestHarness::new();
    let sender = harness.deploy_account(&ALICE);
    let paymaster = MisbehavingPaymaster { settlement: Behavior::Revert, ..Default::default() };
    harness.register_paymaster(PAYMASTER, Arc::new(paymaster), U256::from(ETHER));
    let op = sponsored_op(&harness, sender);
    let op_hash = harness.entry_point.get_user_op_hash(&op).unwrap();

    let result = harness.process(&[op]);

    let outcome = &result.outcomes[0];
    assert!(matches!(outcome.error, Some(OperationError::PostOpReverted(_))));
    assert_eq!(outcome.error.as_ref().and_then(OperationError::code), Some("AA50"));
    assert_eq!(
        outcome.transitions,
        vec![
            OperationState::Decoded,
            OperationState::Validating,
            OperationState::Validated,
            OperationState::Executing,
            OperationState::Executed,
            OperationState::Reverted,
        ]
    );
    assert_eq!(harness.counter(), U256::ZERO);
    assert_eq!(harness.balance_of(PAYMASTER), U256::from(ETHER) - outcome.actual_gas_cost);
    assert!(!outcome.actual_gas_cost.is_zero());

    let events = events_for(&result.events, op_hash);
    assert!(matches!(events[0], EntryPointEvent::PostOpRevertReason { .. }));
    assert!(matches!(events[1], EntryPointEvent::UserOperationEvent { success: false, .. }));
    assert_eq!(harness.surplus(), U256::ZERO);
}

#[test]
fn test_failing_sponsor_does_not_affect_neighbours() {
    let mut harness = TestHarness::new();
    let alice = harness.deploy_account(&ALICE);
    let bob = funded_account(&mut harness, &BOB);
    let paymaster = MisbehavingPaymaster { validation: Behavior::Panic, ..Default::default() };
    harness.register_paymaster(PAYMASTER, Arc::new(paymaster), U256::from(ETHER));
    let ops = [sponsored_op(&harness, alice), harness.increment_op(bob, &BOB, 0)];

    let result = harness.process(&ops);

    assert_eq!(result.outcomes[0].error.as_ref().and_then(OperationError::code), Some("AA33"));
    assert!(result.outcomes[1].success);
    assert_eq!(harness.counter(), U256::from(1));
    assert_eq!(harness.balance_of(PAYMASTER), U256::from(ETHER));
    assert_eq!(harness.surplus(), U256::ZERO);
}
