//! Property tests over random batches.

use std::collections::HashSet;

use base_entrypoint::Host;
use proptest::{collection::vec, prelude::*};

use super::*;

#[derive(Debug, Clone, Copy)]
enum Action {
    Increment,
    Forged,
    Fail,
    Replay,
    Oversized,
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => Just(Action::Increment),
        1 => Just(Action::Forged),
        1 => Just(Action::Fail),
        1 => Just(Action::Replay),
        1 => Just(Action::Oversized),
    ]
}

fn build_batch(harness: &TestHarness, sender: Address, actions: &[Action]) -> Vec<UserOperation> {
    let fail = SimpleAccount::execute_call(COUNTER, U256::ZERO, Counter::fail_call());
    let mut nonce = 0u64;
    let mut ops: Vec<UserOperation> = Vec::new();
    for action in actions {
        let op = match action {
            Action::Increment => {
                nonce += 1;
                harness.increment_op(sender, &ALICE, nonce - 1)
            }
            Action::Forged => harness.increment_op(sender, &BOB, nonce),
            Action::Fail => {
                nonce += 1;
                let builder = harness.op(sender).nonce(U256::from(nonce - 1)).call_data(fail.clone());
                harness.sign(builder, &ALICE)
            }
            Action::Replay => match ops.last() {
                Some(last) => last.clone(),
                None => continue,
            },
            Action::Oversized => {
                let builder = harness.op(sender).nonce(U256::from(nonce)).call_gas(30_000_000);
                harness.sign(builder, &ALICE)
            }
        };
        ops.push(op);
    }
    ops
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_random_batches_conserve_value(
        actions in vec(action(), 1..10),
        deposit_gwei in 0u128..1_000_000,
    ) {
        let mut harness = TestHarness::new();
        let sender = harness.deploy_account(&ALICE);
        let deposit = U256::from(deposit_gwei * GWEI);
        harness.deposit(sender, deposit);
        let ops = build_batch(&harness, sender, &actions);

        let result = harness.process(&ops);

        let charged = result.outcomes.iter().fold(U256::ZERO, |acc, outcome| acc + outcome.actual_gas_cost);
        prop_assert_eq!(charged, result.collected);
        prop_assert_eq!(harness.native_balance(COLLECTOR), result.collected);
        prop_assert_eq!(harness.balance_of(sender) + charged, deposit);
        prop_assert_eq!(harness.surplus(), U256::ZERO);
        prop_assert_eq!(harness.counter(), U256::from(result.succeeded()));

        let mut settled = HashSet::new();
        for event in &result.events {
            if let EntryPointEvent::UserOperationEvent { user_op_hash, .. } = event {
                prop_assert!(settled.insert(*user_op_hash), "operation {} settled twice", user_op_hash);
            }
        }
        for outcome in &result.outcomes {
            prop_assert!(outcome.state.is_terminal());
        }
    }

    #[test]
    fn test_cost_follows_effective_gas_price(
        max_fee in 1u128..1_000,
        priority_share in 0u128..=100,
        base_fee in 0u128..2_000,
    ) {
        let max_fee = max_fee * GWEI;
        let priority = max_fee * priority_share / 100;
        let base_fee = base_fee * GWEI;

        let mut harness = TestHarness::new();
        let mut block = harness.host.block();
        block.base_fee = base_fee;
        harness.host.set_block(block);
        let sender = funded_account(&mut harness, &ALICE);
        let call = SimpleAccount::execute_call(COUNTER, U256::ZERO, Counter::increment_call());
        let op = harness.sign(harness.op(sender).call_data(call).fees(max_fee, priority), &ALICE);

        let result = harness.process(&[op]);

        let outcome = &result.outcomes[0];
        prop_assert!(outcome.success);
        let price = if max_fee == priority { max_fee } else { (base_fee + priority).min(max_fee) };
        prop_assert_eq!(outcome.actual_gas_cost, U256::from(outcome.gas_used) * U256::from(price));
        prop_assert_eq!(harness.balance_of(sender), U256::from(ETHER) - outcome.actual_gas_cost);
    }
}
