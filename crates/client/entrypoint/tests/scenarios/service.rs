//! The shared service: concurrent submitters, snapshots and ledger calls.

use std::thread;

use base_entrypoint::{
    BlockEnv, EntryPointService, EntryPointState, Host, InMemoryHost, LedgerError, Metrics,
};

use super::*;

const NOW: u64 = 1_700_000_000;

fn set_time(service: &EntryPointService<InMemoryHost>, timestamp: u64) {
    service.with_host(|host| {
        let block = host.block();
        host.set_block(BlockEnv { timestamp, number: block.number + 1, ..block });
    });
}

#[test]
fn test_concurrent_submitters_serialize() {
    init_test_tracing();
    Metrics::init();
    let mut harness = TestHarness::new();
    let owners = [ALICE, BOB, CHARLIE];
    let mut submissions = Vec::new();
    for owner in &owners {
        let sender = funded_account(&mut harness, owner);
        let ops: Vec<_> = (0..5).map(|nonce| harness.increment_op(sender, owner, nonce)).collect();
        submissions.push((sender, ops));
    }
    let service = Arc::new(harness.into_service());

    let handles: Vec<_> = submissions
        .clone()
        .into_iter()
        .map(|(_, ops)| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                for op in ops {
                    let result = service.process_batch(&[op], COLLECTOR).unwrap();
                    assert!(result.outcomes[0].success, "{:?}", result.outcomes[0].error);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(service.with_host(|host| Counter::count(host, COUNTER)), U256::from(15));
    for (sender, _) in &submissions {
        assert_eq!(service.get_nonce(*sender, U256::ZERO), U256::from(5));
    }
    let state = service.snapshot();
    let held = service.with_host(|host| host.balance(service.entry_point().address()));
    assert_eq!(held, state.deposits.total_held());
}

#[test]
fn test_snapshot_restores_nonces_and_deposits() {
    let mut harness = TestHarness::new();
    let sender = funded_account(&mut harness, &ALICE);
    let first = harness.increment_op(sender, &ALICE, 0);
    let second = harness.increment_op(sender, &ALICE, 1);
    let service = harness.into_service();
    assert!(service.process_batch(&[first.clone()], COLLECTOR).unwrap().outcomes[0].success);

    let json = service.snapshot().to_json().unwrap();
    let restored = EntryPointState::from_json(&json).unwrap();
    assert_eq!(restored, service.snapshot());

    let entry_point = service.entry_point().clone();
    let (_, host) = service.into_parts();
    let service = EntryPointService::new(entry_point, restored, host);
    let result = service.process_batch(&[first, second], COLLECTOR).unwrap();

    assert_eq!(result.outcomes[0].error, Some(OperationError::NonceInvalid));
    assert!(result.outcomes[1].success);
    assert_eq!(service.get_nonce(sender, U256::ZERO), U256::from(2));
}

#[test]
fn test_simulation_keeps_state() {
    let mut harness = TestHarness::new();
    let sender = funded_account(&mut harness, &ALICE);
    let op = harness.increment_op(sender, &ALICE, 0);
    let service = harness.into_service();
    let before = service.snapshot();

    let validation = service.simulate_validation(&op).unwrap();

    assert_eq!(validation.user_op_hash, service.entry_point().get_user_op_hash(&op).unwrap());
    assert_eq!(validation.prefund, U256::from((21_000 + 150_000 + 200_000) * GWEI));
    assert_eq!(validation.pre_op_gas, 21_000 + 3_000);
    assert_eq!(validation.sponsor_validation, None);
    assert_eq!(service.snapshot(), before);
    assert_eq!(service.with_host(|host| host.depth()), 0);
    assert!(service.process_batch(&[op], COLLECTOR).unwrap().outcomes[0].success);
}

#[test]
fn test_simulation_reports_failure() {
    let mut harness = TestHarness::new();
    let sender = funded_account(&mut harness, &ALICE);
    let forged = harness.increment_op(sender, &BOB, 0);
    let service = harness.into_service();

    assert_eq!(service.simulate_validation(&forged).unwrap_err(), OperationError::SignatureInvalid);
}

#[test]
fn test_deposit_and_withdraw() {
    let harness = TestHarness::new();
    let service = harness.into_service();
    let account = ALICE.address;
    service.with_host(|host| host.set_balance(account, U256::from(10 * ETHER)));

    let deposited = service.deposit_to(account, account, U256::from(4 * ETHER)).unwrap();
    assert_eq!(
        deposited,
        EntryPointEvent::Deposited { account, total_deposit: U256::from(4 * ETHER) }
    );

    let overdraw = service.withdraw_to(account, BOB.address, U256::from(5 * ETHER));
    assert!(matches!(overdraw, Err(LedgerError::InsufficientBalance { .. })));
    assert_eq!(
        service.withdraw_to(account, Address::ZERO, U256::from(ETHER)),
        Err(LedgerError::ZeroAddress)
    );

    service.withdraw_to(account, BOB.address, U256::from(ETHER)).unwrap();
    assert_eq!(service.balance_of(account), U256::from(3 * ETHER));
    assert_eq!(service.with_host(|host| host.balance(BOB.address)), U256::from(ETHER));
    assert_eq!(service.with_host(|host| host.balance(account)), U256::from(6 * ETHER));
}

#[test]
fn test_stake_lifecycle() {
    let harness = TestHarness::new();
    let service = harness.into_service();
    let recipient = address!("00000000000000000000000000000000000000fe");
    service.with_host(|host| host.set_balance(PAYMASTER, U256::from(2 * ETHER)));

    let locked = service.add_stake(PAYMASTER, U256::from(2 * ETHER), 100).unwrap();
    assert_eq!(
        locked,
        EntryPointEvent::StakeLocked {
            account: PAYMASTER,
            total_staked: U256::from(2 * ETHER),
            unstake_delay_sec: 100,
        }
    );
    assert_eq!(
        service.add_stake(PAYMASTER, U256::ZERO, 50),
        Err(LedgerError::UnstakeDelayDecreased { current: 100, requested: 50 })
    );
    assert_eq!(service.withdraw_stake(PAYMASTER, recipient), Err(LedgerError::StakeNotUnlocked));

    let unlocked = service.unlock_stake(PAYMASTER).unwrap();
    assert_eq!(
        unlocked,
        EntryPointEvent::StakeUnlocked { account: PAYMASTER, withdraw_time: NOW + 100 }
    );
    assert!(service.stake_of(PAYMASTER).is_unlocking());

    set_time(&service, NOW + 50);
    assert_eq!(
        service.withdraw_stake(PAYMASTER, recipient),
        Err(LedgerError::WithdrawalNotDue { withdraw_time: NOW + 100, now: NOW + 50 })
    );

    set_time(&service, NOW + 100);
    let withdrawn = service.withdraw_stake(PAYMASTER, recipient).unwrap();
    assert_eq!(
        withdrawn,
        EntryPointEvent::StakeWithdrawn {
            account: PAYMASTER,
            withdraw_address: recipient,
            amount: U256::from(2 * ETHER),
        }
    );
    assert_eq!(service.stake_of(PAYMASTER).stake, U256::ZERO);
    assert_eq!(service.with_host(|host| host.balance(recipient)), U256::from(2 * ETHER));
}

#[test]
fn test_increment_nonce_invalidates_pending_operation() {
    let mut harness = TestHarness::new();
    let sender = funded_account(&mut harness, &ALICE);
    let stale = harness.increment_op(sender, &ALICE, 0);
    let service = harness.into_service();

    service.increment_nonce(sender, U256::ZERO);

    assert_eq!(service.get_nonce(sender, U256::ZERO), U256::from(1));
    let result = service.process_batch(&[stale], COLLECTOR).unwrap();
    assert_eq!(result.outcomes[0].error, Some(OperationError::NonceInvalid));
}
