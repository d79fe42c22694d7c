//! End-to-end batch scenarios against the reference capabilities.

pub use std::sync::Arc;

pub use alloy_primitives::{Address, Bytes, U256, address};
pub use base_account_abstraction::{EntryPointEvent, UserOperation, encode_batch, encode_operation};
pub use base_entrypoint::{
    BatchError, Entity, EntryPointConfig, OperationError, OperationState,
};
pub use base_entrypoint_test_utils::{
    ALICE, BOB, Behavior, COLLECTOR, COUNTER, CHARLIE, Call, Counter, ETHER, FACTORY, GWEI,
    MisbehavingAccount, MisbehavingPaymaster, PAYMASTER, PolicyPaymaster, SimpleAccount,
    SimpleAccountFactory, TestAccount, TestHarness, init_test_tracing,
};

mod batch;
mod deployment;
mod invariants;
mod service;
mod sponsorship;

/// Deploys an account for `owner` and deposits one ether for it.
pub fn funded_account(harness: &mut TestHarness, owner: &TestAccount) -> Address {
    let sender = harness.deploy_account(owner);
    harness.deposit(sender, U256::from(ETHER));
    sender
}

/// Events of the batch that belong to `op_hash`.
pub fn events_for(events: &[EntryPointEvent], op_hash: alloy_primitives::B256) -> Vec<&EntryPointEvent> {
    events.iter().filter(|event| event.user_op_hash() == Some(&op_hash)).collect()
}
