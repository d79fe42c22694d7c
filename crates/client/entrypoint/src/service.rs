//! Shared entry point guarding one state and host.
//!
//! Submitters may call from any thread. Batches and ledger calls are applied one
//! at a time under a single lock, so every call sees the effects of the calls
//! applied before it and nothing in between.

use alloy_primitives::{Address, U256};
use base_account_abstraction::{EntryPointEvent, UserOperation};
use parking_lot::Mutex;

use crate::{
    dispatcher::{BatchResult, EntryPoint, ValidationResult},
    error::{BatchError, LedgerError, OperationError},
    host::Host,
    ledger::StakeInfo,
    state::EntryPointState,
};

#[derive(Debug)]
struct Shared<H> {
    state: EntryPointState,
    host: H,
}

/// An [`EntryPoint`] bound to its state and host.
#[derive(Debug)]
pub struct EntryPointService<H> {
    entry_point: EntryPoint,
    shared: Mutex<Shared<H>>,
}

impl<H: Host> EntryPointService<H> {
    /// Creates a service owning `state` and `host`.
    pub fn new(entry_point: EntryPoint, state: EntryPointState, host: H) -> Self {
        Self { entry_point, shared: Mutex::new(Shared { state, host }) }
    }

    /// The wrapped entry point.
    pub const fn entry_point(&self) -> &EntryPoint {
        &self.entry_point
    }

    /// Applies a batch of decoded operations.
    pub fn process_batch(
        &self,
        ops: &[UserOperation],
        collector: Address,
    ) -> Result<BatchResult, BatchError> {
        let mut shared = self.shared.lock();
        let Shared { state, host } = &mut *shared;
        self.entry_point.process_batch(state, host, ops, collector)
    }

    /// Applies an encoded batch envelope.
    pub fn process_encoded_batch(
        &self,
        envelope: &[u8],
        collector: Address,
    ) -> Result<BatchResult, BatchError> {
        let mut shared = self.shared.lock();
        let Shared { state, host } = &mut *shared;
        self.entry_point.process_encoded_batch(state, host, envelope, collector)
    }

    /// Dry-runs validation of `op` against the current state.
    pub fn simulate_validation(&self, op: &UserOperation) -> Result<ValidationResult, OperationError> {
        let mut shared = self.shared.lock();
        let Shared { state, host } = &mut *shared;
        self.entry_point.simulate_validation(state, host, op)
    }

    /// See [`EntryPoint::deposit_to`].
    pub fn deposit_to(
        &self,
        from: Address,
        account: Address,
        amount: U256,
    ) -> Result<EntryPointEvent, LedgerError> {
        let mut shared = self.shared.lock();
        let Shared { state, host } = &mut *shared;
        self.entry_point.deposit_to(state, host, from, account, amount)
    }

    /// See [`EntryPoint::withdraw_to`].
    pub fn withdraw_to(
        &self,
        account: Address,
        withdraw_address: Address,
        amount: U256,
    ) -> Result<EntryPointEvent, LedgerError> {
        let mut shared = self.shared.lock();
        let Shared { state, host } = &mut *shared;
        self.entry_point.withdraw_to(state, host, account, withdraw_address, amount)
    }

    /// See [`EntryPoint::add_stake`].
    pub fn add_stake(
        &self,
        account: Address,
        amount: U256,
        unstake_delay_sec: u32,
    ) -> Result<EntryPointEvent, LedgerError> {
        let mut shared = self.shared.lock();
        let Shared { state, host } = &mut *shared;
        self.entry_point.add_stake(state, host, account, amount, unstake_delay_sec)
    }

    /// See [`EntryPoint::unlock_stake`].
    pub fn unlock_stake(&self, account: Address) -> Result<EntryPointEvent, LedgerError> {
        let mut shared = self.shared.lock();
        let Shared { state, host } = &mut *shared;
        self.entry_point.unlock_stake(state, &*host, account)
    }

    /// See [`EntryPoint::withdraw_stake`].
    pub fn withdraw_stake(
        &self,
        account: Address,
        withdraw_address: Address,
    ) -> Result<EntryPointEvent, LedgerError> {
        let mut shared = self.shared.lock();
        let Shared { state, host } = &mut *shared;
        self.entry_point.withdraw_stake(state, host, account, withdraw_address)
    }

    /// Deposit of `account`.
    pub fn balance_of(&self, account: Address) -> U256 {
        self.shared.lock().state.deposits.balance_of(account)
    }

    /// Stake of `account`.
    pub fn stake_of(&self, account: Address) -> StakeInfo {
        self.shared.lock().state.deposits.stake_of(account)
    }

    /// Next nonce of `sender` under `key`.
    pub fn get_nonce(&self, sender: Address, key: U256) -> U256 {
        self.shared.lock().state.nonces.get_nonce(sender, key)
    }

    /// Skips the current sequence of `sender` under `key`.
    pub fn increment_nonce(&self, sender: Address, key: U256) {
        self.shared.lock().state.nonces.increment_nonce(sender, key);
    }

    /// Copy of the current state, e.g. for a JSON snapshot.
    pub fn snapshot(&self) -> EntryPointState {
        self.shared.lock().state.clone()
    }

    /// Runs `f` with exclusive access to the host.
    pub fn with_host<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.shared.lock().host)
    }

    /// Consumes the service, returning its state and host.
    pub fn into_parts(self) -> (EntryPointState, H) {
        let Shared { state, host } = self.shared.into_inner();
        (state, host)
    }
}
