//! Batch dispatcher.
//!
//! [`EntryPoint`] processes a batch strictly in order. Every operation runs to a
//! terminal state (validation, execution, settlement) before the next one starts, so
//! operation `i` always observes the deposits and nonces left by `0..i`.

mod execution;
mod outcome;
mod validation;

use std::collections::HashSet;

use alloy_primitives::{Address, U256};
use base_account_abstraction::{
    DecodeError, EntryPointEvent, GasFees, UserOpHash, UserOperation, decode_batch,
    decode_operation, salvage_header,
};
use metrics::{counter, histogram};
use tracing::{debug, error, info, warn};

pub use self::outcome::{BatchResult, OperationOutcome, OperationState, ValidationResult};
use self::{outcome::Lifecycle, validation::Rejection};
use crate::{
    config::{ConfigError, EntryPointConfig},
    error::{BatchError, LedgerError, OperationError},
    gas::gas_cost,
    host::{BlockEnv, Host},
    metrics::{Metrics, wei_to_gwei},
    state::EntryPointState,
};

/// An operation that failed to decode, with its sender if the head was readable.
#[derive(Debug, Clone)]
pub(crate) struct MalformedInput {
    error: DecodeError,
    sender: Option<Address>,
}

impl MalformedInput {
    fn from_raw(raw: &[u8], error: DecodeError) -> Self {
        Self { error, sender: salvage_header(raw).map(|header| header.sender) }
    }

    const fn from_operation(op: &UserOperation, error: DecodeError) -> Self {
        Self { error, sender: Some(op.sender) }
    }
}

/// The ERC-4337 v0.7 entry point.
///
/// Holds only configuration. State and host are passed into every call by
/// exclusive reference, so one instance can serve any number of ledgers.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    config: EntryPointConfig,
}

impl EntryPoint {
    /// Creates an entry point, validating the configuration.
    pub fn new(config: EntryPointConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The active configuration.
    pub const fn config(&self) -> &EntryPointConfig {
        &self.config
    }

    /// Address of the entry point inside the host.
    pub const fn address(&self) -> Address {
        self.config.entry_point
    }

    /// Computes the hash accounts sign for `op`.
    pub fn get_user_op_hash(&self, op: &UserOperation) -> Result<UserOpHash, DecodeError> {
        op.hash(self.config.entry_point, self.config.chain_id)
    }

    /// Processes a batch of decoded operations and pays the collected gas cost to
    /// `collector`.
    pub fn process_batch(
        &self,
        state: &mut EntryPointState,
        host: &mut dyn Host,
        ops: &[UserOperation],
        collector: Address,
    ) -> Result<BatchResult, BatchError> {
        check_collector(collector)?;
        self.run(state, host, ops.iter().cloned().map(Ok).collect(), collector)
    }

    /// Processes an `abi.encode(bytes[])` batch envelope.
    ///
    /// A corrupt envelope rejects the batch. A corrupt element only fails its own
    /// operation.
    pub fn process_encoded_batch(
        &self,
        state: &mut EntryPointState,
        host: &mut dyn Host,
        envelope: &[u8],
        collector: Address,
    ) -> Result<BatchResult, BatchError> {
        check_collector(collector)?;
        let encoded = decode_batch(envelope).inspect_err(|err| {
            counter!(Metrics::BATCHES_REJECTED).increment(1);
            warn!(target: "entrypoint", %err, "rejecting batch with corrupt envelope");
        })?;
        let inputs = encoded
            .iter()
            .map(|raw| decode_operation(raw).map_err(|err| MalformedInput::from_raw(raw, err)))
            .collect();
        self.run(state, host, inputs, collector)
    }

    /// Runs the validation phase of `op` without keeping any of its effects.
    pub fn simulate_validation(
        &self,
        state: &EntryPointState,
        host: &mut dyn Host,
        op: &UserOperation,
    ) -> Result<ValidationResult, OperationError> {
        let hash = self.get_user_op_hash(op)?;
        let limits = self.config.gas_limits(op)?;
        let fees = op.gas_fees()?;

        let mut scratch = state.clone();
        let checkpoint = host.checkpoint();
        let block = host.block();
        let result = {
            let mut run = BatchRun::new(&self.config, &mut scratch, &mut *host, block);
            run.validate(op, hash, limits, fees)
        };
        host.revert_to(checkpoint);

        match result {
            Ok(validated) => Ok(ValidationResult {
                user_op_hash: hash,
                prefund: validated.prefund,
                pre_op_gas: validated.pre_op_gas,
                account_validation: validated.account_validation,
                sponsor_validation: validated
                    .sponsor
                    .as_ref()
                    .map(|sponsor| sponsor.sponsorship.validation_data),
                sponsor_context: validated
                    .sponsor
                    .map(|sponsor| sponsor.sponsorship.context)
                    .unwrap_or_default(),
            }),
            Err(Rejection::Unauthorized { error, .. } | Rejection::Authorized { error, .. }) => {
                Err(error)
            }
        }
    }

    /// Moves `amount` from `from`'s native balance into `account`'s deposit.
    pub fn deposit_to(
        &self,
        state: &mut EntryPointState,
        host: &mut dyn Host,
        from: Address,
        account: Address,
        amount: U256,
    ) -> Result<EntryPointEvent, LedgerError> {
        if account.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        host.transfer(from, self.address(), amount)?;
        let total_deposit = state.deposits.credit(account, amount);
        debug!(target: "entrypoint::ledger", %account, %amount, %total_deposit, "deposited");
        Ok(EntryPointEvent::Deposited { account, total_deposit })
    }

    /// Withdraws `amount` of `account`'s deposit to `withdraw_address`.
    pub fn withdraw_to(
        &self,
        state: &mut EntryPointState,
        host: &mut dyn Host,
        account: Address,
        withdraw_address: Address,
        amount: U256,
    ) -> Result<EntryPointEvent, LedgerError> {
        if withdraw_address.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        state.deposits.debit(account, amount)?;
        if let Err(err) = host.transfer(self.address(), withdraw_address, amount) {
            state.deposits.credit(account, amount);
            return Err(err.into());
        }
        debug!(target: "entrypoint::ledger", %account, %withdraw_address, %amount, "withdrawn");
        Ok(EntryPointEvent::Withdrawn { account, withdraw_address, amount })
    }

    /// Locks `amount` from `account`'s native balance as stake.
    pub fn add_stake(
        &self,
        state: &mut EntryPointState,
        host: &mut dyn Host,
        account: Address,
        amount: U256,
        unstake_delay_sec: u32,
    ) -> Result<EntryPointEvent, LedgerError> {
        let checkpoint = host.checkpoint();
        if let Err(err) = host.transfer(account, self.address(), amount) {
            host.revert_to(checkpoint);
            return Err(err.into());
        }
        match state.deposits.lock_stake(account, amount, unstake_delay_sec) {
            Ok(info) => {
                host.commit(checkpoint);
                debug!(target: "entrypoint::ledger", %account, stake = %info.stake, unstake_delay_sec, "stake locked");
                Ok(EntryPointEvent::StakeLocked {
                    account,
                    total_staked: info.stake,
                    unstake_delay_sec: info.unstake_delay_sec,
                })
            }
            Err(err) => {
                host.revert_to(checkpoint);
                Err(err)
            }
        }
    }

    /// Starts the unstake delay of `account`'s stake.
    pub fn unlock_stake(
        &self,
        state: &mut EntryPointState,
        host: &dyn Host,
        account: Address,
    ) -> Result<EntryPointEvent, LedgerError> {
        let withdraw_time = state.deposits.unlock_stake(account, host.block().timestamp)?;
        debug!(target: "entrypoint::ledger", %account, withdraw_time, "stake unlocking");
        Ok(EntryPointEvent::StakeUnlocked { account, withdraw_time })
    }

    /// Sends `account`'s unlocked stake to `withdraw_address` once the delay passed.
    pub fn withdraw_stake(
        &self,
        state: &mut EntryPointState,
        host: &mut dyn Host,
        account: Address,
        withdraw_address: Address,
    ) -> Result<EntryPointEvent, LedgerError> {
        if withdraw_address.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let info = state.deposits.stake_of(account);
        let amount = state.deposits.withdraw_stake(account, host.block().timestamp)?;
        if let Err(err) = host.transfer(self.address(), withdraw_address, amount) {
            state.deposits.restore_stake(account, info);
            return Err(err.into());
        }
        debug!(target: "entrypoint::ledger", %account, %withdraw_address, %amount, "stake withdrawn");
        Ok(EntryPointEvent::StakeWithdrawn { account, withdraw_address, amount })
    }

    fn run(
        &self,
        state: &mut EntryPointState,
        host: &mut dyn Host,
        inputs: Vec<Result<UserOperation, MalformedInput>>,
        collector: Address,
    ) -> Result<BatchResult, BatchError> {
        let block = host.block();
        let mut run = BatchRun::new(&self.config, state, &mut *host, block);
        let outcomes: Vec<_> = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| run.process(index, input))
            .collect();
        let BatchRun { collected, events, .. } = run;

        let paid_to_collector = match host.transfer(self.address(), collector, collected) {
            Ok(()) => collected,
            Err(err) => {
                error!(target: "entrypoint", %err, %collector, %collected, "collector payout failed");
                U256::ZERO
            }
        };

        counter!(Metrics::BATCHES).increment(1);
        counter!(Metrics::GAS_COLLECTED).increment(wei_to_gwei(paid_to_collector));

        let result = BatchResult {
            outcomes,
            collector,
            collected,
            paid_to_collector,
            events,
            block,
        };
        info!(
            target: "entrypoint",
            block = block.number,
            operations = result.outcomes.len(),
            succeeded = result.succeeded(),
            %collector,
            collected = %result.collected,
            "processed batch"
        );
        Ok(result)
    }
}

fn check_collector(collector: Address) -> Result<(), BatchError> {
    if collector.is_zero() {
        counter!(Metrics::BATCHES_REJECTED).increment(1);
        warn!(target: "entrypoint", "rejecting batch with zero collector");
        return Err(BatchError::InvalidCollector(collector));
    }
    Ok(())
}

/// Mutable context of one batch application.
pub(crate) struct BatchRun<'a> {
    config: &'a EntryPointConfig,
    state: &'a mut EntryPointState,
    host: &'a mut dyn Host,
    block: BlockEnv,
    seen: HashSet<UserOpHash>,
    collected: U256,
    events: Vec<EntryPointEvent>,
}

impl<'a> BatchRun<'a> {
    fn new(
        config: &'a EntryPointConfig,
        state: &'a mut EntryPointState,
        host: &'a mut dyn Host,
        block: BlockEnv,
    ) -> Self {
        Self {
            config,
            state,
            host,
            block,
            seen: HashSet::new(),
            collected: U256::ZERO,
            events: Vec::new(),
        }
    }

    fn process(
        &mut self,
        index: usize,
        input: Result<UserOperation, MalformedInput>,
    ) -> OperationOutcome {
        let mut lifecycle = Lifecycle::new();
        let checked = input.and_then(|op| {
            let checks = op
                .hash(self.config.entry_point, self.config.chain_id)
                .and_then(|hash| Ok((hash, self.config.gas_limits(&op)?, op.gas_fees()?)));
            match checks {
                Ok((hash, limits, fees)) => Ok((op, hash, limits, fees)),
                Err(err) => Err(MalformedInput::from_operation(&op, err)),
            }
        });
        let (op, hash, limits, fees) = match checked {
            Ok(checked) => checked,
            Err(malformed) => return self.reject_malformed(index, malformed, lifecycle),
        };

        lifecycle.advance(OperationState::Validating);
        debug!(target: "entrypoint", index, sender = %op.sender, %hash, "validating operation");

        let outcome = match self.validate(&op, hash, limits, fees) {
            Ok(validated) => {
                lifecycle.advance(OperationState::Validated);
                self.execute_and_settle(index, &op, validated, lifecycle)
            }
            Err(rejection) => self.reject(index, &op, hash, fees, rejection, lifecycle),
        };
        record_outcome(&outcome);
        outcome
    }

    /// Records an operation that could not be decoded or bounded.
    ///
    /// Nothing is charged: no signature has been checked, so the named sender
    /// never authorized a debit.
    fn reject_malformed(
        &mut self,
        index: usize,
        malformed: MalformedInput,
        mut lifecycle: Lifecycle,
    ) -> OperationOutcome {
        let MalformedInput { error, sender } = malformed;
        warn!(target: "entrypoint", index, ?sender, %error, "malformed operation");
        lifecycle.advance(OperationState::BatchAborted);
        let outcome = OperationOutcome {
            index,
            user_op_hash: None,
            sender,
            state: lifecycle.state(),
            transitions: lifecycle.into_transitions(),
            success: false,
            gas_used: 0,
            actual_gas_cost: U256::ZERO,
            error: Some(error.into()),
        };
        record_outcome(&outcome);
        outcome
    }

    /// Records a validation failure, charging the sender if it authorized the operation.
    fn reject(
        &mut self,
        index: usize,
        op: &UserOperation,
        hash: UserOpHash,
        fees: GasFees,
        rejection: Rejection,
        mut lifecycle: Lifecycle,
    ) -> OperationOutcome {
        lifecycle.advance(OperationState::Reverted);
        let (error, gas_used, actual_gas_cost) = match rejection {
            Rejection::Unauthorized { error } => (error, 0, U256::ZERO),
            Rejection::Authorized { error, gas_used } => {
                let price = fees.effective_gas_price(self.block.base_fee);
                let taken = self.state.deposits.debit_up_to(op.sender, gas_cost(gas_used, price));
                self.collected += taken;
                self.events.push(EntryPointEvent::UserOperationEvent {
                    user_op_hash: hash,
                    sender: op.sender,
                    paymaster: op.paymaster.unwrap_or_default(),
                    nonce: op.nonce,
                    success: false,
                    actual_gas_cost: taken,
                    actual_gas_used: gas_used,
                });
                (error, gas_used, taken)
            }
        };
        warn!(
            target: "entrypoint",
            index,
            sender = %op.sender,
            %hash,
            code = error.code().unwrap_or_default(),
            %error,
            "operation failed validation"
        );
        OperationOutcome {
            index,
            user_op_hash: Some(hash),
            sender: Some(op.sender),
            state: lifecycle.state(),
            transitions: lifecycle.into_transitions(),
            success: false,
            gas_used,
            actual_gas_cost,
            error: Some(error),
        }
    }

    /// Credits value sent to the entry point during a kept capability invocation.
    fn apply_deposits(&mut self, deposits: Vec<(Address, U256)>) {
        for (account, amount) in deposits {
            let total_deposit = self.state.deposits.credit(account, amount);
            self.events.push(EntryPointEvent::Deposited { account, total_deposit });
        }
    }
}

fn record_outcome(outcome: &OperationOutcome) {
    let label = outcome.error.as_ref().map_or(Metrics::SUCCESS_LABEL, OperationError::label);
    counter!(Metrics::OPERATIONS, "outcome" => label).increment(1);
    histogram!(Metrics::OPERATION_GAS_USED).record(outcome.gas_used as f64);
}
