//! Reference capabilities.
//!
//! Calls use real ABI encodings generated with `sol!`, so call data built for these
//! capabilities is the same call data a deployed contract would accept.

use std::{collections::HashSet, sync::Arc};

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_sol_types::{SolCall, SolInterface, SolValue, sol};
use base_account_abstraction::{SIG_VALIDATION_FAILED, UserOpHash, UserOperation, ValidationData};
use base_entrypoint::{
    Account, CallContext, CallError, CallResult, Contract, Deployment, EcdsaVerifier, Factory,
    Host, Paymaster, SignatureVerifier, Sponsorship, gas::ECRECOVER_GAS,
};

sol! {
    /// Counter contract interface.
    interface ICounter {
        function increment() external;
        function count() external view returns (uint256);
        function fail() external;
    }

    /// Call interface of [`SimpleAccount`].
    interface ISimpleAccount {
        struct Call {
            address target;
            uint256 value;
            bytes data;
        }

        function execute(address dest, uint256 value, bytes func) external;
        function executeBatch(Call[] calls) external;
    }

    /// Call interface of [`SimpleAccountFactory`].
    interface ISimpleAccountFactory {
        function createAccount(address owner, uint256 salt) external returns (address);
    }
}

pub use ICounter::ICounterCalls;
pub use ISimpleAccount::{Call, ISimpleAccountCalls};

/// Storage slot of the counter value.
pub const COUNT_SLOT: U256 = U256::ZERO;

/// A counter with `increment()`, `count()` and an always-reverting `fail()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counter;

impl Counter {
    /// Current count of the counter deployed at `address`.
    pub fn count(host: &dyn Host, address: Address) -> U256 {
        host.storage(address, COUNT_SLOT)
    }

    /// Call data for `increment()`.
    pub fn increment_call() -> Bytes {
        ICounter::incrementCall {}.abi_encode().into()
    }

    /// Call data for `fail()`.
    pub fn fail_call() -> Bytes {
        ICounter::failCall {}.abi_encode().into()
    }
}

impl Contract for Counter {
    fn call(&self, ctx: &mut CallContext<'_>, data: &Bytes, _value: U256) -> CallResult<Bytes> {
        match ICounterCalls::abi_decode(data) {
            Ok(ICounterCalls::increment(_)) => {
                let count = ctx.sload(COUNT_SLOT)?;
                ctx.sstore(COUNT_SLOT, count + U256::from(1))?;
                Ok(Bytes::new())
            }
            Ok(ICounterCalls::count(_)) => Ok(ctx.sload(COUNT_SLOT)?.abi_encode().into()),
            Ok(ICounterCalls::fail(_)) => Err(CallError::revert("Counter: fail")),
            Err(_) => Err(CallError::revert("Counter: unknown selector")),
        }
    }
}

/// Account owned by one ECDSA key.
///
/// Validation checks the owner's signature over the operation hash and pays any
/// missing funds from the account's native balance. Execution accepts
/// `execute(dest, value, func)` and the all-or-nothing `executeBatch(Call[])`.
#[derive(Debug, Clone)]
pub struct SimpleAccount {
    owner: Address,
    verifier: Arc<dyn SignatureVerifier>,
    window: ValidationData,
}

impl SimpleAccount {
    /// An account owned by `owner` with no validity window.
    pub fn new(owner: Address) -> Self {
        Self { owner, verifier: Arc::new(EcdsaVerifier), window: ValidationData::valid() }
    }

    /// Restricts every operation to `(valid_after, valid_until]`.
    pub const fn with_window(mut self, valid_after: u64, valid_until: u64) -> Self {
        self.window = ValidationData::window(valid_after, valid_until);
        self
    }

    /// The owner.
    pub const fn owner(&self) -> Address {
        self.owner
    }

    /// Call data for a single call.
    pub fn execute_call(dest: Address, value: U256, func: Bytes) -> Bytes {
        ISimpleAccount::executeCall { dest, value, func }.abi_encode().into()
    }

    /// Call data for an atomic batch of calls.
    pub fn execute_batch_call(calls: Vec<Call>) -> Bytes {
        ISimpleAccount::executeBatchCall { calls }.abi_encode().into()
    }
}

fn only_entry_point(ctx: &CallContext<'_>, who: &str) -> CallResult<()> {
    if ctx.caller() != ctx.entry_point() {
        return Err(CallError::revert(&format!("{who}: not from EntryPoint")));
    }
    Ok(())
}

impl Account for SimpleAccount {
    fn validate_operation(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        op_hash: UserOpHash,
        missing_funds: U256,
    ) -> CallResult<ValidationData> {
        only_entry_point(ctx, "account")?;
        ctx.charge_gas(ECRECOVER_GAS)?;
        let mut validation = self.window;
        if !self.verifier.verify(self.owner, op_hash, &op.signature) {
            validation.aggregator = SIG_VALIDATION_FAILED;
        }
        if !missing_funds.is_zero() {
            // A failed payment surfaces as a short deposit.
            if let Err(CallError::OutOfGas) = ctx.pay_prefund(missing_funds) {
                return Err(CallError::OutOfGas);
            }
        }
        Ok(validation)
    }

    fn execute(&self, ctx: &mut CallContext<'_>, call_data: &Bytes) -> CallResult<Bytes> {
        only_entry_point(ctx, "account")?;
        if call_data.is_empty() {
            return Ok(Bytes::new());
        }
        match ISimpleAccountCalls::abi_decode(call_data) {
            Ok(ISimpleAccountCalls::execute(call)) => ctx.call(call.dest, &call.func, call.value),
            Ok(ISimpleAccountCalls::executeBatch(batch)) => {
                for call in batch.calls {
                    ctx.call(call.target, &call.data, call.value)?;
                }
                Ok(Bytes::new())
            }
            Err(_) => Err(CallError::revert("account: unknown call")),
        }
    }
}

/// Deploys [`SimpleAccount`]s at addresses derived from the owner and a salt.
#[derive(Debug, Clone, Copy)]
pub struct SimpleAccountFactory {
    address: Address,
}

impl SimpleAccountFactory {
    /// A factory deployed at `address`.
    pub const fn new(address: Address) -> Self {
        Self { address }
    }

    /// Address the factory deploys for `(owner, salt)`.
    pub fn get_address(&self, owner: Address, salt: U256) -> Address {
        Address::from_word(keccak256((self.address, owner, salt).abi_encode()))
    }

    /// `factoryData` for `createAccount(owner, salt)`.
    pub fn create_account_call(owner: Address, salt: U256) -> Bytes {
        ISimpleAccountFactory::createAccountCall { owner, salt }.abi_encode().into()
    }
}

impl Factory for SimpleAccountFactory {
    fn create_account(
        &self,
        _ctx: &mut CallContext<'_>,
        factory_data: &Bytes,
    ) -> CallResult<Deployment> {
        let call = ISimpleAccountFactory::createAccountCall::abi_decode(factory_data)
            .map_err(|_| CallError::revert("factory: invalid createAccount call"))?;
        Ok(Deployment {
            address: self.get_address(call.owner, call.salt),
            account: Arc::new(SimpleAccount::new(call.owner)),
        })
    }
}

/// Paymaster sponsoring an allow-list of senders up to a per-sender spend cap.
///
/// Spend is tracked in the paymaster's own storage during settlement, so it
/// survives across batches and is unwound with the paymaster's other effects.
#[derive(Debug, Clone)]
pub struct PolicyPaymaster {
    allowed: HashSet<Address>,
    spend_cap: U256,
    window: ValidationData,
}

impl PolicyPaymaster {
    /// A paymaster sponsoring `allowed` senders up to `spend_cap` each.
    pub fn new(allowed: impl IntoIterator<Item = Address>, spend_cap: U256) -> Self {
        Self { allowed: allowed.into_iter().collect(), spend_cap, window: ValidationData::valid() }
    }

    /// Restricts sponsorship to `(valid_after, valid_until]`.
    pub const fn with_window(mut self, valid_after: u64, valid_until: u64) -> Self {
        self.window = ValidationData::window(valid_after, valid_until);
        self
    }

    /// Amount the paymaster at `address` has settled for `sender`.
    pub fn spent(host: &dyn Host, address: Address, sender: Address) -> U256 {
        host.storage(address, spend_slot(sender))
    }
}

fn spend_slot(sender: Address) -> U256 {
    let slot: B256 = keccak256(sender);
    U256::from_be_bytes(slot.0)
}

impl Paymaster for PolicyPaymaster {
    fn validate_sponsorship(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        _op_hash: UserOpHash,
        max_cost: U256,
    ) -> CallResult<Sponsorship> {
        only_entry_point(ctx, "paymaster")?;
        if !self.allowed.contains(&op.sender) {
            return Ok(Sponsorship {
                context: Bytes::new(),
                validation_data: ValidationData::signature_failed(),
            });
        }
        let spent = ctx.sload(spend_slot(op.sender))?;
        if spent.saturating_add(max_cost) > self.spend_cap {
            return Err(CallError::revert("paymaster: spend cap reached"));
        }
        Ok(Sponsorship { context: op.sender.abi_encode().into(), validation_data: self.window })
    }

    fn settle_sponsorship(
        &self,
        ctx: &mut CallContext<'_>,
        context: &Bytes,
        actual_gas_cost: U256,
        _success: bool,
    ) -> CallResult<()> {
        only_entry_point(ctx, "paymaster")?;
        let sender = Address::abi_decode(context)
            .map_err(|_| CallError::revert("paymaster: invalid context"))?;
        let slot = spend_slot(sender);
        let spent = ctx.sload(slot)?;
        ctx.sstore(slot, spent.saturating_add(actual_gas_cost))
    }
}

/// How a misbehaving capability handles one of its calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Behavior {
    /// Succeeds.
    #[default]
    Honest,
    /// Reverts with a message.
    Revert,
    /// Burns gas until the ceiling is hit.
    Loop,
    /// Panics.
    Panic,
}

impl Behavior {
    fn run(self, ctx: &mut CallContext<'_>, who: &str) -> CallResult<()> {
        match self {
            Self::Honest => Ok(()),
            Self::Revert => Err(CallError::revert(&format!("{who}: misbehaving"))),
            Self::Loop => loop {
                ctx.charge_gas(1_000)?;
            },
            Self::Panic => panic!("{who}: misbehaving"),
        }
    }
}

/// Account that signs nothing and misbehaves on command.
#[derive(Debug, Clone, Copy, Default)]
pub struct MisbehavingAccount {
    /// Behavior during validation.
    pub validation: Behavior,
    /// Behavior during execution.
    pub execution: Behavior,
}

impl Account for MisbehavingAccount {
    fn validate_operation(
        &self,
        ctx: &mut CallContext<'_>,
        _op: &UserOperation,
        _op_hash: UserOpHash,
        missing_funds: U256,
    ) -> CallResult<ValidationData> {
        self.validation.run(ctx, "account")?;
        if !missing_funds.is_zero() {
            ctx.pay_prefund(missing_funds)?;
        }
        Ok(ValidationData::valid())
    }

    fn execute(&self, ctx: &mut CallContext<'_>, call_data: &Bytes) -> CallResult<Bytes> {
        self.execution.run(ctx, "account")?;
        if let Ok(ISimpleAccountCalls::execute(call)) = ISimpleAccountCalls::abi_decode(call_data) {
            return ctx.call(call.dest, &call.func, call.value);
        }
        Ok(Bytes::new())
    }
}

/// Paymaster that sponsors everyone and misbehaves on command.
#[derive(Debug, Clone, Copy, Default)]
pub struct MisbehavingPaymaster {
    /// Behavior during sponsorship validation.
    pub validation: Behavior,
    /// Behavior during settlement.
    pub settlement: Behavior,
}

impl Paymaster for MisbehavingPaymaster {
    fn validate_sponsorship(
        &self,
        ctx: &mut CallContext<'_>,
        _op: &UserOperation,
        _op_hash: UserOpHash,
        _max_cost: U256,
    ) -> CallResult<Sponsorship> {
        self.validation.run(ctx, "paymaster")?;
        Ok(Sponsorship::default())
    }

    fn settle_sponsorship(
        &self,
        ctx: &mut CallContext<'_>,
        _context: &Bytes,
        _actual_gas_cost: U256,
        _success: bool,
    ) -> CallResult<()> {
        self.settlement.run(ctx, "paymaster")
    }
}
