//! Capability interfaces invoked by the entry point.
//!
//! Accounts, paymasters, factories and plain contracts are untrusted code. Each
//! invocation receives a [`CallContext`] whose every host access is charged to a
//! [`GasMeter`] with a fixed ceiling, and returns a typed [`CallResult`]. Panics are
//! caught at the invocation boundary and reported as reverts.
//!
//! The ceiling is enforced only when a capability touches its context. Work done
//! in plain Rust without calling back into [`CallContext`] is neither metered nor
//! interrupted, so a capability that spins without charging gas never returns.

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use alloy_primitives::{Address, B256, Bytes, Signature, U256};
use base_account_abstraction::{UserOpHash, UserOperation, ValidationData};
use thiserror::Error;

use crate::{
    gas::{
        BALANCE_GAS, CALL_GAS, CALL_VALUE_GAS, GasMeter, SLOAD_GAS, SSTORE_RESET_GAS,
        SSTORE_SET_GAS,
    },
    host::{BlockEnv, Host},
    revert::revert_message,
};

/// Result of a capability invocation.
pub type CallResult<T> = Result<T, CallError>;

/// Failure of a capability invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The call reverted with the given payload.
    #[error("reverted")]
    Reverted(Bytes),
    /// The call exhausted its gas ceiling.
    #[error("out of gas")]
    OutOfGas,
}

impl CallError {
    /// A revert carrying `Error(message)`.
    pub fn revert(message: &str) -> Self {
        Self::Reverted(revert_message(message))
    }
}

/// Gas and pending deposits of one capability invocation, including nested calls.
#[derive(Debug, Clone, Default)]
pub struct CallFrame {
    /// Gas consumed against the invocation's ceiling.
    pub meter: GasMeter,
    /// Native value sent to the entry point, per depositor, not yet credited.
    pub deposits: Vec<(Address, U256)>,
}

impl CallFrame {
    /// Creates a frame with the given gas ceiling.
    pub const fn new(gas_limit: u64) -> Self {
        Self { meter: GasMeter::new(gas_limit), deposits: Vec::new() }
    }
}

/// Metered view of the host handed to a capability.
pub struct CallContext<'a> {
    host: &'a mut dyn Host,
    frame: &'a mut CallFrame,
    address: Address,
    caller: Address,
    entry_point: Address,
}

impl fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("address", &self.address)
            .field("caller", &self.caller)
            .field("meter", &self.frame.meter)
            .finish_non_exhaustive()
    }
}

impl<'a> CallContext<'a> {
    /// Creates a context for a capability at `address` called by `caller`.
    pub fn new(
        host: &'a mut dyn Host,
        frame: &'a mut CallFrame,
        address: Address,
        caller: Address,
        entry_point: Address,
    ) -> Self {
        Self { host, frame, address, caller, entry_point }
    }

    /// Address of the running capability.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Address that invoked the running capability.
    pub const fn caller(&self) -> Address {
        self.caller
    }

    /// Address of the entry point.
    pub const fn entry_point(&self) -> Address {
        self.entry_point
    }

    /// Current block environment.
    pub fn block(&self) -> BlockEnv {
        self.host.block()
    }

    /// Gas left in the frame.
    pub const fn gas_left(&self) -> u64 {
        self.frame.meter.remaining()
    }

    /// Charges computation gas.
    pub fn charge_gas(&mut self, amount: u64) -> CallResult<()> {
        self.frame.meter.charge(amount)
    }

    /// Reads a slot of the running capability's storage.
    pub fn sload(&mut self, slot: U256) -> CallResult<U256> {
        self.charge_gas(SLOAD_GAS)?;
        Ok(self.host.storage(self.address, slot))
    }

    /// Writes a slot of the running capability's storage.
    pub fn sstore(&mut self, slot: U256, value: U256) -> CallResult<()> {
        let current = self.host.storage(self.address, slot);
        let cost = if current.is_zero() && !value.is_zero() { SSTORE_SET_GAS } else { SSTORE_RESET_GAS };
        self.charge_gas(cost)?;
        self.host.set_storage(self.address, slot, value);
        Ok(())
    }

    /// Reads a native balance.
    pub fn balance(&mut self, address: Address) -> CallResult<U256> {
        self.charge_gas(BALANCE_GAS)?;
        Ok(self.host.balance(address))
    }

    /// Sends native value from the running capability.
    ///
    /// Value sent to the entry point is credited to the sender's deposit once the
    /// enclosing invocation succeeds.
    pub fn transfer(&mut self, to: Address, value: U256) -> CallResult<()> {
        self.charge_gas(CALL_GAS + CALL_VALUE_GAS)?;
        self.host
            .transfer(self.address, to, value)
            .map_err(|err| CallError::revert(&err.to_string()))?;
        if to == self.entry_point {
            self.frame.deposits.push((self.address, value));
        }
        Ok(())
    }

    /// Sends `amount` to the entry point as the caller's deposit.
    pub fn pay_prefund(&mut self, amount: U256) -> CallResult<()> {
        let entry_point = self.entry_point;
        self.transfer(entry_point, amount)
    }

    /// Calls a contract, reverting all of its effects if it fails.
    ///
    /// Calling an address without a contract only moves `value`.
    pub fn call(&mut self, target: Address, data: &Bytes, value: U256) -> CallResult<Bytes> {
        let cost = if value.is_zero() { CALL_GAS } else { CALL_GAS + CALL_VALUE_GAS };
        self.charge_gas(cost)?;

        let checkpoint = self.host.checkpoint();
        let pending = self.frame.deposits.len();
        let result = self.call_inner(target, data, value);
        match result {
            Ok(_) => self.host.commit(checkpoint),
            Err(_) => {
                self.host.revert_to(checkpoint);
                self.frame.deposits.truncate(pending);
            }
        }
        result
    }

    fn call_inner(&mut self, target: Address, data: &Bytes, value: U256) -> CallResult<Bytes> {
        if !value.is_zero() {
            self.host
                .transfer(self.address, target, value)
                .map_err(|err| CallError::revert(&err.to_string()))?;
            if target == self.entry_point {
                self.frame.deposits.push((self.address, value));
            }
        }
        let Some(contract) = self.host.contract(target) else {
            return Ok(Bytes::new());
        };
        let mut inner = CallContext {
            host: &mut *self.host,
            frame: &mut *self.frame,
            address: target,
            caller: self.address,
            entry_point: self.entry_point,
        };
        guarded(|| contract.call(&mut inner, data, value))
    }
}

/// Result of a successful sponsorship validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sponsorship {
    /// Opaque context replayed to [`Paymaster::settle_sponsorship`].
    pub context: Bytes,
    /// Signature and time window returned by the paymaster.
    pub validation_data: ValidationData,
}

/// An account created by a factory.
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Address the account was deployed at.
    pub address: Address,
    /// The account's logic.
    pub account: Arc<dyn Account>,
}

/// Account logic: authorizes operations and executes their call data.
///
/// Gas is charged per [`CallContext`] access. Implementations must route their work
/// through the context (or [`CallContext::charge_gas`]) for the ceiling to stop them.
pub trait Account: fmt::Debug + Send + Sync {
    /// Validates `op`, paying `missing_funds` to the entry point if non-zero.
    fn validate_operation(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        op_hash: UserOpHash,
        missing_funds: U256,
    ) -> CallResult<ValidationData>;

    /// Executes the operation's call data.
    fn execute(&self, ctx: &mut CallContext<'_>, call_data: &Bytes) -> CallResult<Bytes>;
}

/// Paymaster logic: sponsors operations and settles their cost.
///
/// Like [`Account`], a paymaster is only stopped at its gas ceiling when it charges
/// the [`CallContext`] it is given.
pub trait Paymaster: fmt::Debug + Send + Sync {
    /// Agrees to pay up to `max_cost` for `op`.
    fn validate_sponsorship(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        op_hash: UserOpHash,
        max_cost: U256,
    ) -> CallResult<Sponsorship>;

    /// Called after execution, whatever its outcome.
    fn settle_sponsorship(
        &self,
        ctx: &mut CallContext<'_>,
        context: &Bytes,
        actual_gas_cost: U256,
        success: bool,
    ) -> CallResult<()>;
}

/// Factory logic: deploys accounts from `factoryData`.
pub trait Factory: fmt::Debug + Send + Sync {
    /// Deploys an account.
    fn create_account(
        &self,
        ctx: &mut CallContext<'_>,
        factory_data: &Bytes,
    ) -> CallResult<Deployment>;
}

/// Plain contract logic reachable through [`CallContext::call`].
pub trait Contract: fmt::Debug + Send + Sync {
    /// Handles a call.
    fn call(&self, ctx: &mut CallContext<'_>, data: &Bytes, value: U256) -> CallResult<Bytes>;
}

/// Opaque signature check: does `signature` over `message` belong to `signer`?
pub trait SignatureVerifier: fmt::Debug + Send + Sync {
    /// Verifies the signature.
    fn verify(&self, signer: Address, message: B256, signature: &[u8]) -> bool;
}

/// secp256k1 verification over the EIP-191 personal message of `message`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaVerifier;

impl SignatureVerifier for EcdsaVerifier {
    fn verify(&self, signer: Address, message: B256, signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_raw(signature) else {
            return false;
        };
        signature
            .recover_address_from_msg(message.as_slice())
            .is_ok_and(|recovered| recovered == signer)
    }
}

/// Runs a capability invocation, converting a panic into a revert.
pub(crate) fn guarded<T>(f: impl FnOnce() -> CallResult<T>) -> CallResult<T> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|_| Err(CallError::revert("capability panicked")))
}
