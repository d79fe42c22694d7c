//! Gas metering and cost arithmetic.

use alloy_primitives::U256;

use crate::capability::{CallError, CallResult};

/// Cost of reading a storage slot.
pub const SLOAD_GAS: u64 = 2_100;
/// Cost of writing a non-zero value into an empty slot.
pub const SSTORE_SET_GAS: u64 = 20_000;
/// Cost of any other storage write.
pub const SSTORE_RESET_GAS: u64 = 2_900;
/// Base cost of a nested call.
pub const CALL_GAS: u64 = 2_600;
/// Surcharge for a call or transfer carrying value.
pub const CALL_VALUE_GAS: u64 = 9_000;
/// Cost of reading a native balance.
pub const BALANCE_GAS: u64 = 2_600;
/// Cost of one signature recovery.
pub const ECRECOVER_GAS: u64 = 3_000;
/// Cost of deploying an account.
pub const CREATE_GAS: u64 = 32_000;

/// Tracks gas consumed against a fixed ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasMeter {
    limit: u64,
    used: u64,
}

impl GasMeter {
    /// Creates a meter with the given ceiling.
    pub const fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    /// The ceiling.
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Gas consumed so far.
    pub const fn used(&self) -> u64 {
        self.used
    }

    /// Gas still available.
    pub const fn remaining(&self) -> u64 {
        self.limit - self.used
    }

    /// Consumes `amount` gas.
    ///
    /// Exceeding the ceiling consumes everything that was left and fails.
    pub fn charge(&mut self, amount: u64) -> CallResult<()> {
        if amount > self.remaining() {
            self.used = self.limit;
            return Err(CallError::OutOfGas);
        }
        self.used += amount;
        Ok(())
    }
}

/// Gas fields of an operation after bounds checking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasLimits {
    /// `preVerificationGas`.
    pub pre_verification: u64,
    /// `verificationGasLimit`, shared by deployment and account validation.
    pub verification: u64,
    /// `callGasLimit`.
    pub call: u64,
    /// `paymasterVerificationGasLimit`.
    pub paymaster_verification: u64,
    /// `paymasterPostOpGasLimit`.
    pub paymaster_post_op: u64,
}

impl GasLimits {
    /// Sum of every limit: the most gas the operation can be charged for.
    ///
    /// Saturates; a validated config keeps the sum well below `u64::MAX`.
    pub const fn total(&self) -> u64 {
        self.pre_verification
            .saturating_add(self.verification)
            .saturating_add(self.call)
            .saturating_add(self.paymaster_verification)
            .saturating_add(self.paymaster_post_op)
    }

    /// Worst-case charge reserved from the payer during validation.
    pub fn required_prefund(&self, max_fee_per_gas: u128) -> U256 {
        U256::from(self.total()) * U256::from(max_fee_per_gas)
    }
}

/// Penalty charged on gas reserved for execution but left unused.
pub const fn unused_gas_penalty(limit: u64, used: u64, percent: u64) -> u64 {
    limit.saturating_sub(used).saturating_mul(percent) / 100
}

/// Cost of `gas` units at `price`.
pub fn gas_cost(gas: u64, price: u128) -> U256 {
    U256::from(gas) * U256::from(price)
}
