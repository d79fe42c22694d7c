//! Entry point configuration.
//!
//! Protocol-wide bounds and staking requirements applied while processing batches.
//! Every field has a default, so a partial JSON document is a valid configuration.

use alloy_primitives::{Address, ChainId, U256, address};
use base_account_abstraction::{DecodeError, UserOperation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gas::GasLimits;

/// Canonical EntryPoint v0.7 address.
pub const ENTRYPOINT_V07_ADDRESS: Address = address!("0000000071727De22E5E9d8BAf0edAc6f37da032");

/// Ceiling for the sum of every per-operation gas bound.
///
/// Keeps gas totals and the unused-gas penalty (`gas * percent`) within `u64`.
pub const MAX_OPERATION_GAS: u64 = u64::MAX / 100;

/// Base mainnet chain id.
const DEFAULT_CHAIN_ID: ChainId = 8453;

const DEFAULT_MAX_VERIFICATION_GAS: u64 = 5_000_000;
const DEFAULT_MAX_CALL_GAS: u64 = 20_000_000;
const DEFAULT_MAX_POST_OP_GAS: u64 = 5_000_000;
const DEFAULT_MAX_PRE_VERIFICATION_GAS: u64 = 10_000_000;
const DEFAULT_MIN_STAKE_WEI: u128 = 1_000_000_000_000_000_000;
const DEFAULT_MIN_UNSTAKE_DELAY_SEC: u32 = 86_400;
const DEFAULT_UNUSED_GAS_PENALTY_PERCENT: u64 = 10;
const DEFAULT_MAX_REVERT_REASON_BYTES: usize = 2_048;

/// Errors that can occur when validating config
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A field holds a value the entry point cannot run with.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Configuration for the entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryPointConfig {
    /// Address of the entry point inside the host.
    ///
    /// Bound into every operation hash. Default: v0.7 canonical address.
    pub entry_point: Address,

    /// Chain id bound into every operation hash.
    /// Default: 8453
    pub chain_id: ChainId,

    /// Upper bound for `verificationGasLimit` and `paymasterVerificationGasLimit`.
    /// Default: 5,000,000
    pub max_verification_gas: u64,

    /// Upper bound for `callGasLimit`.
    /// Default: 20,000,000
    pub max_call_gas: u64,

    /// Upper bound for `paymasterPostOpGasLimit`.
    /// Default: 5,000,000
    pub max_post_op_gas: u64,

    /// Upper bound for `preVerificationGas`.
    /// Default: 10,000,000
    pub max_pre_verification_gas: u64,

    /// Minimum stake a paymaster must hold to sponsor operations.
    /// Default: 1 ether
    pub min_stake: U256,

    /// Minimum unstake delay a paymaster must have configured.
    /// Default: 1 day
    pub min_unstake_delay_sec: u32,

    /// Percentage of unused execution and post-op gas charged as a penalty.
    /// Default: 10 (10%)
    pub unused_gas_penalty_percent: u64,

    /// Revert payloads longer than this are truncated in results and events.
    /// Default: 2048
    pub max_revert_reason_bytes: usize,
}

impl Default for EntryPointConfig {
    fn default() -> Self {
        Self {
            entry_point: ENTRYPOINT_V07_ADDRESS,
            chain_id: DEFAULT_CHAIN_ID,
            max_verification_gas: DEFAULT_MAX_VERIFICATION_GAS,
            max_call_gas: DEFAULT_MAX_CALL_GAS,
            max_post_op_gas: DEFAULT_MAX_POST_OP_GAS,
            max_pre_verification_gas: DEFAULT_MAX_PRE_VERIFICATION_GAS,
            min_stake: U256::from(DEFAULT_MIN_STAKE_WEI),
            min_unstake_delay_sec: DEFAULT_MIN_UNSTAKE_DELAY_SEC,
            unused_gas_penalty_percent: DEFAULT_UNUSED_GAS_PENALTY_PERCENT,
            max_revert_reason_bytes: DEFAULT_MAX_REVERT_REASON_BYTES,
        }
    }
}

impl EntryPointConfig {
    /// Parses a configuration from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the entry point address
    pub const fn with_entry_point(mut self, entry_point: Address) -> Self {
        self.entry_point = entry_point;
        self
    }

    /// Set the chain id
    pub const fn with_chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Set the maximum verification gas
    pub const fn with_max_verification_gas(mut self, max: u64) -> Self {
        self.max_verification_gas = max;
        self
    }

    /// Set the maximum call gas
    pub const fn with_max_call_gas(mut self, max: u64) -> Self {
        self.max_call_gas = max;
        self
    }

    /// Set the minimum paymaster stake
    pub const fn with_min_stake(mut self, min_stake: U256) -> Self {
        self.min_stake = min_stake;
        self
    }

    /// Set the minimum unstake delay
    pub const fn with_min_unstake_delay_sec(mut self, delay: u32) -> Self {
        self.min_unstake_delay_sec = delay;
        self
    }

    /// Set the unused gas penalty percentage
    pub const fn with_unused_gas_penalty_percent(mut self, percent: u64) -> Self {
        self.unused_gas_penalty_percent = percent;
        self
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entry_point.is_zero() {
            return Err(ConfigError::ValidationError("entryPoint must not be zero".into()));
        }
        if self.chain_id == 0 {
            return Err(ConfigError::ValidationError("chainId must not be zero".into()));
        }
        if self.max_verification_gas == 0 || self.max_call_gas == 0 {
            return Err(ConfigError::ValidationError(
                "verification and call gas bounds must be positive".into(),
            ));
        }
        let worst_case = [
            self.max_verification_gas,
            self.max_call_gas,
            self.max_verification_gas,
            self.max_post_op_gas,
        ]
        .into_iter()
        .try_fold(self.max_pre_verification_gas, u64::checked_add)
        .filter(|total| *total <= MAX_OPERATION_GAS);
        if worst_case.is_none() {
            return Err(ConfigError::ValidationError(format!(
                "sum of gas bounds exceeds {MAX_OPERATION_GAS}"
            )));
        }
        if self.unused_gas_penalty_percent > 100 {
            return Err(ConfigError::ValidationError(format!(
                "unusedGasPenaltyPercent {} exceeds 100",
                self.unused_gas_penalty_percent
            )));
        }
        Ok(())
    }

    /// Narrows an operation's gas fields to `u64`, enforcing the protocol bounds.
    pub fn gas_limits(&self, op: &UserOperation) -> Result<GasLimits, DecodeError> {
        Ok(GasLimits {
            pre_verification: bounded(
                "preVerificationGas",
                op.pre_verification_gas,
                self.max_pre_verification_gas,
            )?,
            verification: bounded(
                "verificationGasLimit",
                op.verification_gas_limit,
                self.max_verification_gas,
            )?,
            call: bounded("callGasLimit", op.call_gas_limit, self.max_call_gas)?,
            paymaster_verification: bounded(
                "paymasterVerificationGasLimit",
                op.paymaster_verification_gas_limit,
                self.max_verification_gas,
            )?,
            paymaster_post_op: bounded(
                "paymasterPostOpGasLimit",
                op.paymaster_post_op_gas_limit,
                self.max_post_op_gas,
            )?,
        })
    }
}

fn bounded(field: &'static str, value: U256, max: u64) -> Result<u64, DecodeError> {
    if value > U256::from(max) {
        return Err(DecodeError::GasLimitTooHigh { field, value, max });
    }
    Ok(value.to::<u64>())
}
