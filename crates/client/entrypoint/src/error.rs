//! Entry point error types.
//!
//! [`OperationError`] is operation-local: it ends one operation and is recorded in
//! its result slot. [`BatchError`] is the only error that rejects a whole batch.

use std::fmt;

use alloy_primitives::{Address, Bytes, U256};
use base_account_abstraction::DecodeError;
use thiserror::Error;

use crate::revert::RevertReason;

/// The capability an operation-local failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    /// The factory named in `initCode`.
    Factory,
    /// The sending account.
    Account,
    /// The paymaster named in `paymasterAndData`.
    Sponsor,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Factory => write!(f, "factory"),
            Self::Account => write!(f, "account"),
            Self::Sponsor => write!(f, "sponsor"),
        }
    }
}

/// Reasons a single operation fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The operation could not be decoded or violates a structural bound.
    #[error("malformed operation: {0}")]
    MalformedOperation(#[from] DecodeError),

    /// `initCode` was given for a sender that already exists.
    #[error("sender {0} already constructed")]
    AccountAlreadyDeployed(Address),

    /// No factory capability is registered at the `initCode` address.
    #[error("factory {0} not deployed")]
    InvalidFactory(Address),

    /// The factory deployed a different address than the sender.
    #[error("initCode must return sender {expected}, got {actual}")]
    DeployedAddressMismatch {
        /// The operation sender.
        expected: Address,
        /// The address the factory produced.
        actual: Address,
    },

    /// The sender has no account and no `initCode`.
    #[error("account {0} not deployed")]
    AccountNotDeployed(Address),

    /// The account rejected the signature.
    #[error("invalid account signature")]
    SignatureInvalid,

    /// The nonce was already used or is out of sequence.
    #[error("invalid account nonce")]
    NonceInvalid,

    /// The validation time window does not contain the batch timestamp.
    #[error("{entity} validation window expired or not due")]
    OperationExpired {
        /// Whose window failed.
        entity: Entity,
    },

    /// A validation call exhausted its gas ceiling.
    #[error("{entity} validation out of gas")]
    ValidationOutOfGas {
        /// Who ran out of gas.
        entity: Entity,
    },

    /// A validation call reverted.
    #[error("{entity} validation reverted: {}", RevertReason::decode(.reason))]
    ValidationReverted {
        /// Who reverted.
        entity: Entity,
        /// Raw revert payload.
        reason: Bytes,
    },

    /// The sponsor is not deployed or its stake is missing, too low or unlocking.
    #[error("invalid sponsor {sponsor}: {reason}")]
    InvalidSponsor {
        /// The paymaster address.
        sponsor: Address,
        /// Why it is not usable.
        reason: &'static str,
    },

    /// The sponsor declined to pay.
    #[error("sponsor rejected the operation")]
    SponsorRejected,

    /// The payer's deposit cannot cover the required prefund.
    #[error("{entity} deposit {available} below required prefund {required}")]
    InsufficientBalance {
        /// Who was supposed to pay.
        entity: Entity,
        /// Required prefund.
        required: U256,
        /// Deposit at the time of the check.
        available: U256,
    },

    /// The actual cost exceeded the prefund.
    #[error("prefund {prefund} below actual gas cost {actual_gas_cost}")]
    PaymentFailure {
        /// The reserved prefund.
        prefund: U256,
        /// The computed cost.
        actual_gas_cost: U256,
    },

    /// The account's execution reverted or ran out of gas.
    #[error("execution reverted: {}", RevertReason::decode(.0))]
    ExecutionReverted(Bytes),

    /// The sponsor's settlement call reverted; execution effects were unwound.
    #[error("sponsor settlement reverted: {}", RevertReason::decode(.0))]
    PostOpReverted(Bytes),
}

impl OperationError {
    /// Returns the ERC-4337 `AA` code for failures the protocol assigns one.
    pub const fn code(&self) -> Option<&'static str> {
        Some(match self {
            Self::AccountAlreadyDeployed(_) => "AA10",
            Self::InvalidFactory(_) => "AA13",
            Self::DeployedAddressMismatch { .. } => "AA14",
            Self::AccountNotDeployed(_) => "AA20",
            Self::InsufficientBalance { entity: Entity::Sponsor, .. } => "AA31",
            Self::InsufficientBalance { .. } => "AA21",
            Self::OperationExpired { entity: Entity::Sponsor } => "AA32",
            Self::OperationExpired { .. } => "AA22",
            Self::ValidationReverted { entity: Entity::Factory, .. }
            | Self::ValidationOutOfGas { entity: Entity::Factory } => "AA13",
            Self::ValidationReverted { entity: Entity::Sponsor, .. } => "AA33",
            Self::ValidationReverted { .. } => "AA23",
            Self::SignatureInvalid => "AA24",
            Self::NonceInvalid => "AA25",
            Self::ValidationOutOfGas { entity: Entity::Sponsor } => "AA36",
            Self::ValidationOutOfGas { .. } => "AA26",
            Self::InvalidSponsor { .. } => "AA30",
            Self::SponsorRejected => "AA34",
            Self::PostOpReverted(_) => "AA50",
            Self::PaymentFailure { .. } => "AA51",
            Self::MalformedOperation(_) | Self::ExecutionReverted(_) => return None,
        })
    }

    /// Stable label used for metrics and logs.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::MalformedOperation(_) => "malformed_operation",
            Self::AccountAlreadyDeployed(_)
            | Self::InvalidFactory(_)
            | Self::DeployedAddressMismatch { .. } => "deployment_failed",
            Self::AccountNotDeployed(_) => "account_not_deployed",
            Self::SignatureInvalid => "signature_invalid",
            Self::NonceInvalid => "nonce_invalid",
            Self::OperationExpired { .. } => "operation_expired",
            Self::ValidationOutOfGas { .. } => "validation_out_of_gas",
            Self::ValidationReverted { .. } => "validation_reverted",
            Self::InvalidSponsor { .. } => "invalid_sponsor",
            Self::SponsorRejected => "sponsor_rejected",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::PaymentFailure { .. } => "payment_failure",
            Self::ExecutionReverted(_) => "execution_reverted",
            Self::PostOpReverted(_) => "post_op_reverted",
        }
    }

    /// Raw revert payload carried by the error, if any.
    pub const fn revert_data(&self) -> Option<&Bytes> {
        match self {
            Self::ValidationReverted { reason, .. }
            | Self::ExecutionReverted(reason)
            | Self::PostOpReverted(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Errors that reject a whole batch before any operation is processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// The collector is the zero address.
    #[error("invalid collector {0}")]
    InvalidCollector(Address),

    /// The batch envelope could not be decoded.
    #[error(transparent)]
    Envelope(#[from] DecodeError),
}

/// Errors raised by the host environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// A native transfer exceeds the sender's balance.
    #[error("{address} balance {available} below transfer amount {required}")]
    InsufficientFunds {
        /// The paying address.
        address: Address,
        /// Requested amount.
        required: U256,
        /// Balance at the time of the transfer.
        available: U256,
    },

    /// An account is already installed at the address.
    #[error("account already exists at {0}")]
    AccountExists(Address),
}

/// Errors raised by deposit and stake management.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The participant's deposit cannot cover the debit.
    #[error("{account} deposit {available} below requested {required}")]
    InsufficientBalance {
        /// The debited participant.
        account: Address,
        /// Requested amount.
        required: U256,
        /// Deposit at the time of the request.
        available: U256,
    },

    /// A stake was requested with a zero unstake delay.
    #[error("must specify unstake delay")]
    ZeroUnstakeDelay,

    /// The unstake delay would decrease.
    #[error("cannot decrease unstake time from {current} to {requested}")]
    UnstakeDelayDecreased {
        /// Currently configured delay.
        current: u32,
        /// Requested delay.
        requested: u32,
    },

    /// Locking would leave the participant with no stake.
    #[error("no stake specified")]
    NoStake,

    /// The stake is already unlocking and cannot be topped up or unlocked again.
    #[error("stake of {0} is already unlocking")]
    AlreadyUnstaking(Address),

    /// The participant has no locked stake.
    #[error("{0} is not staked")]
    NotStaked(Address),

    /// Withdrawal was requested before unlocking.
    #[error("must call unlock_stake first")]
    StakeNotUnlocked,

    /// The unstake delay has not elapsed.
    #[error("stake withdrawal is not due until {withdraw_time}, now {now}")]
    WithdrawalNotDue {
        /// Earliest withdrawal time.
        withdraw_time: u64,
        /// Current block timestamp.
        now: u64,
    },

    /// A recipient or target was the zero address.
    #[error("zero address not allowed")]
    ZeroAddress,

    /// Moving native value failed in the host.
    #[error(transparent)]
    Host(#[from] HostError),
}
