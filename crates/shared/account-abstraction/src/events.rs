//! Events emitted by the entry point while processing batches and ledger calls.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::types::UserOpHash;

/// Events that can be emitted by the entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum EntryPointEvent {
    /// A factory deployed the operation's sender.
    AccountDeployed {
        /// Hash of the deploying operation.
        user_op_hash: UserOpHash,
        /// The deployed account.
        sender: Address,
        /// The factory that deployed it.
        factory: Address,
        /// The paymaster of the deploying operation, zero if none.
        paymaster: Address,
    },
    /// An operation finished with the given outcome and cost.
    UserOperationEvent {
        /// Hash of the operation.
        user_op_hash: UserOpHash,
        /// The operation sender.
        sender: Address,
        /// The paymaster, zero if none.
        paymaster: Address,
        /// The operation nonce.
        nonce: U256,
        /// Whether execution and settlement succeeded.
        success: bool,
        /// Total charged for the operation.
        actual_gas_cost: U256,
        /// Total gas charged for the operation.
        actual_gas_used: u64,
    },
    /// The account's execution reverted.
    UserOperationRevertReason {
        /// Hash of the operation.
        user_op_hash: UserOpHash,
        /// The operation sender.
        sender: Address,
        /// The operation nonce.
        nonce: U256,
        /// Raw revert payload, possibly truncated.
        revert_reason: Bytes,
    },
    /// The paymaster's settlement call reverted.
    PostOpRevertReason {
        /// Hash of the operation.
        user_op_hash: UserOpHash,
        /// The operation sender.
        sender: Address,
        /// The operation nonce.
        nonce: U256,
        /// Raw revert payload, possibly truncated.
        revert_reason: Bytes,
    },
    /// The actual gas cost exceeded the prefund.
    UserOperationPrefundTooLow {
        /// Hash of the operation.
        user_op_hash: UserOpHash,
        /// The operation sender.
        sender: Address,
        /// The operation nonce.
        nonce: U256,
    },
    /// A participant's deposit increased.
    Deposited {
        /// The credited participant.
        account: Address,
        /// Deposit after the credit.
        total_deposit: U256,
    },
    /// A participant withdrew from its deposit.
    Withdrawn {
        /// The debited participant.
        account: Address,
        /// Recipient of the withdrawn value.
        withdraw_address: Address,
        /// Amount withdrawn.
        amount: U256,
    },
    /// A participant locked (or added to) its stake.
    StakeLocked {
        /// The staking participant.
        account: Address,
        /// Stake after the lock.
        total_staked: U256,
        /// Delay between unlocking and withdrawal.
        unstake_delay_sec: u32,
    },
    /// A participant started unlocking its stake.
    StakeUnlocked {
        /// The unstaking participant.
        account: Address,
        /// Earliest time the stake can be withdrawn.
        withdraw_time: u64,
    },
    /// A participant withdrew its unlocked stake.
    StakeWithdrawn {
        /// The unstaking participant.
        account: Address,
        /// Recipient of the withdrawn stake.
        withdraw_address: Address,
        /// Amount withdrawn.
        amount: U256,
    },
}

impl EntryPointEvent {
    /// Returns the operation hash for per-operation events.
    pub const fn user_op_hash(&self) -> Option<&UserOpHash> {
        match self {
            Self::AccountDeployed { user_op_hash, .. }
            | Self::UserOperationEvent { user_op_hash, .. }
            | Self::UserOperationRevertReason { user_op_hash, .. }
            | Self::PostOpRevertReason { user_op_hash, .. }
            | Self::UserOperationPrefundTooLow { user_op_hash, .. } => Some(user_op_hash),
            Self::Deposited { .. }
            | Self::Withdrawn { .. }
            | Self::StakeLocked { .. }
            | Self::StakeUnlocked { .. }
            | Self::StakeWithdrawn { .. } => None,
        }
    }
}
