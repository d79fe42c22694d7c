//! Per-operation lifecycle and batch results.

use alloy_primitives::{Address, Bytes, U256};
use base_account_abstraction::{EntryPointEvent, UserOpHash, ValidationData};
use serde::Serialize;
use tracing::error;

use crate::{error::OperationError, host::BlockEnv};

/// Processing state of one operation.
///
/// `Settled`, `Reverted` and `BatchAborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationState {
    /// Accepted into the batch.
    Decoded,
    /// Deployment, account and sponsor validation in progress.
    Validating,
    /// Authorized and prefunded.
    Validated,
    /// The account's call data is running.
    Executing,
    /// Execution succeeded; settlement pending.
    Executed,
    /// Execution and settlement succeeded.
    Settled,
    /// Failed during validation, execution or settlement.
    Reverted,
    /// Structurally invalid; never validated or charged.
    BatchAborted,
}

impl OperationState {
    /// Returns true if `next` is a legal successor of `self`.
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Decoded, Self::Validating | Self::BatchAborted)
                | (Self::Validating, Self::Validated | Self::Reverted)
                | (Self::Validated, Self::Executing)
                | (Self::Executing, Self::Executed | Self::Reverted)
                | (Self::Executed, Self::Settled | Self::Reverted)
        )
    }

    /// Returns true for states no operation leaves.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Settled | Self::Reverted | Self::BatchAborted)
    }
}

/// Tracks the state transitions of one operation.
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    transitions: Vec<OperationState>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self { transitions: vec![OperationState::Decoded] }
    }

    pub(crate) fn state(&self) -> OperationState {
        self.transitions.last().copied().unwrap_or(OperationState::Decoded)
    }

    pub(crate) fn advance(&mut self, next: OperationState) {
        let current = self.state();
        if !current.can_advance_to(next) {
            error!(target: "entrypoint", ?current, ?next, "illegal operation state transition");
            debug_assert!(false, "illegal transition {current:?} -> {next:?}");
            return;
        }
        self.transitions.push(next);
    }

    pub(crate) fn into_transitions(self) -> Vec<OperationState> {
        self.transitions
    }
}

/// Result of one operation within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    /// Position in the submitted batch.
    pub index: usize,
    /// Operation hash, if the operation could be decoded.
    pub user_op_hash: Option<UserOpHash>,
    /// Sender, if it could be read.
    pub sender: Option<Address>,
    /// Terminal state.
    pub state: OperationState,
    /// Every state the operation passed through, in order.
    pub transitions: Vec<OperationState>,
    /// True if execution and settlement both succeeded.
    pub success: bool,
    /// Gas charged for the operation.
    pub gas_used: u64,
    /// Amount charged to the payer.
    pub actual_gas_cost: U256,
    /// Why the operation failed, if it did.
    pub error: Option<OperationError>,
}

impl OperationOutcome {
    /// Raw revert payload of a failed capability call, if any.
    pub fn revert_reason(&self) -> Option<&Bytes> {
        self.error.as_ref().and_then(OperationError::revert_data)
    }
}

/// Result of one processed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// One outcome per submitted operation, in order.
    pub outcomes: Vec<OperationOutcome>,
    /// Recipient of the collected gas cost.
    pub collector: Address,
    /// Sum of all amounts charged in the batch.
    pub collected: U256,
    /// Amount actually transferred to the collector.
    pub paid_to_collector: U256,
    /// Events in emission order.
    pub events: Vec<EntryPointEvent>,
    /// Block the batch was processed in.
    pub block: BlockEnv,
}

impl BatchResult {
    /// Number of successful operations.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.success).count()
    }
}

/// Result of a validation dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Operation hash.
    pub user_op_hash: UserOpHash,
    /// Prefund the payer must hold.
    pub prefund: U256,
    /// Gas used by `preVerificationGas`, deployment and both validations.
    pub pre_op_gas: u64,
    /// Window and signature result returned by the account.
    pub account_validation: ValidationData,
    /// Window and signature result returned by the paymaster, if any.
    pub sponsor_validation: Option<ValidationData>,
    /// Context the paymaster asked to receive at settlement.
    pub sponsor_context: Bytes,
}
