//! Execution and settlement of validated operations.

use alloy_primitives::Bytes;
use base_account_abstraction::{EntryPointEvent, UserOperation};
use metrics::counter;
use tracing::{debug, error, warn};

use super::{
    BatchRun,
    outcome::{Lifecycle, OperationOutcome, OperationState},
    validation::{SponsorValidation, ValidatedOperation},
};
use crate::{
    capability::{CallContext, CallError, CallFrame, guarded},
    error::OperationError,
    gas::{gas_cost, unused_gas_penalty},
    metrics::Metrics,
    revert::truncate_revert,
};

impl BatchRun<'_> {
    /// Runs the account's call data, settles with the sponsor and refunds the payer.
    pub(super) fn execute_and_settle(
        &mut self,
        index: usize,
        op: &UserOperation,
        validated: ValidatedOperation,
        mut lifecycle: Lifecycle,
    ) -> OperationOutcome {
        let ValidatedOperation { user_op_hash, limits, gas_price, prefund, payer, pre_op_gas, sponsor, .. } =
            validated;
        let entry_point = self.config.entry_point;
        let max_reason = self.config.max_revert_reason_bytes;
        let mut failure = None;

        lifecycle.advance(OperationState::Executing);
        let mut checkpoint = self.host.checkpoint();
        let mut frame = CallFrame::new(limits.call);
        let result = match self.host.account(op.sender) {
            Some(account) => {
                let mut ctx =
                    CallContext::new(&mut *self.host, &mut frame, op.sender, entry_point, entry_point);
                guarded(|| account.execute(&mut ctx, &op.call_data))
            }
            None => Err(CallError::revert("account missing")),
        };
        let execution_used = frame.meter.used();

        let mut pending = match result {
            Ok(_) => {
                lifecycle.advance(OperationState::Executed);
                frame.deposits
            }
            Err(err) => {
                self.host.revert_to(checkpoint);
                checkpoint = self.host.checkpoint();
                let revert_reason = reason_of(err, max_reason);
                self.events.push(EntryPointEvent::UserOperationRevertReason {
                    user_op_hash,
                    sender: op.sender,
                    nonce: op.nonce,
                    revert_reason: revert_reason.clone(),
                });
                lifecycle.advance(OperationState::Reverted);
                failure = Some(OperationError::ExecutionReverted(revert_reason));
                Vec::new()
            }
        };

        let mut post_op_used = 0;
        if let Some(SponsorValidation { address, paymaster, sponsorship }) = sponsor {
            let actual_gas_cost = gas_cost(pre_op_gas + execution_used, gas_price);
            let success = failure.is_none();
            let mut frame = CallFrame::new(limits.paymaster_post_op);
            let settled = {
                let mut ctx =
                    CallContext::new(&mut *self.host, &mut frame, address, entry_point, entry_point);
                guarded(|| {
                    paymaster.settle_sponsorship(&mut ctx, &sponsorship.context, actual_gas_cost, success)
                })
            };
            post_op_used = frame.meter.used();

            match settled {
                Ok(()) => {
                    pending.extend(frame.deposits);
                    self.host.commit(checkpoint);
                }
                Err(err) => {
                    // Unwinds execution too.
                    self.host.revert_to(checkpoint);
                    pending.clear();
                    let revert_reason = reason_of(err, max_reason);
                    self.events.push(EntryPointEvent::PostOpRevertReason {
                        user_op_hash,
                        sender: op.sender,
                        nonce: op.nonce,
                        revert_reason: revert_reason.clone(),
                    });
                    if lifecycle.state() == OperationState::Executed {
                        lifecycle.advance(OperationState::Reverted);
                    }
                    failure = Some(OperationError::PostOpReverted(revert_reason));
                }
            }
        } else {
            self.host.commit(checkpoint);
        }
        self.apply_deposits(pending);

        let penalty = unused_gas_penalty(
            limits.call + limits.paymaster_post_op,
            execution_used + post_op_used,
            self.config.unused_gas_penalty_percent,
        );
        let gas_used = pre_op_gas + execution_used + post_op_used + penalty;
        let actual_gas_cost = gas_cost(gas_used, gas_price);

        let charged = if actual_gas_cost > prefund {
            error!(
                target: "entrypoint",
                %user_op_hash,
                %prefund,
                %actual_gas_cost,
                "actual gas cost exceeds prefund"
            );
            counter!(Metrics::PAYMENT_FAILURES).increment(1);
            self.events.push(EntryPointEvent::UserOperationPrefundTooLow {
                user_op_hash,
                sender: op.sender,
                nonce: op.nonce,
            });
            if lifecycle.state() == OperationState::Executed {
                lifecycle.advance(OperationState::Reverted);
            }
            failure = Some(OperationError::PaymentFailure { prefund, actual_gas_cost });
            prefund
        } else {
            actual_gas_cost
        };

        let refund = prefund - charged;
        if !refund.is_zero() {
            self.state.deposits.credit(payer, refund);
        }
        self.collected += charged;

        let success = failure.is_none();
        if success {
            lifecycle.advance(OperationState::Settled);
            debug!(target: "entrypoint", index, %user_op_hash, gas_used, %charged, "operation settled");
        } else if let Some(err) = &failure {
            warn!(target: "entrypoint", index, %user_op_hash, gas_used, %charged, %err, "operation reverted");
        }

        self.events.push(EntryPointEvent::UserOperationEvent {
            user_op_hash,
            sender: op.sender,
            paymaster: op.paymaster.unwrap_or_default(),
            nonce: op.nonce,
            success,
            actual_gas_cost: charged,
            actual_gas_used: gas_used,
        });

        OperationOutcome {
            index,
            user_op_hash: Some(user_op_hash),
            sender: Some(op.sender),
            state: lifecycle.state(),
            transitions: lifecycle.into_transitions(),
            success,
            gas_used,
            actual_gas_cost: charged,
            error: failure,
        }
    }
}

/// Revert payload recorded for a failed call. Out-of-gas carries no payload.
fn reason_of(err: CallError, max_reason: usize) -> Bytes {
    match err {
        CallError::Reverted(data) => truncate_revert(&data, max_reason),
        CallError::OutOfGas => Bytes::new(),
    }
}
