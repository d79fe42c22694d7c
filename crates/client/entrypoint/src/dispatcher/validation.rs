//! Validation phase: deployment, account authorization and sponsorship.
//!
//! The nonce is consumed at the authorization point, right after the account
//! approves. Anything failing before it is unwound and free. Anything failing
//! after it keeps the account's effects and charges the sender for the
//! validation gas it burned.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use base_account_abstraction::{EntryPointEvent, GasFees, UserOpHash, UserOperation, ValidationData};
use tracing::debug;

use super::BatchRun;
use crate::{
    capability::{CallContext, CallError, CallFrame, Paymaster, Sponsorship, guarded},
    error::{Entity, OperationError},
    gas::{CREATE_GAS, GasLimits},
    revert::truncate_revert,
};

/// Why an operation did not pass validation.
#[derive(Debug)]
pub(crate) enum Rejection {
    /// Failed before authorization; every effect was unwound.
    Unauthorized { error: OperationError },
    /// Failed after authorization; `gas_used` is charged to the sender.
    Authorized { error: OperationError, gas_used: u64 },
}

/// The sponsor of a validated operation and the context it asked for.
#[derive(Debug)]
pub(crate) struct SponsorValidation {
    pub(crate) address: Address,
    pub(crate) paymaster: Arc<dyn Paymaster>,
    pub(crate) sponsorship: Sponsorship,
}

/// An authorized operation whose payer holds the prefund.
#[derive(Debug)]
pub(crate) struct ValidatedOperation {
    pub(crate) user_op_hash: UserOpHash,
    pub(crate) limits: GasLimits,
    pub(crate) gas_price: u128,
    pub(crate) prefund: U256,
    pub(crate) payer: Address,
    /// `preVerificationGas` plus the gas both validations used.
    pub(crate) pre_op_gas: u64,
    pub(crate) account_validation: ValidationData,
    pub(crate) sponsor: Option<SponsorValidation>,
}

struct AccountValidation {
    validation_data: ValidationData,
    deployed: Option<EntryPointEvent>,
}

impl BatchRun<'_> {
    pub(super) fn validate(
        &mut self,
        op: &UserOperation,
        user_op_hash: UserOpHash,
        limits: GasLimits,
        fees: GasFees,
    ) -> Result<ValidatedOperation, Rejection> {
        if self.seen.contains(&user_op_hash) {
            return Err(Rejection::Unauthorized { error: OperationError::NonceInvalid });
        }
        let prefund = limits.required_prefund(fees.max_fee_per_gas);

        let checkpoint = self.host.checkpoint();
        let mut frame = CallFrame::new(limits.verification);
        let account = match self.validate_account(op, user_op_hash, prefund, &mut frame) {
            Ok(account) => account,
            Err(error) => {
                self.host.revert_to(checkpoint);
                return Err(Rejection::Unauthorized { error });
            }
        };
        if !self.state.nonces.validate_and_update(op.sender, op.nonce) {
            self.host.revert_to(checkpoint);
            return Err(Rejection::Unauthorized { error: OperationError::NonceInvalid });
        }

        self.host.commit(checkpoint);
        self.seen.insert(user_op_hash);
        self.events.extend(account.deployed);
        let verification_used = frame.meter.used();
        self.apply_deposits(frame.deposits);
        let mut pre_op_gas = limits.pre_verification + verification_used;
        debug!(
            target: "entrypoint",
            sender = %op.sender,
            %user_op_hash,
            verification_used,
            "operation authorized"
        );

        let sponsor = match op.paymaster {
            None => {
                self.take_prefund(op.sender, Entity::Account, prefund)
                    .map_err(|error| Rejection::Authorized { error, gas_used: pre_op_gas })?;
                None
            }
            Some(address) => {
                let (sponsor, used) = self
                    .validate_sponsor(op, user_op_hash, address, &limits, prefund, account.validation_data)
                    .map_err(|(error, used)| Rejection::Authorized {
                        error,
                        gas_used: pre_op_gas + used,
                    })?;
                pre_op_gas += used;
                Some(sponsor)
            }
        };

        Ok(ValidatedOperation {
            user_op_hash,
            limits,
            gas_price: fees.effective_gas_price(self.block.base_fee),
            prefund,
            payer: op.payer(),
            pre_op_gas,
            account_validation: account.validation_data,
            sponsor,
        })
    }

    /// Deploys the sender if requested and runs the account's validation.
    fn validate_account(
        &mut self,
        op: &UserOperation,
        user_op_hash: UserOpHash,
        prefund: U256,
        frame: &mut CallFrame,
    ) -> Result<AccountValidation, OperationError> {
        let entry_point = self.config.entry_point;
        let max_reason = self.config.max_revert_reason_bytes;

        let mut deployed = None;
        if let Some(factory_address) = op.factory {
            if self.host.account(op.sender).is_some() {
                return Err(OperationError::AccountAlreadyDeployed(op.sender));
            }
            let factory = self
                .host
                .factory(factory_address)
                .ok_or(OperationError::InvalidFactory(factory_address))?;
            let created = {
                let mut ctx = CallContext::new(
                    &mut *self.host,
                    &mut *frame,
                    factory_address,
                    entry_point,
                    entry_point,
                );
                guarded(|| {
                    ctx.charge_gas(CREATE_GAS)?;
                    factory.create_account(&mut ctx, &op.factory_data)
                })
            };
            let deployment = created
                .map_err(|err| validation_failure(Entity::Factory, err, max_reason))?;
            if deployment.address != op.sender {
                return Err(OperationError::DeployedAddressMismatch {
                    expected: op.sender,
                    actual: deployment.address,
                });
            }
            self.host
                .install_account(op.sender, deployment.account)
                .map_err(|_| OperationError::AccountAlreadyDeployed(op.sender))?;
            deployed = Some(EntryPointEvent::AccountDeployed {
                user_op_hash,
                sender: op.sender,
                factory: factory_address,
                paymaster: op.paymaster.unwrap_or_default(),
            });
        }

        let account =
            self.host.account(op.sender).ok_or(OperationError::AccountNotDeployed(op.sender))?;
        let missing_funds = match op.paymaster {
            Some(_) => U256::ZERO,
            None => prefund.saturating_sub(self.state.deposits.balance_of(op.sender)),
        };
        let validated = {
            let mut ctx =
                CallContext::new(&mut *self.host, &mut *frame, op.sender, entry_point, entry_point);
            guarded(|| account.validate_operation(&mut ctx, op, user_op_hash, missing_funds))
        };
        let validation_data =
            validated.map_err(|err| validation_failure(Entity::Account, err, max_reason))?;

        if validation_data.aggregator != Address::ZERO {
            return Err(OperationError::SignatureInvalid);
        }
        if !validation_data.is_within(self.block.timestamp) {
            return Err(OperationError::OperationExpired { entity: Entity::Account });
        }
        Ok(AccountValidation { validation_data, deployed })
    }

    /// Checks the sponsor's standing, reserves its prefund and runs its validation.
    ///
    /// On failure the sponsor's effects are unwound and its prefund returned.
    fn validate_sponsor(
        &mut self,
        op: &UserOperation,
        user_op_hash: UserOpHash,
        address: Address,
        limits: &GasLimits,
        prefund: U256,
        account_validation: ValidationData,
    ) -> Result<(SponsorValidation, u64), (OperationError, u64)> {
        let Some(paymaster) = self.host.paymaster(address) else {
            return Err((OperationError::InvalidSponsor { sponsor: address, reason: "not deployed" }, 0));
        };
        if !self.state.deposits.is_stake_valid(
            address,
            self.config.min_stake,
            self.config.min_unstake_delay_sec,
        ) {
            return Err((
                OperationError::InvalidSponsor {
                    sponsor: address,
                    reason: "stake missing, too low or unlocking",
                },
                0,
            ));
        }
        self.take_prefund(address, Entity::Sponsor, prefund).map_err(|error| (error, 0))?;

        let entry_point = self.config.entry_point;
        let max_reason = self.config.max_revert_reason_bytes;
        let now = self.block.timestamp;

        let checkpoint = self.host.checkpoint();
        let mut frame = CallFrame::new(limits.paymaster_verification);
        let result = {
            let mut ctx =
                CallContext::new(&mut *self.host, &mut frame, address, entry_point, entry_point);
            guarded(|| paymaster.validate_sponsorship(&mut ctx, op, user_op_hash, prefund))
        };
        let used = frame.meter.used();

        let checked = result
            .map_err(|err| validation_failure(Entity::Sponsor, err, max_reason))
            .and_then(|sponsorship| {
                if sponsorship.validation_data.aggregator != Address::ZERO {
                    return Err(OperationError::SponsorRejected);
                }
                if !account_validation.intersect(&sponsorship.validation_data).is_within(now) {
                    return Err(OperationError::OperationExpired { entity: Entity::Sponsor });
                }
                Ok(sponsorship)
            });

        match checked {
            Ok(sponsorship) => {
                self.host.commit(checkpoint);
                self.apply_deposits(frame.deposits);
                Ok((SponsorValidation { address, paymaster, sponsorship }, used))
            }
            Err(error) => {
                self.host.revert_to(checkpoint);
                self.state.deposits.credit(address, prefund);
                Err((error, used))
            }
        }
    }

    /// Debits the prefund from the payer's deposit.
    fn take_prefund(
        &mut self,
        payer: Address,
        entity: Entity,
        prefund: U256,
    ) -> Result<(), OperationError> {
        let available = self.state.deposits.balance_of(payer);
        if available < prefund {
            return Err(OperationError::InsufficientBalance { entity, required: prefund, available });
        }
        self.state.deposits.debit_up_to(payer, prefund);
        Ok(())
    }
}

/// Maps a failed validation call to the error attributed to `entity`.
fn validation_failure(entity: Entity, err: CallError, max_reason: usize) -> OperationError {
    match err {
        CallError::OutOfGas => OperationError::ValidationOutOfGas { entity },
        CallError::Reverted(reason) => {
            OperationError::ValidationReverted { entity, reason: truncate_revert(&reason, max_reason) }
        }
    }
}
