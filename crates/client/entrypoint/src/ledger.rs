//! Deposit and stake ledger.
//!
//! Deposits pay for gas; stakes are locked collateral a paymaster must hold to
//! sponsor operations. Balances are unsigned and every debit is checked, so no
//! participant can ever be driven below zero.

use std::collections::HashMap;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::LedgerError;

/// Locked collateral of one participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeInfo {
    /// Amount locked.
    pub stake: U256,
    /// Seconds between unlocking and withdrawal.
    pub unstake_delay_sec: u32,
    /// Earliest withdrawal time once unlocking; zero while locked.
    pub withdraw_time: u64,
}

impl StakeInfo {
    /// Returns true once `unlock_stake` has been called.
    pub const fn is_unlocking(&self) -> bool {
        self.withdraw_time != 0
    }
}

/// Deposits and stakes per participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositLedger {
    deposits: HashMap<Address, U256>,
    stakes: HashMap<Address, StakeInfo>,
}

impl DepositLedger {
    /// Deposit of `participant`.
    pub fn balance_of(&self, participant: Address) -> U256 {
        self.deposits.get(&participant).copied().unwrap_or_default()
    }

    /// Stake of `participant`.
    pub fn stake_of(&self, participant: Address) -> StakeInfo {
        self.stakes.get(&participant).copied().unwrap_or_default()
    }

    /// Increases a deposit. Returns the new deposit.
    pub fn credit(&mut self, participant: Address, amount: U256) -> U256 {
        let balance = self.deposits.entry(participant).or_default();
        *balance = balance.saturating_add(amount);
        trace!(target: "entrypoint::ledger", %participant, %amount, total = %balance, "credited deposit");
        *balance
    }

    /// Decreases a deposit, failing without effect if it cannot cover `amount`.
    pub fn debit(&mut self, participant: Address, amount: U256) -> Result<U256, LedgerError> {
        let available = self.balance_of(participant);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: participant,
                required: amount,
                available,
            });
        }
        let remaining = available - amount;
        self.deposits.insert(participant, remaining);
        trace!(target: "entrypoint::ledger", %participant, %amount, total = %remaining, "debited deposit");
        Ok(remaining)
    }

    /// Takes as much of `amount` as the deposit holds. Returns what was taken.
    pub fn debit_up_to(&mut self, participant: Address, amount: U256) -> U256 {
        let taken = amount.min(self.balance_of(participant));
        if !taken.is_zero() {
            let remaining = self.balance_of(participant) - taken;
            self.deposits.insert(participant, remaining);
        }
        taken
    }

    /// Adds to a participant's stake and sets its unstake delay.
    ///
    /// The delay may not decrease and the stake may not be unlocking.
    pub fn lock_stake(
        &mut self,
        participant: Address,
        amount: U256,
        unstake_delay_sec: u32,
    ) -> Result<StakeInfo, LedgerError> {
        let current = self.stake_of(participant);
        if unstake_delay_sec == 0 {
            return Err(LedgerError::ZeroUnstakeDelay);
        }
        if unstake_delay_sec < current.unstake_delay_sec {
            return Err(LedgerError::UnstakeDelayDecreased {
                current: current.unstake_delay_sec,
                requested: unstake_delay_sec,
            });
        }
        if current.is_unlocking() {
            return Err(LedgerError::AlreadyUnstaking(participant));
        }
        let stake = current.stake.saturating_add(amount);
        if stake.is_zero() {
            return Err(LedgerError::NoStake);
        }
        let info = StakeInfo { stake, unstake_delay_sec, withdraw_time: 0 };
        self.stakes.insert(participant, info);
        Ok(info)
    }

    /// Starts the unstake delay. Returns the withdrawal time.
    pub fn unlock_stake(&mut self, participant: Address, now: u64) -> Result<u64, LedgerError> {
        let mut info = self.stake_of(participant);
        if info.stake.is_zero() {
            return Err(LedgerError::NotStaked(participant));
        }
        if info.is_unlocking() {
            return Err(LedgerError::AlreadyUnstaking(participant));
        }
        info.withdraw_time = now.saturating_add(u64::from(info.unstake_delay_sec));
        self.stakes.insert(participant, info);
        Ok(info.withdraw_time)
    }

    /// Removes an unlocked stake whose delay has elapsed. Returns the amount.
    pub fn withdraw_stake(&mut self, participant: Address, now: u64) -> Result<U256, LedgerError> {
        let info = self.stake_of(participant);
        if info.stake.is_zero() {
            return Err(LedgerError::NotStaked(participant));
        }
        if !info.is_unlocking() {
            return Err(LedgerError::StakeNotUnlocked);
        }
        if now < info.withdraw_time {
            return Err(LedgerError::WithdrawalNotDue { withdraw_time: info.withdraw_time, now });
        }
        self.stakes.remove(&participant);
        Ok(info.stake)
    }

    /// Puts back a stake removed by a withdrawal that could not be paid out.
    pub(crate) fn restore_stake(&mut self, participant: Address, info: StakeInfo) {
        self.stakes.insert(participant, info);
    }

    /// Returns true if the participant may sponsor operations.
    pub fn is_stake_valid(&self, participant: Address, min_stake: U256, min_delay_sec: u32) -> bool {
        let info = self.stake_of(participant);
        !info.stake.is_zero()
            && info.stake >= min_stake
            && info.unstake_delay_sec >= min_delay_sec
            && !info.is_unlocking()
    }

    /// Sum of all deposits and stakes.
    pub fn total_held(&self) -> U256 {
        let deposits = self.deposits.values().fold(U256::ZERO, |acc, v| acc.saturating_add(*v));
        self.stakes.values().fold(deposits, |acc, info| acc.saturating_add(info.stake))
    }
}
