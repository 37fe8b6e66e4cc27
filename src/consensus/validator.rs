//! Validators
//!
//! A validator carries self-stake plus delegations, earns rewards in
//! proportion to its total stake, and can be jailed or slashed for
//! misbehavior. Status transitions: inactive ⇄ active → jailed → active
//! (via unjail), active → unbonding → removed.

use super::{ConsensusError, ConsensusResult, SlashReason};
use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Validator lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorStatus {
    Inactive,
    Active,
    Jailed,
    Unbonding,
}

/// A slashing incident recorded against a validator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlashEvent {
    pub height: u64,
    pub reason: SlashReason,
    pub amount: u64,
    pub timestamp: i64,
}

/// A network validator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    /// Operator address
    pub address: Address,
    /// Hex-encoded Ed25519 public key used for block signatures
    pub pub_key: String,
    /// Self-bonded stake
    pub self_stake: u64,
    /// Self-stake plus all delegations
    pub total_stake: u64,
    /// Delegated amounts by delegator
    pub delegations: BTreeMap<Address, u64>,
    /// Commission in basis points (100 = 1%)
    pub commission: u64,
    /// Accumulated, unsettled rewards
    pub rewards: u64,
    /// Lifecycle status
    pub status: ValidatorStatus,
    /// Jail expiry (Unix seconds), zero when not jailed
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub jailed_until: i64,
    /// Unbonding completion (Unix seconds), zero when not unbonding
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub unbonding_end: i64,
    /// Slashing history
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slash_events: Vec<SlashEvent>,
    pub created_at: i64,
    pub updated_at: i64,

    /// Blocks produced while selected
    pub blocks_produced: u64,
    /// Blocks missed while selected
    pub blocks_missed: u64,
    /// Production ratio, 0-100
    pub uptime: f64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub website: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

impl Validator {
    /// Default commission in basis points (5%)
    pub const DEFAULT_COMMISSION: u64 = 500;

    /// Register a new active validator
    pub fn new(address: Address, pub_key: String, stake: u64) -> Self {
        let now = crate::unix_now();
        Self {
            address,
            pub_key,
            self_stake: stake,
            total_stake: stake,
            delegations: BTreeMap::new(),
            commission: Self::DEFAULT_COMMISSION,
            rewards: 0,
            status: ValidatorStatus::Active,
            jailed_until: 0,
            unbonding_end: 0,
            slash_events: Vec::new(),
            created_at: now,
            updated_at: now,
            blocks_produced: 0,
            blocks_missed: 0,
            uptime: 100.0,
            name: String::new(),
            website: String::new(),
            description: String::new(),
        }
    }

    /// True when eligible for the active set
    pub fn is_active(&self) -> bool {
        self.status == ValidatorStatus::Active
    }

    /// Add a delegation
    pub fn add_delegation(&mut self, delegator: &Address, amount: u64) {
        let entry = self.delegations.entry(delegator.clone()).or_insert(0);
        *entry = entry.saturating_add(amount);
        self.total_stake = self.total_stake.saturating_add(amount);
        self.updated_at = crate::unix_now();
    }

    /// Remove a delegation; empty entries are dropped
    pub fn remove_delegation(&mut self, delegator: &Address, amount: u64) -> ConsensusResult<()> {
        let current = self.delegations.get(delegator).copied().unwrap_or(0);
        if current < amount {
            return Err(ConsensusError::InsufficientStake {
                have: current,
                need: amount,
            });
        }

        if current == amount {
            self.delegations.remove(delegator);
        } else {
            self.delegations.insert(delegator.clone(), current - amount);
        }
        self.total_stake -= amount;
        self.updated_at = crate::unix_now();
        Ok(())
    }

    /// Delegation from one delegator, zero when absent
    pub fn delegation(&self, delegator: &Address) -> u64 {
        self.delegations.get(delegator).copied().unwrap_or(0)
    }

    /// Accumulate rewards
    pub fn add_reward(&mut self, amount: u64) {
        self.rewards = self.rewards.saturating_add(amount);
    }

    /// Take all accumulated rewards
    pub fn withdraw_rewards(&mut self) -> u64 {
        std::mem::take(&mut self.rewards)
    }

    /// Slash `penalty_bps` basis points of total stake.
    ///
    /// Self-stake absorbs the penalty first; any remainder is taken from
    /// delegations pro-rata by delegated amount. Returns the slashed amount.
    pub fn slash(&mut self, penalty_bps: u64, reason: SlashReason, height: u64, now: i64) -> u64 {
        let slash_amount =
            ((self.total_stake as u128 * penalty_bps as u128) / 10_000) as u64;

        if self.self_stake >= slash_amount {
            self.self_stake -= slash_amount;
        } else {
            let remaining = slash_amount - self.self_stake;
            self.self_stake = 0;

            let total_delegated: u64 = self.delegations.values().sum();
            if total_delegated > 0 {
                let mut collected = 0u64;
                for amount in self.delegations.values_mut() {
                    let share =
                        ((*amount as u128 * remaining as u128) / total_delegated as u128) as u64;
                    *amount -= share;
                    collected += share;
                }
                // Rounding dust, so total_stake stays self_stake + Σ delegations
                let mut leftover = remaining.saturating_sub(collected);
                for amount in self.delegations.values_mut() {
                    let take = leftover.min(*amount);
                    *amount -= take;
                    leftover -= take;
                    if leftover == 0 {
                        break;
                    }
                }
            }
        }

        self.total_stake = self.total_stake.saturating_sub(slash_amount);
        self.slash_events.push(SlashEvent {
            height,
            reason,
            amount: slash_amount,
            timestamp: now,
        });
        self.updated_at = now;

        slash_amount
    }

    /// Put the validator in jail until `now + duration`
    pub fn jail(&mut self, duration: Duration, now: i64) {
        self.status = ValidatorStatus::Jailed;
        self.jailed_until = now + duration.as_secs() as i64;
        self.updated_at = now;
    }

    /// Release from jail once the jail period has passed
    pub fn unjail(&mut self, now: i64) -> ConsensusResult<()> {
        if self.status != ValidatorStatus::Jailed {
            return Ok(());
        }

        if now < self.jailed_until {
            return Err(ConsensusError::StillJailed);
        }

        self.status = ValidatorStatus::Active;
        self.jailed_until = 0;
        self.updated_at = now;
        Ok(())
    }

    /// Begin the unbonding period
    pub fn start_unbonding(&mut self, unbonding: Duration, now: i64) {
        self.status = ValidatorStatus::Unbonding;
        self.unbonding_end = now + unbonding.as_secs() as i64;
        self.updated_at = now;
    }

    /// True once the unbonding period has completed
    pub fn is_unbonded(&self, now: i64) -> bool {
        self.status == ValidatorStatus::Unbonding && now >= self.unbonding_end
    }

    /// Record a produced or missed block and refresh the uptime ratio
    pub fn record_block(&mut self, produced: bool) {
        if produced {
            self.blocks_produced += 1;
        } else {
            self.blocks_missed += 1;
        }

        let total = self.blocks_produced + self.blocks_missed;
        if total > 0 {
            self.uptime = self.blocks_produced as f64 / total as f64 * 100.0;
        }
        self.updated_at = crate::unix_now();
    }

    /// Update the commission rate
    pub fn set_commission(&mut self, commission: u64) -> ConsensusResult<()> {
        if commission > 10_000 {
            return Err(ConsensusError::InvalidCommission);
        }
        self.commission = commission;
        self.updated_at = crate::unix_now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::from_hash(&[n; 20])
    }

    fn validator(stake: u64) -> Validator {
        Validator::new(addr(1), "aa".repeat(32), stake)
    }

    #[test]
    fn test_delegation_updates_total_stake() {
        let mut v = validator(1_000);
        v.add_delegation(&addr(2), 500);
        v.add_delegation(&addr(3), 250);

        assert_eq!(v.total_stake, 1_750);
        assert_eq!(v.delegation(&addr(2)), 500);

        v.remove_delegation(&addr(2), 500).unwrap();
        assert_eq!(v.total_stake, 1_250);
        assert!(!v.delegations.contains_key(&addr(2)));
    }

    #[test]
    fn test_remove_delegation_insufficient() {
        let mut v = validator(1_000);
        v.add_delegation(&addr(2), 100);
        assert!(matches!(
            v.remove_delegation(&addr(2), 200),
            Err(ConsensusError::InsufficientStake { have: 100, need: 200 })
        ));
    }

    #[test]
    fn test_slash_from_self_stake() {
        let mut v = validator(1_000_000);
        let slashed = v.slash(100, SlashReason::Downtime, 10, 0);

        // 1% of total stake
        assert_eq!(slashed, 10_000);
        assert_eq!(v.self_stake, 990_000);
        assert_eq!(v.total_stake, 990_000);
        assert_eq!(v.slash_events.len(), 1);
        assert_eq!(v.slash_events[0].reason, SlashReason::Downtime);
    }

    #[test]
    fn test_slash_spills_into_delegations_pro_rata() {
        let mut v = validator(100);
        v.add_delegation(&addr(2), 300);
        v.add_delegation(&addr(3), 600);
        // total stake 1000; slash 50% = 500; self-stake covers 100,
        // remainder 400 split 1:2 over delegations
        let slashed = v.slash(5_000, SlashReason::DoubleSign, 5, 0);

        assert_eq!(slashed, 500);
        assert_eq!(v.self_stake, 0);
        // Floor shares are 133 and 266; the 1-unit rounding dust is taken
        // from the first delegation so the stake identity holds.
        assert_eq!(v.delegation(&addr(2)), 300 - 134);
        assert_eq!(v.delegation(&addr(3)), 600 - 266);
        assert_eq!(v.total_stake, 500);
        assert_eq!(
            v.self_stake + v.delegations.values().sum::<u64>(),
            v.total_stake
        );
    }

    #[test]
    fn test_jail_and_unjail() {
        let mut v = validator(1_000);
        v.jail(Duration::from_secs(3600), 100);

        assert_eq!(v.status, ValidatorStatus::Jailed);
        assert_eq!(v.jailed_until, 3700);
        assert!(!v.is_active());

        assert_eq!(v.unjail(3699), Err(ConsensusError::StillJailed));
        v.unjail(3700).unwrap();
        assert!(v.is_active());
        assert_eq!(v.jailed_until, 0);
    }

    #[test]
    fn test_unjail_noop_when_not_jailed() {
        let mut v = validator(1_000);
        assert!(v.unjail(0).is_ok());
        assert!(v.is_active());
    }

    #[test]
    fn test_unbonding() {
        let mut v = validator(1_000);
        v.start_unbonding(Duration::from_secs(100), 50);

        assert_eq!(v.status, ValidatorStatus::Unbonding);
        assert!(!v.is_unbonded(149));
        assert!(v.is_unbonded(150));
    }

    #[test]
    fn test_rewards_accumulate_and_withdraw() {
        let mut v = validator(1_000);
        v.add_reward(10);
        v.add_reward(15);
        assert_eq!(v.rewards, 25);

        assert_eq!(v.withdraw_rewards(), 25);
        assert_eq!(v.rewards, 0);
    }

    #[test]
    fn test_uptime_tracking() {
        let mut v = validator(1_000);
        v.record_block(true);
        v.record_block(true);
        v.record_block(false);

        assert_eq!(v.blocks_produced, 2);
        assert_eq!(v.blocks_missed, 1);
        assert!((v.uptime - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_commission_bounds() {
        let mut v = validator(1_000);
        assert!(v.set_commission(10_000).is_ok());
        assert_eq!(
            v.set_commission(10_001),
            Err(ConsensusError::InvalidCommission)
        );
    }
}
