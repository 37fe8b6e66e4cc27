//! Consensus engine
//!
//! Owns the validator set. Proposer selection is deterministic and
//! stake-weighted: the active list is sorted by total stake (address as the
//! tie-break), and round `r` picks the validator whose cumulative stake
//! first exceeds `r mod total_stake`. Two nodes with the same active set and
//! round always select the same proposer.

use super::validator::Validator;
use super::{ConsensusError, ConsensusResult};
use crate::crypto::hash::hash_multiple;
use crate::types::{Address, Block};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// The proof-of-stake consensus engine
pub struct Engine {
    min_stake: u64,
    max_validators: u32,
    block_time: Duration,
    inner: RwLock<EngineInner>,
}

struct EngineInner {
    /// All registered validators by address
    validators: HashMap<Address, Arc<RwLock<Validator>>>,
    /// Active validators, stake-descending
    active: Vec<Arc<RwLock<Validator>>>,
    /// Total stake over the active list
    active_stake: u64,
    current_round: u64,
    current_leader: Option<Address>,
}

/// Outcome of settling a validator's accumulated rewards
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewardSettlement {
    /// Validator whose rewards were settled
    pub validator: Address,
    /// Total settled amount
    pub total: u64,
    /// Amount kept by the validator (commission plus any undelegated pool)
    pub validator_amount: u64,
    /// Pro-rata payouts per delegator
    pub payouts: BTreeMap<Address, u64>,
}

impl Engine {
    /// Create an engine with the chain's staking parameters
    pub fn new(min_stake: u64, max_validators: u32, block_time: Duration) -> Self {
        Self {
            min_stake,
            max_validators,
            block_time,
            inner: RwLock::new(EngineInner {
                validators: HashMap::new(),
                active: Vec::new(),
                active_stake: 0,
                current_round: 0,
                current_leader: None,
            }),
        }
    }

    /// Minimum stake for registration
    pub fn min_stake(&self) -> u64 {
        self.min_stake
    }

    /// Target block interval
    pub fn block_time(&self) -> Duration {
        self.block_time
    }

    /// Register a new validator.
    ///
    /// When the active set is full, admission requires more stake than the
    /// lowest-staked active validator.
    pub fn register_validator(
        &self,
        address: Address,
        pub_key: String,
        stake: u64,
    ) -> ConsensusResult<()> {
        let mut inner = self.inner.write();

        if inner.validators.contains_key(&address) {
            return Err(ConsensusError::AlreadyValidator);
        }

        if stake < self.min_stake {
            return Err(ConsensusError::InsufficientStake {
                have: stake,
                need: self.min_stake,
            });
        }

        if inner.active.len() as u32 >= self.max_validators {
            if let Some(lowest) = inner.active.last() {
                let floor = lowest.read().total_stake;
                if stake <= floor {
                    return Err(ConsensusError::InsufficientStake {
                        have: stake,
                        need: floor + 1,
                    });
                }
            }
        }

        info!(validator = %address, stake, "validator registered");
        let validator = Arc::new(RwLock::new(Validator::new(address.clone(), pub_key, stake)));
        inner.validators.insert(address, validator);
        Self::rebuild_active(&mut inner, self.min_stake, self.max_validators);

        Ok(())
    }

    /// Remove a validator entirely
    pub fn unregister_validator(&self, address: &Address) -> ConsensusResult<()> {
        let mut inner = self.inner.write();
        inner
            .validators
            .remove(address)
            .ok_or_else(|| ConsensusError::ValidatorNotFound(address.clone()))?;
        Self::rebuild_active(&mut inner, self.min_stake, self.max_validators);
        Ok(())
    }

    /// Add delegated stake to a validator
    pub fn delegate(
        &self,
        delegator: &Address,
        validator: &Address,
        amount: u64,
    ) -> ConsensusResult<()> {
        let mut inner = self.inner.write();
        let handle = inner
            .validators
            .get(validator)
            .ok_or_else(|| ConsensusError::ValidatorNotFound(validator.clone()))?
            .clone();

        handle.write().add_delegation(delegator, amount);
        Self::rebuild_active(&mut inner, self.min_stake, self.max_validators);
        Ok(())
    }

    /// Withdraw delegated stake from a validator
    pub fn undelegate(
        &self,
        delegator: &Address,
        validator: &Address,
        amount: u64,
    ) -> ConsensusResult<()> {
        let mut inner = self.inner.write();
        let handle = inner
            .validators
            .get(validator)
            .ok_or_else(|| ConsensusError::ValidatorNotFound(validator.clone()))?
            .clone();

        handle.write().remove_delegation(delegator, amount)?;
        Self::rebuild_active(&mut inner, self.min_stake, self.max_validators);
        Ok(())
    }

    /// Select the block proposer for a round.
    ///
    /// `target = round mod T` where `T` is the total active stake; the list
    /// is walked in sort order accumulating stake until the target is
    /// passed.
    pub fn select_leader(&self, round: u64) -> ConsensusResult<Validator> {
        let mut inner = self.inner.write();

        if inner.active.is_empty() || inner.active_stake == 0 {
            return Err(ConsensusError::NoValidators);
        }

        inner.current_round = round;
        let target = round % inner.active_stake;

        let mut cumulative = 0u64;
        let mut selected = None;
        for handle in &inner.active {
            let validator = handle.read();
            cumulative = cumulative.saturating_add(validator.total_stake);
            if cumulative > target {
                selected = Some(validator.clone());
                break;
            }
        }

        // The walk always terminates inside the list; keep the first
        // validator as a fallback against stale stake sums.
        let leader = match selected {
            Some(v) => v,
            None => inner.active[0].read().clone(),
        };

        debug!(round, leader = %leader.address, "leader selected");
        inner.current_leader = Some(leader.address.clone());
        Ok(leader)
    }

    /// Verify a block's proposer signature against the registered key
    pub fn verify_block(&self, block: &Block) -> ConsensusResult<()> {
        let handle = self
            .handle(&block.validator)
            .ok_or(ConsensusError::NotValidator)?;

        let pub_key_hex = handle.read().pub_key.clone();
        let pub_key = hex::decode(&pub_key_hex).map_err(|_| ConsensusError::InvalidSignature)?;

        block
            .verify_proposer_signature(&pub_key)
            .map_err(|_| ConsensusError::InvalidSignature)
    }

    /// Copy of a validator by address
    pub fn get_validator(&self, address: &Address) -> ConsensusResult<Validator> {
        let handle = self
            .handle(address)
            .ok_or_else(|| ConsensusError::ValidatorNotFound(address.clone()))?;
        let validator = handle.read().clone();
        Ok(validator)
    }

    /// Copies of the active validators, in selection order
    pub fn validators(&self) -> Vec<Validator> {
        let inner = self.inner.read();
        inner.active.iter().map(|h| h.read().clone()).collect()
    }

    /// Number of active validators
    pub fn validator_count(&self) -> usize {
        self.inner.read().active.len()
    }

    /// Total stake over the active set
    pub fn total_stake(&self) -> u64 {
        self.inner.read().active_stake
    }

    /// Leader of the most recent round
    pub fn current_leader(&self) -> Option<Address> {
        self.inner.read().current_leader.clone()
    }

    /// Digest of the active set, committed into block headers
    pub fn validator_set_digest(&self) -> [u8; 32] {
        let inner = self.inner.read();
        let parts: Vec<Vec<u8>> = inner
            .active
            .iter()
            .map(|h| h.read().address.as_str().as_bytes().to_vec())
            .collect();
        let refs: Vec<&[u8]> = parts.iter().map(|p| p.as_slice()).collect();
        hash_multiple(&refs)
    }

    /// Distribute a block reward over the active set, proportional to stake
    pub fn process_rewards(&self, block_reward: u64) {
        let inner = self.inner.read();
        if inner.active.is_empty() || inner.active_stake == 0 {
            return;
        }

        for handle in &inner.active {
            let mut validator = handle.write();
            let reward = ((block_reward as u128 * validator.total_stake as u128)
                / inner.active_stake as u128) as u64;
            validator.add_reward(reward);
        }
    }

    /// Settle a validator's accumulated rewards.
    ///
    /// Commission goes to the validator; the remainder is distributed
    /// pro-rata over delegations. With no delegators the validator keeps
    /// everything.
    pub fn settle_rewards(&self, address: &Address) -> ConsensusResult<RewardSettlement> {
        let handle = self
            .handle(address)
            .ok_or_else(|| ConsensusError::ValidatorNotFound(address.clone()))?;

        let mut validator = handle.write();
        let total = validator.withdraw_rewards();
        let commission = ((total as u128 * validator.commission as u128) / 10_000) as u64;
        let pool = total - commission;

        let mut payouts = BTreeMap::new();
        let total_delegated: u64 = validator.delegations.values().sum();

        let mut validator_amount = commission;
        if total_delegated == 0 {
            validator_amount += pool;
        } else {
            let mut distributed = 0u64;
            for (delegator, amount) in &validator.delegations {
                let share =
                    ((*amount as u128 * pool as u128) / total_delegated as u128) as u64;
                payouts.insert(delegator.clone(), share);
                distributed += share;
            }
            // Rounding dust stays with the validator
            validator_amount += pool - distributed;
        }

        Ok(RewardSettlement {
            validator: address.clone(),
            total,
            validator_amount,
            payouts,
        })
    }

    /// Record block production metrics for a validator
    pub fn record_block(&self, address: &Address, produced: bool) -> ConsensusResult<()> {
        let handle = self
            .handle(address)
            .ok_or_else(|| ConsensusError::ValidatorNotFound(address.clone()))?;
        handle.write().record_block(produced);
        Ok(())
    }

    /// Rebuild the active list after direct validator mutation
    pub fn refresh_active(&self) {
        let mut inner = self.inner.write();
        Self::rebuild_active(&mut inner, self.min_stake, self.max_validators);
    }

    /// Shared handle to a validator, for the slashing keeper
    pub(crate) fn handle(&self, address: &Address) -> Option<Arc<RwLock<Validator>>> {
        self.inner.read().validators.get(address).cloned()
    }

    /// Recompute the active list: active status, stake at or above the
    /// minimum, stake-descending with address ascending as the tie-break,
    /// truncated to the validator cap.
    fn rebuild_active(inner: &mut EngineInner, min_stake: u64, max_validators: u32) {
        let mut entries: Vec<(u64, Address, Arc<RwLock<Validator>>)> = inner
            .validators
            .values()
            .filter_map(|handle| {
                let v = handle.read();
                if v.is_active() && v.total_stake >= min_stake {
                    Some((v.total_stake, v.address.clone(), handle.clone()))
                } else {
                    None
                }
            })
            .collect();

        entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        entries.truncate(max_validators as usize);

        inner.active_stake = entries.iter().map(|(stake, _, _)| *stake).sum();
        inner.active = entries.into_iter().map(|(_, _, h)| h).collect();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Engine")
            .field("validators", &inner.validators.len())
            .field("active", &inner.active.len())
            .field("active_stake", &inner.active_stake)
            .finish()
    }
}
