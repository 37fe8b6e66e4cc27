//! Legacy proof-of-work reward schedule
//!
//! The chain launched with a proof-of-work reward helper that halves the
//! base reward on a fixed block interval with a floor. Proof-of-stake is
//! authoritative and distributes rewards through the engine; this schedule
//! is kept for the dormant mining path and reporting.

use serde::{Deserialize, Serialize};

/// Reward schedule parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSchedule {
    /// Reward at height zero, in base units
    pub base_reward: u64,
    /// Blocks between halvings
    pub halving_blocks: u64,
    /// Floor the reward never drops below
    pub min_reward: u64,
    /// Miner share of fees in basis points
    pub miner_share: u64,
    /// Validator share of fees in basis points
    pub validator_share: u64,
}

impl Default for RewardSchedule {
    fn default() -> Self {
        Self {
            base_reward: 10 * 100_000_000,
            halving_blocks: 2_100_000,
            min_reward: 1_000_000,
            miner_share: 2_000,
            validator_share: 8_000,
        }
    }
}

/// Reward split for one block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReward {
    pub height: u64,
    pub block_reward: u64,
    pub fees: u64,
    pub total_reward: u64,
    pub miner_reward: u64,
    pub validator_reward: u64,
}

impl RewardSchedule {
    /// Block reward at a height: the base reward halved once per interval,
    /// clamped at the floor.
    pub fn block_reward(&self, height: u64) -> u64 {
        let halvings = height / self.halving_blocks;
        let mut reward = self.base_reward;

        for _ in 0..halvings {
            if reward <= self.min_reward {
                break;
            }
            reward /= 2;
        }

        reward.max(self.min_reward)
    }

    /// Split a block reward plus fees between miner and validator shares
    pub fn distribute(&self, height: u64, fees: u64) -> BlockReward {
        let block_reward = self.block_reward(height);
        let total_reward = block_reward.saturating_add(fees);

        let miner_reward = ((total_reward as u128 * self.miner_share as u128) / 10_000) as u64;
        let validator_reward = total_reward - miner_reward;

        BlockReward {
            height,
            block_reward,
            fees,
            total_reward,
            miner_reward,
            validator_reward,
        }
    }
}
