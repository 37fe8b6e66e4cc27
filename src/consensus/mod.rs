//! Proof-of-stake consensus
//!
//! Stake-weighted proposer selection over a delegated validator set, reward
//! distribution, and the slashing keeper that punishes downtime and
//! equivocation.
//!
//! ## Modules
//! - `validator` - Validator records and the status machine
//! - `engine` - Registration, delegation, active set, leader selection
//! - `slashing` - Signing windows, penalties, jailing, tombstoning
//! - `reward` - Legacy proof-of-work halving schedule (dormant)

pub mod engine;
pub mod reward;
pub mod slashing;
pub mod validator;

pub use engine::{Engine, RewardSettlement};
pub use reward::{BlockReward, RewardSchedule};
pub use slashing::{SigningInfo, SlashingEvent, SlashingKeeper, SlashingParams};
pub use validator::{SlashEvent, Validator, ValidatorStatus};

use crate::types::Address;
use serde::{Deserialize, Serialize};

/// Why a validator was slashed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlashReason {
    DoubleSign,
    Downtime,
    Misbehavior,
    InvalidBlock,
}

impl SlashReason {
    /// Wire name of the reason
    pub fn name(&self) -> &'static str {
        match self {
            SlashReason::DoubleSign => "double_sign",
            SlashReason::Downtime => "downtime",
            SlashReason::Misbehavior => "misbehavior",
            SlashReason::InvalidBlock => "invalid_block",
        }
    }
}

/// Consensus errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("no validators available")]
    NoValidators,
    #[error("not a validator")]
    NotValidator,
    #[error("already a validator")]
    AlreadyValidator,
    #[error("validator not found: {0}")]
    ValidatorNotFound(Address),
    #[error("insufficient stake: have {have}, need {need}")]
    InsufficientStake { have: u64, need: u64 },
    #[error("validator is jailed")]
    ValidatorJailed,
    #[error("validator still jailed")]
    StillJailed,
    #[error("validator is tombstoned")]
    Tombstoned,
    #[error("double signing detected")]
    DoubleSign,
    #[error("invalid block signature")]
    InvalidSignature,
    #[error("invalid commission rate")]
    InvalidCommission,
}

pub type ConsensusResult<T> = Result<T, ConsensusError>;
