//! GYDS chain core
//!
//! The node engine of the GYDS proof-of-stake blockchain: a native utility
//! token (GYDS), a native stablecoin (GYD), delegated staking with slashing,
//! a priority mempool, and a Merkle-committed replicated state database.
//!
//! ## Modules
//! - `crypto` - Ed25519 keys and hash primitives
//! - `types` - Addresses, transactions, blocks
//! - `state` - Accounts, assets, balances, state root
//! - `consensus` - Validator set, leader selection, rewards, slashing
//! - `chain` - Chain head: block index and the apply pipeline
//! - `mempool` - Pending transaction pool
//!
//! The peer network, JSON-RPC server, indexer, and wallet tooling live
//! outside this crate and drive it through the public interfaces here.

pub mod chain;
pub mod consensus;
pub mod crypto;
pub mod mempool;
pub mod state;
pub mod types;

/// Result type for chain core operations
pub type ChainResult<T> = Result<T, ChainError>;

/// Errors that can occur in the chain core
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("Address error: {0}")]
    Address(#[from] types::address::AddressError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] types::transaction::TransactionError),

    #[error("Block error: {0}")]
    Block(#[from] types::block::BlockError),

    #[error("State error: {0}")]
    State(#[from] state::StateError),

    #[error("Asset error: {0}")]
    Asset(#[from] state::asset::AssetError),

    #[error("Consensus error: {0}")]
    Consensus(#[from] consensus::ConsensusError),

    #[error("Mempool error: {0}")]
    Mempool(#[from] mempool::MempoolError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::keys::KeyError),
}

impl ChainError {
    /// Stable JSON-RPC error code for this error.
    ///
    /// The RPC layer maps core errors onto the application code range
    /// starting at -32000; anything without a dedicated code reports as an
    /// internal error (-32603).
    pub fn rpc_code(&self) -> i32 {
        use consensus::ConsensusError;
        use mempool::MempoolError;
        use state::StateError;
        use types::block::BlockError;
        use types::transaction::TransactionError;

        match self {
            ChainError::Block(BlockError::NotFound) => -32000,
            ChainError::Transaction(TransactionError::NotFound) => -32001,
            ChainError::State(StateError::AccountNotFound) => -32002,
            ChainError::State(StateError::InsufficientBalance) => -32003,
            ChainError::Transaction(TransactionError::InvalidSignature) => -32004,
            ChainError::Mempool(MempoolError::NonceTooLow) => -32005,
            ChainError::Transaction(TransactionError::InvalidNonce) => -32006,
            ChainError::Mempool(MempoolError::MempoolFull) => -32007,
            ChainError::Consensus(ConsensusError::ValidatorNotFound(_)) => -32008,
            ChainError::Consensus(ConsensusError::AlreadyValidator) => -32009,
            ChainError::Consensus(ConsensusError::NotValidator) => -32010,
            ChainError::Consensus(ConsensusError::InsufficientStake { .. }) => -32011,
            _ => -32603,
        }
    }
}

/// Unix timestamp in seconds.
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
