//! Blocks and block headers
//!
//! A block is a header, an ordered transaction list, and a single proposer
//! signature. The header commits to the transaction set through a Merkle
//! root over transaction hashes and to the world state through the state
//! root.

use super::address::Address;
use super::transaction::Transaction;
use crate::crypto::hash::hash256;
use crate::crypto::keys::{verify_signature, KeyPair};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use std::fmt;

/// Block hash (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// Zero hash, the genesis parent
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hex string without prefix
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a hex string, with or without the 0x prefix
    pub fn from_hex(s: &str) -> Result<Self, BlockError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|_| BlockError::InvalidHash)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| BlockError::InvalidHash)?;
        Ok(Self(arr))
    }

    /// True if all zero (the "empty" parent hash)
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash(0x{})", &self.to_hex()[..16])
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Block header
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Header version
    pub version: u32,
    /// Block height (0 for genesis)
    pub height: u64,
    /// Block timestamp (Unix seconds)
    pub timestamp: i64,
    /// Parent block hash (zero for genesis)
    pub parent_hash: BlockHash,
    /// Merkle root of transaction hashes
    #[serde_as(as = "Hex")]
    pub tx_root: [u8; 32],
    /// State root after applying this block
    #[serde_as(as = "Hex")]
    pub state_root: [u8; 32],
    /// Receipt root
    #[serde_as(as = "Hex")]
    pub receipt_root: [u8; 32],
    /// Digest of the validator set that produced this block
    #[serde_as(as = "Hex")]
    pub validator_set_digest: [u8; 32],
    /// Legacy proof-of-work difficulty, ignored under proof-of-stake
    pub difficulty: u64,
    /// Legacy proof-of-work nonce
    pub nonce: u64,
    /// Free-form extra data
    #[serde_as(as = "Hex")]
    pub extra_data: Vec<u8>,
    /// Gas limit for this block
    pub gas_limit: u64,
    /// Gas used by transactions
    pub gas_used: u64,
}

impl Header {
    /// Current header version
    pub const CURRENT_VERSION: u32 = 1;

    /// Clock drift tolerance for incoming headers, in seconds
    pub const MAX_CLOCK_DRIFT: i64 = 15;

    /// Create a header for a new block
    pub fn new(parent_hash: BlockHash, height: u64) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            height,
            timestamp: crate::unix_now(),
            parent_hash,
            tx_root: [0u8; 32],
            state_root: [0u8; 32],
            receipt_root: [0u8; 32],
            validator_set_digest: [0u8; 32],
            difficulty: 1000,
            nonce: 0,
            extra_data: Vec::new(),
            gas_limit: 10_000_000,
            gas_used: 0,
        }
    }

    /// Header hash: SHA-256 over the canonical JSON form.
    ///
    /// The proposer signature lives outside the header, so no field needs
    /// clearing here.
    pub fn hash(&self) -> BlockHash {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        BlockHash(hash256(&bytes))
    }

    /// Validate header invariants
    pub fn validate(&self) -> Result<(), BlockError> {
        if self.timestamp > crate::unix_now() + Self::MAX_CLOCK_DRIFT {
            return Err(BlockError::FutureTimestamp);
        }

        if self.height > 0 && self.parent_hash.is_zero() {
            return Err(BlockError::InvalidParent);
        }

        Ok(())
    }

    /// True for the genesis header
    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.parent_hash.is_zero()
    }
}

/// A complete block
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block header
    pub header: Header,
    /// Ordered transaction list
    pub transactions: Vec<Transaction>,
    /// Proposer address
    pub validator: Address,
    /// Proposer signature over the header hash
    #[serde_as(as = "Hex")]
    pub signature: Vec<u8>,
}

impl Block {
    /// Create a block and commit its transaction root
    pub fn new(
        parent_hash: BlockHash,
        height: u64,
        transactions: Vec<Transaction>,
        validator: Address,
    ) -> Self {
        let mut block = Self {
            header: Header::new(parent_hash, height),
            transactions,
            validator,
            signature: Vec::new(),
        };
        block.header.tx_root = block.compute_tx_root();
        block
    }

    /// Block hash (hash of the header)
    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    /// Block height
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Merkle root over transaction hashes.
    ///
    /// Empty list hashes to 32 zero bytes; a single transaction's hash is the
    /// root itself.
    pub fn compute_tx_root(&self) -> [u8; 32] {
        let hashes: Vec<[u8; 32]> = self.transactions.iter().map(|tx| tx.hash().0).collect();
        compute_merkle_root(&hashes)
    }

    /// Recompute the transaction root and stamp the timestamp before signing
    pub fn finalize(&mut self) {
        self.header.timestamp = crate::unix_now();
        self.header.tx_root = self.compute_tx_root();
    }

    /// Sign the header hash as the proposer
    pub fn sign(&mut self, keypair: &KeyPair) {
        let hash = self.hash();
        self.signature = keypair.sign(&hash.0).to_vec();
    }

    /// Verify the proposer signature under a known public key
    pub fn verify_proposer_signature(&self, public_key: &[u8]) -> Result<(), BlockError> {
        let hash = self.hash();
        if verify_signature(public_key, &hash.0, &self.signature) {
            Ok(())
        } else {
            Err(BlockError::InvalidSignature)
        }
    }

    /// Structural verification: header invariants, every transaction, and
    /// the committed transaction root.
    pub fn verify(&self) -> Result<(), BlockError> {
        self.header.validate()?;

        for tx in &self.transactions {
            tx.verify().map_err(BlockError::Transaction)?;
        }

        if self.compute_tx_root() != self.header.tx_root {
            return Err(BlockError::InvalidTxRoot);
        }

        Ok(())
    }

    /// Serialized size in bytes
    pub fn size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }

    /// Number of transactions
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}

/// Merkle root over a list of hashes with single-SHA-256 pairing.
///
/// Pairs are concatenated and hashed once per level; an odd level duplicates
/// its last entry. This is the block-path pairing rule — the freestanding
/// crypto util pairs with double SHA-256 instead.
pub fn compute_merkle_root(hashes: &[[u8; 32]]) -> [u8; 32] {
    if hashes.is_empty() {
        return [0u8; 32];
    }

    let mut level: Vec<[u8; 32]> = hashes.to_vec();

    while level.len() > 1 {
        if level.len() % 2 != 0 {
            let last = level[level.len() - 1];
            level.push(last);
        }

        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let mut combined = [0u8; 64];
            combined[..32].copy_from_slice(&pair[0]);
            combined[32..].copy_from_slice(&pair[1]);
            next.push(hash256(&combined));
        }
        level = next;
    }

    level[0]
}

/// Block errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    #[error("block timestamp is in the future")]
    FutureTimestamp,
    #[error("invalid parent block")]
    InvalidParent,
    #[error("invalid transaction root")]
    InvalidTxRoot,
    #[error("invalid block signature")]
    InvalidSignature,
    #[error("invalid block hash")]
    InvalidHash,
    #[error("block not found")]
    NotFound,
    #[error("duplicate block")]
    Duplicate,
    #[error("{0}")]
    Transaction(#[from] super::transaction::TransactionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ASSET_GYDS;

    fn proposer() -> (KeyPair, Address) {
        let pair = KeyPair::from_seed([11u8; 32]);
        let addr = Address::validator_from_public_key(&pair.public_key());
        (pair, addr)
    }

    fn signed_tx(seed: u8, nonce: u64) -> Transaction {
        let pair = KeyPair::from_seed([seed; 32]);
        let from = Address::from_public_key(&pair.public_key());
        let mut tx = Transaction::transfer(from, Address::from_hash(&[1u8; 20]), 10, ASSET_GYDS)
            .with_fee(1)
            .with_nonce(nonce);
        tx.sign(&pair);
        tx
    }

    #[test]
    fn test_header_hash_deterministic() {
        let header = Header::new(BlockHash::ZERO, 1);
        assert_eq!(header.hash(), header.hash());
        assert!(!header.hash().is_zero());
    }

    #[test]
    fn test_empty_block_tx_root_is_zero() {
        let (_, addr) = proposer();
        let block = Block::new(BlockHash::ZERO, 0, Vec::new(), addr);
        assert_eq!(block.header.tx_root, [0u8; 32]);
        assert!(block.verify().is_ok());
    }

    #[test]
    fn test_single_tx_root_is_tx_hash() {
        let (_, addr) = proposer();
        let tx = signed_tx(1, 0);
        let expected = tx.hash().0;
        let block = Block::new(BlockHash::from_bytes([1u8; 32]), 1, vec![tx], addr);
        assert_eq!(block.header.tx_root, expected);
    }

    #[test]
    fn test_merkle_root_determinism_and_order() {
        let leaves = vec![[1u8; 32], [2u8; 32], [3u8; 32], [4u8; 32]];
        assert_eq!(compute_merkle_root(&leaves), compute_merkle_root(&leaves));

        let mut swapped = leaves.clone();
        swapped.swap(0, 1);
        assert_ne!(compute_merkle_root(&leaves), compute_merkle_root(&swapped));
    }

    #[test]
    fn test_merkle_differs_from_double_sha_variant() {
        let leaves = vec![[1u8; 32], [2u8; 32]];
        assert_ne!(
            compute_merkle_root(&leaves),
            crate::crypto::merkle_root_double(&leaves)
        );
    }

    #[test]
    fn test_verify_detects_tx_root_mismatch() {
        let (_, addr) = proposer();
        let mut block = Block::new(BlockHash::from_bytes([1u8; 32]), 1, vec![signed_tx(1, 0)], addr);
        block.header.tx_root = [0xAB; 32];
        assert_eq!(block.verify(), Err(BlockError::InvalidTxRoot));
    }

    #[test]
    fn test_verify_rejects_future_timestamp() {
        let (_, addr) = proposer();
        let mut block = Block::new(BlockHash::ZERO, 0, Vec::new(), addr);
        block.header.timestamp = crate::unix_now() + 60;
        assert_eq!(block.verify(), Err(BlockError::FutureTimestamp));
    }

    #[test]
    fn test_verify_rejects_missing_parent_hash() {
        let (_, addr) = proposer();
        let mut block = Block::new(BlockHash::ZERO, 5, Vec::new(), addr);
        block.header.tx_root = block.compute_tx_root();
        assert_eq!(block.verify(), Err(BlockError::InvalidParent));
    }

    #[test]
    fn test_proposer_signature() {
        let (pair, addr) = proposer();
        let mut block = Block::new(BlockHash::from_bytes([2u8; 32]), 1, Vec::new(), addr);
        block.sign(&pair);

        assert!(block.verify_proposer_signature(&pair.public_key()).is_ok());

        let other = KeyPair::from_seed([99u8; 32]);
        assert_eq!(
            block.verify_proposer_signature(&other.public_key()),
            Err(BlockError::InvalidSignature)
        );
    }

    #[test]
    fn test_genesis_detection() {
        let (_, addr) = proposer();
        let genesis = Block::new(BlockHash::ZERO, 0, Vec::new(), addr.clone());
        assert!(genesis.header.is_genesis());

        let child = Block::new(genesis.hash(), 1, Vec::new(), addr);
        assert!(!child.header.is_genesis());
    }

    #[test]
    fn test_serde_round_trip() {
        let (pair, addr) = proposer();
        let mut block = Block::new(BlockHash::ZERO, 0, vec![signed_tx(3, 0)], addr);
        block.sign(&pair);

        let json = serde_json::to_string(&block).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(block, back);
        assert_eq!(block.hash(), back.hash());
    }
}
