//! Transactions
//!
//! A transaction is a flat, signed record: type tag, sender, recipient,
//! amount, asset, fee, and nonce. The canonical hash is SHA-256 over the
//! JSON form with the signature field cleared; signing produces an Ed25519
//! signature over that hash.

use super::address::{validate_address, Address};
use super::{ASSET_GYD, ASSET_GYDS};
use crate::crypto::hash::hash256;
use crate::crypto::keys::{verify_signature, KeyPair};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use std::fmt;

/// Transaction hash (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hex string without prefix
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a hex string, with or without the 0x prefix
    pub fn from_hex(s: &str) -> Result<Self, TransactionError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|_| TransactionError::InvalidHash)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TransactionError::InvalidHash)?;
        Ok(Self(arr))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash(0x{})", &self.to_hex()[..16])
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Transaction type tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Transfer,
    Stake,
    Unstake,
    Mint,
    Burn,
    CreateAsset,
    UpdateOracle,
}

impl TxType {
    /// Type name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            TxType::Transfer => "transfer",
            TxType::Stake => "stake",
            TxType::Unstake => "unstake",
            TxType::Mint => "mint",
            TxType::Burn => "burn",
            TxType::CreateAsset => "create_asset",
            TxType::UpdateOracle => "update_oracle",
        }
    }
}

/// A chain transaction
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction type
    #[serde(rename = "type")]
    pub tx_type: TxType,
    /// Sender address
    pub from: Address,
    /// Recipient address (empty for burns)
    pub to: Address,
    /// Amount in base units
    pub amount: u64,
    /// Asset identifier
    pub asset: String,
    /// Fee in base units of the same asset
    pub fee: u64,
    /// Sender nonce
    pub nonce: u64,
    /// Creation timestamp (Unix seconds)
    pub timestamp: i64,
    /// Type-specific payload
    #[serde_as(as = "Option<Hex>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    /// Ed25519 signature over the canonical hash
    #[serde_as(as = "Hex")]
    pub signature: Vec<u8>,
    /// Signer public key
    #[serde_as(as = "Hex")]
    pub pub_key: Vec<u8>,
}

impl Transaction {
    /// Create a new unsigned transaction
    pub fn new(tx_type: TxType, from: Address, to: Address, amount: u64, asset: &str) -> Self {
        Self {
            tx_type,
            from,
            to,
            amount,
            asset: asset.to_string(),
            fee: 0,
            nonce: 0,
            timestamp: crate::unix_now(),
            data: None,
            signature: Vec::new(),
            pub_key: Vec::new(),
        }
    }

    /// Create a transfer
    pub fn transfer(from: Address, to: Address, amount: u64, asset: &str) -> Self {
        Self::new(TxType::Transfer, from, to, amount, asset)
    }

    /// Create a stake transaction (GYDS moves from balance to stake)
    pub fn stake(from: Address, validator: Address, amount: u64) -> Self {
        Self::new(TxType::Stake, from, validator, amount, ASSET_GYDS)
    }

    /// Create an unstake transaction
    pub fn unstake(from: Address, validator: Address, amount: u64) -> Self {
        Self::new(TxType::Unstake, from, validator, amount, ASSET_GYDS)
    }

    /// Create a mint transaction
    pub fn mint(from: Address, to: Address, amount: u64, asset: &str) -> Self {
        Self::new(TxType::Mint, from, to, amount, asset)
    }

    /// Create a burn transaction
    pub fn burn(from: Address, amount: u64, asset: &str) -> Self {
        Self::new(TxType::Burn, from, Address::default(), amount, asset)
    }

    /// Set the fee
    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    /// Set the nonce
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Attach a payload
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    /// Canonical transaction hash.
    ///
    /// SHA-256 over the JSON form with the signature cleared.
    pub fn hash(&self) -> TxHash {
        let mut unsigned = self.clone();
        unsigned.signature = Vec::new();

        let bytes = serde_json::to_vec(&unsigned).unwrap_or_default();
        TxHash(hash256(&bytes))
    }

    /// Sign with the given key pair, recording its public key
    pub fn sign(&mut self, keypair: &KeyPair) {
        self.pub_key = keypair.public_key().to_vec();
        let hash = self.hash();
        self.signature = keypair.sign(&hash.0).to_vec();
    }

    /// Field-level verification, done before any state effect
    pub fn verify(&self) -> Result<(), TransactionError> {
        if self.from.is_empty() {
            return Err(TransactionError::MissingFrom);
        }

        if self.tx_type != TxType::Burn && self.to.is_empty() {
            return Err(TransactionError::MissingTo);
        }

        if self.asset.is_empty() {
            return Err(TransactionError::MissingAsset);
        }

        match self.tx_type {
            TxType::Transfer => {
                if self.amount == 0 {
                    return Err(TransactionError::ZeroAmount);
                }
                if self.asset != ASSET_GYDS && self.asset != ASSET_GYD {
                    return Err(TransactionError::InvalidAsset);
                }
            }
            TxType::Stake | TxType::Unstake => {
                if self.asset != ASSET_GYDS {
                    return Err(TransactionError::InvalidAsset);
                }
            }
            _ => {}
        }

        if self.signature.is_empty() {
            return Err(TransactionError::MissingSignature);
        }

        validate_address(self.from.as_str()).map_err(|_| TransactionError::InvalidAddress)?;
        if !self.to.is_empty() {
            validate_address(self.to.as_str()).map_err(|_| TransactionError::InvalidAddress)?;
        }

        let hash = self.hash();
        if !verify_signature(&self.pub_key, &hash.0, &self.signature) {
            return Err(TransactionError::InvalidSignature);
        }

        Ok(())
    }

    /// Serialized size in bytes
    pub fn size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }

    /// True for transfer transactions
    pub fn is_transfer(&self) -> bool {
        self.tx_type == TxType::Transfer
    }

    /// True for stake and unstake transactions
    pub fn is_staking(&self) -> bool {
        matches!(self.tx_type, TxType::Stake | TxType::Unstake)
    }
}

/// Result of executing a transaction inside a block
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: TxHash,
    pub block_hash: super::block::BlockHash,
    pub block_height: u64,
    pub index: u32,
    /// 0 = failed, 1 = success
    pub status: u8,
    pub gas_used: u64,
    pub logs: Vec<ReceiptLog>,
}

/// Log entry attached to a receipt
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReceiptLog {
    pub address: Address,
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
}

impl TransactionReceipt {
    /// Create a receipt for a confirmed transaction
    pub fn new(
        tx_hash: TxHash,
        block_hash: super::block::BlockHash,
        block_height: u64,
        index: u32,
        status: u8,
    ) -> Self {
        Self {
            tx_hash,
            block_hash,
            block_height,
            index,
            status,
            gas_used: 0,
            logs: Vec::new(),
        }
    }
}

/// Transaction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("missing sender address")]
    MissingFrom,
    #[error("missing recipient address")]
    MissingTo,
    #[error("amount cannot be zero")]
    ZeroAmount,
    #[error("missing asset type")]
    MissingAsset,
    #[error("invalid asset type")]
    InvalidAsset,
    #[error("missing signature")]
    MissingSignature,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid address")]
    InvalidAddress,
    #[error("invalid nonce")]
    InvalidNonce,
    #[error("invalid transaction hash")]
    InvalidHash,
    #[error("invalid transaction payload")]
    InvalidPayload,
    #[error("transaction not found")]
    NotFound,
}
