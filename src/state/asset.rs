//! Assets
//!
//! The chain carries two native assets — GYDS (utility) and GYD (stablecoin)
//! — plus user-created assets. Behavior is encoded as data: `mintable`,
//! `burnable`, and `pausable` flags gate the supply operations.

use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Asset kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Fungible,
    Stablecoin,
    Nft,
}

/// An asset definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Asset identifier
    pub id: String,
    /// Asset kind
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    /// Human-readable name
    pub name: String,
    /// Ticker symbol
    pub symbol: String,
    /// Decimal places
    pub decimals: u8,
    /// Current total supply in base units
    pub total_supply: u64,
    /// Maximum supply; zero means unbounded
    pub max_supply: u64,
    /// Owning address
    pub owner: Address,
    /// Supply can grow
    pub mintable: bool,
    /// Supply can shrink
    pub burnable: bool,
    /// Transfers and supply ops can be paused
    pub pausable: bool,
    /// Currently paused
    pub paused: bool,
    /// Optional descriptive metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AssetMetadata>,
    /// Creation timestamp (Unix seconds)
    pub created_at: i64,
    /// Last update timestamp (Unix seconds)
    pub updated_at: i64,
}

/// Descriptive asset metadata
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct AssetMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub external_url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Asset {
    /// Create a fungible token.
    ///
    /// `created_at` is supplied by the caller (genesis or transaction
    /// timestamp) — asset records feed the state root, so wall-clock reads
    /// here would fork the chain.
    pub fn fungible(
        id: &str,
        name: &str,
        symbol: &str,
        decimals: u8,
        owner: Address,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.to_string(),
            asset_type: AssetType::Fungible,
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
            total_supply: 0,
            max_supply: 0,
            owner,
            mintable: true,
            burnable: true,
            pausable: false,
            paused: false,
            metadata: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// Create a stablecoin (pausable, minted against collateral)
    pub fn stablecoin(id: &str, name: &str, symbol: &str, owner: Address, created_at: i64) -> Self {
        Self {
            asset_type: AssetType::Stablecoin,
            pausable: true,
            ..Self::fungible(id, name, symbol, 8, owner, created_at)
        }
    }

    /// Create a non-fungible asset (single unit, not mintable)
    pub fn nft(
        id: &str,
        name: &str,
        owner: Address,
        metadata: Option<AssetMetadata>,
        created_at: i64,
    ) -> Self {
        Self {
            asset_type: AssetType::Nft,
            decimals: 0,
            total_supply: 1,
            max_supply: 1,
            mintable: false,
            metadata,
            ..Self::fungible(id, name, "NFT", 0, owner, created_at)
        }
    }

    /// Increase total supply
    pub fn mint(&mut self, amount: u64, now: i64) -> Result<(), AssetError> {
        if !self.mintable {
            return Err(AssetError::NotMintable);
        }
        if self.paused {
            return Err(AssetError::Paused);
        }
        if self.max_supply > 0 && self.total_supply.saturating_add(amount) > self.max_supply {
            return Err(AssetError::ExceedsMaxSupply);
        }

        self.total_supply = self.total_supply.saturating_add(amount);
        self.updated_at = now;
        Ok(())
    }

    /// Decrease total supply
    pub fn burn(&mut self, amount: u64, now: i64) -> Result<(), AssetError> {
        if !self.burnable {
            return Err(AssetError::NotBurnable);
        }
        if self.paused {
            return Err(AssetError::Paused);
        }
        if self.total_supply < amount {
            return Err(AssetError::InsufficientSupply);
        }

        self.total_supply -= amount;
        self.updated_at = now;
        Ok(())
    }

    /// Pause supply operations
    pub fn pause(&mut self, now: i64) -> Result<(), AssetError> {
        if !self.pausable {
            return Err(AssetError::NotPausable);
        }
        self.paused = true;
        self.updated_at = now;
        Ok(())
    }

    /// Resume supply operations
    pub fn unpause(&mut self, now: i64) -> Result<(), AssetError> {
        if !self.pausable {
            return Err(AssetError::NotPausable);
        }
        self.paused = false;
        self.updated_at = now;
        Ok(())
    }

    /// Hand the asset to a new owner
    pub fn transfer_ownership(&mut self, new_owner: Address, now: i64) {
        self.owner = new_owner;
        self.updated_at = now;
    }

    /// True for fungible assets (including stablecoins)
    pub fn is_fungible(&self) -> bool {
        matches!(self.asset_type, AssetType::Fungible | AssetType::Stablecoin)
    }

    /// True for stablecoins
    pub fn is_stablecoin(&self) -> bool {
        self.asset_type == AssetType::Stablecoin
    }

    /// Canonical bytes for state-root hashing
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Price feed backing a stablecoin peg
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StablecoinOracle {
    /// Asset the feed prices
    pub asset_id: String,
    /// Currency the asset is pegged to
    pub peg_currency: String,
    /// Latest price in peg currency
    pub price: f64,
    /// Timestamp of the latest update (Unix seconds)
    pub last_update: i64,
    /// Feed sources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl StablecoinOracle {
    /// New oracle at the 1.0 peg
    pub fn new(asset_id: &str, peg_currency: &str, now: i64) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            peg_currency: peg_currency.to_string(),
            price: 1.0,
            last_update: now,
            sources: Vec::new(),
        }
    }

    /// Record a new price
    pub fn update_price(&mut self, price: f64, now: i64) {
        self.price = price;
        self.last_update = now;
    }

    /// True when the feed has not updated within `max_age` seconds
    pub fn is_stale(&self, now: i64, max_age: i64) -> bool {
        now - self.last_update > max_age
    }
}

/// Asset errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetError {
    #[error("asset is not mintable")]
    NotMintable,
    #[error("asset is not burnable")]
    NotBurnable,
    #[error("asset is not pausable")]
    NotPausable,
    #[error("asset is paused")]
    Paused,
    #[error("exceeds max supply")]
    ExceedsMaxSupply,
    #[error("insufficient supply")]
    InsufficientSupply,
    #[error("asset already exists")]
    AlreadyExists,
}
