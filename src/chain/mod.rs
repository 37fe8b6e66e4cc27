//! Chain head
//!
//! Owns the block index and the state store, and runs the apply pipeline:
//! verify the block, check parentage, execute every transaction against a
//! state snapshot, and index the block. A failure anywhere rolls the state
//! back and rejects the whole block.

pub mod genesis;

pub use genesis::{ChainParams, GenesisAlloc, GenesisConfig, GenesisValidator, TokenConfig};

use crate::state::{Asset, StateDB, StateError};
use crate::types::{
    Address, Block, BlockError, BlockHash, Transaction, TransactionError, TxType,
};
use crate::{ChainError, ChainResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Static chain configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: String,
    pub network_id: u64,
    pub block_time: u64,
    pub max_block_size: u64,
    pub max_tx_per_block: u64,
    pub gyds_decimals: u8,
    pub gyd_decimals: u8,
    pub stablecoin_peg: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: "gydschain-1".to_string(),
            network_id: 1,
            block_time: 5,
            max_block_size: 1024 * 1024,
            max_tx_per_block: 1_000,
            gyds_decimals: 8,
            gyd_decimals: 8,
            stablecoin_peg: "USD".to_string(),
        }
    }
}

/// Chain statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainStats {
    pub height: u64,
    pub total_blocks: usize,
    pub latest_hash: BlockHash,
    pub total_tx_count: usize,
}

/// Payload of a `create_asset` transaction, carried in `data` as JSON
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateAssetParams {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub max_supply: u64,
    #[serde(default = "default_true")]
    pub mintable: bool,
    #[serde(default = "default_true")]
    pub burnable: bool,
    #[serde(default)]
    pub pausable: bool,
}

/// Payload of an `update_oracle` transaction, carried in `data` as JSON
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OracleUpdate {
    pub price: f64,
    #[serde(default = "default_peg")]
    pub peg_currency: String,
}

fn default_true() -> bool {
    true
}

fn default_peg() -> String {
    "USD".to_string()
}

struct ChainInner {
    blocks: HashMap<BlockHash, Block>,
    heights: HashMap<u64, BlockHash>,
    latest_hash: BlockHash,
    latest_height: u64,
    genesis: Option<Block>,
    params: ChainParams,
}

/// The chain head
pub struct Chain {
    config: ChainConfig,
    state: StateDB,
    inner: RwLock<ChainInner>,
}

impl Chain {
    /// Create an uninitialized chain
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            state: StateDB::new(),
            inner: RwLock::new(ChainInner {
                blocks: HashMap::new(),
                heights: HashMap::new(),
                latest_hash: BlockHash::ZERO,
                latest_height: 0,
                genesis: None,
                params: ChainParams::default(),
            }),
        }
    }

    /// Initialize from a genesis configuration.
    ///
    /// Registers the native asset definitions, funds the allocations,
    /// stores the genesis block, and freezes the chain parameters.
    pub fn init_genesis(&self, genesis: &GenesisConfig) -> ChainResult<BlockHash> {
        let mut inner = self.inner.write();

        if inner.genesis.is_some() {
            return Err(ChainError::Block(BlockError::Duplicate));
        }

        let gyds_total: u64 = genesis.alloc.iter().map(|a| a.gyds_balance).sum();
        let gyd_total: u64 = genesis.alloc.iter().map(|a| a.gyd_balance).sum();

        let mut gyds = Asset::fungible(
            &genesis.gyds.symbol,
            &genesis.gyds.name,
            &genesis.gyds.symbol,
            genesis.gyds.decimals,
            Address::zero(),
            genesis.timestamp,
        );
        gyds.total_supply = gyds_total;
        gyds.max_supply = genesis.gyds.max_supply;
        gyds.mintable = genesis.gyds.mintable;
        gyds.burnable = genesis.gyds.burnable;
        self.state.set_asset(gyds);

        let mut gyd = Asset::stablecoin(
            &genesis.gyd.symbol,
            &genesis.gyd.name,
            &genesis.gyd.symbol,
            Address::zero(),
            genesis.timestamp,
        );
        gyd.total_supply = gyd_total;
        gyd.max_supply = genesis.gyd.max_supply;
        gyd.mintable = genesis.gyd.mintable;
        gyd.burnable = genesis.gyd.burnable;
        self.state.set_asset(gyd);

        for alloc in &genesis.alloc {
            let mut account = crate::state::Account::new(alloc.address.clone());
            account.created_at = genesis.timestamp;
            account.updated_at = genesis.timestamp;
            if alloc.gyds_balance > 0 {
                account.set_balance(&genesis.gyds.symbol, alloc.gyds_balance);
            }
            if alloc.gyd_balance > 0 {
                account.set_balance(&genesis.gyd.symbol, alloc.gyd_balance);
            }
            self.state.set_account(&alloc.address, account);
        }

        let block = genesis.to_block();
        let hash = block.hash();

        info!(hash = %hash, chain_id = %genesis.chain_id, "genesis initialized");

        inner.blocks.insert(hash, block.clone());
        inner.heights.insert(0, hash);
        inner.latest_hash = hash;
        inner.latest_height = 0;
        inner.genesis = Some(block);
        inner.params = genesis.params.clone();

        self.state.commit();
        Ok(hash)
    }

    /// Apply a block.
    ///
    /// Structural verification, parent and height continuity, duplicate
    /// rejection, then a snapshot-scoped transaction apply: the first bad
    /// transaction reverts the state and rejects the block.
    pub fn add_block(&self, block: Block) -> ChainResult<()> {
        let mut inner = self.inner.write();

        block.verify().map_err(ChainError::Block)?;

        if block.header.height > 0 {
            let parent = inner
                .blocks
                .get(&block.header.parent_hash)
                .ok_or(ChainError::Block(BlockError::InvalidParent))?;
            // Applied strictly in height order; gaps are rejected
            if block.header.height != parent.header.height + 1 {
                return Err(ChainError::Block(BlockError::InvalidParent));
            }
        }

        let hash = block.hash();
        if inner.blocks.contains_key(&hash) {
            return Err(ChainError::Block(BlockError::Duplicate));
        }

        let snapshot = self.state.snapshot();
        for tx in &block.transactions {
            if let Err(err) = self.apply_transaction(tx) {
                self.state.revert(snapshot);
                debug!(hash = %hash, %err, "block rejected during apply");
                return Err(err);
            }
        }
        self.state.commit();

        let height = block.header.height;
        inner.blocks.insert(hash, block);
        inner.heights.insert(height, hash);
        if height > inner.latest_height || inner.blocks.len() == 1 {
            inner.latest_height = height;
            inner.latest_hash = hash;
        }

        info!(height, hash = %hash, "block applied");
        Ok(())
    }

    /// Execute one transaction against the state store
    fn apply_transaction(&self, tx: &Transaction) -> ChainResult<()> {
        let mut sender = self
            .state
            .get_account(&tx.from)
            .ok_or(ChainError::State(StateError::AccountNotFound))?;

        match tx.tx_type {
            TxType::Transfer => {
                let total = tx.amount as u128 + tx.fee as u128;
                if (sender.balance(&tx.asset) as u128) < total {
                    return Err(ChainError::State(StateError::InsufficientBalance));
                }
                sender.sub_balance(&tx.asset, tx.amount);
                sender.sub_balance(&tx.asset, tx.fee);
                sender.increment_nonce();
                self.state.set_account(&tx.from, sender);

                let mut receiver = self
                    .state
                    .get_account(&tx.to)
                    .unwrap_or_else(|| crate::state::Account::new(tx.to.clone()));
                receiver.add_balance(&tx.asset, tx.amount);
                self.state.set_account(&tx.to, receiver);
            }
            TxType::Stake => {
                if !sender.sub_balance(&tx.asset, tx.fee) {
                    return Err(ChainError::State(StateError::InsufficientBalance));
                }
                if !sender.stake(tx.amount) {
                    return Err(ChainError::State(StateError::InsufficientBalance));
                }
                sender.increment_nonce();
                self.state.set_account(&tx.from, sender);
            }
            TxType::Unstake => {
                if !sender.sub_balance(&tx.asset, tx.fee) {
                    return Err(ChainError::State(StateError::InsufficientBalance));
                }
                if !sender.unstake(tx.amount) {
                    return Err(ChainError::State(StateError::InsufficientStake));
                }
                sender.increment_nonce();
                self.state.set_account(&tx.from, sender);
            }
            TxType::Mint => {
                if !sender.sub_balance(&tx.asset, tx.fee) {
                    return Err(ChainError::State(StateError::InsufficientBalance));
                }
                sender.increment_nonce();
                self.state.set_account(&tx.from, sender);
                self.state
                    .mint(&tx.asset, &tx.to, tx.amount, tx.timestamp)
                    .map_err(ChainError::State)?;
            }
            TxType::Burn => {
                if !sender.sub_balance(&tx.asset, tx.fee) {
                    return Err(ChainError::State(StateError::InsufficientBalance));
                }
                sender.increment_nonce();
                self.state.set_account(&tx.from, sender);
                self.state
                    .burn(&tx.asset, &tx.from, tx.amount, tx.timestamp)
                    .map_err(ChainError::State)?;
            }
            TxType::CreateAsset => {
                let data = tx
                    .data
                    .as_deref()
                    .ok_or(ChainError::Transaction(TransactionError::InvalidPayload))?;
                let params: CreateAssetParams = serde_json::from_slice(data)
                    .map_err(|_| ChainError::Transaction(TransactionError::InvalidPayload))?;

                if !sender.sub_balance(&tx.asset, tx.fee) {
                    return Err(ChainError::State(StateError::InsufficientBalance));
                }
                sender.increment_nonce();
                self.state.set_account(&tx.from, sender);

                let mut asset = Asset::fungible(
                    &params.id,
                    &params.name,
                    &params.symbol,
                    params.decimals,
                    tx.from.clone(),
                    tx.timestamp,
                );
                asset.max_supply = params.max_supply;
                asset.mintable = params.mintable;
                asset.burnable = params.burnable;
                asset.pausable = params.pausable;
                self.state.create_asset(asset).map_err(ChainError::State)?;
            }
            TxType::UpdateOracle => {
                let data = tx
                    .data
                    .as_deref()
                    .ok_or(ChainError::Transaction(TransactionError::InvalidPayload))?;
                let update: OracleUpdate = serde_json::from_slice(data)
                    .map_err(|_| ChainError::Transaction(TransactionError::InvalidPayload))?;

                if !sender.sub_balance(&tx.asset, tx.fee) {
                    return Err(ChainError::State(StateError::InsufficientBalance));
                }
                sender.increment_nonce();
                self.state.set_account(&tx.from, sender);

                self.state
                    .update_oracle(&tx.asset, &update.peg_currency, update.price, tx.timestamp);
            }
        }

        Ok(())
    }

    /// Block by hash
    pub fn get_block(&self, hash: &BlockHash) -> Option<Block> {
        self.inner.read().blocks.get(hash).cloned()
    }

    /// Block by height
    pub fn get_block_by_height(&self, height: u64) -> Option<Block> {
        let inner = self.inner.read();
        inner
            .heights
            .get(&height)
            .and_then(|hash| inner.blocks.get(hash))
            .cloned()
    }

    /// The most recent block
    pub fn latest_block(&self) -> Option<Block> {
        let inner = self.inner.read();
        inner.blocks.get(&inner.latest_hash).cloned()
    }

    /// Current chain height
    pub fn height(&self) -> u64 {
        self.inner.read().latest_height
    }

    /// The genesis block
    pub fn genesis(&self) -> Option<Block> {
        self.inner.read().genesis.clone()
    }

    /// Chain statistics
    pub fn stats(&self) -> ChainStats {
        let inner = self.inner.read();
        ChainStats {
            height: inner.latest_height,
            total_blocks: inner.blocks.len(),
            latest_hash: inner.latest_hash,
            total_tx_count: inner.blocks.values().map(|b| b.transactions.len()).sum(),
        }
    }

    /// Static configuration
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Parameters frozen at genesis
    pub fn params(&self) -> ChainParams {
        self.inner.read().params.clone()
    }

    /// The owned state store
    pub fn state(&self) -> &StateDB {
        &self.state
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Chain")
            .field("height", &inner.latest_height)
            .field("blocks", &inner.blocks.len())
            .finish()
    }
}
