//! Genesis configuration
//!
//! Describes the chain's starting point: the native token definitions,
//! initial account allocations, the bootstrap validator set, and the chain
//! parameters that the chain head freezes at initialization.

use crate::types::{Address, Block, BlockHash};
use serde::{Deserialize, Serialize};

/// Genesis block and state configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub chain_id: String,
    pub timestamp: i64,
    pub validators: Vec<GenesisValidator>,
    pub alloc: Vec<GenesisAlloc>,
    #[serde(rename = "gyds_config")]
    pub gyds: TokenConfig,
    #[serde(rename = "gyd_config")]
    pub gyd: TokenConfig,
    pub params: ChainParams,
}

/// A bootstrap validator
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub address: Address,
    pub pub_key: String,
    pub power: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// An initial account allocation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisAlloc {
    pub address: Address,
    pub gyds_balance: u64,
    pub gyd_balance: u64,
}

/// Native token configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: u64,
    pub max_supply: u64,
    pub mintable: bool,
    pub burnable: bool,
}

/// Chain-wide parameters frozen at genesis
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Target seconds between blocks
    pub block_time: u64,
    /// Active validator cap
    pub max_validators: u32,
    /// Minimum validator stake in GYDS base units
    pub min_stake: u64,
    /// Unbonding period in seconds
    pub unbonding_time: u64,
    /// Baseline slashing penalty in percent
    pub slashing_penalty: u64,
    /// Annual inflation in percent
    pub inflation_rate: u64,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            block_time: 5,
            max_validators: 100,
            min_stake: 10_000 * 100_000_000,
            unbonding_time: 21 * 24 * 60 * 60,
            slashing_penalty: 5,
            inflation_rate: 5,
        }
    }
}

impl GenesisConfig {
    /// Development genesis: one funded account per seed hash.
    ///
    /// The GYD stablecoin starts at zero supply; it is minted against
    /// collateral after launch.
    pub fn dev(timestamp: i64, alloc: Vec<GenesisAlloc>) -> Self {
        Self {
            chain_id: "gydschain-1".to_string(),
            timestamp,
            validators: Vec::new(),
            alloc,
            gyds: TokenConfig {
                name: "GYDS Token".to_string(),
                symbol: "GYDS".to_string(),
                decimals: 8,
                total_supply: 1_000_000_000 * 100_000_000,
                max_supply: 2_000_000_000 * 100_000_000,
                mintable: true,
                burnable: true,
            },
            gyd: TokenConfig {
                name: "GYD Stablecoin".to_string(),
                symbol: "GYD".to_string(),
                decimals: 8,
                total_supply: 0,
                max_supply: 0,
                mintable: true,
                burnable: true,
            },
            params: ChainParams::default(),
        }
    }

    /// Construct the genesis block itself
    pub fn to_block(&self) -> Block {
        let mut block = Block::new(BlockHash::ZERO, 0, Vec::new(), Address::zero());
        block.header.timestamp = self.timestamp;
        block.header.extra_data = self.chain_id.as_bytes().to_vec();
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_block_shape() {
        let genesis = GenesisConfig::dev(1_700_000_000, Vec::new());
        let block = genesis.to_block();

        assert!(block.header.is_genesis());
        assert_eq!(block.header.timestamp, 1_700_000_000);
        assert_eq!(block.header.tx_root, [0u8; 32]);
        assert!(block.verify().is_ok());
    }

    #[test]
    fn test_genesis_block_deterministic() {
        let genesis = GenesisConfig::dev(1_700_000_000, Vec::new());
        assert_eq!(genesis.to_block().hash(), genesis.to_block().hash());
    }

    #[test]
    fn test_serde_round_trip() {
        let genesis = GenesisConfig::dev(
            0,
            vec![GenesisAlloc {
                address: Address::from_hash(&[1u8; 20]),
                gyds_balance: 1_000,
                gyd_balance: 0,
            }],
        );

        let json = serde_json::to_string(&genesis).unwrap();
        let back: GenesisConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.alloc.len(), 1);
        assert_eq!(back.params, genesis.params);

        // Wire key names follow the config file format
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("gyds_config").is_some());
        assert!(value.get("gyd_config").is_some());
    }
}
