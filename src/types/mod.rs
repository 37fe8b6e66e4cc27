//! Core chain types: addresses, transactions, blocks

pub mod address;
pub mod block;
pub mod transaction;

pub use address::{
    decode_address, is_valid_address, validate_address, Address, AddressError, ADDRESS_PREFIX,
    VALIDATOR_PREFIX,
};
pub use block::{compute_merkle_root, Block, BlockError, BlockHash, Header};
pub use transaction::{Transaction, TransactionError, TransactionReceipt, TxHash, TxType};

/// Asset id of the native utility token
pub const ASSET_GYDS: &str = "GYDS";

/// Asset id of the native stablecoin
pub const ASSET_GYD: &str = "GYD";
