//! Cryptographic primitives
//!
//! Ed25519 key pairs for transaction and block signing, plus the hash
//! functions the chain is built on (SHA-256, Keccak-256, RIPEMD-160).

pub mod hash;
pub mod keys;

pub use hash::{double_hash256, hash160, hash256, keccak256, merkle_root_double, ripemd160};
pub use keys::{verify_signature, KeyPair};
