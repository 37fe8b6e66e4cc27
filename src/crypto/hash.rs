//! Hash functions
//!
//! SHA-256 is the workhorse for transaction, header, and state hashing.
//! Keccak-256 and RIPEMD-160 exist for address derivation and external
//! compatibility.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// SHA-256 hash.
pub fn hash256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Hex-encoded SHA-256 hash.
pub fn hash256_hex(data: &[u8]) -> String {
    hex::encode(hash256(data))
}

/// Double SHA-256 hash (like Bitcoin).
pub fn double_hash256(data: &[u8]) -> [u8; 32] {
    hash256(&hash256(data))
}

/// Keccak-256 hash (Ethereum-style).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// RIPEMD-160 hash.
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}

/// RIPEMD-160 of SHA-256, the address hash.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(&hash256(data))
}

/// Hash multiple byte slices together with a single SHA-256.
pub fn hash_multiple(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Merkle root with double-SHA-256 pairing (like Bitcoin).
///
/// Empty input yields 32 zero bytes, a single leaf is returned as-is, and an
/// odd level duplicates its last leaf. The block path uses its own
/// single-SHA pairing; this utility is the standalone variant.
pub fn merkle_root_double(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return [0u8; 32];
    }

    let mut level: Vec<[u8; 32]> = leaves.to_vec();

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
            next.push(double_hash256(&combined));
        }
        level = next;
    }

    level[0]
}
