//! GYDS addresses
//!
//! Addresses are derived from public keys via Hash160 and encoded in a
//! Bech32-style format: a human-readable prefix (`gyds1` for accounts,
//! `gydsvaloper1` for validators), 32 charset symbols carrying the 20-byte
//! hash, and a 6-symbol polymod checksum.

use crate::crypto::hash::hash160;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix for user account addresses
pub const ADDRESS_PREFIX: &str = "gyds1";

/// Prefix for validator operator addresses
pub const VALIDATOR_PREFIX: &str = "gydsvaloper1";

/// Length of the data part (32 hash symbols + 6 checksum symbols)
pub const ADDRESS_LENGTH: usize = 38;

/// Character set for the 5-bit data encoding
pub const BECH32_CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

const BECH32_GENERATOR: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];

/// A GYDS address string.
///
/// Thin newtype over the encoded form. `Ord` compares the encoded strings,
/// which does NOT match the raw-byte order of the decoded hash (the charset
/// is not monotonic in ASCII); anything that needs the canonical raw-byte
/// order must sort on [`Address::decode`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Derive a user address from a public key
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self(encode(ADDRESS_PREFIX, &hash160(public_key)))
    }

    /// Derive a validator operator address from a public key
    pub fn validator_from_public_key(public_key: &[u8]) -> Self {
        Self(encode(VALIDATOR_PREFIX, &hash160(public_key)))
    }

    /// Encode a 20-byte hash as a user address
    pub fn from_hash(hash: &[u8; 20]) -> Self {
        Self(encode(ADDRESS_PREFIX, hash))
    }

    /// The zero address (20 zero bytes), used as the protocol owner
    pub fn zero() -> Self {
        Self::from_hash(&[0u8; 20])
    }

    /// Wrap an already-encoded address string after validating it
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        validate_address(s)?;
        Ok(Self(s.to_string()))
    }

    /// Wrap a string without validation.
    ///
    /// For wire decoding paths that validate separately.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Decode back to the 20-byte hash
    pub fn decode(&self) -> Result<[u8; 20], AddressError> {
        decode_address(&self.0)
    }

    /// Validate prefix, length, charset, and checksum
    pub fn validate(&self) -> Result<(), AddressError> {
        validate_address(&self.0)
    }

    /// True if the address string is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if this is a validator operator address
    pub fn is_validator(&self) -> bool {
        self.0.starts_with(VALIDATOR_PREFIX)
    }

    /// Borrow the encoded form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for display
    pub fn short(&self) -> String {
        if self.0.len() <= 16 {
            return self.0.clone();
        }
        format!("{}...{}", &self.0[..10], &self.0[self.0.len() - 6..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> String {
        addr.0
    }
}

/// Validate an encoded address.
///
/// Valid iff the prefix is one of the known prefixes, the data part is
/// exactly [`ADDRESS_LENGTH`] symbols, every symbol is in the charset, and
/// the checksum verifies.
pub fn validate_address(address: &str) -> Result<(), AddressError> {
    let prefix = if address.starts_with(VALIDATOR_PREFIX) {
        VALIDATOR_PREFIX
    } else if address.starts_with(ADDRESS_PREFIX) {
        ADDRESS_PREFIX
    } else {
        return Err(AddressError::InvalidPrefix);
    };

    if address.len() != prefix.len() + ADDRESS_LENGTH {
        return Err(AddressError::InvalidLength);
    }

    let data = &address.as_bytes()[prefix.len()..];
    let mut decoded = Vec::with_capacity(data.len());
    for &c in data {
        let idx = BECH32_CHARSET
            .iter()
            .position(|&s| s == c)
            .ok_or(AddressError::InvalidCharacter)?;
        decoded.push(idx as u8);
    }

    if !verify_checksum(prefix, &decoded) {
        return Err(AddressError::InvalidChecksum);
    }

    Ok(())
}

/// True if the address validates
pub fn is_valid_address(address: &str) -> bool {
    validate_address(address).is_ok()
}

/// Decode an address back to its 20-byte hash
pub fn decode_address(address: &str) -> Result<[u8; 20], AddressError> {
    validate_address(address)?;

    let prefix = if address.starts_with(VALIDATOR_PREFIX) {
        VALIDATOR_PREFIX
    } else {
        ADDRESS_PREFIX
    };

    let data = &address.as_bytes()[prefix.len()..];
    let mut decoded = Vec::with_capacity(data.len() - 6);
    for &c in &data[..data.len() - 6] {
        // Charset membership was checked during validation
        let idx = BECH32_CHARSET.iter().position(|&s| s == c).unwrap_or(0);
        decoded.push(idx as u8);
    }

    let bytes = convert_bits(&decoded, 5, 8, false);
    bytes.try_into().map_err(|_| AddressError::InvalidLength)
}

fn encode(prefix: &str, hash: &[u8; 20]) -> String {
    let converted = convert_bits(hash, 8, 5, true);
    let checksum = checksum(prefix, &converted);

    let mut out = String::with_capacity(prefix.len() + converted.len() + checksum.len());
    out.push_str(prefix);
    for b in converted.iter().chain(checksum.iter()) {
        out.push(BECH32_CHARSET[*b as usize] as char);
    }
    out
}

fn convert_bits(data: &[u8], from_bits: u32, to_bits: u32, pad: bool) -> Vec<u8> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let maxv: u32 = (1 << to_bits) - 1;
    let mut result = Vec::new();

    for &value in data {
        acc = (acc << from_bits) | value as u32;
        bits += from_bits;
        while bits >= to_bits {
            bits -= to_bits;
            result.push(((acc >> bits) & maxv) as u8);
        }
    }

    if pad && bits > 0 {
        result.push(((acc << (to_bits - bits)) & maxv) as u8);
    }

    result
}

fn checksum(hrp: &str, data: &[u8]) -> [u8; 6] {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0u8; 6]);

    let polymod = polymod(&values) ^ 1;

    let mut out = [0u8; 6];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = ((polymod >> (5 * (5 - i))) & 31) as u8;
    }
    out
}

fn verify_checksum(hrp: &str, data: &[u8]) -> bool {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    polymod(&values) == 1
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let bytes = hrp.as_bytes();
    let mut out = vec![0u8; bytes.len() * 2 + 1];
    for (i, &c) in bytes.iter().enumerate() {
        out[i] = c >> 5;
        out[i + bytes.len() + 1] = c & 31;
    }
    out[bytes.len()] = 0;
    out
}

fn polymod(values: &[u8]) -> u32 {
    let mut chk: u32 = 1;
    for &v in values {
        let top = chk >> 25;
        chk = ((chk & 0x1ff_ffff) << 5) ^ v as u32;
        for (i, gen) in BECH32_GENERATOR.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= gen;
            }
        }
    }
    chk
}

/// Address errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Invalid address prefix")]
    InvalidPrefix,
    #[error("Invalid address length")]
    InvalidLength,
    #[error("Invalid character in address")]
    InvalidCharacter,
    #[error("Invalid address checksum")]
    InvalidChecksum,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_derive_and_validate() {
        let pair = KeyPair::from_seed([1u8; 32]);
        let addr = Address::from_public_key(&pair.public_key());

        assert!(addr.as_str().starts_with(ADDRESS_PREFIX));
        assert_eq!(addr.as_str().len(), ADDRESS_PREFIX.len() + ADDRESS_LENGTH);
        assert!(addr.validate().is_ok());
    }

    #[test]
    fn test_validator_address() {
        let pair = KeyPair::from_seed([2u8; 32]);
        let addr = Address::validator_from_public_key(&pair.public_key());

        assert!(addr.is_validator());
        assert!(addr.validate().is_ok());
        assert_eq!(
            addr.as_str().len(),
            VALIDATOR_PREFIX.len() + ADDRESS_LENGTH
        );
    }

    #[test]
    fn test_round_trip() {
        let hash = {
            let mut h = [0u8; 20];
            for (i, b) in h.iter_mut().enumerate() {
                *b = i as u8;
            }
            h
        };

        let addr = Address::from_hash(&hash);
        assert_eq!(addr.decode().unwrap(), hash);
    }

    #[test]
    fn test_single_character_mutation_fails() {
        let pair = KeyPair::from_seed([3u8; 32]);
        let addr = Address::from_public_key(&pair.public_key());
        let encoded = addr.as_str();

        // Flip each data character to a different charset symbol
        for i in ADDRESS_PREFIX.len()..encoded.len() {
            let mut mutated: Vec<u8> = encoded.as_bytes().to_vec();
            let original = mutated[i];
            let replacement = BECH32_CHARSET
                .iter()
                .copied()
                .find(|&c| c != original)
                .unwrap();
            mutated[i] = replacement;
            let mutated = String::from_utf8(mutated).unwrap();

            assert!(
                !is_valid_address(&mutated),
                "mutation at {} not caught",
                i
            );
        }
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        assert!(matches!(
            validate_address("cosmos1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq"),
            Err(AddressError::InvalidPrefix)
        ));
    }

    #[test]
    fn test_invalid_length_rejected() {
        assert!(matches!(
            validate_address("gyds1qqq"),
            Err(AddressError::InvalidLength)
        ));
    }

    #[test]
    fn test_invalid_charset_rejected() {
        let pair = KeyPair::from_seed([4u8; 32]);
        let addr = Address::from_public_key(&pair.public_key());
        // 'b' and 'i' are not in the charset
        let mutated = format!("{}b", &addr.as_str()[..addr.as_str().len() - 1]);
        assert!(matches!(
            validate_address(&mutated),
            Err(AddressError::InvalidCharacter)
        ));
    }

    #[test]
    fn test_zero_address_is_valid() {
        let zero = Address::zero();
        assert!(zero.validate().is_ok());
        assert_eq!(zero.decode().unwrap(), [0u8; 20]);
    }

    #[test]
    fn test_user_and_validator_addresses_differ() {
        let pair = KeyPair::from_seed([5u8; 32]);
        let user = Address::from_public_key(&pair.public_key());
        let valoper = Address::validator_from_public_key(&pair.public_key());
        assert_ne!(user, valoper);
    }
}
