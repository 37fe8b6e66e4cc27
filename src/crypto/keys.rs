//! Ed25519 key pairs
//!
//! Every account and validator signs with Ed25519. Public keys travel on the
//! wire as 32 hex-encoded bytes; signatures as 64.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

/// Ed25519 public key length in bytes
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Ed25519 signature length in bytes
pub const SIGNATURE_LENGTH: usize = 64;

/// An Ed25519 signing key pair
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Generate a fresh random key pair
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic key pair from a 32-byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Restore a key pair from raw private key bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let seed: [u8; 32] = bytes.try_into().map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_seed(seed))
    }

    /// Raw public key bytes
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.signing.verifying_key().to_bytes()
    }

    /// Hex-encoded public key
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }

    /// Raw private key bytes
    pub fn private_key(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
        self.signing.sign(message).to_bytes()
    }

    /// Verify a signature against this key pair's public key
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        verify_signature(&self.public_key(), message, signature)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the private half
        write!(f, "KeyPair({})", self.public_key_hex())
    }
}

/// Verify an Ed25519 signature under a raw public key.
///
/// Malformed keys or signatures verify as false rather than erroring; the
/// callers treat both the same way.
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; PUBLIC_KEY_LENGTH]>::try_from(public_key) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };

    key.verify(message, &sig).is_ok()
}

/// Key handling errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let pair = KeyPair::from_seed([1u8; 32]);
        let sig = pair.sign(b"hello gyds");

        assert!(pair.verify(b"hello gyds", &sig));
        assert!(!pair.verify(b"hello gyd", &sig));
    }

    #[test]
    fn test_deterministic_from_seed() {
        let a = KeyPair::from_seed([9u8; 32]);
        let b = KeyPair::from_seed([9u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let signer = KeyPair::from_seed([2u8; 32]);
        let other = KeyPair::from_seed([3u8; 32]);
        let sig = signer.sign(b"msg");

        assert!(verify_signature(&signer.public_key(), b"msg", &sig));
        assert!(!verify_signature(&other.public_key(), b"msg", &sig));
    }

    #[test]
    fn test_verify_rejects_malformed_inputs() {
        let pair = KeyPair::from_seed([4u8; 32]);
        let sig = pair.sign(b"msg");

        assert!(!verify_signature(&[0u8; 5], b"msg", &sig));
        assert!(!verify_signature(&pair.public_key(), b"msg", &sig[..40]));
    }

    #[test]
    fn test_round_trip_private_key() {
        let pair = KeyPair::generate();
        let restored = KeyPair::from_bytes(&pair.private_key()).unwrap();
        assert_eq!(pair.public_key(), restored.public_key());
    }
}
