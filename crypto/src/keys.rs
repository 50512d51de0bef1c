//! Ed25519 client identity keys.

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use crate::CryptoError;

/// Generate a fresh Ed25519 signing key (used by clients and tests).
pub fn generate_keypair() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Validate raw public key bytes as presented by a registering client.
///
/// Returns the 32-byte key on success. Rejects wrong lengths and byte
/// strings that do not decode to a valid curve point.
pub fn parse_public_key(bytes: &[u8]) -> Result<[u8; 32], CryptoError> {
    let arr: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
    VerifyingKey::from_bytes(&arr).map_err(|_| CryptoError::InvalidPublicKey)?;
    Ok(arr)
}
