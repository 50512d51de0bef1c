//! Cryptographic primitives for TomChain.
//!
//! Two concerns live here:
//!
//! - **Threshold BLS** — dealer-style `(t, n)` key-share generation, share
//!   signing, and aggregation of `t` shares into a single group signature
//!   that verifies against the group public key.
//! - **Client identity** — Ed25519 keys clients present at registration.

pub mod error;
pub mod keys;
pub mod threshold;

pub use error::CryptoError;
pub use keys::{generate_keypair, parse_public_key};
pub use threshold::{generate_shares, sign_share, verify, KeyShare, SigShareSet};
