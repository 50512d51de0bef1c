//! Client profiles provisioned at server startup.

use blsttc::{PublicKeyShare, SecretKeyShare};

/// Per-client key material held by the server.
///
/// Profiles are created during server initialization, one per configured
/// client; the threshold key shares never change afterwards. The ECC
/// public key is filled in when the client registers.
#[derive(Clone)]
pub struct ClientProfile {
    pub id: u64,
    /// Ed25519 identity key, set by the `Register` RPC.
    pub ecc_pubkey: Option<[u8; 32]>,
    /// This client's BLS threshold secret share, handed out at registration.
    pub tss_secret_share: SecretKeyShare,
    /// The matching public share, kept server-side.
    pub tss_public_share: PublicKeyShare,
}

impl ClientProfile {
    pub fn new(id: u64, secret: SecretKeyShare, public: PublicKeyShare) -> Self {
        Self {
            id,
            ecc_pubkey: None,
            tss_secret_share: secret,
            tss_public_share: public,
        }
    }
}
