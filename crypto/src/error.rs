use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid threshold {t} for {n} participants")]
    BadThreshold { t: usize, n: usize },

    #[error("not enough signature shares: have {have}, need {need}")]
    NotEnoughShares { have: usize, need: usize },

    #[error("share aggregation failed: {0}")]
    Aggregation(#[from] blsttc::Error),

    #[error("aggregated signature does not verify against the group key")]
    InvalidAggregate,

    #[error("invalid Ed25519 public key bytes")]
    InvalidPublicKey,
}
