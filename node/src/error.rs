use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] tomchain_store::StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] tomchain_crypto::CryptoError),

    #[error("network error: {0}")]
    Network(#[from] tomchain_network::NetworkError),

    #[error("serialization error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
