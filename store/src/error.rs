use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("lmdb error: {0}")]
    Lmdb(#[from] heed::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}
