//! Core error kinds and their mappings from the storage and crypto layers.

use sealbox_crypto::CryptoError;
use sealbox_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity absent. Access denial is also surfaced as this, so presence
    /// of a secret is not leakable.
    #[error("not found")]
    NotFound,
    /// Unique-key violation on a name or `(series, version)`.
    #[error("conflict")]
    Conflict,
    /// The principal's variant does not permit the operation.
    #[error("forbidden")]
    Forbidden,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Integrity failure from the cryptographer; indicates corruption or
    /// cross-series ciphertext reuse and must page, never a 4xx.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// Transport/constraint failure not covered above.
    #[error("store error: {0}")]
    Store(String),
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => CoreError::NotFound,
            StoreError::Conflict => CoreError::Conflict,
            StoreError::Backend(s) => CoreError::Store(s),
        }
    }
}
