use thiserror::Error;

use coldwire_crypto::CryptoError;
use coldwire_storage::StorageError;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unknown or already-consumed challenge")]
    UnknownChallenge,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
