use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key length mismatch: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("malformed {0}")]
    MalformedKey(&'static str),

    #[error("signing failed")]
    SigningFailed,

    #[error("failed to mint bearer token: {0}")]
    TokenMint(#[from] jsonwebtoken::errors::Error),

    #[error("bearer token is invalid or expired")]
    TokenInvalid,
}
