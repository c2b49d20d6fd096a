use thiserror::Error;

use coldwire_crypto::CryptoError;
use coldwire_storage::StorageError;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("recipient does not exist")]
    NotFound,

    #[error("federation is disabled on this server")]
    Forbidden,

    #[error("federated send to peer failed: {0}")]
    SendFailed(String),

    #[error("peer self-attestation signature did not verify")]
    PeerVerificationFailed,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("outbound federation request failed: {0}")]
    Http(#[from] reqwest::Error),
}
