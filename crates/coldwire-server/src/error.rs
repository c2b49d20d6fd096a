//! Maps every crate-boundary error into the status codes this dispatcher promises, mirroring
//! `relayer.rs`'s `RelayerError` → `tonic::Status` conversion, adapted to `axum`'s
//! `IntoResponse`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde_json::json;

use coldwire_crypto::CryptoError;
use coldwire_identity::IdentityError;
use coldwire_relay::RelayError;
use coldwire_storage::StorageError;

pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "missing, invalid, or expired bearer token".to_string(),
            ),
            ApiError::Internal(msg) => {
                error!("internal error while processing request: {msg}");
                (StatusCode::BAD_REQUEST, "error while processing request".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::BadRequest(msg) => ApiError::BadRequest(msg),
            IdentityError::UnknownChallenge => {
                ApiError::BadRequest("unknown or already-consumed challenge".into())
            }
            IdentityError::Storage(e) => ApiError::Internal(e.to_string()),
            IdentityError::Crypto(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::BadRequest(msg) => ApiError::BadRequest(msg),
            RelayError::NotFound => ApiError::BadRequest("recipient does not exist".into()),
            RelayError::Forbidden => ApiError::BadRequest("federation is disabled".into()),
            RelayError::SendFailed(msg) => ApiError::BadRequest(msg),
            RelayError::PeerVerificationFailed => {
                ApiError::BadRequest("peer signature did not verify".into())
            }
            RelayError::Storage(e) => ApiError::Internal(e.to_string()),
            RelayError::Crypto(e) => ApiError::Internal(e.to_string()),
            RelayError::Http(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
