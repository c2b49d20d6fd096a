//! Bearer token mint/verify: an HS512 JWT carrying `{user_id, exp}`, MAC'd with the
//! process-local 256-byte secret.
//!
//! Mirrors `internal/crypto/crypto.go`'s `CreateJWTToken`/`VerifyJWT` (which use
//! `golang-jwt` HS512) and `relayer/src/auth_service.rs`'s claims-struct/`sign_with_key`
//! shape, adapted to `jsonwebtoken`.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use coldwire_types::constants::ACCESS_TOKEN_TTL_SECS;

use crate::error::CryptoError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub exp: i64,
}

pub fn mint_token(user_id: &str, secret: &[u8]) -> Result<String, CryptoError> {
    let claims = Claims {
        user_id: user_id.to_string(),
        exp: (Utc::now() + Duration::seconds(ACCESS_TOKEN_TTL_SECS)).timestamp(),
    };

    let header = Header::new(Algorithm::HS512);
    encode(&header, &claims, &EncodingKey::from_secret(secret)).map_err(CryptoError::from)
}

pub fn verify_token(token: &str, secret: &[u8]) -> Result<Claims, CryptoError> {
    let mut validation = Validation::new(Algorithm::HS512);
    validation.validate_exp = true;

    decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|_| CryptoError::TokenInvalid)
}
