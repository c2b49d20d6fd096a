//! Challenge-response authentication, unifying registration and login behind a single
//! verify endpoint. Mirrors `internal/authenticate/authenticate.go`'s `UserService`.

pub mod error;

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{info, warn};

use coldwire_crypto::{mint_token, random_user_id, verify_signature};
use coldwire_types::constants::{CHALLENGE_LEN, ML_DSA_87_PK_LEN, ML_DSA_87_SIGN_LEN, USER_ID_LEN};
use coldwire_storage::Storage;

pub use error::IdentityError;

/// Outcome of `auth_verify`. A failed signature is not an error — it is a valid protocol
/// outcome that simply does not mint a token, per `UserService::AuthenticateVerificationProcessor`'s
/// boolean-verdict contract.
#[derive(Debug)]
pub enum AuthOutcome {
    Verified { user_id: String, token: String },
    Failed,
}

pub struct IdentityService {
    storage: Arc<dyn Storage>,
    jwt_secret: Vec<u8>,
}

impl IdentityService {
    pub fn new(storage: Arc<dyn Storage>, jwt_secret: Vec<u8>) -> Self {
        Self {
            storage,
            jwt_secret,
        }
    }

    /// Begins a challenge-response flow. Exactly one of `public_key_b64` (registration) or
    /// `user_id` (login) must be set by the caller; the challenge row records whichever was
    /// supplied so `auth_verify` can resolve the discriminator without the client repeating it.
    pub async fn auth_init(
        &self,
        public_key_b64: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<String, IdentityError> {
        match (public_key_b64, user_id) {
            (None, None) | (Some(_), Some(_)) => {
                return Err(IdentityError::BadRequest(
                    "request requires exactly one of public_key or user_id".into(),
                ))
            }
            _ => {}
        }

        let decoded_public_key = match public_key_b64 {
            Some(encoded) => {
                let decoded = BASE64
                    .decode(encoded)
                    .map_err(|_| IdentityError::BadRequest("public_key is not valid base64".into()))?;
                if decoded.len() != ML_DSA_87_PK_LEN {
                    return Err(IdentityError::BadRequest(format!(
                        "public_key length ({}) does not match ML-DSA-87 public key length ({})",
                        decoded.len(),
                        ML_DSA_87_PK_LEN
                    )));
                }
                Some(decoded)
            }
            None => None,
        };

        if let Some(id) = user_id {
            if id.len() != USER_ID_LEN || !id.bytes().all(|b| b.is_ascii_digit()) {
                return Err(IdentityError::BadRequest("invalid user_id".into()));
            }
        }

        let challenge = coldwire_crypto::secure_random_bytes(CHALLENGE_LEN);

        self.storage
            .save_challenge(&challenge, user_id, decoded_public_key.as_deref())
            .await?;

        info!("created a new authentication challenge");

        Ok(BASE64.encode(challenge))
    }

    /// Resolves a challenge, verifies the signature over it, and on success either logs in the
    /// existing user or registers a new one and mints a bearer token.
    pub async fn auth_verify(
        &self,
        challenge_b64: &str,
        signature_b64: &str,
    ) -> Result<AuthOutcome, IdentityError> {
        let signature = BASE64
            .decode(signature_b64)
            .map_err(|_| IdentityError::BadRequest("signature is not valid base64".into()))?;
        if signature.len() != ML_DSA_87_SIGN_LEN {
            return Err(IdentityError::BadRequest(format!(
                "signature length ({}) does not match ML-DSA-87 signature length ({})",
                signature.len(),
                ML_DSA_87_SIGN_LEN
            )));
        }

        let challenge = BASE64
            .decode(challenge_b64)
            .map_err(|_| IdentityError::BadRequest("challenge is not valid base64".into()))?;
        if challenge.len() != CHALLENGE_LEN {
            return Err(IdentityError::BadRequest(format!(
                "challenge length ({}) does not match the expected length ({})",
                challenge.len(),
                CHALLENGE_LEN
            )));
        }

        let Some(challenge_data) = self.storage.get_challenge_data(&challenge).await? else {
            return Err(IdentityError::UnknownChallenge);
        };

        let valid = verify_signature(&challenge_data.public_key, &challenge, &signature);

        if !valid {
            warn!("challenge verification failed");
            return Ok(AuthOutcome::Failed);
        }

        info!("challenge verification passed");

        let user_id = match challenge_data.user_id {
            Some(user_id) => user_id,
            None => self.register_new_user(&challenge_data.public_key).await?,
        };

        let token = mint_token(&user_id, &self.jwt_secret)?;

        Ok(AuthOutcome::Verified { user_id, token })
    }

    async fn register_new_user(&self, public_key: &[u8]) -> Result<String, IdentityError> {
        let user_id = loop {
            let candidate = random_user_id();
            if !self.storage.check_user_exists(&candidate).await? {
                break candidate;
            }
        };

        self.storage.save_user(&user_id, public_key).await?;
        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldwire_storage::SqliteStorage;

    async fn service() -> IdentityService {
        let storage = SqliteStorage::connect("sqlite::memory:").await.unwrap();
        IdentityService::new(Arc::new(storage), b"test-secret-at-least-this-long".to_vec())
    }

    #[tokio::test]
    async fn registration_then_login_round_trip() {
        let svc = service().await;
        let keypair = coldwire_crypto::generate_keypair().unwrap();
        let public_key_b64 = BASE64.encode(&keypair.verification_key);

        let challenge_b64 = svc.auth_init(Some(&public_key_b64), None).await.unwrap();
        let challenge = BASE64.decode(&challenge_b64).unwrap();
        let signature = coldwire_crypto::create_signature(&keypair.signing_key, &challenge).unwrap();

        let outcome = svc
            .auth_verify(&challenge_b64, &BASE64.encode(&signature))
            .await
            .unwrap();

        let user_id = match outcome {
            AuthOutcome::Verified { user_id, token } => {
                assert!(!token.is_empty());
                user_id
            }
            AuthOutcome::Failed => panic!("expected verification to succeed"),
        };
        assert_eq!(user_id.len(), USER_ID_LEN);

        let login_challenge_b64 = svc.auth_init(None, Some(&user_id)).await.unwrap();
        let login_challenge = BASE64.decode(&login_challenge_b64).unwrap();
        let login_signature =
            coldwire_crypto::create_signature(&keypair.signing_key, &login_challenge).unwrap();

        let login_outcome = svc
            .auth_verify(&login_challenge_b64, &BASE64.encode(&login_signature))
            .await
            .unwrap();

        match login_outcome {
            AuthOutcome::Verified { user_id: logged_in, .. } => assert_eq!(logged_in, user_id),
            AuthOutcome::Failed => panic!("expected login verification to succeed"),
        }
    }

    #[tokio::test]
    async fn bad_signature_is_a_clean_failure_not_an_error() {
        let svc = service().await;
        let keypair = coldwire_crypto::generate_keypair().unwrap();
        let public_key_b64 = BASE64.encode(&keypair.verification_key);

        let challenge_b64 = svc.auth_init(Some(&public_key_b64), None).await.unwrap();
        let forged_signature = vec![0u8; ML_DSA_87_SIGN_LEN];

        let outcome = svc
            .auth_verify(&challenge_b64, &BASE64.encode(&forged_signature))
            .await
            .unwrap();

        assert!(matches!(outcome, AuthOutcome::Failed));
    }

    #[tokio::test]
    async fn challenge_is_single_use() {
        let svc = service().await;
        let keypair = coldwire_crypto::generate_keypair().unwrap();
        let public_key_b64 = BASE64.encode(&keypair.verification_key);

        let challenge_b64 = svc.auth_init(Some(&public_key_b64), None).await.unwrap();
        let challenge = BASE64.decode(&challenge_b64).unwrap();
        let signature = coldwire_crypto::create_signature(&keypair.signing_key, &challenge).unwrap();
        let signature_b64 = BASE64.encode(&signature);

        svc.auth_verify(&challenge_b64, &signature_b64).await.unwrap();

        let replay = svc.auth_verify(&challenge_b64, &signature_b64).await;
        assert!(matches!(replay, Err(IdentityError::UnknownChallenge)));
    }

    #[tokio::test]
    async fn rejects_malformed_init_request() {
        let svc = service().await;
        assert!(svc.auth_init(None, None).await.is_err());
        assert!(svc.auth_init(Some("key"), Some("1234567890123456")).await.is_err());
    }
}
