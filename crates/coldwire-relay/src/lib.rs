//! Message relay: framing, local/federated send, federation key discovery, long-poll delivery,
//! and ack-driven deletion. Mirrors `internal/data/data.go` and `internal/httpserver/{data,
//! federation}.go`, generalized from the Go original's flush-and-delete queue to the
//! ack-driven at-least-once model this implementation specifies.

pub mod error;
pub mod federation;
pub mod framing;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64URL};
use base64::Engine as _;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use log::{info, warn};

use coldwire_crypto::{create_signature, random_ack_id, verify_signature};
use coldwire_storage::Storage;
use coldwire_types::constants::{
    ACK_ID_LEN, LONGPOLL_MAX_SECS, LONGPOLL_TICK_SECS, ML_DSA_87_SIGN_LEN,
};

pub use error::RelayError;

pub struct RelayConfig {
    pub own_url: String,
    pub federation_enabled: bool,
    pub dsa_signing_key: Vec<u8>,
    pub dsa_public_key: Vec<u8>,
    pub blacklisted_ips: Vec<String>,
    pub blacklisted_domains: Vec<String>,
}

pub struct RelayService {
    storage: Arc<dyn Storage>,
    http: reqwest::Client,
    config: RelayConfig,
}

impl RelayService {
    pub fn new(storage: Arc<dyn Storage>, config: RelayConfig) -> Self {
        Self {
            storage,
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Routes a message to a local user or a federation peer depending on `recipient`'s shape.
    pub async fn send(&self, sender_id: &str, recipient: &str, blob: &[u8]) -> Result<(), RelayError> {
        if validate::is_local_recipient(recipient) {
            return self.deliver_locally(sender_id, recipient, blob).await;
        }

        let Some((local_part, peer_url)) = validate::split_federated_recipient(recipient) else {
            return Err(RelayError::BadRequest(format!(
                "recipient {recipient:?} is neither a local user id nor a federated address"
            )));
        };

        if !validate::is_all_digits(local_part) {
            return Err(RelayError::BadRequest("federated local-part must be all digits".into()));
        }

        if peer_url.eq_ignore_ascii_case(&self.config.own_url) {
            return self.deliver_locally(sender_id, local_part, blob).await;
        }

        if !self.config.federation_enabled {
            return Err(RelayError::Forbidden);
        }

        if !validate::is_valid_domain_or_ip(
            peer_url,
            &self.config.blacklisted_ips,
            &self.config.blacklisted_domains,
        ) {
            return Err(RelayError::BadRequest(format!("peer url {peer_url:?} is blacklisted")));
        }

        let mut to_sign = Vec::new();
        to_sign.extend_from_slice(peer_url.as_bytes());
        to_sign.extend_from_slice(local_part.as_bytes());
        to_sign.extend_from_slice(sender_id.as_bytes());
        to_sign.extend_from_slice(blob);
        let signature = create_signature(&self.config.dsa_signing_key, &to_sign)?;

        let mut signed_blob = signature;
        signed_blob.extend_from_slice(blob);

        federation::send_federated_blob(
            &self.http,
            peer_url,
            sender_id,
            local_part,
            &self.config.own_url,
            signed_blob,
        )
        .await
    }

    async fn deliver_locally(&self, sender_id: &str, recipient: &str, blob: &[u8]) -> Result<(), RelayError> {
        if !self.storage.check_user_exists(recipient).await? {
            return Err(RelayError::NotFound);
        }

        let frame = framing::frame_entry(sender_id, blob)?;
        let ack_id = random_ack_id();
        self.storage.insert_data(recipient, &ack_id, &frame).await?;
        Ok(())
    }

    /// Accepts a message forwarded from another server. `signed_blob` is `signature || blob`.
    pub async fn federation_ingress(
        &self,
        sender: &str,
        recipient: &str,
        peer_url: &str,
        signed_blob: &[u8],
    ) -> Result<(), RelayError> {
        if signed_blob.len() < ML_DSA_87_SIGN_LEN + 1 {
            return Err(RelayError::BadRequest("federated blob is too short".into()));
        }
        if !validate::is_all_digits(sender) || !validate::is_all_digits(recipient) {
            return Err(RelayError::BadRequest("sender/recipient must be all digits".into()));
        }

        if !validate::is_valid_domain_or_ip(
            peer_url,
            &self.config.blacklisted_ips,
            &self.config.blacklisted_domains,
        ) {
            return Err(RelayError::BadRequest(format!("peer url {peer_url:?} is blacklisted")));
        }

        if !self.storage.check_user_exists(recipient).await? {
            return Err(RelayError::NotFound);
        }

        let (signature, blob) = signed_blob.split_at(ML_DSA_87_SIGN_LEN);

        let peer = self.resolve_peer_key(peer_url).await?;

        let mut to_verify = Vec::new();
        to_verify.extend_from_slice(self.config.own_url.as_bytes());
        to_verify.extend_from_slice(recipient.as_bytes());
        to_verify.extend_from_slice(sender.as_bytes());
        to_verify.extend_from_slice(blob);

        if !verify_signature(&peer.public_key, &to_verify, signature) {
            return Err(RelayError::PeerVerificationFailed);
        }

        let federated_sender = format!("{sender}@{peer_url}");
        let frame = framing::frame_entry(&federated_sender, blob)?;
        let ack_id = random_ack_id();
        self.storage.insert_data(recipient, &ack_id, &frame).await?;
        Ok(())
    }

    /// Returns the peer's cached key if still fresh, otherwise refetches and upserts it.
    async fn resolve_peer_key(&self, peer_url: &str) -> Result<coldwire_storage::ServerInfo, RelayError> {
        if let Some(info) = self.storage.get_server_info(peer_url).await? {
            let today = Utc::now().date_naive();
            let refetch_date = NaiveDate::parse_from_str(&info.refetch_date, "%Y-%m-%d").ok();
            if refetch_date.map(|d| today < d).unwrap_or(false) {
                return Ok(info);
            }
        }
        self.federation_fetch_key(peer_url).await
    }

    /// Discovers (or refreshes) a peer's public key via TOFU: fetch `federation/info`, verify
    /// its self-attestation, and upsert the result.
    pub async fn federation_fetch_key(&self, peer_url: &str) -> Result<coldwire_storage::ServerInfo, RelayError> {
        let (public_key, refetch_date, signature) =
            federation::fetch_peer_info(&self.http, peer_url).await?;

        let mut to_verify = Vec::new();
        to_verify.extend_from_slice(peer_url.as_bytes());
        to_verify.extend_from_slice(refetch_date.as_bytes());

        if !verify_signature(&public_key, &to_verify, &signature) {
            return Err(RelayError::PeerVerificationFailed);
        }

        self.storage
            .save_server_info(peer_url, &public_key, &refetch_date)
            .await?;

        info!("refreshed federation key for peer {peer_url}");

        Ok(coldwire_storage::ServerInfo {
            public_key,
            refetch_date,
        })
    }

    /// This server's own self-attestation: its public key, tomorrow's UTC midnight as the
    /// refetch date, and a signature over `own_url || refetch_date`.
    pub fn federation_info(&self) -> Result<(String, String, String), RelayError> {
        let refetch_date = (Utc::now().date_naive() + ChronoDuration::days(1))
            .format("%Y-%m-%d")
            .to_string();

        let mut to_sign = Vec::new();
        to_sign.extend_from_slice(self.config.own_url.as_bytes());
        to_sign.extend_from_slice(refetch_date.as_bytes());

        let signature = create_signature(&self.config.dsa_signing_key, &to_sign)?;

        Ok((
            BASE64.encode(&self.config.dsa_public_key),
            refetch_date,
            BASE64.encode(signature),
        ))
    }

    /// Blocks up to `LONGPOLL_MAX_SECS`, polling the queue once per second. Never deletes.
    /// If the client disconnects mid-poll, the connection-serving task drops this future before
    /// it returns, so nothing is written and nothing is consumed — no explicit disconnect
    /// plumbing is needed here.
    pub async fn long_poll(&self, user_id: &str) -> Result<Vec<u8>, RelayError> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(LONGPOLL_MAX_SECS);
        let mut ticker = tokio::time::interval(Duration::from_secs(LONGPOLL_TICK_SECS));
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    return Ok(Vec::new());
                }
                _ = ticker.tick() => {
                    let data = self.storage.get_latest_data(user_id).await?;
                    if !data.is_empty() {
                        return Ok(data);
                    }
                }
            }
        }
    }

    /// Deletes every queue entry for `user_id` whose ack id is in `ack_ids_b64`. Idempotent.
    /// Ack ids are base64url per spec.md §6, unlike every other base64 field in this interface.
    pub async fn ack(&self, user_id: &str, ack_ids_b64: &[String]) -> Result<(), RelayError> {
        let mut ack_ids = Vec::with_capacity(ack_ids_b64.len());
        for encoded in ack_ids_b64 {
            let decoded = BASE64URL
                .decode(encoded)
                .map_err(|_| RelayError::BadRequest("ack id is not valid base64url".into()))?;
            if decoded.len() != ACK_ID_LEN {
                return Err(RelayError::BadRequest(format!(
                    "ack id length ({}) does not match the expected length ({ACK_ID_LEN})",
                    decoded.len()
                )));
            }
            ack_ids.push(decoded);
        }

        if ack_ids.is_empty() {
            warn!("ack request for {user_id} carried no ack ids");
            return Ok(());
        }

        self.storage.delete_ack(user_id, &ack_ids).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldwire_storage::SqliteStorage;

    async fn relay() -> RelayService {
        let storage = SqliteStorage::connect("sqlite::memory:").await.unwrap();
        let keypair = coldwire_crypto::generate_keypair().unwrap();
        RelayService::new(
            Arc::new(storage),
            RelayConfig {
                own_url: "relay.example".into(),
                federation_enabled: true,
                dsa_signing_key: keypair.signing_key,
                dsa_public_key: keypair.verification_key,
                blacklisted_ips: vec![],
                blacklisted_domains: vec![],
            },
        )
    }

    #[tokio::test]
    async fn send_to_unknown_local_user_is_not_found() {
        let svc = relay().await;
        let err = svc
            .send("1111111111111111", "2222222222222222", b"hello")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotFound));
    }

    #[tokio::test]
    async fn local_send_then_longpoll_then_ack() {
        let svc = relay().await;
        svc.storage.save_user("2222222222222222", b"pubkey").await.unwrap();

        svc.send("1111111111111111", "2222222222222222", b"hello")
            .await
            .unwrap();

        let delivered = svc.long_poll("2222222222222222").await.unwrap();
        assert!(!delivered.is_empty());

        let ack_id = &delivered[..ACK_ID_LEN];
        let body = &delivered[ACK_ID_LEN..];
        let (sender, ciphertext) = framing::split_sender_and_ciphertext(&body[3..]).unwrap();
        assert_eq!(sender, "1111111111111111");
        assert_eq!(ciphertext, b"hello");

        svc.ack("2222222222222222", &[BASE64URL.encode(ack_id)]).await.unwrap();
        let after_ack = svc.storage.get_latest_data("2222222222222222").await.unwrap();
        assert!(after_ack.is_empty());
    }

    #[tokio::test]
    async fn federation_disabled_rejects_federated_send() {
        let storage = SqliteStorage::connect("sqlite::memory:").await.unwrap();
        let keypair = coldwire_crypto::generate_keypair().unwrap();
        let svc = RelayService::new(
            Arc::new(storage),
            RelayConfig {
                own_url: "relay.example".into(),
                federation_enabled: false,
                dsa_signing_key: keypair.signing_key,
                dsa_public_key: keypair.verification_key,
                blacklisted_ips: vec![],
                blacklisted_domains: vec![],
            },
        );

        let err = svc
            .send("1111111111111111", "2222222222222222@peer.example", b"hi")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Forbidden));
    }

    #[tokio::test]
    async fn federation_info_self_attests() {
        let svc = relay().await;
        let (public_key_b64, refetch_date, signature_b64) = svc.federation_info().unwrap();

        let public_key = BASE64.decode(&public_key_b64).unwrap();
        let signature = BASE64.decode(&signature_b64).unwrap();

        let mut to_verify = Vec::new();
        to_verify.extend_from_slice(b"relay.example");
        to_verify.extend_from_slice(refetch_date.as_bytes());

        assert!(verify_signature(&public_key, &to_verify, &signature));
    }

    #[tokio::test]
    async fn federation_ingress_rejects_blacklisted_peer() {
        let storage = SqliteStorage::connect("sqlite::memory:").await.unwrap();
        storage.save_user("2222222222222222", b"pubkey").await.unwrap();
        let keypair = coldwire_crypto::generate_keypair().unwrap();
        let svc = RelayService::new(
            Arc::new(storage),
            RelayConfig {
                own_url: "relay.example".into(),
                federation_enabled: true,
                dsa_signing_key: keypair.signing_key,
                dsa_public_key: keypair.verification_key,
                blacklisted_ips: vec![],
                blacklisted_domains: vec!["evil.example".into()],
            },
        );

        let err = svc
            .federation_ingress(
                "1111111111111111",
                "2222222222222222",
                "evil.example",
                &[0u8; ML_DSA_87_SIGN_LEN + 1],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::BadRequest(_)));
    }
}
