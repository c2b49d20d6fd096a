//! External Redis backend. `internal/storage/redis/redis.go` was truncated in the retrieved
//! source (it only shows `SaveChallenge`/`GetChallengeData`), so the rest of this KV layout —
//! hashes for users/servers, a per-challenge key with native TTL, a per-recipient list for the
//! queue — is derived from the shared `Storage` contract rather than from unavailable Go
//! detail. Uniqueness on user id/public key is enforced by pre-check-then-write, since Redis
//! has no native multi-key unique constraint.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use coldwire_types::constants::{ACK_ID_LEN, CHALLENGE_TTL_SECS};

use crate::error::StorageError;
use crate::{ChallengeData, ServerInfo, Storage};

#[derive(Serialize, Deserialize)]
struct ChallengeRecord {
    user_id: Option<String>,
    public_key: Option<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
struct ServerRecord {
    public_key: Vec<u8>,
    refetch_date: String,
}

fn user_key(id: &str) -> String {
    format!("coldwire:user:{id}")
}

fn pubkey_index_key() -> &'static str {
    "coldwire:user_pubkeys"
}

fn challenge_key(challenge: &[u8]) -> String {
    format!("coldwire:challenge:{}", BASE64.encode(challenge))
}

fn server_key(url: &str) -> String {
    format!("coldwire:server:{url}")
}

fn queue_key(recipient: &str) -> String {
    format!("coldwire:queue:{recipient}")
}

pub struct RedisStorage {
    client: redis::Client,
}

impl RedisStorage {
    pub fn connect(addr: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(addr)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, StorageError> {
        Ok(self.client.get_multiplexed_tokio_connection().await?)
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn save_user(&self, id: &str, public_key: &[u8]) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        let pk_field = BASE64.encode(public_key);

        let owner: Option<String> = conn.hget(pubkey_index_key(), &pk_field).await?;
        if owner.is_some() {
            return Err(StorageError::DuplicatePublicKey);
        }

        let created: bool = redis::cmd("SETNX")
            .arg(user_key(id))
            .arg(public_key)
            .query_async(&mut conn)
            .await?;
        if !created {
            return Err(StorageError::DuplicateUser);
        }

        let _: () = conn.hset(pubkey_index_key(), &pk_field, id).await?;
        Ok(())
    }

    async fn check_user_exists(&self, id: &str) -> Result<bool, StorageError> {
        let mut conn = self.conn().await?;
        Ok(conn.exists(user_key(id)).await?)
    }

    async fn get_public_key_by_id(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let mut conn = self.conn().await?;
        Ok(conn.get(user_key(id)).await?)
    }

    async fn save_challenge(
        &self,
        challenge: &[u8],
        user_id: Option<&str>,
        public_key: Option<&[u8]>,
    ) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        let record = ChallengeRecord {
            user_id: user_id.map(|s| s.to_string()),
            public_key: public_key.map(|p| p.to_vec()),
        };
        let payload = serde_json::to_vec(&record)?;
        let _: () = conn
            .set_ex(challenge_key(challenge), payload, CHALLENGE_TTL_SECS as u64)
            .await?;
        Ok(())
    }

    async fn get_challenge_data(
        &self,
        challenge: &[u8],
    ) -> Result<Option<ChallengeData>, StorageError> {
        let mut conn = self.conn().await?;
        let key = challenge_key(challenge);

        let payload: Option<Vec<u8>> = conn.get(&key).await?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        let _: () = conn.del(&key).await?;

        let record: ChallengeRecord = serde_json::from_slice(&payload)?;
        if let Some(user_id) = record.user_id {
            let resolved = self
                .get_public_key_by_id(&user_id)
                .await?
                .ok_or(StorageError::MalformedChallengeRow)?;
            Ok(Some(ChallengeData {
                public_key: resolved,
                user_id: Some(user_id),
            }))
        } else if let Some(public_key) = record.public_key {
            Ok(Some(ChallengeData {
                public_key,
                user_id: None,
            }))
        } else {
            Err(StorageError::MalformedChallengeRow)
        }
    }

    async fn cleanup_challenges(&self) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        let keys: Vec<String> = conn.keys("coldwire:challenge:*").await?;
        if !keys.is_empty() {
            let _: () = conn.del(keys).await?;
        }
        Ok(())
    }

    async fn cleanup_expired_challenges(
        &self,
        _older_than: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        // Challenge keys carry a native TTL set at SET_EX time; Redis expires them itself.
        Ok(())
    }

    async fn save_server_info(
        &self,
        url: &str,
        public_key: &[u8],
        refetch_date: &str,
    ) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        let record = ServerRecord {
            public_key: public_key.to_vec(),
            refetch_date: refetch_date.to_string(),
        };
        let payload = serde_json::to_vec(&record)?;
        let _: () = conn.set(server_key(url), payload).await?;
        Ok(())
    }

    async fn get_server_info(&self, url: &str) -> Result<Option<ServerInfo>, StorageError> {
        let mut conn = self.conn().await?;
        let payload: Option<Vec<u8>> = conn.get(server_key(url)).await?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        let record: ServerRecord = serde_json::from_slice(&payload)?;
        Ok(Some(ServerInfo {
            public_key: record.public_key,
            refetch_date: record.refetch_date,
        }))
    }

    async fn insert_data(
        &self,
        recipient: &str,
        ack_id: &[u8],
        blob: &[u8],
    ) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        let mut entry = Vec::with_capacity(ack_id.len() + blob.len());
        entry.extend_from_slice(ack_id);
        entry.extend_from_slice(blob);
        let _: () = conn.rpush(queue_key(recipient), entry).await?;
        Ok(())
    }

    async fn get_latest_data(&self, recipient: &str) -> Result<Vec<u8>, StorageError> {
        let mut conn = self.conn().await?;
        let entries: Vec<Vec<u8>> = conn.lrange(queue_key(recipient), 0, -1).await?;
        Ok(entries.concat())
    }

    async fn delete_ack(&self, recipient: &str, ack_ids: &[Vec<u8>]) -> Result<(), StorageError> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let key = queue_key(recipient);
        let entries: Vec<Vec<u8>> = conn.lrange(&key, 0, -1).await?;
        for entry in entries {
            if entry.len() >= ACK_ID_LEN
                && ack_ids.iter().any(|id| id.as_slice() == &entry[..ACK_ID_LEN])
            {
                let _: () = conn.lrem(&key, 1, entry).await?;
            }
        }
        Ok(())
    }

    async fn exit_cleanup(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
