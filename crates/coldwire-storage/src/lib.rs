//! The `Storage` trait and its three backends (SQLite, Postgres, Redis).
//!
//! Mirrors `internal/storage/storage.go`'s `UserStorage`/`DataStorage` split, merged here into
//! a single trait since every backend in this implementation serves both roles.

pub mod error;
pub mod postgres;
pub mod redis_backend;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use error::StorageError;
pub use postgres::PostgresStorage;
pub use redis_backend::RedisStorage;
pub use sqlite::SqliteStorage;

/// The public key resolved for a challenge, plus the `user_id` if the challenge was created
/// for an existing user (login) rather than a fresh registration.
#[derive(Debug, Clone)]
pub struct ChallengeData {
    pub public_key: Vec<u8>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub public_key: Vec<u8>,
    pub refetch_date: String,
}

/// Storage abstraction shared by every backend. Every method is independently atomic;
/// the caller (`coldwire-identity`, `coldwire-relay`) holds no cross-call locks of its own.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn save_user(&self, id: &str, public_key: &[u8]) -> Result<(), StorageError>;
    async fn check_user_exists(&self, id: &str) -> Result<bool, StorageError>;
    async fn get_public_key_by_id(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Exactly one of `user_id`/`public_key` must be `Some`; enforced by the caller.
    async fn save_challenge(
        &self,
        challenge: &[u8],
        user_id: Option<&str>,
        public_key: Option<&[u8]>,
    ) -> Result<(), StorageError>;

    /// Consumes (deletes) the challenge row as part of the lookup. Returns `None` if the
    /// challenge is unknown or was already consumed.
    async fn get_challenge_data(
        &self,
        challenge: &[u8],
    ) -> Result<Option<ChallengeData>, StorageError>;

    /// Purges every challenge unconditionally. Used at server start.
    async fn cleanup_challenges(&self) -> Result<(), StorageError>;

    /// Purges challenges created before `older_than`. Used by the background TTL sweep.
    async fn cleanup_expired_challenges(&self, older_than: DateTime<Utc>)
        -> Result<(), StorageError>;

    async fn save_server_info(
        &self,
        url: &str,
        public_key: &[u8],
        refetch_date: &str,
    ) -> Result<(), StorageError>;
    async fn get_server_info(&self, url: &str) -> Result<Option<ServerInfo>, StorageError>;

    async fn insert_data(
        &self,
        recipient: &str,
        ack_id: &[u8],
        blob: &[u8],
    ) -> Result<(), StorageError>;

    /// Returns every queued entry for `recipient`, concatenated as `ack_id || blob` in
    /// insertion order. MUST NOT delete — deletion happens only via `delete_ack`.
    async fn get_latest_data(&self, recipient: &str) -> Result<Vec<u8>, StorageError>;

    /// Deletes every queue entry for `recipient` whose `ack_id` is in `ack_ids`. Idempotent.
    async fn delete_ack(&self, recipient: &str, ack_ids: &[Vec<u8>]) -> Result<(), StorageError>;

    async fn exit_cleanup(&self) -> Result<(), StorageError>;
}
