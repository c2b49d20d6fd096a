//! Embedded SQLite backend. Grounded on `internal/storage/sqlite/sqlite.go`'s schema and
//! query shapes.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::StorageError;
use crate::{ChallengeData, ServerInfo, Storage};

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        public_key BLOB NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS servers (
        url TEXT PRIMARY KEY,
        public_key BLOB UNIQUE NOT NULL,
        refetch_date TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS challenges (
        challenge BLOB PRIMARY KEY,
        id TEXT,
        public_key BLOB,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        recipient TEXT NOT NULL,
        ack_id BLOB NOT NULL,
        data_blob BLOB NOT NULL
    )",
];

const BUSY_RETRY_ATTEMPTS: u32 = 5;
const BUSY_RETRY_BASE_DELAY_MS: u64 = 20;

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn connect(path: &str) -> Result<Self, StorageError> {
        let opts = SqliteConnectOptions::from_str(path)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(BUSY_RETRY_BASE_DELAY_MS));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(opts)
            .await?;

        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        for stmt in SCHEMA_STATEMENTS {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }
}

/// Retries `op` a bounded number of times when SQLite reports "database is locked", per
/// SPEC_FULL.md's deliberate hardening of the source's literal busy-spin into a bounded,
/// sleeping retry loop. Grounded on `auth_service.rs::start_challenge_expiration_task`'s
/// periodic-retry idiom.
async fn retry_on_busy<T, F, Fut>(mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_busy(&err) && attempt < BUSY_RETRY_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(
                    BUSY_RETRY_BASE_DELAY_MS * attempt as u64,
                ))
                .await;
            }
            Err(err) if is_busy(&err) => return Err(StorageError::RetriesExhausted),
            Err(err) => return Err(err.into()),
        }
    }
}

fn is_busy(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("database is locked"))
}

fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed") => {
            Some(db.message())
        }
        _ => None,
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_user(&self, id: &str, public_key: &[u8]) -> Result<(), StorageError> {
        let result = retry_on_busy(|| async {
            sqlx::query("INSERT INTO users (id, public_key) VALUES (?, ?)")
                .bind(id)
                .bind(public_key)
                .execute(&self.pool)
                .await
        })
        .await;

        match result {
            Err(StorageError::Sql(err)) => match unique_violation(&err) {
                Some(msg) if msg.contains("users.id") => Err(StorageError::DuplicateUser),
                Some(_) => Err(StorageError::DuplicatePublicKey),
                None => Err(StorageError::Sql(err)),
            },
            other => other.map(|_| ()),
        }
    }

    async fn check_user_exists(&self, id: &str) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?) AS e")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("e")? != 0)
    }

    async fn get_public_key_by_id(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let row = sqlx::query("SELECT public_key FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>("public_key")))
    }

    async fn save_challenge(
        &self,
        challenge: &[u8],
        user_id: Option<&str>,
        public_key: Option<&[u8]>,
    ) -> Result<(), StorageError> {
        retry_on_busy(|| async {
            sqlx::query(
                "INSERT INTO challenges (challenge, id, public_key, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(challenge)
            .bind(user_id)
            .bind(public_key)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
        })
        .await?;
        Ok(())
    }

    async fn get_challenge_data(
        &self,
        challenge: &[u8],
    ) -> Result<Option<ChallengeData>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT id, public_key FROM challenges WHERE challenge = ?")
            .bind(challenge)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let user_id: Option<String> = row.get("id");
        let public_key: Option<Vec<u8>> = row.get("public_key");

        sqlx::query("DELETE FROM challenges WHERE challenge = ?")
            .bind(challenge)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if let Some(user_id) = user_id {
            let resolved = self
                .get_public_key_by_id(&user_id)
                .await?
                .ok_or(StorageError::MalformedChallengeRow)?;
            Ok(Some(ChallengeData {
                public_key: resolved,
                user_id: Some(user_id),
            }))
        } else if let Some(public_key) = public_key {
            Ok(Some(ChallengeData {
                public_key,
                user_id: None,
            }))
        } else {
            Err(StorageError::MalformedChallengeRow)
        }
    }

    async fn cleanup_challenges(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM challenges")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cleanup_expired_challenges(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM challenges WHERE created_at < ?")
            .bind(older_than.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_server_info(
        &self,
        url: &str,
        public_key: &[u8],
        refetch_date: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO servers (url, public_key, refetch_date) VALUES (?, ?, ?)
             ON CONFLICT(url) DO UPDATE SET public_key = excluded.public_key,
                                             refetch_date = excluded.refetch_date",
        )
        .bind(url)
        .bind(public_key)
        .bind(refetch_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_server_info(&self, url: &str) -> Result<Option<ServerInfo>, StorageError> {
        let row = sqlx::query("SELECT public_key, refetch_date FROM servers WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| ServerInfo {
            public_key: r.get("public_key"),
            refetch_date: r.get("refetch_date"),
        }))
    }

    async fn insert_data(
        &self,
        recipient: &str,
        ack_id: &[u8],
        blob: &[u8],
    ) -> Result<(), StorageError> {
        retry_on_busy(|| async {
            sqlx::query(
                "INSERT INTO data (recipient, ack_id, data_blob) VALUES (?, ?, ?)",
            )
            .bind(recipient)
            .bind(ack_id)
            .bind(blob)
            .execute(&self.pool)
            .await
        })
        .await?;
        Ok(())
    }

    async fn get_latest_data(&self, recipient: &str) -> Result<Vec<u8>, StorageError> {
        let rows = sqlx::query("SELECT ack_id, data_blob FROM data WHERE recipient = ? ORDER BY id")
            .bind(recipient)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::new();
        for row in rows {
            let ack_id: Vec<u8> = row.get("ack_id");
            let blob: Vec<u8> = row.get("data_blob");
            out.extend_from_slice(&ack_id);
            out.extend_from_slice(&blob);
        }
        Ok(out)
    }

    async fn delete_ack(&self, recipient: &str, ack_ids: &[Vec<u8>]) -> Result<(), StorageError> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for ack_id in ack_ids {
            sqlx::query("DELETE FROM data WHERE recipient = ? AND ack_id = ?")
                .bind(recipient)
                .bind(ack_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn exit_cleanup(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_storage() -> SqliteStorage {
        SqliteStorage::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn save_and_fetch_user() {
        let storage = memory_storage().await;
        storage.save_user("1234567890123456", b"pubkey").await.unwrap();
        assert!(storage.check_user_exists("1234567890123456").await.unwrap());
        assert_eq!(
            storage
                .get_public_key_by_id("1234567890123456")
                .await
                .unwrap(),
            Some(b"pubkey".to_vec())
        );
    }

    #[tokio::test]
    async fn duplicate_user_id_is_rejected() {
        let storage = memory_storage().await;
        storage.save_user("1234567890123456", b"key-a").await.unwrap();
        let err = storage
            .save_user("1234567890123456", b"key-b")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateUser));
    }

    #[tokio::test]
    async fn challenge_is_consumed_on_read() {
        let storage = memory_storage().await;
        storage
            .save_challenge(b"challenge-bytes-000000000000000", None, Some(b"pubkey"))
            .await
            .unwrap();

        let first = storage
            .get_challenge_data(b"challenge-bytes-000000000000000")
            .await
            .unwrap();
        assert!(first.is_some());

        let second = storage
            .get_challenge_data(b"challenge-bytes-000000000000000")
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn queue_round_trips_and_ack_deletes() {
        let storage = memory_storage().await;
        storage.save_user("1234567890123456", b"pubkey").await.unwrap();

        storage
            .insert_data("1234567890123456", b"ack-id-0000000000000000000000000", b"hello")
            .await
            .unwrap();

        let flushed = storage.get_latest_data("1234567890123456").await.unwrap();
        assert_eq!(flushed.len(), 32 + 5);

        let still_there = storage.get_latest_data("1234567890123456").await.unwrap();
        assert_eq!(still_there.len(), 32 + 5, "flush must not delete");

        storage
            .delete_ack(
                "1234567890123456",
                &[b"ack-id-0000000000000000000000000".to_vec()],
            )
            .await
            .unwrap();
        let after_ack = storage.get_latest_data("1234567890123456").await.unwrap();
        assert!(after_ack.is_empty());
    }

    #[tokio::test]
    async fn server_info_upserts() {
        let storage = memory_storage().await;
        storage
            .save_server_info("peer.example", b"key-1", "2026-01-01")
            .await
            .unwrap();
        storage
            .save_server_info("peer.example", b"key-1", "2026-02-01")
            .await
            .unwrap();

        let info = storage.get_server_info("peer.example").await.unwrap().unwrap();
        assert_eq!(info.refetch_date, "2026-02-01");
    }
}
