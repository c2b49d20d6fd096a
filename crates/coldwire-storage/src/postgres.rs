//! External Postgres backend. Grounded on `internal/storage/mysql/mysql.go`'s query shapes,
//! translated from MySQL's `?`/`INSERT ... ON DUPLICATE KEY UPDATE` to Postgres's `$n`/
//! `ON CONFLICT DO UPDATE`, since the corpus carries `sqlx`'s Postgres driver rather than
//! MySQL's.

use chrono::{DateTime, Utc};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::error::StorageError;
use crate::{ChallengeData, ServerInfo, Storage};

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        public_key BYTEA NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS servers (
        url TEXT PRIMARY KEY,
        public_key BYTEA UNIQUE NOT NULL,
        refetch_date TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS challenges (
        challenge BYTEA PRIMARY KEY,
        id TEXT,
        public_key BYTEA,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS data (
        id BIGSERIAL PRIMARY KEY,
        recipient TEXT NOT NULL,
        ack_id BYTEA NOT NULL,
        data_blob BYTEA NOT NULL
    )",
];

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn connect(dsn: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new().max_connections(8).connect(dsn).await?;
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

fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => Some(db.message()),
        _ => None,
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn save_user(&self, id: &str, public_key: &[u8]) -> Result<(), StorageError> {
        let result = sqlx::query("INSERT INTO users (id, public_key) VALUES ($1, $2)")
            .bind(id)
            .bind(public_key)
            .execute(&self.pool)
            .await;

        match result {
            Err(err) => match unique_violation(&err) {
                Some(msg) if msg.contains("users_pkey") => Err(StorageError::DuplicateUser),
                Some(_) => Err(StorageError::DuplicatePublicKey),
                None => Err(err.into()),
            },
            Ok(_) => Ok(()),
        }
    }

    async fn check_user_exists(&self, id: &str) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1) AS e")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<bool, _>("e")?)
    }

    async fn get_public_key_by_id(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let row = sqlx::query("SELECT public_key FROM users WHERE id = $1")
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
        sqlx::query(
            "INSERT INTO challenges (challenge, id, public_key, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(challenge)
        .bind(user_id)
        .bind(public_key)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_challenge_data(
        &self,
        challenge: &[u8],
    ) -> Result<Option<ChallengeData>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT id, public_key FROM challenges WHERE challenge = $1")
            .bind(challenge)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let user_id: Option<String> = row.get("id");
        let public_key: Option<Vec<u8>> = row.get("public_key");

        sqlx::query("DELETE FROM challenges WHERE challenge = $1")
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
        sqlx::query("DELETE FROM challenges").execute(&self.pool).await?;
        Ok(())
    }

    async fn cleanup_expired_challenges(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM challenges WHERE created_at < $1")
            .bind(older_than)
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
            "INSERT INTO servers (url, public_key, refetch_date) VALUES ($1, $2, $3)
             ON CONFLICT (url) DO UPDATE SET public_key = excluded.public_key,
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
        let row = sqlx::query("SELECT public_key, refetch_date FROM servers WHERE url = $1")
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
        sqlx::query("INSERT INTO data (recipient, ack_id, data_blob) VALUES ($1, $2, $3)")
            .bind(recipient)
            .bind(ack_id)
            .bind(blob)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_latest_data(&self, recipient: &str) -> Result<Vec<u8>, StorageError> {
        let rows = sqlx::query("SELECT ack_id, data_blob FROM data WHERE recipient = $1 ORDER BY id")
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
            sqlx::query("DELETE FROM data WHERE recipient = $1 AND ack_id = $2")
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
