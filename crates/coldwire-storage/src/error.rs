use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("user id already registered")]
    DuplicateUser,

    #[error("public key already registered")]
    DuplicatePublicKey,

    #[error("peer server already registered under a different key")]
    DuplicateServer,

    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage backend exhausted its retry budget on a transient error")]
    RetriesExhausted,

    #[error("challenge row has neither a user_id nor a public_key set, which is a bug")]
    MalformedChallengeRow,
}
