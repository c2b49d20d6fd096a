//! Server configuration: loaded from a JSON file on disk, with the JWT secret and
//! ML-DSA-87 private key lazily generated and persisted back on first run.
//!
//! Mirrors `internal/config/config.go`'s `Config` struct and `Load`/`Validate`/`Write`
//! behavior field-for-field.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::JWT_SECRET_LEN;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RedisConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub db: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PostgresConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default, rename = "db_name")]
    pub db_name: String,
    #[serde(default, rename = "db_user")]
    pub db_user: String,
    #[serde(default, rename = "db_password")]
    pub db_password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Sqlite,
    Postgres,
    Redis,
}

impl Default for StorageKind {
    fn default() -> Self {
        StorageKind::Sqlite
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "Your_domain_or_IP")]
    pub domain_or_ip: String,

    #[serde(rename = "Federation_enabled")]
    pub federation_enabled: bool,

    #[serde(rename = "User_storage")]
    pub user_storage: StorageKind,

    #[serde(rename = "Data_storage")]
    pub data_storage: StorageKind,

    #[serde(rename = "Redis", default)]
    pub redis: RedisConfig,

    #[serde(rename = "SQL", default)]
    pub postgres: PostgresConfig,

    #[serde(rename = "Blacklisted_Domain_Names", default)]
    pub blacklisted_domains: Vec<String>,

    #[serde(rename = "Blacklisted_IP_nets", default)]
    pub blacklisted_ips: Vec<String>,

    #[serde(rename = "JWT_Secret_Base64_Encoded", default)]
    pub jwt_secret_b64: Option<String>,

    #[serde(rename = "ML_DSA_87_Private_Key_Base64_Encoded", default)]
    pub dsa_private_key_b64: Option<String>,

    /// Not present in the original Go schema, which re-derives the public key from the private
    /// key on every read. `libcrux_ml_dsa` does not expose that derivation, so this persists the
    /// public half generated alongside the private key at bootstrap.
    #[serde(rename = "ML_DSA_87_Public_Key_Base64_Encoded", default)]
    pub dsa_public_key_b64: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read(path)?;
        let mut cfg: Config = serde_json::from_slice(&data)?;

        cfg.domain_or_ip = cfg.domain_or_ip.to_lowercase();
        cfg.validate()?;

        let mut dirty = false;

        if cfg.jwt_secret_b64.is_none() {
            let secret = coldwire_secure_random_bytes(JWT_SECRET_LEN);
            cfg.jwt_secret_b64 = Some(base64_encode(&secret));
            dirty = true;
        }

        // The ML-DSA-87 private key itself is generated by coldwire-crypto, not here;
        // callers that need a fresh keypair call `Config::set_dsa_private_key` and then
        // `Config::write` during server bootstrap, before `dsa_private_key_b64` is read.

        if dirty {
            cfg.write(path)?;
        }

        Ok(cfg)
    }

    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if matches!(self.data_storage, StorageKind::Redis) && self.redis.port == 0 {
            return Err(ConfigError::Invalid(format!(
                "invalid Redis port: {}",
                self.redis.port
            )));
        }

        if matches!(self.data_storage, StorageKind::Postgres) && self.postgres.port == 0 {
            return Err(ConfigError::Invalid(format!(
                "invalid SQL port: {}",
                self.postgres.port
            )));
        }

        if self.domain_or_ip.is_empty() {
            return Err(ConfigError::Invalid(
                "you must include your domain name or IP address in the configuration file"
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn jwt_secret(&self) -> Vec<u8> {
        self.jwt_secret_b64
            .as_deref()
            .and_then(|s| base64_decode(s).ok())
            .unwrap_or_default()
    }

    pub fn dsa_private_key(&self) -> Option<Vec<u8>> {
        self.dsa_private_key_b64
            .as_deref()
            .and_then(|s| base64_decode(s).ok())
    }

    pub fn set_dsa_private_key(&mut self, key: &[u8]) {
        self.dsa_private_key_b64 = Some(base64_encode(key));
    }

    pub fn dsa_public_key(&self) -> Option<Vec<u8>> {
        self.dsa_public_key_b64
            .as_deref()
            .and_then(|s| base64_decode(s).ok())
    }

    pub fn set_dsa_public_key(&mut self, key: &[u8]) {
        self.dsa_public_key_b64 = Some(base64_encode(key));
    }
}

fn coldwire_secure_random_bytes(n: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut out = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut out);
    out
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.decode(s)
}
