//! Shared vocabulary for the Coldwire relay: wire-exact constants, JSON DTOs for the
//! external HTTP interface, and server configuration.

pub mod config;
pub mod constants;
pub mod wire;

pub use config::{Config, ConfigError, PostgresConfig, RedisConfig, StorageKind};
