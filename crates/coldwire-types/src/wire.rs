//! JSON request/response bodies for the external HTTP interface (SPEC_FULL.md §6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthenticateInitRequest {
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticateInitResponse {
    pub challenge: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticateVerifyRequest {
    pub challenge: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticateVerifyResponse {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSendMetadata {
    pub recipient: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FederationSendMetadata {
    pub sender: String,
    pub recipient: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FederationInfoResponse {
    pub public_key: String,
    pub refetch_date: String,
    pub signature: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AckRequest {
    pub acks: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    pub const fn success() -> Self {
        Self { status: "success" }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
