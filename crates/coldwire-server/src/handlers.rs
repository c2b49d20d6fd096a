use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::{info, warn};

use coldwire_crypto::Claims;
use coldwire_identity::AuthOutcome;
use coldwire_types::constants::MAX_MULTIPART_MEMORY;
use coldwire_types::wire::{
    AckRequest, AuthenticateInitRequest, AuthenticateInitResponse, AuthenticateVerifyRequest,
    AuthenticateVerifyResponse, DataSendMetadata, FederationInfoResponse, FederationSendMetadata,
    HealthResponse, StatusResponse,
};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn authenticate_init(
    State(state): State<AppState>,
    Json(req): Json<AuthenticateInitRequest>,
) -> Result<Json<AuthenticateInitResponse>, ApiError> {
    info!("received authentication init request");
    let challenge = state
        .identity
        .auth_init(req.public_key.as_deref(), req.user_id.as_deref())
        .await?;
    Ok(Json(AuthenticateInitResponse { challenge }))
}

pub async fn authenticate_verify(
    State(state): State<AppState>,
    Json(req): Json<AuthenticateVerifyRequest>,
) -> Result<Json<AuthenticateVerifyResponse>, ApiError> {
    info!("received authentication verify request");
    match state.identity.auth_verify(&req.challenge, &req.signature).await? {
        AuthOutcome::Verified { user_id, token } => {
            Ok(Json(AuthenticateVerifyResponse { user_id, token }))
        }
        AuthOutcome::Failed => {
            warn!("challenge verification failed, refusing to mint a token");
            Ok(Json(AuthenticateVerifyResponse {
                user_id: String::new(),
                token: String::new(),
            }))
        }
    }
}

pub async fn data_send(
    State(state): State<AppState>,
    claims: axum::Extension<Claims>,
    multipart: Multipart,
) -> Result<Json<StatusResponse>, ApiError> {
    let (metadata_raw, blob) = read_blob_multipart(multipart, "metadata").await?;

    let metadata: DataSendMetadata = serde_json::from_slice(&metadata_raw)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON metadata: {e}")))?;
    if metadata.recipient.is_empty() {
        return Err(ApiError::BadRequest("missing recipient in metadata".into()));
    }
    if blob.is_empty() {
        return Err(ApiError::BadRequest("empty blob is not allowed".into()));
    }

    state.relay.send(&claims.user_id, &metadata.recipient, &blob).await?;
    Ok(Json(StatusResponse::success()))
}

pub async fn data_longpoll(
    State(state): State<AppState>,
    claims: axum::Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let data = state.relay.long_poll(&claims.user_id).await?;
    Ok((
        StatusCode::OK,
        [("content-type", "application/octet-stream")],
        data,
    ))
}

pub async fn data_ack(
    State(state): State<AppState>,
    claims: axum::Extension<Claims>,
    Json(req): Json<AckRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.relay.ack(&claims.user_id, &req.acks).await?;
    Ok(Json(StatusResponse::success()))
}

pub async fn federation_info(
    State(state): State<AppState>,
) -> Result<Json<FederationInfoResponse>, ApiError> {
    info!("received federation information fetch request");
    let (public_key, refetch_date, signature) = state.relay.federation_info()?;
    Ok(Json(FederationInfoResponse {
        public_key,
        refetch_date,
        signature,
    }))
}

pub async fn federation_send(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<StatusResponse>, ApiError> {
    info!("received federation send request");
    let (metadata_raw, blob) = read_blob_multipart(multipart, "metadata").await?;

    let metadata: FederationSendMetadata = serde_json::from_slice(&metadata_raw)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON metadata: {e}")))?;
    if metadata.sender.is_empty() || metadata.recipient.is_empty() || metadata.url.is_empty() {
        return Err(ApiError::BadRequest("missing sender, recipient, or url in metadata".into()));
    }
    if blob.is_empty() {
        return Err(ApiError::BadRequest("empty blob is not allowed".into()));
    }

    state
        .relay
        .federation_ingress(&metadata.sender, &metadata.recipient, &metadata.url, &blob)
        .await?;
    Ok(Json(StatusResponse::success()))
}

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.get_server_info("__healthz_probe__").await {
        Ok(_) => (StatusCode::OK, Json(HealthResponse { status: "healthy" })),
        Err(e) => {
            warn!("healthz probe failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse { status: "unhealthy" }),
            )
        }
    }
}

/// Reads a `metadata` text field plus a `blob` file field out of a multipart form, bounded by
/// `MAX_MULTIPART_MEMORY`, mirroring `r.ParseMultipartForm(3 << 20)` in the Go handlers.
async fn read_blob_multipart(
    mut multipart: Multipart,
    metadata_field: &str,
) -> Result<(Vec<u8>, Vec<u8>), ApiError> {
    let mut metadata = None;
    let mut blob = None;
    let mut total = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to parse multipart form: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read form field: {e}")))?;

        total += bytes.len();
        if total > MAX_MULTIPART_MEMORY {
            return Err(ApiError::BadRequest("multipart form exceeds size limit".into()));
        }

        if name == metadata_field {
            metadata = Some(bytes.to_vec());
        } else if name == "blob" {
            blob = Some(bytes.to_vec());
        }
    }

    let metadata = metadata.ok_or_else(|| ApiError::BadRequest("missing metadata".into()))?;
    let blob = blob.ok_or_else(|| ApiError::BadRequest("failed to read blob from form".into()))?;
    Ok((metadata, blob))
}
