//! Bearer token middleware. Mirrors `internal/httpserver/jwt_middleware.go`'s
//! `Authorization: Bearer <token>` check, adapted from context-value injection to an axum
//! request extension.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use coldwire_crypto::{verify_token, Claims};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn require_bearer_token(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;

    let claims: Claims = verify_token(token, &state.jwt_secret).map_err(|_| ApiError::Unauthorized)?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
