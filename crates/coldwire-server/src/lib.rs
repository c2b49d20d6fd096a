//! Request dispatcher: maps external HTTP requests to `coldwire-identity`/`coldwire-relay` and
//! enforces bearer-token auth on protected operations. Mirrors `internal/httpserver/server.go`'s
//! route table, translated from `http.ServeMux` + a hand-rolled JWT middleware wrapper to
//! `axum::Router` + `axum::middleware::from_fn_with_state`.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use coldwire_types::constants::MAX_MULTIPART_MEMORY;

pub use state::AppState;

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/data/send", post(handlers::data_send))
        .route("/data/longpoll", get(handlers::data_longpoll))
        .route("/data/ack", post(handlers::data_ack))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    let public = Router::new()
        .route("/authenticate/init", post(handlers::authenticate_init))
        .route("/authenticate/verify", post(handlers::authenticate_verify))
        .route("/federation/info", get(handlers::federation_info))
        .route("/federation/send", post(handlers::federation_send))
        .route("/healthz", get(handlers::healthz));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(RequestBodyLimitLayer::new(MAX_MULTIPART_MEMORY))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
