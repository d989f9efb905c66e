use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

use super::app_state::AppState;
use super::{login, rest_api};

/// Build the axum router with all REST routes and the static web client.
pub fn build_router(state: Arc<AppState>, static_dir: &str) -> Router {
    // Restrict CORS to the configured public_url origin (or allow any for localhost dev)
    let public_url = &state.auth_config.public_url;
    let cors = if public_url.contains("localhost") || public_url.contains("127.0.0.1") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origin = public_url
            .parse::<HeaderValue>()
            .unwrap_or_else(|_| HeaderValue::from_static("https://localhost"));
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let login_routes = Router::new()
        .route("/rest/login", get(login::login))
        .route("/rest/login/logout", get(login::logout).post(login::logout))
        .route("/rest/login/check", get(login::check));

    // Raid commands only accept POST; other methods get 405 from the router.
    let raid_routes = Router::new()
        .route("/rest/get", get(rest_api::get_raids))
        .route("/rest/raid/host", post(rest_api::host))
        .route("/rest/raid/join", post(rest_api::join))
        .route("/rest/raid/leave", post(rest_api::leave))
        .route("/rest/raid/join-alt", post(rest_api::join_alt))
        .route("/rest/raid/leave-alt", post(rest_api::leave_alt))
        .route("/rest/raid/finish", post(rest_api::finish))
        .route("/rest/raid/ping", post(rest_api::ping));

    let index = format!("{}/index.html", static_dir.trim_end_matches('/'));

    Router::new()
        .merge(login_routes)
        .merge(raid_routes)
        // Static files with SPA fallback — unmatched routes serve index.html
        .fallback_service(ServeDir::new(static_dir).fallback(ServeFile::new(index)))
        .layer(cors)
        .with_state(state)
}
