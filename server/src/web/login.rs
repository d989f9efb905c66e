use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::auth::config::AuthConfig;
use crate::auth::token::{api_key, create_session_token, verify_login};

use super::app_state::AppState;
use super::auth_middleware::{SESSION_COOKIE, session_claims};

#[derive(Deserialize)]
pub struct LoginParams {
    pub username: String,
    pub t: String,
    pub signature: String,
}

#[derive(Serialize)]
pub struct CheckResponse {
    pub cmd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

fn session_cookie(config: &AuthConfig, value: &str, max_age: i64) -> String {
    let secure = if config.secure_cookies() { "; Secure" } else { "" };
    format!("{SESSION_COOKIE}={value}; HttpOnly; Path=/; Max-Age={max_age}; SameSite=Lax{secure}")
}

/// Mint a fresh API key for `username` and wrap it in a session cookie.
fn issue_session(config: &AuthConfig, username: &str) -> Result<String, StatusCode> {
    let key = api_key(&config.login_secret, username, Utc::now().timestamp(), 0);
    let jwt = create_session_token(
        username,
        &key,
        &config.session_secret,
        config.session_expiry_hours,
    )
    .map_err(|e| {
        error!(error = %e, "failed to create session token");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(session_cookie(config, &jwt, config.session_max_age_secs()))
}

/// GET /rest/login — redeem a signed login link from the chat bot
pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LoginParams>,
) -> Response {
    let config = &state.auth_config;
    let Ok(t) = params.t.parse::<i64>() else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if let Err(e) = verify_login(
        &config.login_secret,
        &params.username,
        t,
        &params.signature,
        Utc::now().timestamp(),
        config.login_max_age_secs,
    ) {
        warn!(user = %params.username, reason = %e, "rejected login");
        return StatusCode::FORBIDDEN.into_response();
    }

    let cookie = match issue_session(config, &params.username) {
        Ok(cookie) => cookie,
        Err(status) => return status.into_response(),
    };
    info!(user = %params.username, "logged in");

    (
        StatusCode::FOUND,
        [
            (header::SET_COOKIE, cookie),
            (header::LOCATION, state.login_redirect.clone()),
        ],
    )
        .into_response()
}

/// GET|POST /rest/login/logout — clear the session cookie
pub async fn logout(State(state): State<Arc<AppState>>) -> Response {
    let cookie = session_cookie(&state.auth_config, "", 0);
    (StatusCode::OK, [(header::SET_COOKIE, cookie)]).into_response()
}

/// GET /rest/login/check — who am I, with a refreshed API key
pub async fn check(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let cmd = state.slash_command.clone();
    let Some(claims) = session_claims(&jar, &state) else {
        return Json(CheckResponse {
            cmd,
            username: None,
        })
        .into_response();
    };

    match issue_session(&state.auth_config, &claims.sub) {
        Ok(cookie) => (
            [(header::SET_COOKIE, cookie)],
            Json(CheckResponse {
                cmd,
                username: Some(claims.sub),
            }),
        )
            .into_response(),
        Err(status) => status.into_response(),
    }
}
