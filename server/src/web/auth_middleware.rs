use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use tracing::warn;

use crate::auth::token::{Claims, validate_session_token, verify_api_key};

use super::app_state::AppState;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "raidbot_session";

/// Decode the session cookie, if present and signed by us.
pub fn session_claims(jar: &CookieJar, state: &AppState) -> Option<Claims> {
    let cookie = jar.get(SESSION_COOKIE)?;
    validate_session_token(cookie.value(), &state.auth_config.session_secret).ok()
}

/// Extractor for raid commands: a valid session whose API key is still
/// within its validity window. Rejects with 403 otherwise.
pub struct ApiUser {
    pub username: String,
}

impl FromRequestParts<Arc<AppState>> for ApiUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        let claims = session_claims(&jar, state)
            .ok_or_else(|| (StatusCode::FORBIDDEN, "Not authenticated").into_response())?;

        if !verify_api_key(
            &state.auth_config.login_secret,
            &claims.sub,
            &claims.api_key,
            Utc::now().timestamp(),
        ) {
            warn!(user = %claims.sub, "rejected stale api key");
            return Err((StatusCode::FORBIDDEN, "API key expired, log in again").into_response());
        }

        Ok(ApiUser {
            username: claims.sub,
        })
    }
}
