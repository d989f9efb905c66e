use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// How many hourly API keys (current plus previous) are accepted.
pub const API_KEY_VALID_HOURS: i64 = 10;

/// JWT claims for the session cookie. Replaces untyped session values with
/// the two things a session needs: who the user is and their API key.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // username
    pub api_key: String,
    pub exp: i64, // expiry (unix timestamp)
    pub iat: i64, // issued at
}

/// Why a login link was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    #[error("login link timestamp is in the future")]
    FromTheFuture,
    #[error("login link has expired")]
    Expired,
    #[error("login link signature does not match")]
    BadSignature,
}

/// Create a JWT session token carrying the user's current API key.
pub fn create_session_token(
    username: &str,
    api_key: &str,
    secret: &str,
    expiry_hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: username.to_string(),
        api_key: api_key.to_string(),
        exp: (now + Duration::hours(expiry_hours)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Validate a JWT session token and return the claims.
pub fn validate_session_token(
    token: &str,
    secret: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Hex HMAC-SHA256 of `message` under `key`.
fn sign(key: &str, message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Signature the chat bot attaches to a login link for `username` at unix
/// time `t`.
pub fn login_signature(key: &str, username: &str, t: i64) -> String {
    sign(key, &format!("{username} {t}\n"))
}

/// Check a login link: signed with the shared key, not from the future and
/// no older than `max_age_secs` as of `now`.
pub fn verify_login(
    key: &str,
    username: &str,
    t: i64,
    signature: &str,
    now: i64,
    max_age_secs: i64,
) -> Result<(), LoginError> {
    if t > now {
        return Err(LoginError::FromTheFuture);
    }
    if now.checked_sub(t).is_none_or(|age| age > max_age_secs) {
        return Err(LoginError::Expired);
    }
    if !constant_time_eq(signature, &login_signature(key, username, t)) {
        return Err(LoginError::BadSignature);
    }
    Ok(())
}

/// The hour bucket API keys are derived from: unix time / 3600, rounded up.
pub fn hour_bucket(now: i64) -> i64 {
    (now + 3599).div_euclid(3600)
}

/// API key for `username`, `age` hours before the bucket containing `now`.
pub fn api_key(key: &str, username: &str, now: i64, age: i64) -> String {
    sign(key, &format!("{username} {}\n", hour_bucket(now) - age))
}

/// Accept a key minted within the last [`API_KEY_VALID_HOURS`] hour buckets.
pub fn verify_api_key(key: &str, username: &str, candidate: &str, now: i64) -> bool {
    (0..API_KEY_VALID_HOURS)
        .any(|age| constant_time_eq(candidate, &api_key(key, username, now, age)))
}

/// Random 256-bit secret, hex encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
