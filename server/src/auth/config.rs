/// Authentication settings, derived from the server configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// Key shared with the chat bot that mints login links. Also keys the
    /// hourly API keys.
    pub login_secret: String,
    /// Key for the session JWT.
    pub session_secret: String,
    pub session_expiry_hours: i64,
    /// Oldest login link accepted, in seconds.
    pub login_max_age_secs: i64,
    pub public_url: String,
}

impl AuthConfig {
    /// Whether cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.public_url.starts_with("https")
    }

    /// Session cookie lifetime in seconds.
    pub fn session_max_age_secs(&self) -> i64 {
        self.session_expiry_hours * 3600
    }
}
