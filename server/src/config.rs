use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::config::AuthConfig;
use crate::auth::token::generate_secret;

/// Top-level server configuration, loaded from raidbot.toml.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub auth: AuthSection,
    pub raids: RaidSection,
    pub slack: SlackSection,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub web_address: String,
    /// Directory of the web client, served for every non-API path.
    pub static_dir: String,
    pub public_url: String,
    /// Where a successful login redirects to.
    pub login_redirect: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            web_address: "0.0.0.0:8080".into(),
            static_dir: "www".into(),
            public_url: "http://localhost:8080".into(),
            login_redirect: "/".into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub login_secret: String,
    /// Empty means a random secret per process (sessions end on restart).
    pub session_secret: String,
    pub session_expiry_hours: i64,
    pub login_max_age_secs: i64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            login_secret: String::new(),
            session_secret: String::new(),
            session_expiry_hours: 168,
            login_max_age_secs: 300,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct RaidSection {
    /// Raids idle for longer than this are removed by the sweeper.
    pub inactivity_ttl_minutes: i64,
    pub sweep_interval_secs: u64,
    pub long_poll_timeout_secs: u64,
    /// Users who may finish or ping any raid.
    pub admin_users: Vec<String>,
}

impl Default for RaidSection {
    fn default() -> Self {
        Self {
            inactivity_ttl_minutes: 360,
            sweep_interval_secs: 300,
            long_poll_timeout_secs: 30,
            admin_users: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct SlackSection {
    /// Incoming-webhook URL. If unset, notices are only logged.
    pub webhook_url: Option<String>,
    pub slash_command: String,
}

impl Default for SlackSection {
    fn default() -> Self {
        Self {
            webhook_url: None,
            slash_command: "/raid".into(),
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {path}"))?;
            Self::parse(&contents).with_context(|| format!("failed to parse config file {path}"))?
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        config.fill_secrets();
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WEB_ADDRESS") {
            self.server.web_address = v;
        }
        if let Ok(v) = std::env::var("STATIC_DIR") {
            self.server.static_dir = v;
        }
        if let Ok(v) = std::env::var("PUBLIC_URL") {
            self.server.public_url = v;
        }
        if let Ok(v) = std::env::var("LOGIN_REDIRECT") {
            self.server.login_redirect = v;
        }
        if let Ok(v) = std::env::var("LOGIN_SECRET") {
            self.auth.login_secret = v;
        }
        if let Ok(v) = std::env::var("SESSION_SECRET") {
            self.auth.session_secret = v;
        }
        if let Ok(v) = std::env::var("SESSION_EXPIRY_HOURS")
            && let Ok(hours) = v.parse()
        {
            self.auth.session_expiry_hours = hours;
        }
        if let Ok(v) = std::env::var("RAID_TTL_MINUTES")
            && let Ok(minutes) = v.parse()
        {
            self.raids.inactivity_ttl_minutes = minutes;
        }
        if let Ok(v) = std::env::var("RAID_SWEEP_SECS")
            && let Ok(secs) = v.parse()
        {
            self.raids.sweep_interval_secs = secs;
        }
        if let Ok(v) = std::env::var("LONG_POLL_TIMEOUT_SECS")
            && let Ok(secs) = v.parse()
        {
            self.raids.long_poll_timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("ADMIN_USERS") {
            self.raids.admin_users = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = std::env::var("SLACK_WEBHOOK_URL") {
            self.slack.webhook_url = Some(v).filter(|url| !url.is_empty());
        }
        if let Ok(v) = std::env::var("SLASH_COMMAND") {
            self.slack.slash_command = v;
        }
    }

    fn validate(&self) -> Result<()> {
        let minutes = self.raids.inactivity_ttl_minutes;
        if minutes <= 0 || chrono::Duration::try_minutes(minutes).is_none() {
            bail!(
                "raids.inactivity_ttl_minutes must be a positive number of minutes, got {minutes}"
            );
        }
        Ok(())
    }

    fn fill_secrets(&mut self) {
        if self.auth.login_secret.is_empty() {
            warn!("login_secret is not set; only links signed with an empty key will be accepted");
        }
        if self.auth.session_secret.is_empty() {
            info!("session_secret is not set, generating one for this process");
            self.auth.session_secret = generate_secret();
        }
    }

    /// Convert into an AuthConfig for the auth layer.
    pub fn to_auth_config(&self) -> AuthConfig {
        AuthConfig {
            login_secret: self.auth.login_secret.clone(),
            session_secret: self.auth.session_secret.clone(),
            session_expiry_hours: self.auth.session_expiry_hours,
            login_max_age_secs: self.auth.login_max_age_secs,
            public_url: self.server.public_url.clone(),
        }
    }

    /// Falls back to the default TTL when the configured one is unusable.
    pub fn inactivity_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_minutes(self.raids.inactivity_ttl_minutes)
            .filter(|ttl| *ttl > chrono::Duration::zero())
            .unwrap_or_else(|| {
                chrono::Duration::minutes(RaidSection::default().inactivity_ttl_minutes)
            })
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.raids.sweep_interval_secs.max(1))
    }

    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.raids.long_poll_timeout_secs)
    }
}
