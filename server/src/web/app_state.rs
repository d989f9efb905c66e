use std::sync::Arc;
use std::time::Duration;

use crate::auth::config::AuthConfig;
use crate::engine::raid_engine::RaidEngine;
use crate::slack::SlackNotifier;

/// Shared state for all HTTP handlers.
pub struct AppState {
    pub engine: Arc<RaidEngine>,
    pub slack: SlackNotifier,
    pub auth_config: AuthConfig,
    /// Slash command the chat bot answers to, reported to the web client.
    pub slash_command: String,
    pub login_redirect: String,
    pub long_poll_timeout: Duration,
}
