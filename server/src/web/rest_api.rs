use std::sync::Arc;

use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::engine::notifier::WaitOutcome;
use crate::engine::outcome::Outcome;
use crate::engine::raid_engine::RaidEngine;
use crate::engine::registry::{RaidError, RegistrySnapshot};

use super::app_state::AppState;
use super::auth_middleware::ApiUser;

/// Map a refused command to the HTTP status the client sees.
pub fn status_for(err: &RaidError) -> StatusCode {
    match err {
        RaidError::NotFound => StatusCode::NOT_FOUND,
        RaidError::DuplicateRaid | RaidError::NotMember | RaidError::NotAlt => {
            StatusCode::CONFLICT
        }
        RaidError::WrongUser => StatusCode::FORBIDDEN,
        RaidError::Invalid(_) => StatusCode::BAD_REQUEST,
    }
}

// ── Long poll ───────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct PollParams {
    pub since: Option<String>,
}

#[derive(Serialize)]
pub struct PollResponse<'a> {
    pub version: u64,
    pub raids: &'a RegistrySnapshot,
}

/// GET /rest/get?since=<version> — block until the raid list differs from
/// the version the client last saw. 204 when nothing changed in time.
pub async fn get_raids(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PollParams>,
) -> Response {
    // An unparseable version can never match, so the client gets the
    // current state at once.
    let since = params.since.and_then(|s| s.parse::<u64>().ok());
    let deadline = Instant::now() + state.long_poll_timeout;

    match state.engine.wait_for_change(since, deadline).await {
        WaitOutcome::Changed(published) => {
            debug!(version = published.version, "long poll woke");
            Json(PollResponse {
                version: published.version,
                raids: &published.snapshot,
            })
            .into_response()
        }
        WaitOutcome::TimedOut(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

// ── Raid commands ───────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RaidForm {
    pub channel: String,
    pub raid: String,
}

type Command = fn(&RaidEngine, &str, &str, &str) -> Result<Outcome, RaidError>;

/// Run one command for an authenticated user and forward its notices.
fn run_command(
    state: &AppState,
    user: &str,
    action: &'static str,
    form: &RaidForm,
    command: Command,
) -> Response {
    info!(%user, channel = %form.channel, raid = %form.raid, action, "raid command");

    match command(&state.engine, user, &form.channel, &form.raid) {
        Ok(outcome) => {
            state.slack.send_all(outcome.notices);
            (StatusCode::OK, outcome.reply).into_response()
        }
        Err(e) => {
            info!(%user, action, error = %e, "raid command refused");
            (status_for(&e), e.to_string()).into_response()
        }
    }
}

/// POST /rest/raid/host
pub async fn host(
    State(state): State<Arc<AppState>>,
    user: ApiUser,
    Form(form): Form<RaidForm>,
) -> Response {
    run_command(&state, &user.username, "host", &form, RaidEngine::host)
}

/// POST /rest/raid/join
pub async fn join(
    State(state): State<Arc<AppState>>,
    user: ApiUser,
    Form(form): Form<RaidForm>,
) -> Response {
    run_command(&state, &user.username, "join", &form, RaidEngine::join)
}

/// POST /rest/raid/leave
pub async fn leave(
    State(state): State<Arc<AppState>>,
    user: ApiUser,
    Form(form): Form<RaidForm>,
) -> Response {
    run_command(&state, &user.username, "leave", &form, RaidEngine::leave)
}

/// POST /rest/raid/join-alt
pub async fn join_alt(
    State(state): State<Arc<AppState>>,
    user: ApiUser,
    Form(form): Form<RaidForm>,
) -> Response {
    run_command(&state, &user.username, "join-alt", &form, RaidEngine::join_alt)
}

/// POST /rest/raid/leave-alt
pub async fn leave_alt(
    State(state): State<Arc<AppState>>,
    user: ApiUser,
    Form(form): Form<RaidForm>,
) -> Response {
    run_command(&state, &user.username, "leave-alt", &form, RaidEngine::leave_alt)
}

/// POST /rest/raid/finish
pub async fn finish(
    State(state): State<Arc<AppState>>,
    user: ApiUser,
    Form(form): Form<RaidForm>,
) -> Response {
    run_command(&state, &user.username, "finish", &form, RaidEngine::finish)
}

/// POST /rest/raid/ping
pub async fn ping(
    State(state): State<Arc<AppState>>,
    user: ApiUser,
    Form(form): Form<RaidForm>,
) -> Response {
    run_command(&state, &user.username, "ping", &form, RaidEngine::ping)
}
