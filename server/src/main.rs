use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use raidbot_server::config::ServerConfig;
use raidbot_server::engine::raid_engine::{RaidEngine, spawn_expiry_sweeper};
use raidbot_server::slack::SlackNotifier;
use raidbot_server::web::app_state::AppState;
use raidbot_server::web::router::build_router;

#[derive(Parser)]
#[command(name = "raidbot-server", about = "Channel-scoped raid coordination server")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "raidbot.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig::load(&args.config)?;

    // Raid state is volatile: every start begins with an empty registry.
    let engine = Arc::new(RaidEngine::new(
        config.raids.admin_users.clone(),
        config.inactivity_ttl(),
    ));

    let (slack, slack_task) = SlackNotifier::spawn(config.slack.webhook_url.clone());

    let shutdown = CancellationToken::new();
    let sweeper = spawn_expiry_sweeper(
        engine.clone(),
        slack.clone(),
        config.sweep_interval(),
        shutdown.clone(),
    );

    let app_state = Arc::new(AppState {
        engine,
        slack,
        auth_config: config.to_auth_config(),
        slash_command: config.slack.slash_command.clone(),
        login_redirect: config.server.login_redirect.clone(),
        long_poll_timeout: config.long_poll_timeout(),
    });

    let app = build_router(app_state, &config.server.static_dir);

    let web_addr = &config.server.web_address;
    info!(
        %web_addr,
        ttl_minutes = config.raids.inactivity_ttl_minutes,
        sweep_secs = config.raids.sweep_interval_secs,
        "Raidbot server starting"
    );

    let listener = tokio::net::TcpListener::bind(web_addr)
        .await
        .with_context(|| format!("failed to bind web listener on {web_addr}"))?;

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
            signal.cancel();
        })
        .await
        .context("server error")?;

    shutdown.cancel();
    sweeper.await.context("expiry sweeper panicked")?;
    // Give queued chat notices a moment to go out.
    if tokio::time::timeout(Duration::from_secs(5), slack_task).await.is_err() {
        warn!("gave up waiting for queued chat notices");
    }
    Ok(())
}
