use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::notifier::{ChangeNotifier, WaitOutcome};
use super::outcome::{Notice, Outcome};
use super::registry::{RaidError, RaidRegistry, RegistrySnapshot, Requester};
use crate::slack::SlackNotifier;

/// The caller layer over the registry: runs one registry operation per
/// command, publishes a fresh snapshot on success and builds the messages
/// the chat platform should receive. Transport-agnostic; the REST handlers
/// and the expiry sweeper both call into this.
pub struct RaidEngine {
    registry: RaidRegistry,
    notifier: ChangeNotifier<RegistrySnapshot>,
    admins: HashSet<String>,
    inactivity_ttl: Duration,
}

impl RaidEngine {
    pub fn new(admins: impl IntoIterator<Item = String>, inactivity_ttl: Duration) -> Self {
        let registry = RaidRegistry::new();
        let notifier = ChangeNotifier::new(registry.snapshot());
        Self {
            registry,
            notifier,
            admins: admins.into_iter().collect(),
            inactivity_ttl,
        }
    }

    pub fn registry(&self) -> &RaidRegistry {
        &self.registry
    }

    pub fn notifier(&self) -> &ChangeNotifier<RegistrySnapshot> {
        &self.notifier
    }

    pub fn is_admin(&self, user: &str) -> bool {
        self.admins.contains(user)
    }

    fn requester<'a>(&self, user: &'a str) -> Requester<'a> {
        if self.is_admin(user) {
            Requester::Admin(user)
        } else {
            Requester::User(user)
        }
    }

    /// Push the registry's current contents to long-polling clients. Called
    /// after the registry lock has been released; the snapshot is taken
    /// under the notifier's lock so publishes land in registry order.
    fn publish(&self) {
        let version = self.notifier.publish_with(|| self.registry.snapshot());
        debug!(version, "published raid snapshot");
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Register a new raid with `user` as leader.
    pub fn host(&self, user: &str, channel: &str, raid: &str) -> Result<Outcome, RaidError> {
        let uuid = self.registry.register(channel, raid, user)?;
        self.publish();
        info!(%channel, %raid, %user, %uuid, "raid registered");

        Ok(Outcome::reply(format!("Registered raid {raid} on {channel}"))
            .notify(Notice::channel(
                channel,
                format!("@{user} is hosting a new raid: {raid}"),
            )))
    }

    pub fn join(&self, user: &str, channel: &str, raid: &str) -> Result<Outcome, RaidError> {
        let leader = self.registry.join(channel, raid, user)?;
        self.publish();
        info!(%channel, %raid, %user, "joined raid");

        Ok(Outcome::reply(format!("You joined {raid}"))
            .notify_user(
                Some(leader.as_str()),
                user,
                format!("@{user} joined your raid {raid} on {channel}"),
            )
            .notify(Notice::channel(channel, format!("@{user} joined {raid}"))))
    }

    pub fn join_alt(&self, user: &str, channel: &str, raid: &str) -> Result<Outcome, RaidError> {
        let leader = self.registry.join_alt(channel, raid, user)?;
        self.publish();
        info!(%channel, %raid, %user, "joined raid as alt");

        Ok(Outcome::reply(format!("You joined {raid} as an alt"))
            .notify_user(
                leader.as_deref(),
                user,
                format!("@{user} joined your raid {raid} on {channel} as an alt"),
            )
            .notify(Notice::channel(
                channel,
                format!("@{user} joined {raid} as an alt"),
            )))
    }

    pub fn leave(&self, user: &str, channel: &str, raid: &str) -> Result<Outcome, RaidError> {
        let leader = self.registry.leave(channel, raid, user)?;
        self.publish();
        info!(%channel, %raid, %user, leader = ?leader, "left raid");

        let announcement = match &leader {
            Some(leader) => format!("@{user} left {raid} (led by @{leader})"),
            None => format!("@{user} left {raid}, which now has no leader"),
        };
        Ok(Outcome::reply(format!("You left {raid}"))
            .notify_user(
                leader.as_deref(),
                user,
                format!("@{user} left your raid {raid} on {channel}"),
            )
            .notify(Notice::channel(channel, announcement)))
    }

    pub fn leave_alt(&self, user: &str, channel: &str, raid: &str) -> Result<Outcome, RaidError> {
        let leader = self.registry.leave_alt(channel, raid, user)?;
        self.publish();
        info!(%channel, %raid, %user, "left raid as alt");

        Ok(Outcome::reply(format!("You are no longer an alt for {raid}"))
            .notify_user(
                leader.as_deref(),
                user,
                format!("@{user} is no longer an alt for your raid {raid} on {channel}"),
            )
            .notify(Notice::channel(
                channel,
                format!("@{user} is no longer an alt for {raid}"),
            )))
    }

    /// Leader (or admin) only: message everyone attached to the raid.
    pub fn ping(&self, user: &str, channel: &str, raid: &str) -> Result<Outcome, RaidError> {
        let roster = self.registry.ping(channel, raid, self.requester(user))?;
        self.publish();

        let mut outcome = Outcome::default();
        for raider in roster.everyone().filter(|r| *r != user) {
            outcome = outcome.notify(Notice::direct(
                raider,
                format!("@{user} is pinging you for {raid} on {channel}"),
            ));
        }
        info!(%channel, %raid, %user, pinged = outcome.notices.len(), "pinged raid");
        outcome.reply = format!("Pinged {} raiders of {raid}", outcome.notices.len());
        Ok(outcome)
    }

    /// Leader (or admin) only: delete the raid.
    pub fn finish(&self, user: &str, channel: &str, raid: &str) -> Result<Outcome, RaidError> {
        let requester = self.requester(user);
        let removed = self.registry.finish(channel, raid, requester)?;
        self.publish();
        info!(
            %channel,
            %raid,
            user = requester.id(),
            admin = matches!(requester, Requester::Admin(_)),
            "raid finished"
        );

        let mut outcome = Outcome::reply(format!("Finished {raid}"))
            .notify(Notice::channel(channel, format!("{raid} has finished")));
        for raider in removed.members.iter().chain(removed.alts.iter()) {
            outcome = outcome.notify_user(
                Some(raider.as_str()),
                user,
                format!("{raid} on {channel} has finished"),
            );
        }
        Ok(outcome)
    }

    // ── Expiry ──────────────────────────────────────────────────────

    /// Remove raids idle for longer than the configured TTL. Publishes only
    /// when something was removed.
    pub fn expire(&self, now: DateTime<Utc>) -> Outcome {
        let expired = self.registry.expire(now, self.inactivity_ttl);
        if expired.is_empty() {
            return Outcome::default();
        }
        self.publish();

        let mut outcome = Outcome::reply(format!("Expired {} raids", expired.len()));
        for entry in &expired {
            info!(channel = %entry.channel, raid = %entry.raid.name, "raid expired");
            outcome = outcome.notify(Notice::channel(
                &entry.channel,
                format!("{} expired after a period of inactivity", entry.raid.name),
            ));
        }
        outcome
    }

    // ── Long polling ────────────────────────────────────────────────

    /// Wait until the published version differs from `since`. A client with
    /// no known version gets the current snapshot straight away.
    pub async fn wait_for_change(
        &self,
        since: Option<u64>,
        deadline: Instant,
    ) -> WaitOutcome<RegistrySnapshot> {
        match since {
            Some(known) => self.notifier.await_change(known, deadline).await,
            None => WaitOutcome::Changed(self.notifier.current()),
        }
    }
}

/// Periodically expire idle raids and forward the announcements. Stops when
/// `shutdown` is cancelled.
pub fn spawn_expiry_sweeper(
    engine: Arc<RaidEngine>,
    slack: SlackNotifier,
    every: StdDuration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let outcome = engine.expire(Utc::now());
                    if !outcome.notices.is_empty() {
                        info!(expired = outcome.notices.len(), "expiry sweep removed raids");
                        slack.send_all(outcome.notices);
                    }
                }
            }
        }
        info!("expiry sweeper stopped");
    })
}
