use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use super::raid::{Raid, RaidView, Roster};
use super::validation;

/// Why a registry operation was refused. Every variant is recoverable and is
/// reported back to whoever issued the command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RaidError {
    #[error("No raid by that name is registered on this channel")]
    NotFound,
    #[error("A raid by this name is already registered")]
    DuplicateRaid,
    #[error("You are not a member of this raid")]
    NotMember,
    #[error("You are not an alt for this raid")]
    NotAlt,
    #[error("Only the raid leader can do that")]
    WrongUser,
    #[error("{0}")]
    Invalid(String),
}

/// Who is asking for a leader-only operation.
#[derive(Debug, Clone, Copy)]
pub enum Requester<'a> {
    User(&'a str),
    /// Administrative override: bypasses the leader check.
    Admin(&'a str),
}

impl<'a> Requester<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            Requester::User(id) | Requester::Admin(id) => id,
        }
    }

    fn may_lead(&self, raid: &Raid) -> bool {
        match self {
            Requester::Admin(_) => true,
            Requester::User(id) => raid.leader() == Some(id),
        }
    }
}

/// A raid removed by the expiry sweep, with the channel it lived on.
#[derive(Debug, Clone)]
pub struct ExpiredRaid {
    pub channel: String,
    pub raid: Raid,
}

/// Channel-keyed view of every active raid. Channels are sorted by name and
/// raids keep their registration order.
pub type RegistrySnapshot = BTreeMap<String, Vec<RaidView>>;

/// All raid state for all channels.
///
/// Each channel's raid list lives behind a single map entry; every operation
/// holds that entry's lock for its whole duration, so no caller can observe a
/// half-applied change. No operation spans two channels except the expiry
/// sweep and snapshot, which visit channels one at a time.
#[derive(Default)]
pub struct RaidRegistry {
    channels: DashMap<String, Vec<Raid>>,
}

impl RaidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against one raid under the channel lock.
    fn with_raid<T>(
        &self,
        channel: &str,
        name: &str,
        f: impl FnOnce(&mut Raid) -> Result<T, RaidError>,
    ) -> Result<T, RaidError> {
        let mut raids = self.channels.get_mut(channel).ok_or(RaidError::NotFound)?;
        let raid = raids
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or(RaidError::NotFound)?;
        f(raid)
    }

    /// Register a new raid led by `leader`. Returns the raid's UUID.
    pub fn register(&self, channel: &str, name: &str, leader: &str) -> Result<Uuid, RaidError> {
        validation::validate_channel(channel).map_err(RaidError::Invalid)?;
        validation::validate_raid_name(name).map_err(RaidError::Invalid)?;
        validation::validate_user_id(leader).map_err(RaidError::Invalid)?;

        let mut raids = self.channels.entry(channel.to_string()).or_default();
        if raids.iter().any(|r| r.name == name) {
            return Err(RaidError::DuplicateRaid);
        }

        let raid = Raid::new(name.to_string(), leader.to_string(), Utc::now());
        let uuid = raid.uuid;
        raids.push(raid);
        Ok(uuid)
    }

    /// Members (leader first) and alts of a raid.
    pub fn list_members(&self, channel: &str, name: &str) -> Result<Roster, RaidError> {
        let raids = self.channels.get(channel).ok_or(RaidError::NotFound)?;
        let raid = raids
            .iter()
            .find(|r| r.name == name)
            .ok_or(RaidError::NotFound)?;
        Ok(Roster {
            members: raid.members.clone(),
            alts: raid.alts.clone(),
        })
    }

    /// Join as a member. Re-joining is a no-op; an alt is promoted out of the
    /// alt list. Returns the leader, which is the joiner on a leaderless raid.
    pub fn join(&self, channel: &str, name: &str, user: &str) -> Result<String, RaidError> {
        validation::validate_user_id(user).map_err(RaidError::Invalid)?;
        self.with_raid(channel, name, |raid| {
            if !raid.is_member(user) {
                raid.alts.retain(|a| a != user);
                raid.members.push(user.to_string());
            }
            raid.touch(Utc::now());
            Ok(raid.leader().unwrap_or(user).to_string())
        })
    }

    /// Join as an alt. A no-op for anyone already listed as member or alt.
    /// Returns the leader, if the raid still has one.
    pub fn join_alt(
        &self,
        channel: &str,
        name: &str,
        user: &str,
    ) -> Result<Option<String>, RaidError> {
        validation::validate_user_id(user).map_err(RaidError::Invalid)?;
        self.with_raid(channel, name, |raid| {
            if !raid.is_member(user) && !raid.is_alt(user) {
                raid.alts.push(user.to_string());
            }
            raid.touch(Utc::now());
            Ok(raid.leader().map(str::to_string))
        })
    }

    /// Remove a member, keeping the order of the rest. The leader is not
    /// protected here; removing them hands the lead to the next member.
    pub fn leave(
        &self,
        channel: &str,
        name: &str,
        user: &str,
    ) -> Result<Option<String>, RaidError> {
        self.with_raid(channel, name, |raid| {
            let idx = raid
                .members
                .iter()
                .position(|m| m == user)
                .ok_or(RaidError::NotMember)?;
            raid.members.remove(idx);
            raid.touch(Utc::now());
            Ok(raid.leader().map(str::to_string))
        })
    }

    /// Remove an alt, keeping the order of the rest.
    pub fn leave_alt(
        &self,
        channel: &str,
        name: &str,
        user: &str,
    ) -> Result<Option<String>, RaidError> {
        self.with_raid(channel, name, |raid| {
            let idx = raid
                .alts
                .iter()
                .position(|a| a == user)
                .ok_or(RaidError::NotAlt)?;
            raid.alts.remove(idx);
            raid.touch(Utc::now());
            Ok(raid.leader().map(str::to_string))
        })
    }

    /// Leader-only: the full roster to notify. Counts as activity.
    pub fn ping(
        &self,
        channel: &str,
        name: &str,
        requester: Requester<'_>,
    ) -> Result<Roster, RaidError> {
        self.with_raid(channel, name, |raid| {
            if !requester.may_lead(raid) {
                return Err(RaidError::WrongUser);
            }
            raid.touch(Utc::now());
            Ok(Roster {
                members: raid.members.clone(),
                alts: raid.alts.clone(),
            })
        })
    }

    /// Delete a raid. Only its leader (or an admin) may do this. Returns the
    /// removed raid so the caller can tell its members.
    pub fn finish(
        &self,
        channel: &str,
        name: &str,
        requester: Requester<'_>,
    ) -> Result<Raid, RaidError> {
        let removed = {
            let mut raids = self.channels.get_mut(channel).ok_or(RaidError::NotFound)?;
            let idx = raids
                .iter()
                .position(|r| r.name == name)
                .ok_or(RaidError::NotFound)?;
            if !requester.may_lead(&raids[idx]) {
                return Err(RaidError::WrongUser);
            }
            raids.remove(idx)
        };
        self.channels.remove_if(channel, |_, raids| raids.is_empty());
        Ok(removed)
    }

    /// Remove every raid idle for longer than `ttl` as of `now`.
    pub fn expire(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<ExpiredRaid> {
        let mut expired = Vec::new();
        self.channels.retain(|channel, raids| {
            let (keep, gone): (Vec<Raid>, Vec<Raid>) = std::mem::take(raids)
                .into_iter()
                .partition(|r| now.signed_duration_since(r.last_activity_at) <= ttl);
            *raids = keep;
            expired.extend(gone.into_iter().map(|raid| ExpiredRaid {
                channel: channel.clone(),
                raid,
            }));
            !raids.is_empty()
        });
        expired
    }

    /// Copy of every active raid, for publishing to polling clients.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.channels
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().iter().map(Raid::view).collect(),
                )
            })
            .collect()
    }

    pub fn raid_count(&self) -> usize {
        self.channels.iter().map(|entry| entry.value().len()).sum()
    }

    #[cfg(test)]
    fn set_last_activity(&self, channel: &str, name: &str, at: DateTime<Utc>) {
        let mut raids = self.channels.get_mut(channel).unwrap();
        let raid = raids.iter_mut().find(|r| r.name == name).unwrap();
        raid.last_activity_at = at;
    }
}
