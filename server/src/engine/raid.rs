use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// In-memory state for a single raid.
///
/// `members[0]` is the leader. `members` and `alts` are disjoint and never
/// hold duplicates; the registry is the only code that mutates them.
#[derive(Debug, Clone)]
pub struct Raid {
    pub uuid: Uuid,
    pub name: String,
    pub members: Vec<String>,
    pub alts: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Raid {
    pub fn new(name: String, leader: String, now: DateTime<Utc>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name,
            members: vec![leader],
            alts: Vec::new(),
            created_at: now,
            last_activity_at: now,
        }
    }

    /// The leader, or `None` once every member has left.
    pub fn leader(&self) -> Option<&str> {
        self.members.first().map(String::as_str)
    }

    pub fn is_member(&self, user: &str) -> bool {
        self.members.iter().any(|m| m == user)
    }

    pub fn is_alt(&self, user: &str) -> bool {
        self.alts.iter().any(|a| a == user)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    pub fn view(&self) -> RaidView {
        RaidView {
            uuid: self.uuid,
            name: self.name.clone(),
            members: self.members.clone(),
            alts: self.alts.clone(),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        }
    }
}

/// Serializable copy of a raid, as served to polling clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaidView {
    pub uuid: Uuid,
    pub name: String,
    pub members: Vec<String>,
    pub alts: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// Members and alts of one raid, leader first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Roster {
    pub members: Vec<String>,
    pub alts: Vec<String>,
}

impl Roster {
    pub fn leader(&self) -> Option<&str> {
        self.members.first().map(String::as_str)
    }

    /// Everyone attached to the raid, members before alts.
    pub fn everyone(&self) -> impl Iterator<Item = &str> {
        self.members
            .iter()
            .chain(self.alts.iter())
            .map(String::as_str)
    }
}
