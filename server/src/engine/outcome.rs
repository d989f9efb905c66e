use serde::{Deserialize, Serialize};

/// A message for the chat platform, produced after a successful command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    /// Announcement posted to a channel.
    Channel { channel: String, text: String },
    /// Direct message to one user.
    Direct { user: String, text: String },
}

impl Notice {
    pub fn channel(channel: &str, text: impl Into<String>) -> Self {
        Notice::Channel {
            channel: channel.to_string(),
            text: text.into(),
        }
    }

    pub fn direct(user: &str, text: impl Into<String>) -> Self {
        Notice::Direct {
            user: user.to_string(),
            text: text.into(),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Notice::Channel { text, .. } | Notice::Direct { text, .. } => text,
        }
    }
}

/// What a command produced: the reply for whoever issued it, and the
/// notices to forward once the registry call has returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub reply: String,
    pub notices: Vec<Notice>,
}

impl Outcome {
    pub fn reply(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            notices: Vec::new(),
        }
    }

    pub fn notify(mut self, notice: Notice) -> Self {
        self.notices.push(notice);
        self
    }

    /// Direct-message `user` unless they are the one who acted.
    pub fn notify_user(self, user: Option<&str>, actor: &str, text: impl Into<String>) -> Self {
        match user {
            Some(user) if user != actor => self.notify(Notice::direct(user, text)),
            _ => self,
        }
    }
}
