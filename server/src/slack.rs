use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::outcome::Notice;

/// Maximum queued outbound notices (a stalled webhook must not grow memory).
pub const MAX_QUEUED_NOTICES: usize = 256;

/// Body of a Slack incoming-webhook post.
#[derive(Debug, Serialize, PartialEq, Eq)]
struct WebhookPayload<'a> {
    channel: String,
    text: &'a str,
}

impl<'a> WebhookPayload<'a> {
    fn from_notice(notice: &'a Notice) -> Self {
        match notice {
            Notice::Channel { channel, text } => Self {
                channel: if channel.starts_with('#') {
                    channel.clone()
                } else {
                    format!("#{channel}")
                },
                text,
            },
            Notice::Direct { user, text } => Self {
                channel: format!("@{user}"),
                text,
            },
        }
    }
}

/// Handle for forwarding notices to the chat platform. Delivery happens on a
/// background task so request handlers never wait on the webhook.
#[derive(Clone)]
pub struct SlackNotifier {
    outbound: mpsc::Sender<Notice>,
}

impl SlackNotifier {
    /// Start the delivery task. Without a webhook URL notices are only logged.
    pub fn spawn(webhook_url: Option<String>) -> (Self, JoinHandle<()>) {
        let (outbound, rx) = mpsc::channel(MAX_QUEUED_NOTICES);
        let handle = tokio::spawn(deliver(rx, webhook_url));
        (Self { outbound }, handle)
    }

    /// A notifier whose queue the caller drains itself.
    pub fn detached(capacity: usize) -> (Self, mpsc::Receiver<Notice>) {
        let (outbound, rx) = mpsc::channel(capacity);
        (Self { outbound }, rx)
    }

    /// Queue a notice. Returns false if the queue is full or closed; the
    /// notice is dropped rather than blocking the caller.
    pub fn send(&self, notice: Notice) -> bool {
        self.outbound.try_send(notice).is_ok()
    }

    pub fn send_all(&self, notices: Vec<Notice>) {
        for notice in notices {
            if !self.send(notice) {
                warn!("dropped chat notice (queue full or closed)");
            }
        }
    }
}

async fn deliver(mut rx: mpsc::Receiver<Notice>, webhook_url: Option<String>) {
    let client = reqwest::Client::new();

    while let Some(notice) = rx.recv().await {
        let payload = WebhookPayload::from_notice(&notice);
        let Some(url) = &webhook_url else {
            info!(to = %payload.channel, text = %payload.text, "chat notice");
            continue;
        };

        let result = client
            .post(url)
            .json(&payload)
            .send()
            .await
            .and_then(|resp| resp.error_for_status());
        if let Err(e) = result {
            warn!(to = %payload.channel, error = %e, "failed to deliver chat notice");
        }
    }
}
