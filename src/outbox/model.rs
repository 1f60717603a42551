//! Records kept in the outbox

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, ErrorKind, HushchatError};

/// Delivery state of an outbound message.
///
/// Legal transitions, as reported by [`DeliveryStatus::can_transition_to`]:
///
/// ```text
/// sending -> sent | failed | given_up
/// failed  -> sending | given_up
/// ```
///
/// `sent` and `given_up` are terminal. The store itself records whatever
/// status the sender asks for; enforcing the graph is the sender's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Failed,
    /// The sender stopped retrying, e.g. after hitting its attempt limit.
    GivenUp,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::GivenUp => "given_up",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::GivenUp)
    }

    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::{Failed, GivenUp, Sending, Sent};
        matches!(
            (self, next),
            (Sending, Sent) | (Sending, Failed) | (Sending, GivenUp) | (Failed, Sending) | (Failed, GivenUp)
        )
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = HushchatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "given_up" => Ok(Self::GivenUp),
            other => Err(HushchatError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidStatus,
                format!(
                    "unknown delivery status {:?} (expected sending, sent, failed or given_up)",
                    other
                ),
            )),
        }
    }
}

/// A file or media item referenced by a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub kind: String,
    pub filename: String,
    pub url: String,
}

/// A message the user committed to send that has not been acknowledged yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMessage {
    /// Caller-assigned, globally unique; doubles as the idempotency key.
    pub id: String,
    pub channel: String,
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl PendingMessage {
    /// A fresh message stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        channel: impl Into<String>,
        sender: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            channel: channel.into(),
            sender: sender.into(),
            text: text.into(),
            timestamp: Utc::now(),
            status: DeliveryStatus::Sending,
            retry_count: 0,
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}
