use crate::Error;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Declared type of a transport event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Chat,
    Join,
    Leave,
    Typing,
}

/// One event delivered by, or handed to, the transport.
///
/// For `CHAT` events `content` carries the encoded [`crate::EncryptedEnvelope`];
/// presence events only name their `sender`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// RFC 3339 timestamp set by the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ChatEvent {
    pub fn chat(sender: &str, recipient: &str, content: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Chat,
            sender: sender.to_string(),
            recipient: Some(recipient.to_string()),
            content: Some(content),
            timestamp: Some(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }

    /// Presence announcement for `sender`.
    pub fn join(sender: &str) -> Self {
        Self {
            kind: EventKind::Join,
            sender: sender.to_string(),
            recipient: None,
            content: None,
            timestamp: None,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// The other party of this event as seen by `local_user`.
    ///
    /// That is the recipient when `local_user` sent the event and the sender
    /// otherwise.
    pub fn counterpart(&self, local_user: &str) -> Option<&str> {
        if self.sender == local_user {
            self.recipient.as_deref()
        } else {
            Some(self.sender.as_str())
        }
    }

    /// The sender's timestamp, if present and well formed.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|timestamp| timestamp.with_timezone(&Utc))
    }
}
