//! Flat records carried as payload by backend notifications.
//!
//! A backend creates these, copies them into a
//! [`ServiceMessage`](crate::service::ServiceMessage), and from there they are
//! owned by whichever consumer (UI model, message cache) stores them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Returns the current wall-clock time in milliseconds since the UNIX epoch.
#[must_use]
pub fn now_millis() -> i64 {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    i64::try_from(millis).unwrap_or(i64::MAX)
}

/// A chat (direct conversation or group) as listed by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    /// Backend-specific chat identifier.
    pub id: String,
    /// Human readable chat name.
    pub name: String,
    /// Whether the chat has unread messages.
    pub is_unread: bool,
    /// Whether notifications for the chat are muted.
    pub is_muted: bool,
    /// Time of the most recent message, milliseconds since the epoch.
    pub last_message_time: i64,
}

/// A contact known to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Backend-specific user identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether this contact is the logged-in account itself.
    pub is_self: bool,
}

/// A single message within a chat.
///
/// Messages do not carry their chat id; the enclosing notification does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Backend-specific message identifier, unique within its chat.
    pub id: String,
    /// User id of the sender.
    pub sender_id: String,
    /// Message text.
    pub text: String,
    /// Id of the message this one replies to.
    pub quoted_id: Option<String>,
    /// Attached file, if any.
    pub file_path: Option<PathBuf>,
    /// Send time, milliseconds since the epoch.
    pub time_sent: i64,
    /// Whether the logged-in account sent this message.
    pub is_outgoing: bool,
    /// Whether the message has been read.
    pub is_read: bool,
}

impl ChatMessage {
    /// Creates a plain text message with no quote or attachment.
    #[must_use]
    pub fn text(
        id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
        time_sent: i64,
        is_outgoing: bool,
    ) -> Self {
        Self {
            id: id.into(),
            sender_id: sender_id.into(),
            text: text.into(),
            quoted_id: None,
            file_path: None,
            time_sent,
            is_outgoing,
            is_read: is_outgoing,
        }
    }
}
