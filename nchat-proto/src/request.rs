//! Requests sent from the UI (or the message cache) to a backend.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::service::ServiceMessage;

/// An operation to perform against a backend.
///
/// Immutable once constructed. After it is handed to a protocol's
/// `send_request`, only the worker thread that dequeues it touches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestMessage {
    /// Fetch the contact list.
    GetContacts,
    /// Fetch the chat list.
    GetChats,
    /// Fetch messages of a chat, newest first, older than `from_msg_id` when set.
    GetMessages {
        /// Chat to read.
        chat_id: String,
        /// Only return messages older than this one.
        from_msg_id: Option<String>,
        /// Maximum number of messages to return.
        limit: usize,
    },
    /// Send a message to a chat.
    SendMessage {
        /// Destination chat.
        chat_id: String,
        /// Message text.
        text: String,
        /// File to attach.
        file_path: Option<PathBuf>,
        /// Message being replied to.
        quoted_id: Option<String>,
    },
    /// Mark a message as read.
    MarkMessageRead {
        /// Chat containing the message.
        chat_id: String,
        /// Message to mark.
        msg_id: String,
    },
    /// Delete a message.
    DeleteMessage {
        /// Chat containing the message.
        chat_id: String,
        /// Message to delete.
        msg_id: String,
    },
    /// Start or stop the local typing indicator in a chat.
    SendTyping {
        /// Chat the indicator applies to.
        chat_id: String,
        /// Whether the user is typing.
        is_typing: bool,
    },
    /// Set the account's online status.
    SetStatus {
        /// Online when true, away/offline otherwise.
        is_online: bool,
    },
    /// Deliver a pre-built notification from the worker thread.
    ///
    /// Lets a backend emit a notification after its own initialization
    /// without calling the message handler from inside `login`.
    DeferNotify(Box<ServiceMessage>),
}

impl RequestMessage {
    /// Short name of the variant, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GetContacts => "GetContacts",
            Self::GetChats => "GetChats",
            Self::GetMessages { .. } => "GetMessages",
            Self::SendMessage { .. } => "SendMessage",
            Self::MarkMessageRead { .. } => "MarkMessageRead",
            Self::DeleteMessage { .. } => "DeleteMessage",
            Self::SendTyping { .. } => "SendTyping",
            Self::SetStatus { .. } => "SetStatus",
            Self::DeferNotify(_) => "DeferNotify",
        }
    }

    /// Whether the backend must answer this request with exactly one
    /// notification.
    #[must_use]
    pub const fn expects_reply(&self) -> bool {
        !matches!(self, Self::DeferNotify(_))
    }

    /// Convenience constructor for a plain text [`RequestMessage::SendMessage`].
    #[must_use]
    pub fn send_text(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::SendMessage {
            chat_id: chat_id.into(),
            text: text.into(),
            file_path: None,
            quoted_id: None,
        }
    }
}
