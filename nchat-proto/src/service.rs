//! Notifications sent from a backend back to the UI and message cache.

use serde::{Deserialize, Serialize};

use crate::message::{ChatInfo, ChatMessage, ContactInfo};

/// Something that happened in a backend.
///
/// Read-only once handed to the message handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMessage {
    /// Profile of the backend instance that produced this notification.
    pub profile_id: String,
    /// What happened.
    pub kind: ServiceKind,
}

impl ServiceMessage {
    /// Creates a notification for the given profile.
    #[must_use]
    pub fn new(profile_id: impl Into<String>, kind: ServiceKind) -> Self {
        Self {
            profile_id: profile_id.into(),
            kind,
        }
    }
}

/// Payload of a [`ServiceMessage`].
///
/// Result variants carry a `success` flag plus enough of the request to
/// tell which request they answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceKind {
    /// Backend connection established (or failed).
    Connect {
        /// Whether the connection succeeded.
        success: bool,
    },
    /// Contacts added or updated.
    NewContacts {
        /// The contacts.
        contacts: Vec<ContactInfo>,
    },
    /// Chats added or updated.
    NewChats {
        /// Whether the chat list could be fetched.
        success: bool,
        /// The chats.
        chats: Vec<ChatInfo>,
    },
    /// Messages received or fetched for a chat.
    NewMessages {
        /// Whether the fetch succeeded.
        success: bool,
        /// Chat the messages belong to.
        chat_id: String,
        /// The messages, newest first.
        messages: Vec<ChatMessage>,
        /// The `from_msg_id` of the request this answers, if any.
        from_msg_id: Option<String>,
    },
    /// Outcome of a send request.
    SendMessage {
        /// Whether the message was sent.
        success: bool,
        /// Destination chat.
        chat_id: String,
        /// The message as the backend recorded it.
        chat_message: ChatMessage,
    },
    /// Outcome of a mark-read request.
    MarkMessageRead {
        /// Whether the message was marked.
        success: bool,
        /// Chat containing the message.
        chat_id: String,
        /// The message.
        msg_id: String,
    },
    /// Outcome of a delete request.
    DeleteMessage {
        /// Whether the message was deleted.
        success: bool,
        /// Chat containing the message.
        chat_id: String,
        /// The message.
        msg_id: String,
    },
    /// Outcome of a typing indicator request.
    SendTyping {
        /// Whether the indicator was sent.
        success: bool,
        /// Chat the indicator applies to.
        chat_id: String,
        /// Requested typing state.
        is_typing: bool,
    },
    /// Outcome of a status request.
    SetStatus {
        /// Whether the status was set.
        success: bool,
        /// Requested status.
        is_online: bool,
    },
    /// A remote user started or stopped typing.
    ReceiveTyping {
        /// Chat where the user is typing.
        chat_id: String,
        /// The typing user.
        user_id: String,
        /// Whether the user is typing.
        is_typing: bool,
    },
    /// A remote user's online status changed.
    ReceiveStatus {
        /// The user.
        user_id: String,
        /// Whether the user is online.
        is_online: bool,
    },
}

impl ServiceKind {
    /// Short name of the variant, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "Connect",
            Self::NewContacts { .. } => "NewContacts",
            Self::NewChats { .. } => "NewChats",
            Self::NewMessages { .. } => "NewMessages",
            Self::SendMessage { .. } => "SendMessage",
            Self::MarkMessageRead { .. } => "MarkMessageRead",
            Self::DeleteMessage { .. } => "DeleteMessage",
            Self::SendTyping { .. } => "SendTyping",
            Self::SetStatus { .. } => "SetStatus",
            Self::ReceiveTyping { .. } => "ReceiveTyping",
            Self::ReceiveStatus { .. } => "ReceiveStatus",
        }
    }

    /// The `success` flag of result variants; `None` for unsolicited events.
    #[must_use]
    pub const fn success(&self) -> Option<bool> {
        match self {
            Self::Connect { success }
            | Self::NewChats { success, .. }
            | Self::NewMessages { success, .. }
            | Self::SendMessage { success, .. }
            | Self::MarkMessageRead { success, .. }
            | Self::DeleteMessage { success, .. }
            | Self::SendTyping { success, .. }
            | Self::SetStatus { success, .. } => Some(*success),
            Self::NewContacts { .. } | Self::ReceiveTyping { .. } | Self::ReceiveStatus { .. } => {
                None
            }
        }
    }
}
