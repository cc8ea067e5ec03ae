//! Capability flags a backend may advertise.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Optional backend behaviors the dispatcher can query.
///
/// This is a small closed set, not a plugin registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtocolFeature {
    /// The backend fetches the chat list by itself right after login, so
    /// the dispatcher must not request it again.
    AutoGetChatsOnLogin,
    /// The backend expires typing indicators itself.
    TypingTimeout,
}

impl fmt::Display for ProtocolFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AutoGetChatsOnLogin => write!(f, "auto-get-chats-on-login"),
            Self::TypingTimeout => write!(f, "typing-timeout"),
        }
    }
}
