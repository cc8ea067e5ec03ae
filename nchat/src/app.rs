//! Consumer-side state built from backend notifications.
//!
//! [`App`] keeps one [`ProfileView`] per loaded profile and a queue of
//! user-visible system lines. It is only ever touched by the dispatcher, so
//! it needs no locking.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use chrono::{Local, LocalResult, TimeZone};

use nchat_proto::message::{ChatInfo, ChatMessage, ContactInfo};
use nchat_proto::service::{ServiceKind, ServiceMessage};

/// Everything the UI knows about one profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileView {
    /// Whether the backend reported a successful connection.
    pub connected: bool,
    /// Our own online status as last confirmed by the backend.
    pub online: bool,
    /// Chats by id.
    pub chats: HashMap<String, ChatInfo>,
    /// Contacts by id.
    pub contacts: HashMap<String, ContactInfo>,
    /// Messages by chat id, newest first.
    pub messages: HashMap<String, Vec<ChatMessage>>,
    /// Users currently typing, by chat id.
    pub typing: HashMap<String, BTreeSet<String>>,
    /// Last known online status of other users.
    pub user_online: HashMap<String, bool>,
}

impl ProfileView {
    /// Chats, most recently active first.
    #[must_use]
    pub fn chats_by_recency(&self) -> Vec<&ChatInfo> {
        let mut chats: Vec<&ChatInfo> = self.chats.values().collect();
        chats.sort_by(|a, b| {
            b.last_message_time
                .cmp(&a.last_message_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        chats
    }

    /// Insert or replace a message, keeping newest-first order.
    /// Returns `true` if the message was not known before.
    fn upsert_message(&mut self, chat_id: &str, message: &ChatMessage) -> bool {
        let messages = self.messages.entry(chat_id.to_string()).or_default();
        if let Some(existing) = messages.iter_mut().find(|m| m.id == message.id) {
            *existing = message.clone();
            return false;
        }
        let at = messages
            .iter()
            .position(|m| m.time_sent < message.time_sent)
            .unwrap_or(messages.len());
        messages.insert(at, message.clone());
        if let Some(chat) = self.chats.get_mut(chat_id)
            && chat.last_message_time < message.time_sent
        {
            chat.last_message_time = message.time_sent;
        }
        true
    }

    fn chat_name<'a>(&'a self, chat_id: &'a str) -> &'a str {
        self.chats.get(chat_id).map_or(chat_id, |c| c.name.as_str())
    }

    fn sender_name<'a>(&'a self, message: &'a ChatMessage) -> &'a str {
        if message.is_outgoing {
            return "You";
        }
        self.contacts
            .get(&message.sender_id)
            .map_or(message.sender_id.as_str(), |c| c.name.as_str())
    }
}

/// Main consumer state.
pub struct App {
    profiles: BTreeMap<String, ProfileView>,
    system_messages: VecDeque<String>,
    timestamp_format: String,
}

impl App {
    /// Create an empty model. `timestamp_format` is a chrono format string.
    pub fn new(timestamp_format: impl Into<String>) -> Self {
        Self {
            profiles: BTreeMap::new(),
            system_messages: VecDeque::new(),
            timestamp_format: timestamp_format.into(),
        }
    }

    /// Start tracking a profile.
    pub fn add_profile(&mut self, profile_id: &str) {
        self.profiles.entry(profile_id.to_string()).or_default();
    }

    /// View of one profile.
    #[must_use]
    pub fn profile(&self, profile_id: &str) -> Option<&ProfileView> {
        self.profiles.get(profile_id)
    }

    /// Queue a line for the user.
    pub fn push_system_message(&mut self, line: String) {
        self.system_messages.push_back(line);
    }

    /// Take all queued lines.
    pub fn drain_system_messages(&mut self) -> Vec<String> {
        self.system_messages.drain(..).collect()
    }

    /// Render a message as `[time] sender: text`.
    #[must_use]
    pub fn format_message(&self, profile_id: &str, message: &ChatMessage) -> String {
        match self.profiles.get(profile_id) {
            Some(view) => render_line(view, message, &self.timestamp_format),
            None => render_line(&ProfileView::default(), message, &self.timestamp_format),
        }
    }

    /// Apply one notification. Returns `false` if its profile is unknown.
    #[allow(clippy::too_many_lines)]
    pub fn apply(&mut self, message: ServiceMessage) -> bool {
        let ServiceMessage { profile_id, kind } = message;
        let Some(view) = self.profiles.get_mut(&profile_id) else {
            tracing::warn!(profile_id = %profile_id, kind = kind.name(), "notification for unknown profile");
            return false;
        };

        let mut lines = Vec::new();
        match kind {
            ServiceKind::Connect { success } => {
                view.connected = success;
                if success {
                    view.online = true;
                    lines.push(format!("{profile_id}: connected"));
                } else {
                    lines.push(format!("{profile_id}: connection failed"));
                }
            }
            ServiceKind::NewContacts { contacts } => {
                for contact in contacts {
                    view.contacts.insert(contact.id.clone(), contact);
                }
            }
            ServiceKind::NewChats { success, chats } => {
                if success {
                    let count = chats.len();
                    for chat in chats {
                        view.chats.insert(chat.id.clone(), chat);
                    }
                    lines.push(format!("{profile_id}: {count} chats"));
                } else {
                    lines.push(format!("{profile_id}: failed to fetch chats"));
                }
            }
            ServiceKind::NewMessages {
                success,
                chat_id,
                messages,
                ..
            } => {
                if success {
                    let mut fresh = Vec::new();
                    for m in &messages {
                        if view.upsert_message(&chat_id, m) {
                            fresh.push(m);
                        }
                    }
                    let chat = view.chat_name(&chat_id).to_string();
                    for m in fresh.into_iter().rev() {
                        lines.push(format!("{profile_id}/{chat} {}", render_line(view, m, &self.timestamp_format)));
                    }
                } else {
                    lines.push(format!("{profile_id}: failed to fetch messages for {chat_id}"));
                }
            }
            ServiceKind::SendMessage {
                success,
                chat_id,
                chat_message,
            } => {
                if success {
                    view.upsert_message(&chat_id, &chat_message);
                    let chat = view.chat_name(&chat_id).to_string();
                    lines.push(format!(
                        "{profile_id}/{chat} {}",
                        render_line(view, &chat_message, &self.timestamp_format)
                    ));
                } else {
                    lines.push(format!("{profile_id}: failed to send message to {chat_id}"));
                }
            }
            ServiceKind::MarkMessageRead {
                success,
                chat_id,
                msg_id,
            } => {
                if success {
                    if let Some(m) = view
                        .messages
                        .get_mut(&chat_id)
                        .and_then(|msgs| msgs.iter_mut().find(|m| m.id == msg_id))
                    {
                        m.is_read = true;
                    }
                    if let Some(chat) = view.chats.get_mut(&chat_id) {
                        chat.is_unread = view
                            .messages
                            .get(&chat_id)
                            .is_some_and(|msgs| msgs.iter().any(|m| !m.is_read));
                    }
                } else {
                    lines.push(format!("{profile_id}: failed to mark {msg_id} read"));
                }
            }
            ServiceKind::DeleteMessage {
                success,
                chat_id,
                msg_id,
            } => {
                if success {
                    if let Some(msgs) = view.messages.get_mut(&chat_id) {
                        msgs.retain(|m| m.id != msg_id);
                    }
                    lines.push(format!("{profile_id}: deleted {msg_id}"));
                } else {
                    lines.push(format!("{profile_id}: failed to delete {msg_id}"));
                }
            }
            ServiceKind::SetStatus { success, is_online } => {
                if success {
                    view.online = is_online;
                } else {
                    lines.push(format!("{profile_id}: failed to set status"));
                }
            }
            ServiceKind::SendTyping { success: false, chat_id, .. } => {
                lines.push(format!("{profile_id}: failed to send typing to {chat_id}"));
            }
            ServiceKind::ReceiveTyping {
                chat_id,
                user_id,
                is_typing,
            } => {
                let users = view.typing.entry(chat_id).or_default();
                if is_typing {
                    users.insert(user_id);
                } else {
                    users.remove(&user_id);
                }
            }
            ServiceKind::ReceiveStatus { user_id, is_online } => {
                view.user_online.insert(user_id, is_online);
            }
            other => {
                tracing::debug!(profile_id = %profile_id, kind = other.name(), "notification not handled by ui");
            }
        }

        self.system_messages.extend(lines);
        true
    }
}

fn render_line(view: &ProfileView, message: &ChatMessage, timestamp_format: &str) -> String {
    let time = match Local.timestamp_millis_opt(message.time_sent) {
        LocalResult::Single(dt) => dt.format(timestamp_format).to_string(),
        _ => "??:??".to_string(),
    };
    let attachment = message
        .file_path
        .as_ref()
        .map(|p| format!(" [file: {}]", p.display()))
        .unwrap_or_default();
    format!(
        "[{time}] {}: {}{attachment}",
        view.sender_name(message),
        message.text
    )
}
