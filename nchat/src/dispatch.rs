//! Notification dispatcher.
//!
//! Backends call a [`MessageHandler`] from their worker threads. The handler
//! built by [`message_handler`] only pushes onto an unbounded channel; the
//! single [`Dispatcher`] that owns the receiving end applies notifications to
//! the UI model one at a time, in arrival order, and issues the follow-up
//! requests a notification calls for.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::mpsc;

use nchat_proto::feature::ProtocolFeature;
use nchat_proto::request::RequestMessage;
use nchat_proto::service::{ServiceKind, ServiceMessage};

use crate::app::App;
use crate::cache::MessageCache;
use crate::console::{Command, HELP};
use crate::protocol::{MessageHandler, Protocol};

const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Build the handler that forwards notifications to a dispatcher's channel.
///
/// Callable from any thread. If the dispatcher is gone the notification is
/// dropped.
pub fn message_handler(tx: mpsc::UnboundedSender<ServiceMessage>) -> MessageHandler {
    Arc::new(move |message: ServiceMessage| {
        if let Err(mpsc::error::SendError(message)) = tx.send(message) {
            tracing::debug!(
                profile_id = %message.profile_id,
                kind = message.kind.name(),
                "dispatcher gone, notification dropped"
            );
        }
    })
}

/// Single owner of the UI model and the loaded protocols.
pub struct Dispatcher {
    protocols: BTreeMap<String, Arc<dyn Protocol>>,
    app: App,
    cache: Option<Arc<MessageCache>>,
    history_limit: usize,
}

impl Dispatcher {
    /// Create a dispatcher over `app`. `cache` is consulted for history.
    pub fn new(app: App, cache: Option<Arc<MessageCache>>) -> Self {
        Self {
            protocols: BTreeMap::new(),
            app,
            cache,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Number of messages `history` shows and requests when no limit is given.
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Register a loaded protocol under its profile id.
    pub fn add_protocol(&mut self, protocol: Arc<dyn Protocol>) {
        let profile_id = protocol.profile_id();
        self.app.add_profile(&profile_id);
        self.protocols.insert(profile_id, protocol);
    }

    /// Protocol for a profile id.
    #[must_use]
    pub fn protocol(&self, profile_id: &str) -> Option<&Arc<dyn Protocol>> {
        self.protocols.get(profile_id)
    }

    /// All registered protocols, by profile id.
    pub fn protocols(&self) -> impl Iterator<Item = &Arc<dyn Protocol>> {
        self.protocols.values()
    }

    /// The UI model.
    #[must_use]
    pub const fn app(&self) -> &App {
        &self.app
    }

    /// The UI model, mutably.
    pub const fn app_mut(&mut self) -> &mut App {
        &mut self.app
    }

    /// Handle one notification to completion.
    pub fn handle(&mut self, message: ServiceMessage) {
        let Some(protocol) = self.protocols.get(&message.profile_id).cloned() else {
            tracing::warn!(
                profile_id = %message.profile_id,
                kind = message.kind.name(),
                "notification for unknown profile ignored"
            );
            return;
        };
        tracing::debug!(profile_id = %message.profile_id, kind = message.kind.name(), "dispatching");

        if matches!(message.kind, ServiceKind::Connect { success: true })
            && !protocol.has_feature(ProtocolFeature::AutoGetChatsOnLogin)
        {
            protocol.send_request(RequestMessage::GetContacts);
            protocol.send_request(RequestMessage::GetChats);
        }

        self.app.apply(message);
    }

    /// Handle everything already waiting on `rx` without blocking.
    /// Returns the number of notifications handled.
    pub fn drain(&mut self, rx: &mut mpsc::UnboundedReceiver<ServiceMessage>) -> usize {
        let mut handled = 0;
        while let Ok(message) = rx.try_recv() {
            self.handle(message);
            handled += 1;
        }
        handled
    }

    /// Run a console command. `Break` means the user asked to quit.
    pub fn execute(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Quit => return ControlFlow::Break(()),
            Command::Help => {
                for line in HELP.lines() {
                    self.app.push_system_message(line.to_string());
                }
            }
            Command::Profiles => {
                let lines: Vec<String> = self
                    .protocols
                    .iter()
                    .map(|(id, protocol)| {
                        let state = match self.app.profile(id) {
                            Some(view) if view.connected => "connected",
                            _ => "offline",
                        };
                        format!("{id} ({}) {state}", protocol.profile_display_name())
                    })
                    .collect();
                for line in lines {
                    self.app.push_system_message(line);
                }
            }
            Command::Chats { profile_id } => self.list_chats(&profile_id),
            Command::History {
                profile_id,
                chat_id,
                limit,
            } => self.show_history(&profile_id, &chat_id, limit.unwrap_or(self.history_limit)),
            Command::Send {
                profile_id,
                chat_id,
                text,
            } => self.request(&profile_id, RequestMessage::send_text(chat_id, text)),
            Command::Read {
                profile_id,
                chat_id,
                msg_id,
            } => self.request(&profile_id, RequestMessage::MarkMessageRead { chat_id, msg_id }),
            Command::Delete {
                profile_id,
                chat_id,
                msg_id,
            } => self.request(&profile_id, RequestMessage::DeleteMessage { chat_id, msg_id }),
            Command::Typing {
                profile_id,
                chat_id,
                is_typing,
            } => self.request(&profile_id, RequestMessage::SendTyping { chat_id, is_typing }),
            Command::Status {
                profile_id,
                is_online,
            } => self.request(&profile_id, RequestMessage::SetStatus { is_online }),
        }
        ControlFlow::Continue(())
    }

    fn known_protocol(&mut self, profile_id: &str) -> Option<Arc<dyn Protocol>> {
        let protocol = self.protocols.get(profile_id).cloned();
        if protocol.is_none() {
            self.app
                .push_system_message(format!("unknown profile: {profile_id}"));
        }
        protocol
    }

    fn request(&mut self, profile_id: &str, request: RequestMessage) {
        if let Some(protocol) = self.known_protocol(profile_id) {
            tracing::debug!(profile_id, request = request.name(), "console request");
            protocol.send_request(request);
        }
    }

    fn list_chats(&mut self, profile_id: &str) {
        if self.known_protocol(profile_id).is_none() {
            return;
        }
        let mut lines: Vec<String> = self
            .app
            .profile(profile_id)
            .map(|view| {
                view.chats_by_recency()
                    .into_iter()
                    .map(|c| chat_line(&c.id, &c.name, c.is_unread))
                    .collect()
            })
            .unwrap_or_default();
        if lines.is_empty()
            && let Some(cache) = &self.cache
        {
            lines = cache
                .chats(profile_id)
                .iter()
                .map(|c| chat_line(&c.id, &c.name, c.is_unread))
                .collect();
        }
        if lines.is_empty() {
            lines.push(format!("{profile_id}: no chats yet"));
        }
        for line in lines {
            self.app.push_system_message(line);
        }
    }

    fn show_history(&mut self, profile_id: &str, chat_id: &str, limit: usize) {
        let Some(protocol) = self.known_protocol(profile_id) else {
            return;
        };
        let history = match &self.cache {
            Some(cache) => cache.fetch_messages(protocol.as_ref(), chat_id, limit),
            None => {
                let known: Vec<_> = self
                    .app
                    .profile(profile_id)
                    .and_then(|view| view.messages.get(chat_id))
                    .map(|msgs| msgs.iter().take(limit).cloned().collect())
                    .unwrap_or_default();
                if known.is_empty() {
                    protocol.send_request(RequestMessage::GetMessages {
                        chat_id: chat_id.to_string(),
                        from_msg_id: None,
                        limit,
                    });
                    None
                } else {
                    Some(known)
                }
            }
        };

        match history {
            Some(messages) => {
                let lines: Vec<String> = messages
                    .iter()
                    .rev()
                    .map(|m| self.app.format_message(profile_id, m))
                    .collect();
                for line in lines {
                    self.app.push_system_message(line);
                }
            }
            None => self
                .app
                .push_system_message(format!("{profile_id}: fetching history for {chat_id}")),
        }
    }
}

fn chat_line(id: &str, name: &str, is_unread: bool) -> String {
    let marker = if is_unread { " *" } else { "" };
    format!("{id}  {name}{marker}")
}
