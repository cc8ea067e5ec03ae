//! Deterministic simulated backend.
//!
//! Seeds one contact and one chat per name in [`NAMES`], each chat holding a
//! single incoming message. Requests are answered from that in-memory model
//! on the worker thread, optionally after a fixed simulated latency.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use nchat_proto::feature::ProtocolFeature;
use nchat_proto::message::{ChatInfo, ChatMessage, ContactInfo, now_millis};
use nchat_proto::request::RequestMessage;
use nchat_proto::service::{ServiceKind, ServiceMessage};

use super::worker::{Notifier, RequestHandler, Worker, WorkerState};
use super::{MessageHandler, Protocol, ProtocolError, split_profile_id};
use crate::lock::PathLock;

/// Backend name, also the profile id prefix.
pub const PROTOCOL_NAME: &str = "Dummy";

/// Seeded contact names, one chat each.
pub const NAMES: [&str; 26] = [
    "Alice", "Bob", "Carol", "Dave", "Eve", "Frank", "Grace", "Heidi", "Ivan", "Judy", "Kevin",
    "Laura", "Mallory", "Niaj", "Olivia", "Peggy", "Quentin", "Rupert", "Sybil", "Trent", "Ursula",
    "Victor", "Walter", "Xavier", "Yvonne", "Zoe",
];

/// Gap between the seeded chats' last message times.
const SEED_INTERVAL_MS: i64 = 60_000;

/// File inside the profile directory locked while the profile is loaded.
const PROFILE_LOCK_FILE: &str = "profile.lock";

struct LoadedProfile {
    id: String,
    dir: PathBuf,
    lock: PathLock,
    worker: Arc<Worker>,
}

/// [`Protocol`] implementation backed by an in-memory simulation.
pub struct DummyProtocol {
    latency: Duration,
    features: BTreeSet<ProtocolFeature>,
    profile: Mutex<Option<LoadedProfile>>,
    handler: Mutex<Option<MessageHandler>>,
}

impl DummyProtocol {
    /// Create a dummy backend that answers each request after `latency`.
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            features: BTreeSet::new(),
            profile: Mutex::new(None),
            handler: Mutex::new(None),
        }
    }

    /// Advertise the given features.
    #[must_use]
    pub fn with_features(mut self, features: impl IntoIterator<Item = ProtocolFeature>) -> Self {
        self.features.extend(features);
        self
    }

    /// Directory of the loaded profile, if any.
    #[must_use]
    pub fn profile_dir(&self) -> Option<PathBuf> {
        self.profile.lock().as_ref().map(|p| p.dir.clone())
    }

    fn open(&self, profiles_dir: &Path, profile_id: &str) -> Result<(), ProtocolError> {
        let mut profile = self.profile.lock();
        if let Some(loaded) = profile.as_ref() {
            if loaded.id == profile_id {
                return Ok(());
            }
            return Err(ProtocolError::StillRunning);
        }

        let dir = profiles_dir.join(profile_id);
        if !dir.is_dir() {
            return Err(ProtocolError::ProfileNotFound(profile_id.to_string()));
        }
        let mut lock = PathLock::new(&dir.join(PROFILE_LOCK_FILE))?;
        lock.try_lock()?;

        tracing::info!(profile_id, "dummy profile loaded");
        *profile = Some(LoadedProfile {
            id: profile_id.to_string(),
            dir,
            lock,
            worker: Arc::new(Worker::new(profile_id)),
        });
        Ok(())
    }

    fn worker(&self) -> Option<(String, Arc<Worker>)> {
        self.profile
            .lock()
            .as_ref()
            .map(|p| (p.id.clone(), Arc::clone(&p.worker)))
    }
}

impl Default for DummyProtocol {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl Protocol for DummyProtocol {
    fn profile_id(&self) -> String {
        self.profile
            .lock()
            .as_ref()
            .map_or_else(|| PROTOCOL_NAME.to_string(), |p| p.id.clone())
    }

    fn profile_display_name(&self) -> String {
        let id = self.profile_id();
        split_profile_id(&id).map_or(id.clone(), |(name, discriminator)| {
            format!("{name} #{discriminator}")
        })
    }

    fn has_feature(&self, feature: ProtocolFeature) -> bool {
        self.features.contains(&feature)
    }

    fn setup_profile(&self, profiles_dir: &Path) -> Result<String, ProtocolError> {
        let profile_id = (0u32..)
            .map(|n| format!("{PROTOCOL_NAME}_{n}"))
            .find(|id| !profiles_dir.join(id).exists())
            .ok_or_else(|| ProtocolError::Setup("no free profile slot".to_string()))?;

        std::fs::create_dir_all(profiles_dir.join(&profile_id))?;
        self.open(profiles_dir, &profile_id)?;
        tracing::info!(profile_id = %profile_id, "dummy profile created");
        Ok(profile_id)
    }

    fn load_profile(&self, profiles_dir: &Path, profile_id: &str) -> Result<(), ProtocolError> {
        self.open(profiles_dir, profile_id)
    }

    fn close_profile(&self) -> Result<(), ProtocolError> {
        let mut profile = self.profile.lock();
        if let Some(loaded) = profile.as_mut() {
            if loaded.worker.state() != WorkerState::Stopped {
                return Err(ProtocolError::StillRunning);
            }
            loaded.lock.unlock();
            tracing::info!(profile_id = %loaded.id, "dummy profile closed");
        }
        *profile = None;
        Ok(())
    }

    fn login(&self) -> Result<(), ProtocolError> {
        let handler = self
            .handler
            .lock()
            .clone()
            .ok_or(ProtocolError::NoMessageHandler)?;
        let (profile_id, worker) = self.worker().ok_or(ProtocolError::NoProfile)?;

        let backend = DummyBackend::seeded(&profile_id, self.latency);
        worker.start(backend, Notifier::new(profile_id.clone(), handler))?;

        // Reported from the worker thread once it is pumping its queue.
        let connected = ServiceMessage::new(profile_id, ServiceKind::Connect { success: true });
        worker.send(RequestMessage::DeferNotify(Box::new(connected)))?;
        Ok(())
    }

    fn logout(&self) -> Result<(), ProtocolError> {
        // Clone the worker out first; its thread may call back into `self`.
        if let Some((_, worker)) = self.worker() {
            worker.stop()?;
        }
        Ok(())
    }

    fn send_request(&self, request: RequestMessage) {
        let Some((profile_id, worker)) = self.worker() else {
            tracing::warn!(request = request.name(), "request dropped, no profile loaded");
            return;
        };
        if let Err(e) = worker.send(request) {
            tracing::warn!(profile_id = %profile_id, error = %e, "request dropped");
        }
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        *self.handler.lock() = Some(handler);
    }
}

struct DummyChat {
    info: ChatInfo,
    /// Newest first.
    messages: Vec<ChatMessage>,
}

/// The simulated service, owned by the worker thread.
struct DummyBackend {
    self_id: String,
    latency: Duration,
    chats: Vec<DummyChat>,
}

impl DummyBackend {
    fn seeded(self_id: &str, latency: Duration) -> Self {
        let base = now_millis();
        let chats = NAMES
            .iter()
            .zip(0i64..)
            .map(|(name, index)| {
                let chat_id = format!("{name}_{index}");
                let time = base - index * SEED_INTERVAL_MS;
                let greeting = ChatMessage::text(
                    format!("{chat_id}_0"),
                    chat_id.clone(),
                    format!("Hello from {name}"),
                    time,
                    false,
                );
                DummyChat {
                    info: ChatInfo {
                        id: chat_id,
                        name: (*name).to_string(),
                        is_unread: true,
                        is_muted: false,
                        last_message_time: time,
                    },
                    messages: vec![greeting],
                }
            })
            .collect();

        Self {
            self_id: self_id.to_string(),
            latency,
            chats,
        }
    }

    fn chat_mut(&mut self, chat_id: &str) -> Option<&mut DummyChat> {
        self.chats.iter_mut().find(|c| c.info.id == chat_id)
    }

    fn get_messages(
        &self,
        chat_id: &str,
        from_msg_id: Option<&str>,
        limit: usize,
    ) -> Option<Vec<ChatMessage>> {
        let chat = self.chats.iter().find(|c| c.info.id == chat_id)?;
        let start = match from_msg_id {
            None => 0,
            Some(id) => chat.messages.iter().position(|m| m.id == id)? + 1,
        };
        Some(chat.messages.iter().skip(start).take(limit).cloned().collect())
    }

    fn send_message(
        &mut self,
        chat_id: &str,
        text: String,
        file_path: Option<PathBuf>,
        quoted_id: Option<String>,
    ) -> ChatMessage {
        let now = now_millis();
        let message = ChatMessage {
            id: Uuid::now_v7().to_string(),
            sender_id: self.self_id.clone(),
            text,
            quoted_id,
            file_path,
            time_sent: now,
            is_outgoing: true,
            is_read: true,
        };

        if self.chat_mut(chat_id).is_none() {
            self.chats.push(DummyChat {
                info: ChatInfo {
                    id: chat_id.to_string(),
                    name: chat_id.to_string(),
                    is_unread: false,
                    is_muted: false,
                    last_message_time: now,
                },
                messages: Vec::new(),
            });
        }
        if let Some(chat) = self.chat_mut(chat_id) {
            chat.info.last_message_time = now;
            chat.messages.insert(0, message.clone());
        }
        message
    }
}

impl RequestHandler for DummyBackend {
    fn handle(&mut self, request: RequestMessage, notifier: &Notifier) {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let kind = match request {
            RequestMessage::GetContacts => ServiceKind::NewContacts {
                contacts: self
                    .chats
                    .iter()
                    .map(|c| ContactInfo {
                        id: c.info.id.clone(),
                        name: c.info.name.clone(),
                        is_self: false,
                    })
                    .collect(),
            },
            RequestMessage::GetChats => ServiceKind::NewChats {
                success: true,
                chats: self.chats.iter().map(|c| c.info.clone()).collect(),
            },
            RequestMessage::GetMessages {
                chat_id,
                from_msg_id,
                limit,
            } => {
                let found = self.get_messages(&chat_id, from_msg_id.as_deref(), limit);
                ServiceKind::NewMessages {
                    success: found.is_some(),
                    chat_id,
                    messages: found.unwrap_or_default(),
                    from_msg_id,
                }
            }
            RequestMessage::SendMessage {
                chat_id,
                text,
                file_path,
                quoted_id,
            } => {
                let chat_message = self.send_message(&chat_id, text, file_path, quoted_id);
                ServiceKind::SendMessage {
                    success: true,
                    chat_id,
                    chat_message,
                }
            }
            RequestMessage::MarkMessageRead { chat_id, msg_id } => {
                let success = self
                    .chat_mut(&chat_id)
                    .and_then(|c| c.messages.iter_mut().find(|m| m.id == msg_id))
                    .map(|m| m.is_read = true)
                    .is_some();
                if let Some(chat) = self.chat_mut(&chat_id) {
                    chat.info.is_unread = chat.messages.iter().any(|m| !m.is_read);
                }
                ServiceKind::MarkMessageRead {
                    success,
                    chat_id,
                    msg_id,
                }
            }
            RequestMessage::DeleteMessage { chat_id, msg_id } => {
                let success = self.chat_mut(&chat_id).is_some_and(|c| {
                    let before = c.messages.len();
                    c.messages.retain(|m| m.id != msg_id);
                    c.messages.len() != before
                });
                ServiceKind::DeleteMessage {
                    success,
                    chat_id,
                    msg_id,
                }
            }
            RequestMessage::SendTyping { chat_id, is_typing } => ServiceKind::SendTyping {
                success: true,
                chat_id,
                is_typing,
            },
            RequestMessage::SetStatus { is_online } => ServiceKind::SetStatus {
                success: true,
                is_online,
            },
            // Executed by the worker loop; a handler never owns it.
            RequestMessage::DeferNotify(_) => return,
        };
        notifier.notify(kind);
    }
}
