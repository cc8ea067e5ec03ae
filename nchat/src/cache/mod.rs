//! Message cache: a notification subscriber that persists chat state.
//!
//! The cache sits between the backends and the UI. [`MessageCache::subscribe`]
//! wraps the UI's handler so every notification is first folded into the
//! cache and then forwarded unchanged. Upserts are keyed by
//! `(profile, chat id, message id)`, so replayed notifications (e.g. after a
//! reconnect) never duplicate stored state.
//!
//! Each profile is persisted as one framed postcard snapshot,
//! `<cache_dir>/<profileId>.bin`, written by [`MessageCache::flush`] either
//! periodically from [`MessageCache::spawn_flush_task`] or at shutdown.

mod export;

pub use export::ExportSummary;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use nchat_proto::codec::{self, CodecError};
use nchat_proto::message::{ChatInfo, ChatMessage, ContactInfo};
use nchat_proto::request::RequestMessage;
use nchat_proto::service::{ServiceKind, ServiceMessage};

use crate::protocol::{MessageHandler, Protocol};
use crate::sync::OwnedMutex;

const SNAPSHOT_EXTENSION: &str = "bin";

/// Errors from loading, flushing or exporting the cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem error.
    #[error("cache I/O error on {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A snapshot could not be encoded or decoded.
    #[error("cache snapshot {}: {source}", path.display())]
    Snapshot {
        /// Snapshot file.
        path: PathBuf,
        /// Codec error.
        source: CodecError,
    },

    /// Export serialization failed.
    #[error("export serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Snapshot file of a profile inside `cache_dir`.
#[must_use]
pub fn snapshot_path(cache_dir: &Path, profile_id: &str) -> PathBuf {
    cache_dir.join(format!("{profile_id}.{SNAPSHOT_EXTENSION}"))
}

/// Everything cached for one profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCache {
    /// Chats by id.
    pub chats: BTreeMap<String, ChatInfo>,
    /// Contacts by id.
    pub contacts: BTreeMap<String, ContactInfo>,
    /// Messages by chat id, then message id.
    pub messages: BTreeMap<String, BTreeMap<String, ChatMessage>>,
    /// Chats whose latest history page came from the backend. Messages
    /// cached only from sends do not count.
    pub history_fetched: BTreeSet<String>,
}

impl ProfileCache {
    /// Fold one notification in. Returns whether anything changed.
    fn apply(&mut self, kind: &ServiceKind) -> bool {
        match kind {
            ServiceKind::NewContacts { contacts } => contacts
                .iter()
                .fold(false, |changed, c| upsert(&mut self.contacts, &c.id, c) | changed),
            ServiceKind::NewChats {
                success: true,
                chats,
            } => chats
                .iter()
                .fold(false, |changed, c| upsert(&mut self.chats, &c.id, c) | changed),
            ServiceKind::NewMessages {
                success: true,
                chat_id,
                messages,
                from_msg_id,
            } => {
                let stored = self.messages.entry(chat_id.clone()).or_default();
                let changed = messages
                    .iter()
                    .fold(false, |changed, m| upsert(stored, &m.id, m) | changed);
                let fetched = from_msg_id.is_none() && self.history_fetched.insert(chat_id.clone());
                changed | fetched
            }
            ServiceKind::SendMessage {
                success: true,
                chat_id,
                chat_message,
            } => {
                let stored = self.messages.entry(chat_id.clone()).or_default();
                let mut changed = upsert(stored, &chat_message.id, chat_message);
                if let Some(chat) = self.chats.get_mut(chat_id)
                    && chat.last_message_time < chat_message.time_sent
                {
                    chat.last_message_time = chat_message.time_sent;
                    changed = true;
                }
                changed
            }
            ServiceKind::MarkMessageRead {
                success: true,
                chat_id,
                msg_id,
            } => self
                .messages
                .get_mut(chat_id)
                .and_then(|msgs| msgs.get_mut(msg_id))
                .is_some_and(|m| !std::mem::replace(&mut m.is_read, true)),
            ServiceKind::DeleteMessage {
                success: true,
                chat_id,
                msg_id,
            } => self
                .messages
                .get_mut(chat_id)
                .is_some_and(|msgs| msgs.remove(msg_id).is_some()),
            _ => false,
        }
    }

    /// Messages of a chat, newest first.
    #[must_use]
    pub fn messages_newest_first(&self, chat_id: &str) -> Vec<ChatMessage> {
        let mut msgs: Vec<ChatMessage> = self
            .messages
            .get(chat_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        msgs.sort_by(|a, b| b.time_sent.cmp(&a.time_sent).then_with(|| b.id.cmp(&a.id)));
        msgs
    }

    /// Chats, most recently active first.
    #[must_use]
    pub fn chats_by_recency(&self) -> Vec<ChatInfo> {
        let mut chats: Vec<ChatInfo> = self.chats.values().cloned().collect();
        chats.sort_by(|a, b| {
            b.last_message_time
                .cmp(&a.last_message_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        chats
    }
}

fn upsert<T: Clone + PartialEq>(map: &mut BTreeMap<String, T>, key: &str, value: &T) -> bool {
    if map.get(key) == Some(value) {
        return false;
    }
    map.insert(key.to_string(), value.clone());
    true
}

#[derive(Default)]
struct CacheState {
    profiles: BTreeMap<String, ProfileCache>,
    dirty: BTreeSet<String>,
}

/// Persistent store of chats, contacts and messages for all profiles.
pub struct MessageCache {
    dir: PathBuf,
    state: OwnedMutex<CacheState>,
}

impl MessageCache {
    /// Open the cache directory, creating it if needed, and load every
    /// snapshot in it.
    ///
    /// A snapshot that fails to decode is logged and skipped; its profile
    /// starts empty and is rewritten on the next flush.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the directory cannot be created or read.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(dir).map_err(io_err(dir))?;

        let mut profiles = BTreeMap::new();
        for entry in std::fs::read_dir(dir).map_err(io_err(dir))? {
            let path = entry.map_err(io_err(dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            let Some(profile_id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };
            match load_snapshot(&path) {
                Ok(profile) => {
                    profiles.insert(profile_id, profile);
                }
                Err(e) => tracing::warn!(error = %e, "skipping unreadable cache snapshot"),
            }
        }
        tracing::info!(dir = %dir.display(), profiles = profiles.len(), "message cache opened");

        Ok(Self {
            dir: dir.to_path_buf(),
            state: OwnedMutex::new(CacheState {
                profiles,
                dirty: BTreeSet::new(),
            }),
        })
    }

    /// Fold a notification into the cache. Returns whether anything changed.
    pub fn apply(&self, message: &ServiceMessage) -> bool {
        debug_assert!(!self.state.owns_lock(), "message cache re-entered");
        let mut state = self.state.lock();
        let changed = state
            .profiles
            .entry(message.profile_id.clone())
            .or_default()
            .apply(&message.kind);
        if changed {
            state.dirty.insert(message.profile_id.clone());
        }
        tracing::trace!(
            profile_id = %message.profile_id,
            kind = message.kind.name(),
            changed,
            "cache applied notification"
        );
        changed
    }

    /// Build the handler backends should call: cache first, then `downstream`.
    pub fn subscribe(self: &Arc<Self>, downstream: MessageHandler) -> MessageHandler {
        let cache = Arc::clone(self);
        Arc::new(move |message: ServiceMessage| {
            cache.apply(&message);
            downstream(message);
        })
    }

    /// Cached history of a chat, newest first, at most `limit` messages.
    ///
    /// Until the backend has delivered the chat's latest history, asks
    /// `protocol` for it and returns `None`; the answer arrives later through
    /// the subscribed handler. Messages cached only from our own sends do not
    /// count as history.
    pub fn fetch_messages(
        &self,
        protocol: &dyn Protocol,
        chat_id: &str,
        limit: usize,
    ) -> Option<Vec<ChatMessage>> {
        debug_assert!(!self.state.owns_lock(), "message cache re-entered");
        let profile_id = protocol.profile_id();
        let cached = {
            let state = self.state.lock();
            state
                .profiles
                .get(&profile_id)
                .filter(|p| p.history_fetched.contains(chat_id))
                .map(|p| p.messages_newest_first(chat_id))
        };
        if let Some(cached) = cached {
            return Some(cached.into_iter().take(limit).collect());
        }

        // The lock is released here: a backend may answer synchronously.
        tracing::debug!(profile_id = %profile_id, chat_id, "history not cached, requesting");
        protocol.send_request(RequestMessage::GetMessages {
            chat_id: chat_id.to_string(),
            from_msg_id: None,
            limit,
        });
        None
    }

    /// Cached messages of a chat, newest first.
    #[must_use]
    pub fn messages(&self, profile_id: &str, chat_id: &str) -> Vec<ChatMessage> {
        debug_assert!(!self.state.owns_lock(), "message cache re-entered");
        self.state
            .lock()
            .profiles
            .get(profile_id)
            .map(|p| p.messages_newest_first(chat_id))
            .unwrap_or_default()
    }

    /// Cached chats of a profile, most recently active first.
    #[must_use]
    pub fn chats(&self, profile_id: &str) -> Vec<ChatInfo> {
        debug_assert!(!self.state.owns_lock(), "message cache re-entered");
        self.state
            .lock()
            .profiles
            .get(profile_id)
            .map(ProfileCache::chats_by_recency)
            .unwrap_or_default()
    }

    /// Profiles with cached state.
    #[must_use]
    pub fn profile_ids(&self) -> Vec<String> {
        self.state.lock().profiles.keys().cloned().collect()
    }

    /// Drop everything cached for a profile and delete its snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the snapshot exists but cannot be removed.
    pub fn forget(&self, profile_id: &str) -> Result<(), CacheError> {
        {
            let mut state = self.state.lock();
            state.profiles.remove(profile_id);
            state.dirty.remove(profile_id);
        }
        let path = snapshot_path(&self.dir, profile_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io { path, source: e }),
        }
    }

    /// Write every changed profile to disk. Returns how many were written.
    ///
    /// # Errors
    ///
    /// Returns the first write error; profiles not yet written stay dirty.
    pub fn flush(&self) -> Result<usize, CacheError> {
        let pending: Vec<(String, ProfileCache)> = {
            let mut state = self.state.lock();
            let dirty = std::mem::take(&mut state.dirty);
            dirty
                .into_iter()
                .filter_map(|id| state.profiles.get(&id).cloned().map(|p| (id, p)))
                .collect()
        };

        for (index, (profile_id, profile)) in pending.iter().enumerate() {
            if let Err(e) = self.write_snapshot(profile_id, profile) {
                let mut state = self.state.lock();
                state
                    .dirty
                    .extend(pending[index..].iter().map(|(id, _)| id.clone()));
                return Err(e);
            }
        }
        if !pending.is_empty() {
            tracing::info!(profiles = pending.len(), "message cache flushed");
        }
        Ok(pending.len())
    }

    /// Spawn a background task that flushes changed profiles every
    /// `interval`.
    ///
    /// The task stops when the returned [`tokio::task::JoinHandle`] is
    /// aborted or the runtime shuts down. Write errors are logged and the
    /// affected profiles retried on the next tick.
    pub fn spawn_flush_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tick.tick().await;
                if let Err(e) = cache.flush() {
                    tracing::warn!(error = %e, "periodic cache flush failed");
                }
            }
        })
    }

    /// Copy of a profile's cached state.
    #[must_use]
    pub fn snapshot(&self, profile_id: &str) -> Option<ProfileCache> {
        self.state.lock().profiles.get(profile_id).cloned()
    }

    fn write_snapshot(&self, profile_id: &str, profile: &ProfileCache) -> Result<(), CacheError> {
        let path = snapshot_path(&self.dir, profile_id);
        let bytes = codec::encode_framed(profile).map_err(|source| CacheError::Snapshot {
            path: path.clone(),
            source,
        })?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(io_err(&path))
    }
}

fn load_snapshot(path: &Path) -> Result<ProfileCache, CacheError> {
    let bytes = std::fs::read(path).map_err(io_err(path))?;
    codec::decode_framed(&bytes).map_err(|source| CacheError::Snapshot {
        path: path.to_path_buf(),
        source,
    })
}
