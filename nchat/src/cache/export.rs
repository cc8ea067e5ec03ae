//! Export of cached state to plain JSON files.
//!
//! Layout: `<out>/<profileId>/chats.json`, `<out>/<profileId>/contacts.json`
//! and one `<out>/<profileId>/messages/<chatId>.json` per chat with messages
//! oldest first. Ids are percent-escaped so distinct ids never share a file.
//! Works purely on cached state; no backend needs to be running.

use std::fmt::Write as _;
use std::path::Path;

use super::{CacheError, MessageCache, io_err};

const MESSAGES_DIR: &str = "messages";

/// Counts of what an export wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Profiles exported.
    pub profiles: usize,
    /// Chat files written.
    pub chats: usize,
    /// Messages written across all chats.
    pub messages: usize,
}

impl MessageCache {
    /// Write all cached state under `out_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if a directory or file cannot be written.
    pub fn export(&self, out_dir: &Path) -> Result<ExportSummary, CacheError> {
        let mut summary = ExportSummary::default();

        for profile_id in self.profile_ids() {
            let Some(profile) = self.snapshot(&profile_id) else {
                continue;
            };
            let dir = out_dir.join(file_name_for(&profile_id));
            let messages_dir = dir.join(MESSAGES_DIR);
            std::fs::create_dir_all(&messages_dir).map_err(io_err(&messages_dir))?;

            write_json(&dir.join("chats.json"), &profile.chats_by_recency())?;
            let contacts: Vec<_> = profile.contacts.values().collect();
            write_json(&dir.join("contacts.json"), &contacts)?;

            for chat_id in profile.messages.keys() {
                let mut messages = profile.messages_newest_first(chat_id);
                messages.reverse();
                let path = messages_dir.join(format!("{}.json", file_name_for(chat_id)));
                write_json(&path, &messages)?;
                summary.chats += 1;
                summary.messages += messages.len();
            }
            summary.profiles += 1;
        }

        tracing::info!(
            out = %out_dir.display(),
            profiles = summary.profiles,
            chats = summary.chats,
            messages = summary.messages,
            "cache exported"
        );
        Ok(summary)
    }
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CacheError> {
    let json = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, json).map_err(io_err(path))
}

/// Escape an id into a single path component.
///
/// ASCII letters, digits, `-` and `_` pass through; every other byte becomes
/// `%XX`. The mapping is injective.
fn file_name_for(id: &str) -> String {
    let mut name = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            name.push(char::from(byte));
        } else {
            let _ = write!(name, "%{byte:02X}");
        }
    }
    name
}
