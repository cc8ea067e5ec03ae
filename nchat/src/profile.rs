//! On-disk layout of the application directory.
//!
//! ```text
//! <confdir>/
//!   app.toml
//!   log.txt
//!   cache/<profileId>.bin
//!   profiles/version
//!   profiles/<protocolName>_<discriminator>/
//! ```

use std::path::{Path, PathBuf};

use crate::protocol::split_profile_id;

/// Profiles-root layout version written by this build.
pub const PROFILES_VERSION: u32 = 1;

const PROFILES_DIR: &str = "profiles";
const CACHE_DIR: &str = "cache";
const VERSION_FILE: &str = "version";
const LOG_FILE: &str = "log.txt";

/// Errors touching the application directory.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// The profiles root was written by an incompatible nchat version.
    #[error("profiles directory has version {found}, this build supports {expected}")]
    IncompatibleVersion {
        /// Version found on disk.
        found: String,
        /// Version this build writes.
        expected: u32,
    },

    /// The named profile does not exist.
    #[error("profile {0} not found")]
    NotFound(String),

    /// The name is not of the form `<protocol>_<discriminator>`.
    #[error("invalid profile id {0:?}")]
    InvalidId(String),

    /// Filesystem error.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ProfileError + '_ {
    move |source| ProfileError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The application directory.
#[derive(Debug, Clone)]
pub struct AppDir {
    root: PathBuf,
}

impl AppDir {
    /// Wrap an application directory path. Nothing is created yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The application directory itself.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one subdirectory per profile.
    #[must_use]
    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join(PROFILES_DIR)
    }

    /// Directory holding the message cache snapshots.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    /// Default log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    /// Create the application and profiles directories if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Io`] if a directory cannot be created.
    pub fn ensure(&self) -> Result<(), ProfileError> {
        let profiles = self.profiles_dir();
        std::fs::create_dir_all(&profiles).map_err(io_err(&profiles))
    }

    /// Check the profiles-root version marker, writing it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::IncompatibleVersion`] if the marker holds a
    /// different version.
    pub fn check_version(&self) -> Result<(), ProfileError> {
        let path = self.profiles_dir().join(VERSION_FILE);
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let found = contents.trim();
                if found.parse::<u32>().ok() == Some(PROFILES_VERSION) {
                    Ok(())
                } else {
                    Err(ProfileError::IncompatibleVersion {
                        found: found.to_string(),
                        expected: PROFILES_VERSION,
                    })
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(version = PROFILES_VERSION, "writing profiles version marker");
                std::fs::write(&path, format!("{PROFILES_VERSION}\n")).map_err(io_err(&path))
            }
            Err(e) => Err(ProfileError::Io { path, source: e }),
        }
    }

    /// Profile ids present on disk, sorted.
    ///
    /// Entries that are not directories or not valid profile ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Io`] if the profiles directory cannot be read.
    pub fn list_profiles(&self) -> Result<Vec<String>, ProfileError> {
        let dir = self.profiles_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ProfileError::Io { path: dir, source: e }),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_err(&dir))?;
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if split_profile_id(&name).is_some() {
                ids.push(name);
            } else {
                tracing::debug!(entry = %name, "ignoring non-profile directory");
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Delete a profile directory and its cache snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::InvalidId`] for a malformed id,
    /// [`ProfileError::NotFound`] if it does not exist, or
    /// [`ProfileError::Io`] if deletion fails.
    pub fn remove_profile(&self, profile_id: &str) -> Result<(), ProfileError> {
        if split_profile_id(profile_id).is_none() || profile_id.contains(['/', '\\']) {
            return Err(ProfileError::InvalidId(profile_id.to_string()));
        }
        let dir = self.profiles_dir().join(profile_id);
        if !dir.is_dir() {
            return Err(ProfileError::NotFound(profile_id.to_string()));
        }
        std::fs::remove_dir_all(&dir).map_err(io_err(&dir))?;

        let snapshot = crate::cache::snapshot_path(&self.cache_dir(), profile_id);
        match std::fs::remove_file(&snapshot) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ProfileError::Io { path: snapshot, source: e }),
        }
        tracing::info!(profile_id, "profile removed");
        Ok(())
    }
}
