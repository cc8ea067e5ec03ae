//! Protocol capability interface for nchat backends.
//!
//! Defines the [`Protocol`] trait every backend implements, whether it talks
//! to a real service or simulates one. Concrete implementations include:
//! - [`dummy::DummyProtocol`]: deterministic simulated backend
//!
//! Each backend owns a [`worker::Worker`] that serializes all of its work
//! onto one thread. Results come back asynchronously through the
//! [`MessageHandler`] registered with [`Protocol::set_message_handler`].

pub mod dummy;
pub mod registry;
pub mod worker;

use std::path::Path;
use std::sync::Arc;

use nchat_proto::feature::ProtocolFeature;
use nchat_proto::request::RequestMessage;
use nchat_proto::service::ServiceMessage;

use crate::lock::LockError;
use worker::WorkerError;

/// Callback a backend invokes for every notification it produces.
///
/// Called from the backend's worker thread.
pub type MessageHandler = Arc<dyn Fn(ServiceMessage) + Send + Sync>;

/// Errors reported synchronously by [`Protocol`] lifecycle calls.
///
/// Request outcomes are never reported here; they arrive later as a
/// notification with `success == false`.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Profile setup was aborted or failed.
    #[error("profile setup failed: {0}")]
    Setup(String),

    /// The profile directory does not exist or is unusable.
    #[error("profile {0} not found")]
    ProfileNotFound(String),

    /// No profile has been loaded or set up yet.
    #[error("no profile loaded")]
    NoProfile,

    /// `login` was called before a message handler was registered.
    #[error("no message handler registered")]
    NoMessageHandler,

    /// The operation requires the backend to be logged out.
    #[error("backend is still logged in")]
    StillRunning,

    /// Another process is using this profile.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The worker thread could not be started or stopped cleanly.
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// Filesystem error while touching profile state.
    #[error("profile I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The contract every messaging backend implements.
///
/// All methods take `&self` so a single `Arc<dyn Protocol>` can be shared by
/// the startup code and the dispatcher.
///
/// # Lifecycle
///
/// `setup_profile` or `load_profile`, then `set_message_handler`, then
/// `login`. `logout` stops the worker; `close_profile` is only valid after
/// that.
pub trait Protocol: Send + Sync {
    /// Stable identifier `<protocolName>_<accountDiscriminator>`.
    fn profile_id(&self) -> String;

    /// Human readable name of the profile, for display.
    fn profile_display_name(&self) -> String;

    /// Whether the backend has the given optional behavior.
    fn has_feature(&self, feature: ProtocolFeature) -> bool;

    /// Interactive first-time setup. Creates the on-disk profile state and
    /// returns the new profile id.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Setup`] if the user aborts or setup fails.
    fn setup_profile(&self, profiles_dir: &Path) -> Result<String, ProtocolError>;

    /// Rehydrate backend state for an existing profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile is missing or already in use.
    fn load_profile(&self, profiles_dir: &Path, profile_id: &str) -> Result<(), ProtocolError>;

    /// Release in-memory and backend resources.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::StillRunning`] if called before `logout`.
    fn close_profile(&self) -> Result<(), ProtocolError>;

    /// Start the worker and the backend connection.
    ///
    /// Returns before the backend is necessarily connected; completion is
    /// signaled by a `Connect` notification.
    ///
    /// # Errors
    ///
    /// Returns an error if no handler is registered or the worker cannot start.
    fn login(&self) -> Result<(), ProtocolError>;

    /// Stop the worker, waiting for the in-flight request to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread panicked.
    fn logout(&self) -> Result<(), ProtocolError>;

    /// Queue a request. Never blocks on backend I/O; callable from any thread.
    fn send_request(&self, request: RequestMessage);

    /// Register the single notification sink. Must happen before `login`.
    fn set_message_handler(&self, handler: MessageHandler);
}

/// Split a profile id into `(protocol_name, discriminator)`.
///
/// Returns `None` if the id has no `_` separator or either part is empty.
#[must_use]
pub fn split_profile_id(profile_id: &str) -> Option<(&str, &str)> {
    let (name, discriminator) = profile_id.split_once('_')?;
    if name.is_empty() || discriminator.is_empty() {
        return None;
    }
    Some((name, discriminator))
}
