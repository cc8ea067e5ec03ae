//! `nchat`: a terminal chat client core with pluggable messaging backends.
//!
//! Each backend implements [`protocol::Protocol`] and runs its blocking work
//! on a per-profile [`protocol::worker::Worker`]. Notifications flow through
//! the [`cache::MessageCache`] into the single [`dispatch::Dispatcher`], which
//! owns the [`app::App`] model.

pub mod app;
pub mod cache;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod lock;
pub mod profile;
pub mod protocol;
pub mod sync;
