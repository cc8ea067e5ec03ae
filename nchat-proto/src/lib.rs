//! Request and notification envelope types exchanged between the nchat UI
//! and its messaging backends.

pub mod codec;
pub mod feature;
pub mod message;
pub mod request;
pub mod service;
