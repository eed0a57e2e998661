//! Trigger authentication

pub mod middleware;

pub use middleware::{require_update_secret, UpdateSecret};
