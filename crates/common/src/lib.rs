//! Shared types, error definitions, and hook contracts used across all spamgate crates.

pub mod api;
pub mod error;
pub mod hooks;
pub mod types;

pub use error::{Error, FromMessage, Result};
