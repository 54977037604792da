//! The slice of the host's plugin API that hooks consume.

use {async_trait::async_trait, tracing::error};

use crate::types::{Channel, ChannelId, Post};

/// Failures reported by the host (or by the transport to it).
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A plugin's update hook refused the edit; the stored post is unchanged.
    #[error("rejected by plugin: {0}")]
    Rejected(String),

    #[error("host call failed: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("host connection closed")]
    Closed,

    #[error("re-entrant hook depth {depth} exceeds limit {limit}")]
    DepthExceeded { depth: usize, limit: usize },
}

impl HostError {
    #[must_use]
    pub fn channel_not_found(id: &ChannelId) -> Self {
        Self::NotFound {
            kind: "channel",
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn post_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind: "post",
            id: id.to_string(),
        }
    }
}

/// Host calls available to hooks while they handle an event.
///
/// `update_post` re-enters the host's update path, so it triggers
/// `MessageWillBeUpdated` for every registered plugin, including the caller.
#[async_trait]
pub trait PluginApi: Send + Sync {
    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel, HostError>;

    async fn update_post(&self, post: Post) -> Result<Post, HostError>;

    /// Diagnostic sink. Has no behavioural effect.
    async fn log_error(&self, message: &str, key: &str, value: &str) {
        error!(key, value, "{message}");
    }
}
