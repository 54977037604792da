//! Channel and post entities as the host hands them to plugins.

use std::fmt;

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Opaque host identifier of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Opaque host identifier of a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Drafts that have not been committed yet carry an empty id.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PostId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

impl Channel {
    pub fn new(id: impl Into<ChannelId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            display_name: None,
            team_id: None,
        }
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Out-of-band signals attached to a post.
///
/// Only the pass-through flag is read. Every other key the host sends is
/// kept in `extra` and written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProps {
    /// Set by the moderation hook when it approved a sentinel edit.
    #[serde(
        rename = "randomSpamLetPass",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub let_pass: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PostProps {
    pub fn lets_pass(&self) -> bool {
        self.let_pass == Some(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub id: PostId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub props: PostProps,
    /// Host fields spamgate does not look at (`root_id`, `create_at`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Post {
    pub fn new(
        id: impl Into<PostId>,
        channel_id: impl Into<ChannelId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            user_id: String::new(),
            message: message.into(),
            props: PostProps::default(),
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    #[must_use]
    pub fn with_let_pass(mut self, let_pass: bool) -> Self {
        self.props.let_pass = Some(let_pass);
        self
    }

    /// True when the pass-through flag is present and set.
    pub fn lets_pass(&self) -> bool {
        self.props.lets_pass()
    }
}

impl From<String> for PostId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
