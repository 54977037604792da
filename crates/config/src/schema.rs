//! Configuration schema types.

use serde::{Deserialize, Serialize};

/// Root configuration (`spamgate.toml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamgateConfig {
    pub moderation: ModerationConfig,
    pub runtime: RuntimeConfig,
}

/// The moderation rules applied to the moderated channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Exact channel name the rules apply to.
    pub channel_name: String,
    /// Leading character that marks a post as pre-approved.
    pub sentinel: char,
    /// Body given to new posts without the sentinel.
    pub placeholder_message: String,
    /// Body the post-commit hook tries to write back to unflagged posts.
    pub commit_rewrite_message: String,
    /// User-visible reason attached to rejected edits.
    pub rejection_message: String,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            channel_name: "random_spam".into(),
            sentinel: '~',
            placeholder_message: "I have successfully edited this message".into(),
            commit_rewrite_message: "Lorem ipsum dolor sit amet".into(),
            rejection_message: "Error 500: Internal server error. Please contact your website \
                                administrator with detais on this message."
                .into(),
        }
    }
}

/// Plugin process settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Identifier announced to the host in the handshake.
    pub plugin_id: String,
    /// How many hook calls may nest inside a host API call before further
    /// nested calls are answered without dispatching.
    pub max_reentry_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            plugin_id: "spamgate".into(),
            max_reentry_depth: 4,
        }
    }
}
