//! In-process host for tests and `spamgate simulate`.
//!
//! Holds channels and posts in memory and runs the registry's hooks at the
//! same points the real host does: before a post is stored, after it is
//! committed, and before every update (including updates requested by the
//! hooks themselves).

use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use {
    async_trait::async_trait,
    serde::Serialize,
    tracing::{debug, error, info},
};

use {
    spamgate_common::{
        api::{HostError, PluginApi},
        hooks::{HookPayload, HookRegistry},
        types::{Channel, ChannelId, Post, PostId},
    },
    spamgate_config::RuntimeConfig,
};

use crate::reentry::ReentryGauge;

/// One `LogError` call, as recorded by [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggedError {
    pub message: String,
    pub key: String,
    pub value: String,
}

#[derive(Default)]
struct HostState {
    channels: HashMap<ChannelId, Channel>,
    posts: HashMap<PostId, Post>,
    errors: Vec<LoggedError>,
    next_post: u64,
}

pub struct MemoryHost {
    registry: HookRegistry,
    state: Mutex<HostState>,
    update_calls: AtomicUsize,
    gauge: ReentryGauge,
}

impl MemoryHost {
    pub fn new(registry: HookRegistry, config: &RuntimeConfig) -> Self {
        Self {
            registry,
            state: Mutex::new(HostState::default()),
            update_calls: AtomicUsize::new(0),
            gauge: ReentryGauge::new(config.max_reentry_depth),
        }
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_channel(&self, channel: Channel) {
        self.state().channels.insert(channel.id.clone(), channel);
    }

    /// Stored version of a post.
    pub fn post(&self, id: &PostId) -> Option<Post> {
        self.state().posts.get(id).cloned()
    }

    /// Every `LogError` call so far, oldest first.
    pub fn logged_errors(&self) -> Vec<LoggedError> {
        self.state().errors.clone()
    }

    /// Number of `UpdatePost` calls made by hooks, refused ones included.
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    /// Deepest hook-initiated update nesting reached.
    pub fn deepest_reentry(&self) -> usize {
        self.gauge.deepest()
    }

    /// Create a post the way a user would: run `MessageWillBePosted`, store
    /// the result under a fresh id, then run `MessageHasBeenPosted`.
    ///
    /// Returns the stored version after the post-commit hooks ran.
    pub async fn create_post(&self, draft: Post) -> Result<Post, HostError> {
        let payload = HookPayload::MessageWillBePosted {
            post: draft.clone(),
        };
        let response = self.registry.dispatch(self, &payload).await;
        if response.is_rejected() {
            info!(channel_id = %draft.channel_id, reason = %response.rejection_reason, "post rejected");
            return Err(HostError::Rejected(response.rejection_reason));
        }

        let mut post = response.post.unwrap_or(draft);
        {
            let mut state = self.state();
            state.next_post += 1;
            post.id = PostId::new(format!("post-{}", state.next_post));
            state.posts.insert(post.id.clone(), post.clone());
        }
        debug!(post_id = %post.id, "post stored");

        self.registry
            .dispatch(self, &HookPayload::MessageHasBeenPosted { post: post.clone() })
            .await;

        Ok(self.post(&post.id).unwrap_or(post))
    }

    /// Edit a post the way a user would. Not counted as a hook update.
    pub async fn edit_post(&self, post: Post) -> Result<Post, HostError> {
        self.apply_update(post).await
    }

    async fn apply_update(&self, new_post: Post) -> Result<Post, HostError> {
        let old_post = self
            .post(&new_post.id)
            .ok_or_else(|| HostError::post_not_found(&new_post.id))?;

        let payload = HookPayload::MessageWillBeUpdated {
            new_post: new_post.clone(),
            old_post,
        };
        let response = self.registry.dispatch(self, &payload).await;
        if response.is_rejected() {
            info!(post_id = %new_post.id, reason = %response.rejection_reason, "update rejected");
            return Err(HostError::Rejected(response.rejection_reason));
        }

        let stored = response.post.unwrap_or(new_post);
        self.state()
            .posts
            .insert(stored.id.clone(), stored.clone());
        debug!(post_id = %stored.id, "post updated");
        Ok(stored)
    }
}

#[async_trait]
impl PluginApi for MemoryHost {
    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel, HostError> {
        self.state()
            .channels
            .get(channel_id)
            .cloned()
            .ok_or_else(|| HostError::channel_not_found(channel_id))
    }

    async fn update_post(&self, post: Post) -> Result<Post, HostError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.gauge.enter()?;
        self.apply_update(post).await
    }

    async fn log_error(&self, message: &str, key: &str, value: &str) {
        error!(key, value, "plugin error: {message}");
        self.state().errors.push(LoggedError {
            message: message.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
    }
}
