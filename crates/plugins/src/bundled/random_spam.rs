//! `random-spam` hook: pins every message in the moderated channel to a fixed
//! body unless it was posted with the sentinel prefix.
//!
//! - new post starting with the sentinel → sentinel stripped, pass-through flag set
//! - any other new post (empty included) → placeholder body
//! - edit without the pass-through flag → rejected, stored version kept
//! - committed post without the flag → rewritten through `UpdatePost`, which the
//!   update hook then reverts

use {
    anyhow::Result,
    async_trait::async_trait,
    tracing::{debug, info},
};

use {
    spamgate_common::{
        api::{HostError, PluginApi},
        hooks::{HookAction, HookEvent, HookPayload, MessageHook},
        types::{ChannelId, Post},
    },
    spamgate_config::ModerationConfig,
};

pub struct RandomSpamHook {
    rules: ModerationConfig,
}

impl RandomSpamHook {
    pub fn new(rules: ModerationConfig) -> Self {
        Self { rules }
    }

    /// Resolves the channel and compares its name. Lookup failures are
    /// reported to the host and treated as "not moderated".
    async fn is_moderated(&self, api: &dyn PluginApi, channel_id: &ChannelId) -> bool {
        match api.get_channel(channel_id).await {
            Ok(channel) => channel.name == self.rules.channel_name,
            Err(e) => {
                debug!(channel_id = %channel_id, error = %e, "random-spam: channel lookup failed");
                api.log_error("could not find channel", "channel_id", channel_id.as_str())
                    .await;
                false
            },
        }
    }

    /// `MessageWillBePosted`: never rejects.
    pub async fn on_pre_post(&self, api: &dyn PluginApi, post: &Post) -> HookAction {
        debug!(post_id = %post.id, user_id = %post.user_id, "random-spam: message will be posted");

        if !self.is_moderated(api, &post.channel_id).await {
            return HookAction::Continue;
        }

        let mut post = post.clone();
        match post.message.strip_prefix(self.rules.sentinel) {
            Some(rest) => {
                post.message = rest.to_string();
                post.props.let_pass = Some(true);
            },
            None => {
                post.message.clone_from(&self.rules.placeholder_message);
                post.props.let_pass = None;
            },
        }
        HookAction::Replace(post)
    }

    /// `MessageWillBeUpdated`: only edits carrying the pass-through flag survive.
    pub async fn on_pre_update(
        &self,
        api: &dyn PluginApi,
        new_post: &Post,
        old_post: &Post,
    ) -> HookAction {
        if !self.is_moderated(api, &old_post.channel_id).await || new_post.lets_pass() {
            return HookAction::Continue;
        }

        debug!(post_id = %old_post.id, "random-spam: rejecting edit");
        HookAction::Reject(self.rules.rejection_message.clone())
    }

    /// `MessageHasBeenPosted`: rewrites unflagged posts once. The rewrite goes
    /// back through `MessageWillBeUpdated`, which rejects it.
    pub async fn on_post_committed(&self, api: &dyn PluginApi, post: &Post) {
        if !self.is_moderated(api, &post.channel_id).await || post.lets_pass() {
            return;
        }

        let mut rewrite = post.clone();
        rewrite.message.clone_from(&self.rules.commit_rewrite_message);

        match api.update_post(rewrite).await {
            Ok(stored) => {
                info!(post_id = %stored.id, "random-spam: post-commit rewrite was stored");
            },
            Err(HostError::Rejected(reason)) => {
                debug!(post_id = %post.id, reason = %reason, "random-spam: post-commit rewrite reverted");
            },
            Err(e) => {
                debug!(post_id = %post.id, error = %e, "random-spam: post-commit rewrite failed");
                api.log_error("could not update post", "post_id", post.id.as_str())
                    .await;
            },
        }
    }
}

impl Default for RandomSpamHook {
    fn default() -> Self {
        Self::new(ModerationConfig::default())
    }
}

#[async_trait]
impl MessageHook for RandomSpamHook {
    fn name(&self) -> &str {
        "random-spam"
    }

    fn events(&self) -> &[HookEvent] {
        HookEvent::ALL
    }

    async fn handle(&self, api: &dyn PluginApi, payload: &HookPayload) -> Result<HookAction> {
        let action = match payload {
            HookPayload::MessageWillBePosted { post } => self.on_pre_post(api, post).await,
            HookPayload::MessageWillBeUpdated { new_post, old_post } => {
                self.on_pre_update(api, new_post, old_post).await
            },
            HookPayload::MessageHasBeenPosted { post } => {
                self.on_post_committed(api, post).await;
                HookAction::Continue
            },
        };
        Ok(action)
    }
}
