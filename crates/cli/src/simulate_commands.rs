use std::path::Path;

use {
    anyhow::Result,
    clap::Args,
    serde_json::{Value, json},
};

use {
    spamgate_common::types::{Channel, Post},
    spamgate_config::SpamgateConfig,
    spamgate_plugins::{MemoryHost, default_registry},
};

#[derive(Args)]
pub struct SimulateArgs {
    /// Name of the channel the post is created in.
    #[arg(long)]
    channel: String,
    /// Body of the new post.
    #[arg(short, long, default_value = "hello")]
    message: String,
    /// Attempt a user edit of the stored post with this body.
    #[arg(long)]
    edit: Option<String>,
}

pub async fn handle_simulate(args: SimulateArgs, path: Option<&Path>) -> Result<()> {
    let config = crate::load_validated(path)?;
    let report = simulate(&config, &args).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn simulate(config: &SpamgateConfig, args: &SimulateArgs) -> Result<Value> {
    let host = MemoryHost::new(default_registry(config), &config.runtime);
    host.add_channel(Channel::new("simulated-channel", args.channel.as_str()));

    let draft = Post::new("", "simulated-channel", args.message.as_str()).with_user("simulated-user");
    let stored = host.create_post(draft).await?;

    let edit = match &args.edit {
        Some(body) => {
            let proposed = Post {
                message: body.clone(),
                ..stored.clone()
            };
            match host.edit_post(proposed).await {
                Ok(post) => json!({ "accepted": true, "post": post }),
                Err(e) => json!({ "accepted": false, "error": e.to_string() }),
            }
        },
        None => Value::Null,
    };

    Ok(json!({
        "post": host.post(&stored.id).unwrap_or(stored),
        "edit": edit,
        "update_calls": host.update_calls(),
        "deepest_reentry": host.deepest_reentry(),
        "logged_errors": host.logged_errors(),
        "hooks": host.registry().stats_snapshot(),
    }))
}
