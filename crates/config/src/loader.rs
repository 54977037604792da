use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::SpamgateConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "spamgate.toml",
    "spamgate.yaml",
    "spamgate.yml",
    "spamgate.json",
];

/// Overrides the moderated channel name.
pub const ENV_CHANNEL: &str = "SPAMGATE_CHANNEL";
/// Overrides `runtime.max_reentry_depth`.
pub const ENV_MAX_REENTRY_DEPTH: &str = "SPAMGATE_MAX_REENTRY_DEPTH";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<SpamgateConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./spamgate.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/spamgate/spamgate.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to [`SpamgateConfig::default()`] when nothing is found or the
/// file fails to parse. Environment overrides are applied last.
pub fn discover_and_load() -> SpamgateConfig {
    let config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                SpamgateConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            SpamgateConfig::default()
        },
    };
    apply_env_overrides(config)
}

/// Load an explicitly named file (errors propagate), or discover one.
pub fn load_or_discover(path: Option<&Path>) -> Result<SpamgateConfig> {
    match path {
        Some(path) => Ok(apply_env_overrides(load_config(path)?)),
        None => Ok(discover_and_load()),
    }
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .or_else(|| {
            let dir = config_dir()?;
            CONFIG_FILENAMES
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.exists())
        })
}

/// Returns the user-global config directory (`~/.config/spamgate/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "spamgate").map(|d| d.config_dir().to_path_buf())
}

/// Apply `SPAMGATE_*` environment variables on top of a loaded config.
pub fn apply_env_overrides(config: SpamgateConfig) -> SpamgateConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: SpamgateConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> SpamgateConfig {
    if let Some(channel) = lookup(ENV_CHANNEL).filter(|v| !v.trim().is_empty()) {
        debug!(channel = %channel, "moderated channel overridden from environment");
        config.moderation.channel_name = channel;
    }
    if let Some(raw) = lookup(ENV_MAX_REENTRY_DEPTH) {
        match parse_depth(&raw) {
            Ok(depth) => config.runtime.max_reentry_depth = depth,
            Err(e) => warn!(error = %e, "ignoring invalid environment override"),
        }
    }
    config
}

fn parse_depth(raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .with_context(|| format!("{ENV_MAX_REENTRY_DEPTH}={raw:?} is not a depth"))
}

/// Render a config as TOML.
pub fn to_toml(config: &SpamgateConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

fn parse_config(raw: &str, path: &Path) -> Result<SpamgateConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}
