//! Configuration loading, validation, and env substitution.
//!
//! Config files: `spamgate.toml`, `spamgate.yaml`, or `spamgate.json`
//! Searched in `./` then `~/.config/spamgate/`.
//!
//! Supports `${ENV_VAR}` substitution in the raw file text and `SPAMGATE_*`
//! overrides applied after parsing.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config,
        load_or_discover, to_toml,
    },
    schema::{ModerationConfig, RuntimeConfig, SpamgateConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
