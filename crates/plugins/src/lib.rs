//! Message hooks and the runtimes that host them.
//!
//! - [`bundled`]: hooks shipped with spamgate (`random-spam`)
//! - [`runtime`]: serves a hook registry to a host over stdio
//! - [`memory`]: in-process host used by tests and `spamgate simulate`

pub mod bundled;
pub mod memory;
mod reentry;
pub mod runtime;

pub use {
    bundled::{RandomSpamHook, default_registry},
    memory::{LoggedError, MemoryHost},
    runtime::{PluginRuntime, client_main},
};
