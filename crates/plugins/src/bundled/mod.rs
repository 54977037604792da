//! Hooks shipped with spamgate.

pub mod random_spam;

use std::sync::Arc;

use {spamgate_common::hooks::HookRegistry, spamgate_config::SpamgateConfig};

pub use random_spam::RandomSpamHook;

/// Registry holding every bundled hook, configured from `config`.
pub fn default_registry(config: &SpamgateConfig) -> HookRegistry {
    let mut registry = HookRegistry::new();
    registry.register(Arc::new(RandomSpamHook::new(config.moderation.clone())));
    registry
}

#[cfg(test)]
mod tests {
    use {super::*, spamgate_common::hooks::HookEvent};

    #[test]
    fn registers_random_spam_for_every_event() {
        let registry = default_registry(&SpamgateConfig::default());
        assert_eq!(registry.handler_names(), vec!["random-spam".to_string()]);
        assert_eq!(registry.events(), HookEvent::ALL.to_vec());
    }
}
