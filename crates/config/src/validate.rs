//! Semantic checks on a loaded configuration.

use crate::schema::SpamgateConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "moderation.sentinel"
    pub path: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Number of diagnostics at the given severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            message: message.into(),
        });
    }
}

pub fn validate(config: &SpamgateConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    let moderation = &config.moderation;

    if moderation.channel_name.trim().is_empty() {
        result.push(
            Severity::Error,
            "moderation.channel_name",
            "channel name must not be empty",
        );
    } else if moderation.channel_name.trim() != moderation.channel_name {
        result.push(
            Severity::Warning,
            "moderation.channel_name",
            "channel name has surrounding whitespace and will never match exactly",
        );
    }

    if moderation.sentinel.is_whitespace() {
        result.push(
            Severity::Error,
            "moderation.sentinel",
            "sentinel must be a visible character",
        );
    }

    for (path, text) in [
        ("moderation.placeholder_message", &moderation.placeholder_message),
        ("moderation.rejection_message", &moderation.rejection_message),
    ] {
        if text.is_empty() {
            result.push(Severity::Error, path, "message must not be empty");
        }
    }

    // An empty rewrite would make the committed post look deleted.
    if moderation.commit_rewrite_message.is_empty() {
        result.push(
            Severity::Warning,
            "moderation.commit_rewrite_message",
            "empty rewrite message",
        );
    }

    if moderation.placeholder_message.starts_with(moderation.sentinel) {
        result.push(
            Severity::Warning,
            "moderation.placeholder_message",
            "placeholder starts with the sentinel character",
        );
    }

    if config.runtime.max_reentry_depth == 0 {
        result.push(
            Severity::Error,
            "runtime.max_reentry_depth",
            "depth 0 refuses the update hook that reverts post-commit rewrites",
        );
    }

    if config.runtime.plugin_id.trim().is_empty() {
        result.push(
            Severity::Error,
            "runtime.plugin_id",
            "plugin id must not be empty",
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_clean() {
        let result = validate(&SpamgateConfig::default());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn empty_channel_is_an_error() {
        let mut cfg = SpamgateConfig::default();
        cfg.moderation.channel_name = "  ".into();
        let result = validate(&cfg);
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].path, "moderation.channel_name");
    }

    #[test]
    fn padded_channel_is_a_warning() {
        let mut cfg = SpamgateConfig::default();
        cfg.moderation.channel_name = " random_spam".into();
        let result = validate(&cfg);
        assert!(!result.has_errors());
        assert_eq!(result.diagnostics[0].severity, Severity::Warning);
    }

    #[test]
    fn whitespace_sentinel_and_zero_depth_are_errors() {
        let mut cfg = SpamgateConfig::default();
        cfg.moderation.sentinel = ' ';
        cfg.runtime.max_reentry_depth = 0;
        let paths: Vec<_> = validate(&cfg)
            .diagnostics
            .into_iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.path)
            .collect();
        assert_eq!(paths, vec!["moderation.sentinel", "runtime.max_reentry_depth"]);
    }

    #[test]
    fn empty_messages_are_reported() {
        let mut cfg = SpamgateConfig::default();
        cfg.moderation.rejection_message.clear();
        cfg.moderation.commit_rewrite_message.clear();
        let result = validate(&cfg);
        assert!(result.has_errors());
        assert_eq!(result.count(Severity::Error), 1);
        assert_eq!(result.count(Severity::Warning), 1);
    }
}
