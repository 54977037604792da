use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Hook params that are not shaped like the event's payload.
    #[error("invalid {event} params: {reason}")]
    InvalidParams { event: String, reason: String },
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ── Context helper ──────────────────────────────────────────────────────────

/// Error types that can wrap a failure as a plain message.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Expands to a crate-local `Context` trait giving `.context()` and
/// `.with_context()` on any `Result` whose error is `Display`.
///
/// The calling module must define `Error: FromMessage` and a `Result<T>` alias.
///
/// ```ignore
/// spamgate_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> Result<T>;

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T>;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.with_context(|| context)
            }

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
                self.map_err(|source| {
                    let context: String = f().into();
                    <Error as $crate::FromMessage>::from_message(format!("{context}: {source}"))
                })
            }
        }
    };
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    impl_context!();

    #[test]
    fn context_prefixes_the_source_message() {
        let parsed: std::result::Result<u8, _> = "300".parse::<u8>();
        let err = parsed.context("depth").unwrap_err();
        assert_eq!(err.to_string(), "depth: number too large to fit in target type");

        let err = Err::<(), _>("boom")
            .with_context(|| format!("step {}", 2))
            .unwrap_err();
        assert!(matches!(err, Error::Message(m) if m == "step 2: boom"));
    }
}
