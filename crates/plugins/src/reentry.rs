//! Nesting guard for hooks that run inside another hook's host call.
//!
//! A post-commit rewrite calls `UpdatePost`, and the host answers by invoking
//! `MessageWillBeUpdated` on us before the call returns. Each such nested
//! dispatch enters the gauge; going past the limit is refused.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use spamgate_common::api::HostError;

#[derive(Debug)]
struct Levels {
    current: AtomicUsize,
    deepest: AtomicUsize,
}

#[derive(Debug, Clone)]
pub(crate) struct ReentryGauge {
    levels: Arc<Levels>,
    limit: usize,
}

impl ReentryGauge {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            levels: Arc::new(Levels {
                current: AtomicUsize::new(0),
                deepest: AtomicUsize::new(0),
            }),
            limit,
        }
    }

    /// Enter one nesting level. The level is released when the guard drops.
    pub(crate) fn enter(&self) -> Result<ReentryGuard, HostError> {
        let depth = self.levels.current.fetch_add(1, Ordering::SeqCst) + 1;
        if depth > self.limit {
            self.levels.current.fetch_sub(1, Ordering::SeqCst);
            return Err(HostError::DepthExceeded {
                depth,
                limit: self.limit,
            });
        }
        self.levels.deepest.fetch_max(depth, Ordering::SeqCst);
        Ok(ReentryGuard {
            levels: Arc::clone(&self.levels),
        })
    }

    pub(crate) fn current(&self) -> usize {
        self.levels.current.load(Ordering::SeqCst)
    }

    /// Highest level ever entered.
    pub(crate) fn deepest(&self) -> usize {
        self.levels.deepest.load(Ordering::SeqCst)
    }
}

#[must_use]
pub(crate) struct ReentryGuard {
    levels: Arc<Levels>,
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        self.levels.current.fetch_sub(1, Ordering::SeqCst);
    }
}
