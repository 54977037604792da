//! Core hook types shared across crates.
//!
//! These types define the message hook contract between the host and
//! plugins. Concrete hooks live in `spamgate-plugins`; this module provides
//! the trait, the typed payloads, and the registry that dispatches them.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tracing::{debug, info, warn},
};

use crate::{api::PluginApi, error::Error, types::Post};

// ── HookEvent ───────────────────────────────────────────────────────────────

/// Points in a message's lifecycle where the host calls into plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    MessageWillBePosted,
    MessageWillBeUpdated,
    MessageHasBeenPosted,
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl HookEvent {
    /// All variants, for iteration.
    pub const ALL: &'static [HookEvent] = &[
        Self::MessageWillBePosted,
        Self::MessageWillBeUpdated,
        Self::MessageHasBeenPosted,
    ];

    /// Returns true if the host does not wait for a verdict on this event.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::MessageHasBeenPosted)
    }

    /// Looks up an event by its wire method name.
    pub fn from_method(method: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.to_string() == method)
    }
}

// ── HookPayload ─────────────────────────────────────────────────────────────

/// Typed payload carried with each hook event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum HookPayload {
    MessageWillBePosted { post: Post },
    MessageWillBeUpdated { new_post: Post, old_post: Post },
    MessageHasBeenPosted { post: Post },
}

impl HookPayload {
    /// Returns the [`HookEvent`] variant that matches this payload.
    pub fn event(&self) -> HookEvent {
        match self {
            Self::MessageWillBePosted { .. } => HookEvent::MessageWillBePosted,
            Self::MessageWillBeUpdated { .. } => HookEvent::MessageWillBeUpdated,
            Self::MessageHasBeenPosted { .. } => HookEvent::MessageHasBeenPosted,
        }
    }

    /// Decodes wire params (`{"post": ..}` or `{"new_post": .., "old_post": ..}`)
    /// for the given event.
    pub fn from_params(event: HookEvent, params: Value) -> crate::Result<Self> {
        let Value::Object(mut fields) = params else {
            return Err(Error::InvalidParams {
                event: event.to_string(),
                reason: "expected an object".into(),
            });
        };
        fields.insert("event".into(), Value::String(event.to_string()));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    /// The post the verdict applies to: the draft, or the proposed new version.
    pub fn subject(&self) -> &Post {
        match self {
            Self::MessageWillBePosted { post } | Self::MessageHasBeenPosted { post } => post,
            Self::MessageWillBeUpdated { new_post, .. } => new_post,
        }
    }

    fn replace_subject(&mut self, replacement: Post) {
        match self {
            Self::MessageWillBePosted { post } | Self::MessageHasBeenPosted { post } => {
                *post = replacement;
            },
            Self::MessageWillBeUpdated { new_post, .. } => *new_post = replacement,
        }
    }

    /// Turns a handler verdict into the `(post-or-null, reason)` pair the host
    /// expects.
    ///
    /// A rejected update hands back the stored version so the edit has no
    /// effect; a rejected draft hands back nothing.
    pub fn resolve(&self, action: HookAction) -> HookResponse {
        match (self, action) {
            (Self::MessageWillBeUpdated { new_post, .. }, HookAction::Continue) => {
                HookResponse::replace(new_post.clone())
            },
            (_, HookAction::Continue) => HookResponse::allow(),
            (_, HookAction::Replace(post)) => HookResponse::replace(post),
            (Self::MessageWillBeUpdated { old_post, .. }, HookAction::Reject(reason)) => {
                HookResponse {
                    post: Some(old_post.clone()),
                    rejection_reason: reason,
                }
            },
            (_, HookAction::Reject(reason)) => HookResponse {
                post: None,
                rejection_reason: reason,
            },
        }
    }
}

// ── HookAction ──────────────────────────────────────────────────────────────

/// The outcome a hook handler returns.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum HookAction {
    /// Let the message through untouched.
    #[default]
    Continue,
    /// Let the message through with this version of the post.
    Replace(Post),
    /// Refuse the message, with a user-visible reason.
    Reject(String),
}

// ── HookResponse ────────────────────────────────────────────────────────────

/// What the host receives back from a modifying hook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookResponse {
    /// `None` tells the host to keep its own copy of the post.
    #[serde(default)]
    pub post: Option<Post>,
    /// Empty unless the message was rejected.
    #[serde(default)]
    pub rejection_reason: String,
}

impl HookResponse {
    pub fn allow() -> Self {
        Self::default()
    }

    pub fn replace(post: Post) -> Self {
        Self {
            post: Some(post),
            rejection_reason: String::new(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        !self.rejection_reason.is_empty()
    }
}

// ── MessageHook trait ───────────────────────────────────────────────────────

/// Trait implemented by every message hook.
#[async_trait]
pub trait MessageHook: Send + Sync {
    /// A human-readable name for this hook.
    fn name(&self) -> &str;

    /// Which events this hook subscribes to.
    fn events(&self) -> &[HookEvent];

    /// Priority for ordering. Higher values run first. Default is 0.
    fn priority(&self) -> i32 {
        0
    }

    /// Handle the event. `api` is the host the event came from.
    async fn handle(&self, api: &dyn PluginApi, payload: &HookPayload) -> Result<HookAction>;
}

// ── HookStats ───────────────────────────────────────────────────────────────

/// How one hook invocation ended, as counted by [`HookStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Replaced,
    Rejected,
    Failed,
}

/// Per-hook verdict counters and cumulative latency.
#[derive(Debug, Default)]
pub struct HookStats {
    pub calls: AtomicU64,
    pub replaced: AtomicU64,
    pub rejected: AtomicU64,
    pub failed: AtomicU64,
    latency_us: AtomicU64,
}

impl HookStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: Outcome, latency: Duration) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_us.fetch_add(micros, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Passed => return,
            Outcome::Replaced => &self.replaced,
            Outcome::Rejected => &self.rejected,
            Outcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Mean latency per call; zero before the first call.
    pub fn avg_latency(&self) -> Duration {
        match self.calls.load(Ordering::Relaxed) {
            0 => Duration::ZERO,
            calls => Duration::from_micros(self.latency_us.load(Ordering::Relaxed) / calls),
        }
    }

    pub fn snapshot(&self) -> HookStatsSnapshot {
        HookStatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            avg_latency_us: u64::try_from(self.avg_latency().as_micros()).unwrap_or(u64::MAX),
        }
    }
}

/// Point-in-time copy of a hook's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HookStatsSnapshot {
    pub calls: u64,
    pub replaced: u64,
    pub rejected: u64,
    pub failed: u64,
    pub avg_latency_us: u64,
}

// ── Handler entry (with stats) ──────────────────────────────────────────────

struct HandlerEntry {
    handler: Arc<dyn MessageHook>,
    stats: Arc<HookStats>,
}

// ── HookRegistry ────────────────────────────────────────────────────────────

/// Registered message hooks, dispatched in priority order.
#[derive(Default)]
pub struct HookRegistry {
    handlers: HashMap<HookEvent, Vec<HandlerEntry>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for all events it subscribes to.
    /// Hooks are sorted by priority (descending) within each event.
    pub fn register(&mut self, handler: Arc<dyn MessageHook>) {
        let stats = Arc::new(HookStats::new());
        for &event in handler.events() {
            let entry = HandlerEntry {
                handler: Arc::clone(&handler),
                stats: Arc::clone(&stats),
            };
            let handlers = self.handlers.entry(event).or_default();
            handlers.push(entry);
            handlers.sort_by_key(|h| std::cmp::Reverse(h.handler.priority()));
        }
        info!(handler = handler.name(), "message hook registered");
    }

    /// Returns true if any hooks are registered for the given event.
    pub fn has_handlers(&self, event: HookEvent) -> bool {
        self.handlers.get(&event).is_some_and(|v| !v.is_empty())
    }

    /// Events with at least one registered hook, in [`HookEvent::ALL`] order.
    pub fn events(&self) -> Vec<HookEvent> {
        HookEvent::ALL
            .iter()
            .copied()
            .filter(|e| self.has_handlers(*e))
            .collect()
    }

    /// Get stats for a named hook. Returns None if not found.
    pub fn handler_stats(&self, name: &str) -> Option<Arc<HookStats>> {
        self.handlers
            .values()
            .flatten()
            .find(|entry| entry.handler.name() == name)
            .map(|entry| Arc::clone(&entry.stats))
    }

    /// Counters of every registered hook, keyed by name.
    pub fn stats_snapshot(&self) -> BTreeMap<String, HookStatsSnapshot> {
        self.handlers
            .values()
            .flatten()
            .map(|entry| (entry.handler.name().to_string(), entry.stats.snapshot()))
            .collect()
    }

    /// List all registered hook names (deduplicated).
    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .values()
            .flatten()
            .map(|e| e.handler.name().to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Dispatch an event to all registered hooks.
    ///
    /// Modifying events run hooks sequentially: each replacement is handed to
    /// the next hook, and the first rejection short-circuits. Read-only events
    /// run every hook and ignore their verdicts. A failing hook is logged and
    /// skipped, so the message passes as if the hook were absent.
    pub async fn dispatch(&self, api: &dyn PluginApi, payload: &HookPayload) -> HookResponse {
        let event = payload.event();
        let handlers = match self.handlers.get(&event) {
            Some(h) if !h.is_empty() => h,
            _ => return payload.resolve(HookAction::Continue),
        };

        debug!(event = %event, count = handlers.len(), "dispatching hook event");

        if event.is_read_only() {
            for entry in handlers {
                if let Some(HookAction::Replace(_) | HookAction::Reject(_)) =
                    entry.invoke(api, payload).await
                {
                    debug!(handler = entry.handler.name(), event = %event, "verdict on read-only event ignored");
                }
            }
            return HookResponse::allow();
        }

        let mut current = payload.clone();
        let mut replaced = false;
        for entry in handlers {
            match entry.invoke(api, &current).await {
                Some(HookAction::Replace(post)) => {
                    current.replace_subject(post);
                    replaced = true;
                },
                Some(HookAction::Reject(reason)) => {
                    info!(handler = entry.handler.name(), event = %event, reason = %reason, "hook rejected message");
                    return payload.resolve(HookAction::Reject(reason));
                },
                Some(HookAction::Continue) | None => {},
            }
        }

        match replaced {
            true => HookResponse::replace(current.subject().clone()),
            false => payload.resolve(HookAction::Continue),
        }
    }
}

impl HandlerEntry {
    /// Run the hook once and record the outcome. Failures are logged and
    /// reported as `None` so the caller can carry on without this hook.
    async fn invoke(&self, api: &dyn PluginApi, payload: &HookPayload) -> Option<HookAction> {
        let start = Instant::now();
        let result = self.handler.handle(api, payload).await;
        let latency = start.elapsed();

        let outcome = match &result {
            Ok(HookAction::Continue) => Outcome::Passed,
            Ok(HookAction::Replace(_)) => Outcome::Replaced,
            Ok(HookAction::Reject(_)) => Outcome::Rejected,
            Err(_) => Outcome::Failed,
        };
        self.stats.record(outcome, latency);

        match result {
            Ok(action) => Some(action),
            Err(e) => {
                warn!(handler = self.handler.name(), event = %payload.event(), error = %e, "message hook failed, skipping it");
                None
            },
        }
    }
}
