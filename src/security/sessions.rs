//! Concurrent streaming-session caps per plan tier.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::schema::RateLimitConfig;

/// Tracks live streaming sessions per identity and enforces tier caps.
pub struct SessionTracker {
    counts: Mutex<HashMap<String, usize>>,
    caps: HashMap<String, usize>,
    default_cap: usize,
}

impl SessionTracker {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            caps: config
                .sessions
                .iter()
                .map(|s| (s.tier.clone(), s.max_sessions))
                .collect(),
            default_cap: config.default_max_sessions,
        }
    }

    /// Try to start a session for `identity`; the returned guard ends it
    /// on drop. `None` when the tier's cap is already reached.
    pub fn try_begin(self: &Arc<Self>, identity: &str, tier: &str) -> Option<SessionGuard> {
        let cap = self.caps.get(tier).copied().unwrap_or(self.default_cap);

        let mut counts = self.counts.lock().expect("session tracker mutex poisoned");
        let current = counts.entry(identity.to_string()).or_insert(0);
        if *current >= cap {
            tracing::debug!(identity = %identity, tier = %tier, cap, "Session cap reached");
            return None;
        }
        *current += 1;
        Some(SessionGuard {
            tracker: self.clone(),
            identity: identity.to_string(),
        })
    }

    fn end(&self, identity: &str) {
        let mut counts = self.counts.lock().expect("session tracker mutex poisoned");
        if let Some(count) = counts.get_mut(identity) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(identity);
            }
        }
    }
}

/// RAII guard for one live session.
pub struct SessionGuard {
    tracker: Arc<SessionTracker>,
    identity: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.tracker.end(&self.identity);
    }
}
