//! Breaker registry.
//!
//! # Responsibilities
//! - Own one long-lived breaker per configured dependency
//! - Hand breakers to the supervisor, health aggregator and ops server
//!
//! # Design Decisions
//! - Built once at startup from config and passed by `Arc` (no global
//!   mutable state, no string-keyed singletons)
//! - Immutable after construction; breakers themselves carry the locks

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::schema::GuardConfig;
use crate::lifecycle::Shutdown;
use crate::resilience::circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, StateChangeHook,
};

pub struct BreakerRegistry {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Build one breaker per configured dependency, all sharing the same
    /// optional transition hook.
    pub fn from_config(config: &GuardConfig, hook: Option<StateChangeHook>) -> Self {
        let mut breakers = HashMap::new();
        for dependency in &config.dependencies {
            let mut breaker = CircuitBreaker::new(&dependency.name, &dependency.breaker);
            if let Some(hook) = &hook {
                breaker = breaker.with_state_change_hook(hook.clone());
            }
            breakers.insert(dependency.name.clone(), Arc::new(breaker));
        }
        Self { breakers }
    }

    /// Registry over pre-built breakers; used by tests.
    pub fn from_breakers(breakers: Vec<Arc<CircuitBreaker>>) -> Self {
        Self {
            breakers: breakers
                .into_iter()
                .map(|b| (b.name().to_string(), b))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshots for every breaker, sorted by name for stable output.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<BreakerSnapshot> =
            self.breakers.values().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Start each breaker's window rotation task.
    pub fn spawn_rotation_tasks(&self, shutdown: &Shutdown) -> Vec<tokio::task::JoinHandle<()>> {
        self.breakers
            .values()
            .map(|breaker| breaker.spawn_rotation(shutdown.subscribe()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BreakerConfig, DependencyConfig};

    fn config_with(names: &[&str]) -> GuardConfig {
        GuardConfig {
            dependencies: names
                .iter()
                .map(|name| DependencyConfig {
                    name: name.to_string(),
                    base_url: format!("http://127.0.0.1:9000/{name}"),
                    health_path: "/health".to_string(),
                    fallback_message: None,
                    breaker: BreakerConfig::default(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn builds_one_breaker_per_dependency() {
        let registry = BreakerRegistry::from_config(&config_with(&["text-gen", "image-gen"]), None);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("text-gen").is_some());
        assert!(registry.get("image-gen").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["image-gen", "text-gen"]);
    }

    #[test]
    fn snapshots_are_sorted_by_name() {
        let registry = BreakerRegistry::from_config(&config_with(&["zeta", "alpha"]), None);
        let snapshots = registry.snapshots();
        assert_eq!(snapshots[0].name, "alpha");
        assert_eq!(snapshots[1].name, "zeta");
    }
}
