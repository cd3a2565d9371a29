//! # Circuit Breaker Manager
//!
//! Explicit breaker-by-name registry, constructed once at process start and
//! owned by the query governor. One breaker instance exists per logical
//! operation name, auto-created on first use from per-component or default
//! configuration.
//!
//! State is process-local and therefore approximate across stateless
//! instances: each process observes its own failures and opens its own
//! circuits. This is an accepted tradeoff — no distributed coordination is
//! attempted.

use crate::config::CircuitBreakerSettings;
use crate::resilience::circuit_breaker::{BreakerMetrics, CircuitBreaker};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Registry of circuit breakers keyed by operation name.
#[derive(Debug)]
pub struct CircuitBreakerManager {
    settings: CircuitBreakerSettings,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerManager {
    /// Create a manager from circuit breaker settings
    pub fn from_config(settings: CircuitBreakerSettings) -> Self {
        Self {
            settings,
            breakers: DashMap::new(),
        }
    }

    /// Whether circuit breakers are enabled at all
    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Get (or create) the breaker for an operation name.
    ///
    /// The same `Arc` is returned for every call with the same name, so all
    /// callers share one state machine per operation.
    pub fn breaker_for(&self, operation_name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(operation_name) {
            return existing.clone();
        }

        let entry = self
            .breakers
            .entry(operation_name.to_string())
            .or_insert_with(|| {
                debug!(operation = %operation_name, "Auto-creating circuit breaker");
                Arc::new(CircuitBreaker::new(
                    operation_name.to_string(),
                    self.settings.config_for_component(operation_name),
                ))
            });
        entry.clone()
    }

    /// Number of registered breakers
    pub fn breaker_count(&self) -> usize {
        self.breakers.len()
    }

    /// Metrics snapshot for every registered breaker
    pub async fn metrics_snapshot(&self) -> HashMap<String, BreakerMetrics> {
        let mut snapshot = HashMap::new();
        let breakers: Vec<(String, Arc<CircuitBreaker>)> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (name, breaker) in breakers {
            snapshot.insert(name, breaker.metrics().await);
        }
        snapshot
    }

    /// Force every registered breaker closed (emergency recovery)
    pub async fn force_all_closed(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for breaker in breakers {
            breaker.force_closed().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComponentBreakerConfig;
    use crate::resilience::circuit_breaker::CircuitState;

    fn manager_with_threshold(threshold: u32) -> CircuitBreakerManager {
        let settings = CircuitBreakerSettings {
            enabled: true,
            default_config: ComponentBreakerConfig {
                failure_threshold: threshold,
                ..ComponentBreakerConfig::default()
            },
            component_configs: HashMap::new(),
        };
        CircuitBreakerManager::from_config(settings)
    }

    #[tokio::test]
    async fn same_name_returns_same_breaker() {
        let manager = manager_with_threshold(5);
        let a = manager.breaker_for("generate");
        let b = manager.breaker_for("generate");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.breaker_count(), 1);
    }

    #[tokio::test]
    async fn breakers_are_isolated_per_operation() {
        let manager = manager_with_threshold(1);

        let generate = manager.breaker_for("generate");
        let _ = generate.call(|| async { Err::<(), _>("error") }).await;
        assert_eq!(generate.state(), CircuitState::Open);

        // A failure in "generate" must not affect "favorites".
        let favorites = manager.breaker_for("favorites");
        assert_eq!(favorites.state(), CircuitState::Closed);
        let result = favorites.call(|| async { Ok::<_, String>(1) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn component_config_overrides_apply() {
        let mut settings = CircuitBreakerSettings::default();
        settings.component_configs.insert(
            "generate".to_string(),
            ComponentBreakerConfig {
                failure_threshold: 1,
                ..ComponentBreakerConfig::default()
            },
        );
        let manager = CircuitBreakerManager::from_config(settings);

        let generate = manager.breaker_for("generate");
        let _ = generate.call(|| async { Err::<(), _>("error") }).await;
        assert_eq!(generate.state(), CircuitState::Open);

        let metrics = manager.metrics_snapshot().await;
        assert_eq!(metrics["generate"].failure_count, 1);
    }
}
