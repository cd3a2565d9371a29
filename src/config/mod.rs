//! # Configuration Management
//!
//! Environment-aware configuration for the resilience and caching core. It
//! allows different guard behaviors in production, development, and test
//! environments, with per-field environment variable overrides.

use crate::rate_limit::{Action, Tier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tracing::{info, warn};

/// Top-level configuration for the core, aggregated per concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardianConfig {
    pub governor: GovernorSettings,
    pub circuit_breakers: CircuitBreakerSettings,
    pub rate_limits: RateLimitSettings,
    pub cache: CacheSettings,
}

/// Defaults for governed query execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorSettings {
    /// Per-attempt deadline for a guarded datastore call, in milliseconds
    pub timeout_ms: u64,
    /// Additional attempts after the first failure (total attempts = retries + 1)
    pub retries: u32,
    /// Default chunk size for batched query execution
    pub batch_size: usize,
    /// Pause between batches, in milliseconds (the throttling mechanism)
    pub batch_delay_ms: u64,
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            retries: 2,
            batch_size: 10,
            batch_delay_ms: 100,
        }
    }
}

impl GovernorSettings {
    /// Get query timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get batch delay as Duration
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

/// Circuit breaker settings: a default plus per-component overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Whether circuit breakers are enabled globally
    pub enabled: bool,
    /// Default configuration for new circuit breakers
    pub default_config: ComponentBreakerConfig,
    /// Specific configurations for named operations
    pub component_configs: HashMap<String, ComponentBreakerConfig>,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_config: ComponentBreakerConfig::default(),
            component_configs: HashMap::new(),
        }
    }
}

impl CircuitBreakerSettings {
    /// Get configuration for a specific operation name
    pub fn config_for_component(&self, component_name: &str) -> ComponentBreakerConfig {
        self.component_configs
            .get(component_name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }
}

/// Circuit breaker configuration for a single guarded operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentBreakerConfig {
    /// Failures within the monitoring period before the circuit opens
    pub failure_threshold: u32,
    /// Time to wait in open state before attempting recovery, in seconds
    pub reset_timeout_seconds: u64,
    /// Consecutive half-open successes required to close the circuit
    pub success_threshold: u32,
    /// Window within which failures accumulate toward the threshold, in seconds
    pub monitoring_period_seconds: u64,
}

impl Default for ComponentBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_seconds: 30,
            success_threshold: 2,
            monitoring_period_seconds: 60,
        }
    }
}

impl ComponentBreakerConfig {
    /// Get reset timeout as Duration
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_seconds)
    }

    /// Get monitoring period as Duration
    pub fn monitoring_period(&self) -> Duration {
        Duration::from_secs(self.monitoring_period_seconds)
    }
}

/// Rate limit settings: window size plus the tier/action quota table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Fixed window size, in seconds
    pub window_seconds: u64,
    /// Overrides keyed `"<action>:<tier>"`, e.g. `"generate:free"`
    pub limit_overrides: HashMap<String, u32>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_seconds: 60,
            limit_overrides: HashMap::new(),
        }
    }
}

impl RateLimitSettings {
    /// Get window size as Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    /// Requests allowed per window for an action/tier pair.
    ///
    /// Admins are effectively unmetered; anonymous callers get the tightest
    /// quotas on the expensive AI-backed actions.
    pub fn limit_for(&self, action: Action, tier: Tier) -> u32 {
        let key = format!("{action}:{tier}");
        if let Some(limit) = self.limit_overrides.get(&key) {
            return *limit;
        }

        match (action, tier) {
            (_, Tier::Admin) => 1000,
            (Action::Generate, Tier::Anonymous) => 5,
            (Action::Generate, Tier::Free) => 10,
            (Action::Generate, Tier::Pro) => 60,
            (Action::Analyze, Tier::Anonymous) => 3,
            (Action::Analyze, Tier::Free) => 10,
            (Action::Analyze, Tier::Pro) => 30,
            (Action::Favorites, Tier::Anonymous) => 20,
            (Action::Favorites, _) => 60,
            (Action::Waitlist, _) => 5,
            (Action::Hooks, Tier::Anonymous) => 30,
            (Action::Hooks, _) => 120,
        }
    }
}

/// Configuration for cache behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Default entry TTL, in seconds
    pub default_ttl_seconds: u64,
    /// Application-level schema version stamped into entries; ignored by the
    /// cache itself
    pub version: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: 300,
            version: "v1".to_string(),
        }
    }
}

impl CacheSettings {
    /// Get default TTL as Duration
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }
}

impl GuardianConfig {
    /// Create test-optimized configuration with rapid expiry and recovery
    pub fn for_test() -> Self {
        Self {
            governor: GovernorSettings {
                timeout_ms: 1000,
                retries: 1,
                batch_size: 10,
                batch_delay_ms: 10,
            },
            circuit_breakers: CircuitBreakerSettings {
                enabled: true,
                default_config: ComponentBreakerConfig {
                    failure_threshold: 2,
                    reset_timeout_seconds: 1,
                    success_threshold: 2,
                    monitoring_period_seconds: 10,
                },
                component_configs: HashMap::new(),
            },
            rate_limits: RateLimitSettings {
                window_seconds: 1,
                limit_overrides: HashMap::new(),
            },
            cache: CacheSettings {
                enabled: true,
                default_ttl_seconds: 1,
                version: "test".to_string(),
            },
        }
    }

    /// Load configuration from environment or use defaults
    pub fn from_environment() -> Self {
        let environment = env::var("GUARDIAN_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .or_else(|_| env::var("RUST_ENV"))
            .unwrap_or_else(|_| "production".to_string());

        let config = match environment.as_str() {
            "test" => {
                info!("Loading test guardian configuration (rapid expiry)");
                Self::for_test()
            }
            _ => Self::default(),
        };

        config.with_env_overrides()
    }

    /// Apply environment variable overrides to configuration
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(timeout) = env::var("GUARDIAN_QUERY_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                self.governor.timeout_ms = ms;
                info!("Query timeout override: {}ms", ms);
            }
        }

        if let Ok(retries) = env::var("GUARDIAN_QUERY_RETRIES") {
            if let Ok(n) = retries.parse::<u32>() {
                self.governor.retries = n;
                info!("Query retries override: {}", n);
            }
        }

        if let Ok(threshold) = env::var("GUARDIAN_CB_FAILURE_THRESHOLD") {
            if let Ok(n) = threshold.parse::<u32>() {
                self.circuit_breakers.default_config.failure_threshold = n;
                info!("Circuit breaker failure threshold override: {}", n);
            }
        }

        if let Ok(reset) = env::var("GUARDIAN_CB_RESET_TIMEOUT_SECONDS") {
            if let Ok(seconds) = reset.parse::<u64>() {
                self.circuit_breakers.default_config.reset_timeout_seconds = seconds;
                info!("Circuit breaker reset timeout override: {}s", seconds);
            }
        }

        if let Ok(window) = env::var("GUARDIAN_RATE_LIMIT_WINDOW_SECONDS") {
            if let Ok(seconds) = window.parse::<u64>() {
                self.rate_limits.window_seconds = seconds;
                info!("Rate limit window override: {}s", seconds);
            }
        }

        if let Ok(enabled) = env::var("GUARDIAN_CACHE_ENABLED") {
            self.cache.enabled = enabled.parse().unwrap_or(self.cache.enabled);
            info!("Cache enabled override: {}", self.cache.enabled);
        }

        if let Ok(ttl) = env::var("GUARDIAN_CACHE_TTL_SECONDS") {
            if let Ok(seconds) = ttl.parse::<u64>() {
                self.cache.default_ttl_seconds = seconds;
                info!("Cache TTL override: {}s", seconds);
            }
        }

        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.governor.timeout_ms == 0 {
            return Err("Query timeout must be greater than 0".to_string());
        }

        if self.circuit_breakers.default_config.failure_threshold == 0 {
            return Err("Circuit breaker failure threshold must be greater than 0".to_string());
        }

        if self.circuit_breakers.default_config.success_threshold == 0 {
            return Err("Circuit breaker success threshold must be greater than 0".to_string());
        }

        if self.rate_limits.window_seconds == 0 {
            return Err("Rate limit window must be greater than 0".to_string());
        }

        if self.cache.default_ttl_seconds == 0 {
            warn!("Cache default TTL is 0 - caching effectively disabled");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let config = GuardianConfig::default();
        assert_eq!(config.governor.timeout_ms, 5000);
        assert_eq!(config.governor.retries, 2);
        assert_eq!(config.circuit_breakers.default_config.failure_threshold, 5);
        assert!(config.circuit_breakers.default_config.reset_timeout_seconds >= 30);
        assert_eq!(config.rate_limits.window_seconds, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn component_config_falls_back_to_default() {
        let mut settings = CircuitBreakerSettings::default();
        settings.component_configs.insert(
            "generate".to_string(),
            ComponentBreakerConfig {
                failure_threshold: 3,
                ..ComponentBreakerConfig::default()
            },
        );

        assert_eq!(settings.config_for_component("generate").failure_threshold, 3);
        assert_eq!(settings.config_for_component("favorites").failure_threshold, 5);
    }

    #[test]
    fn limit_table_respects_overrides() {
        let mut settings = RateLimitSettings::default();
        assert_eq!(settings.limit_for(Action::Generate, Tier::Free), 10);
        assert_eq!(settings.limit_for(Action::Generate, Tier::Admin), 1000);

        settings
            .limit_overrides
            .insert("generate:free".to_string(), 25);
        assert_eq!(settings.limit_for(Action::Generate, Tier::Free), 25);
    }

    #[test]
    fn env_overrides_apply() {
        let _guard = crate::logging::ENV_LOCK.lock().unwrap();
        std::env::set_var("GUARDIAN_QUERY_TIMEOUT_MS", "2500");
        let config = GuardianConfig::default().with_env_overrides();
        assert_eq!(config.governor.timeout_ms, 2500);
        std::env::remove_var("GUARDIAN_QUERY_TIMEOUT_MS");
    }
}
