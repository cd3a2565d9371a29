//! # Circuit Breaker Implementation
//!
//! Fault isolation for guarded operations, following the classic circuit
//! breaker pattern with three states: Closed (normal operation), Open
//! (failing fast), and Half-Open (testing recovery with a single probe).
//!
//! Each guarded operation name owns an independent breaker instance; a
//! failure in operation "generate" never affects the breaker for
//! "favorites". Only errors from executing the wrapped operation count
//! toward the failure threshold — timeouts included, open-circuit
//! rejections not.

use crate::config::ComponentBreakerConfig;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - a single probe call allowed at a time
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Errors produced by a breaker-wrapped call
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// Circuit is open (or the half-open probe slot is taken); the wrapped
    /// operation was not executed
    #[error("circuit breaker open for {operation}, retry after {}s", retry_after.as_secs())]
    CircuitOpen {
        operation: String,
        retry_after: Duration,
    },

    /// Operation executed and failed; the failure was recorded
    #[error("operation failed: {0}")]
    OperationFailed(E),
}

/// Counter snapshot for a single breaker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakerMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub current_state: Option<CircuitState>,
}

/// Admission decision for one call.
enum CallSlot {
    Admitted { probe: bool },
    Rejected { retry_after: Duration },
}

/// Mutable breaker bookkeeping, protected by a single mutex.
#[derive(Debug)]
struct BreakerInner {
    metrics: BreakerMetrics,
    /// Start of the current failure-monitoring window
    window_started_at: Instant,
    /// Time when the circuit was opened (for reset timeout calculations)
    opened_at: Option<Instant>,
}

/// Core circuit breaker with atomic state word and mutex-held counters.
///
/// State is process-local: across stateless instances each process tracks
/// its own view of dependency health, which is best-effort by design.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Operation name for logging and metrics
    name: String,

    /// Current circuit state (atomic for lock-free reads)
    state: AtomicU8,

    /// Set while a half-open probe call is in flight; at most one probe
    /// executes at a time
    probe_in_flight: AtomicBool,

    config: ComponentBreakerConfig,

    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for the given operation name
    pub fn new(name: String, config: ComponentBreakerConfig) -> Self {
        info!(
            operation = %name,
            failure_threshold = config.failure_threshold,
            reset_timeout_seconds = config.reset_timeout_seconds,
            success_threshold = config.success_threshold,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            probe_in_flight: AtomicBool::new(false),
            config,
            inner: Mutex::new(BreakerInner {
                metrics: BreakerMetrics::default(),
                window_started_at: Instant::now(),
                opened_at: None,
            }),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Operation name this breaker guards
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// An open circuit rejects immediately without executing the operation.
    /// After the reset timeout, the next call transitions the breaker to
    /// half-open and runs as the probe.
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let is_probe = match self.acquire_call_slot().await {
            CallSlot::Admitted { probe } => probe,
            CallSlot::Rejected { retry_after } => {
                return Err(BreakerError::CircuitOpen {
                    operation: self.name.clone(),
                    retry_after,
                });
            }
        };

        let result = operation().await;

        // The probe permit is owned by the call that claimed it and is
        // released only here, after the probe has finished executing.
        if is_probe {
            self.probe_in_flight.store(false, Ordering::Release);
        }

        match &result {
            Ok(_) => self.record_success().await,
            Err(_) => self.record_failure().await,
        }

        result.map_err(BreakerError::OperationFailed)
    }

    /// Decide whether a call may proceed and whether it runs as the probe.
    async fn acquire_call_slot(&self) -> CallSlot {
        match self.state() {
            CircuitState::Closed => CallSlot::Admitted { probe: false },
            CircuitState::Open => {
                let opened_at = { self.inner.lock().await.opened_at };
                let remaining = match opened_at {
                    Some(opened_at) => self
                        .config
                        .reset_timeout()
                        .checked_sub(opened_at.elapsed()),
                    None => {
                        // Cleared timestamp usually means another caller
                        // just won the half-open swap; contend for the
                        // probe permit. A circuit still open without a
                        // timestamp should not happen; admit the call
                        // rather than wedge the operation.
                        if self.state() == CircuitState::Open {
                            warn!(operation = %self.name, "Circuit open but no timestamp recorded");
                            return CallSlot::Admitted { probe: false };
                        }
                        return self.try_claim_probe();
                    }
                };

                if let Some(retry_after) = remaining {
                    if !retry_after.is_zero() {
                        return CallSlot::Rejected { retry_after };
                    }
                }

                // Reset timeout elapsed. Exactly one caller can win the
                // Open -> HalfOpen swap; everyone, winner included, then
                // contends for the single probe permit.
                if self
                    .state
                    .compare_exchange(
                        CircuitState::Open as u8,
                        CircuitState::HalfOpen as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.note_half_open().await;
                }
                self.try_claim_probe()
            }
            CircuitState::HalfOpen => self.try_claim_probe(),
        }
    }

    /// Claim the half-open probe permit. At most one call holds it at a
    /// time; everyone else is rejected.
    fn try_claim_probe(&self) -> CallSlot {
        if self
            .probe_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            CallSlot::Admitted { probe: true }
        } else {
            CallSlot::Rejected {
                retry_after: Duration::from_secs(1),
            }
        }
    }

    /// Record a successful operation
    async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.metrics.total_calls += 1;
        inner.metrics.success_count += 1;

        match self.state() {
            CircuitState::HalfOpen => {
                inner.metrics.half_open_successes += 1;
                debug!(
                    operation = %self.name,
                    successes = inner.metrics.half_open_successes,
                    success_threshold = self.config.success_threshold,
                    "🟡 Half-open probe succeeded"
                );
                if inner.metrics.half_open_successes >= self.config.success_threshold {
                    drop(inner);
                    self.transition_to_closed().await;
                }
            }
            CircuitState::Closed => {
                // Success resets the failure streak
                inner.metrics.consecutive_failures = 0;
            }
            CircuitState::Open => {
                warn!(operation = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a failed operation
    async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.metrics.total_calls += 1;
        inner.metrics.failure_count += 1;

        match self.state() {
            CircuitState::Closed => {
                // Failures only accumulate within the monitoring period
                if inner.window_started_at.elapsed() > self.config.monitoring_period() {
                    inner.window_started_at = Instant::now();
                    inner.metrics.consecutive_failures = 0;
                }
                inner.metrics.consecutive_failures += 1;
                debug!(
                    operation = %self.name,
                    consecutive_failures = inner.metrics.consecutive_failures,
                    failure_threshold = self.config.failure_threshold,
                    "🔴 Operation failed"
                );
                if inner.metrics.consecutive_failures >= self.config.failure_threshold {
                    drop(inner);
                    self.transition_to_open().await;
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open state immediately re-opens
                drop(inner);
                self.transition_to_open().await;
            }
            CircuitState::Open => {
                // Already open, just record the failure
            }
        }
    }

    /// Transition to closed state (normal operation)
    async fn transition_to_closed(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.probe_in_flight.store(false, Ordering::Release);

        let mut inner = self.inner.lock().await;
        inner.metrics.consecutive_failures = 0;
        inner.metrics.half_open_successes = 0;
        inner.window_started_at = Instant::now();
        inner.opened_at = None;

        info!(
            operation = %self.name,
            total_calls = inner.metrics.total_calls,
            "🟢 Circuit breaker closed (recovered)"
        );
    }

    /// Transition to open state (failing fast)
    async fn transition_to_open(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        self.probe_in_flight.store(false, Ordering::Release);

        let mut inner = self.inner.lock().await;
        inner.opened_at = Some(Instant::now());
        inner.metrics.half_open_successes = 0;

        error!(
            operation = %self.name,
            consecutive_failures = inner.metrics.consecutive_failures,
            reset_timeout_seconds = self.config.reset_timeout_seconds,
            "🔴 Circuit breaker opened (failing fast)"
        );
    }

    /// Bookkeeping for the caller that won the Open -> HalfOpen swap. The
    /// state word itself was already updated by the winning
    /// compare_exchange.
    async fn note_half_open(&self) {
        let mut inner = self.inner.lock().await;
        inner.metrics.half_open_successes = 0;
        inner.opened_at = None;

        info!(
            operation = %self.name,
            success_threshold = self.config.success_threshold,
            "🟡 Circuit breaker half-open (testing recovery)"
        );
    }

    /// Force circuit to open state (for emergency situations)
    pub async fn force_open(&self) {
        warn!(operation = %self.name, "🚨 Circuit breaker forced open");
        self.transition_to_open().await;
    }

    /// Force circuit to closed state (for emergency recovery)
    pub async fn force_closed(&self) {
        warn!(operation = %self.name, "🚨 Circuit breaker forced closed");
        self.transition_to_closed().await;
    }

    /// Get current metrics snapshot
    pub async fn metrics(&self) -> BreakerMetrics {
        let inner = self.inner.lock().await;
        let mut snapshot = inner.metrics.clone();
        snapshot.current_state = Some(self.state());
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use tokio::time::sleep;

    fn test_config(failure_threshold: u32, success_threshold: u32) -> ComponentBreakerConfig {
        ComponentBreakerConfig {
            failure_threshold,
            reset_timeout_seconds: 1,
            success_threshold,
            monitoring_period_seconds: 60,
        }
    }

    #[tokio::test]
    async fn normal_operation_stays_closed() {
        let breaker = CircuitBreaker::new("test".to_string(), ComponentBreakerConfig::default());
        assert_eq!(breaker.state(), CircuitState::Closed);

        let result = breaker.call(|| async { Ok::<_, String>("success") }).await;
        assert!(result.is_ok());

        let metrics = breaker.metrics().await;
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failure_count, 0);
    }

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let breaker = CircuitBreaker::new("test".to_string(), test_config(3, 2));

        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<(), _>("error") }).await;
            assert_eq!(breaker.state(), CircuitState::Closed);
        }

        let _ = breaker.call(|| async { Err::<(), _>("error") }).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_invoking() {
        let breaker = CircuitBreaker::new("test".to_string(), test_config(2, 2));
        let _ = breaker.call(|| async { Err::<(), _>("error") }).await;
        let _ = breaker.call(|| async { Err::<(), _>("error") }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let invoked = Arc::new(AtomicU32::new(0));
        let invoked_clone = invoked.clone();
        let result = breaker
            .call(move || async move {
                invoked_clone.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("should not execute")
            })
            .await;

        match result {
            Err(BreakerError::CircuitOpen { retry_after, .. }) => {
                assert!(retry_after > Duration::ZERO);
            }
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn recovers_through_half_open_success_streak() {
        let breaker = CircuitBreaker::new("test".to_string(), test_config(1, 2));

        let _ = breaker.call(|| async { Err::<(), _>("error") }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        sleep(Duration::from_millis(1100)).await;

        // First probe transitions to half-open and succeeds.
        let result = breaker.call(|| async { Ok::<_, String>(1) }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // Second consecutive success closes the circuit.
        let result = breaker.call(|| async { Ok::<_, String>(2) }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new("test".to_string(), test_config(1, 2));

        let _ = breaker.call(|| async { Err::<(), _>("error") }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        sleep(Duration::from_millis(1100)).await;

        let _ = breaker.call(|| async { Err::<(), _>("still broken") }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        // Back to rejecting immediately.
        let result = breaker.call(|| async { Ok::<_, String>(1) }).await;
        assert!(matches!(result, Err(BreakerError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn half_open_admits_one_probe_at_a_time() {
        let breaker = Arc::new(CircuitBreaker::new(
            "test".to_string(),
            test_config(1, 2),
        ));

        let _ = breaker.call(|| async { Err::<(), _>("error") }).await;
        sleep(Duration::from_millis(1100)).await;

        // Start a slow probe; while it holds the slot, a second call is
        // rejected instead of executing concurrently.
        let slow = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| async {
                        sleep(Duration::from_millis(200)).await;
                        Ok::<_, String>("probe")
                    })
                    .await
            })
        };

        sleep(Duration::from_millis(50)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let second = breaker.call(|| async { Ok::<_, String>("rejected") }).await;
        assert!(matches!(second, Err(BreakerError::CircuitOpen { .. })));

        assert!(slow.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn concurrent_callers_after_reset_admit_single_probe() {
        let breaker = Arc::new(CircuitBreaker::new("test".to_string(), test_config(1, 2)));

        let _ = breaker.call(|| async { Err::<(), _>("error") }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        sleep(Duration::from_millis(1100)).await;

        // Every caller arrives after the reset deadline, so each sees Open
        // and attempts the half-open transition; only one may execute.
        let invoked = Arc::new(AtomicU32::new(0));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let breaker = breaker.clone();
                let invoked = invoked.clone();
                tokio::spawn(async move {
                    breaker
                        .call(|| async {
                            invoked.fetch_add(1, Ordering::SeqCst);
                            sleep(Duration::from_millis(100)).await;
                            Ok::<_, String>(())
                        })
                        .await
                })
            })
            .collect();

        let results = futures::future::join_all(tasks).await;
        let admitted = results
            .into_iter()
            .filter(|r| r.as_ref().unwrap().is_ok())
            .count();

        assert_eq!(admitted, 1);
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn force_operations() {
        let breaker = CircuitBreaker::new("test".to_string(), ComponentBreakerConfig::default());

        breaker.force_open().await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.force_closed().await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
