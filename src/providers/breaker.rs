//! Per-provider circuit breaker.
//!
//! Wraps every provider call so that a failing vendor API is cut off
//! instead of absorbing request after request. Standard closed/open/
//! half-open state machine; failures only count toward the trip threshold
//! while they sit inside a rolling monitoring window.
//!
//! # States
//!
//! - **Closed**: calls pass through, failures accumulate in the window
//! - **Open**: calls rejected immediately until the recovery timeout elapses
//! - **Half-Open**: one probe call allowed; success closes, failure reopens

use std::collections::VecDeque;
use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::BreakerConfig;
use crate::error::{ProviderError, ProviderResult};

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls allowed
    Closed,
    /// Blocking all calls - too many failures
    Open,
    /// Testing recovery - allowing one probe
    HalfOpen,
}

impl CircuitState {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CircuitState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "closed" => Ok(CircuitState::Closed),
            "open" => Ok(CircuitState::Open),
            "half_open" => Ok(CircuitState::HalfOpen),
            _ => Err(format!("Unknown circuit state: {}", s)),
        }
    }
}

/// Circuit breaker state machine for a single provider.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    /// Current state
    state: CircuitState,

    /// Failure timestamps within the monitoring window
    failures: VecDeque<DateTime<Utc>>,

    /// Total failures since creation
    total_failures: u32,

    /// Total successes since creation
    total_successes: u32,

    /// Time of last failure
    last_failure: Option<DateTime<Utc>>,

    /// Time of last state change
    last_state_change: DateTime<Utc>,

    /// Configuration
    config: BreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            total_failures: 0,
            total_successes: 0,
            last_failure: None,
            last_state_change: Utc::now(),
            config,
        }
    }

    /// Check if a call can be executed.
    ///
    /// Returns `true` when the circuit is closed, or when it is open but
    /// the recovery timeout has elapsed (transitioning to half-open for
    /// one probe).
    pub fn can_execute(&mut self) -> bool {
        self.prune_window();
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if let Some(last_fail) = self.last_failure {
                    let elapsed = Utc::now() - last_fail;
                    let timeout = Duration::milliseconds(self.config.recovery_timeout_ms as i64);
                    if elapsed >= timeout {
                        self.transition_to(CircuitState::HalfOpen);
                        return true;
                    }
                }
                false
            }
            CircuitState::HalfOpen => true, // Allow the probe
        }
    }

    /// Record a successful call.
    pub fn record_success(&mut self) {
        self.failures.clear();
        self.total_successes += 1;

        match self.state {
            CircuitState::HalfOpen => {
                // One probe success is enough to close
                self.transition_to(CircuitState::Closed);
            }
            CircuitState::Open => {
                // Shouldn't happen, but handle gracefully
                tracing::warn!("Success recorded while circuit is open - closing");
                self.transition_to(CircuitState::Closed);
            }
            CircuitState::Closed => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&mut self) {
        let now = Utc::now();
        self.failures.push_back(now);
        self.total_failures += 1;
        self.last_failure = Some(now);
        self.prune_window();

        match self.state {
            CircuitState::Closed => {
                if self.failures.len() as u32 >= self.config.failure_threshold {
                    self.transition_to(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                // Probe failed - back to open
                self.transition_to(CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Drop failures that have aged out of the monitoring window.
    fn prune_window(&mut self) {
        let window = Duration::milliseconds(self.config.monitoring_period_ms as i64);
        let cutoff = Utc::now() - window;
        while let Some(oldest) = self.failures.front() {
            if *oldest <= cutoff {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    /// Transition to a new state.
    fn transition_to(&mut self, new_state: CircuitState) {
        tracing::info!(
            from = %self.state,
            to = %new_state,
            window_failures = self.failures.len(),
            "Circuit breaker state transition"
        );
        self.state = new_state;
        self.last_state_change = Utc::now();
    }

    /// Get the current state.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Failures currently counted inside the monitoring window.
    pub fn failure_count(&self) -> u32 {
        let window = Duration::milliseconds(self.config.monitoring_period_ms as i64);
        let cutoff = Utc::now() - window;
        self.failures.iter().filter(|t| **t > cutoff).count() as u32
    }

    /// Get total failures count.
    pub fn total_failures(&self) -> u32 {
        self.total_failures
    }

    /// Get total successes count.
    pub fn total_successes(&self) -> u32 {
        self.total_successes
    }

    /// Get last failure time.
    pub fn last_failure(&self) -> Option<DateTime<Utc>> {
        self.last_failure
    }

    /// Check if the circuit is open (blocking calls).
    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }

    /// Check if the circuit is closed (allowing calls).
    pub fn is_closed(&self) -> bool {
        self.state == CircuitState::Closed
    }

    /// Get time until the next recovery probe (if open).
    pub fn time_until_recovery(&self) -> Option<Duration> {
        if self.state != CircuitState::Open {
            return None;
        }

        self.last_failure.map(|last_fail| {
            let timeout = Duration::milliseconds(self.config.recovery_timeout_ms as i64);
            let elapsed = Utc::now() - last_fail;
            if elapsed >= timeout {
                Duration::zero()
            } else {
                timeout - elapsed
            }
        })
    }

    /// Manually reset the circuit breaker to closed state.
    pub fn reset(&mut self) {
        tracing::info!(
            from = %self.state,
            "Circuit breaker manually reset to closed"
        );
        self.state = CircuitState::Closed;
        self.failures.clear();
        self.last_state_change = Utc::now();
    }

    /// Get a snapshot of the current state for health reporting.
    pub fn summary(&self) -> BreakerSummary {
        BreakerSummary {
            state: self.state,
            failure_count: self.failure_count(),
            total_failures: self.total_failures,
            total_successes: self.total_successes,
            time_until_recovery_ms: self.time_until_recovery().map(|d| d.num_milliseconds()),
        }
    }
}

/// Snapshot of circuit breaker state, serialized into `/api/health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSummary {
    /// Current state
    pub state: CircuitState,
    /// Failures inside the monitoring window
    pub failure_count: u32,
    /// Total failures
    pub total_failures: u32,
    /// Total successes
    pub total_successes: u32,
    /// Time until recovery probe (if open)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_until_recovery_ms: Option<i64>,
}

impl std::fmt::Display for BreakerSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Circuit Breaker: {} ", self.state.to_string().to_uppercase())?;

        match self.state {
            CircuitState::Closed => {
                write!(f, "({} failures in window)", self.failure_count)
            }
            CircuitState::Open => {
                if let Some(ms) = self.time_until_recovery_ms {
                    let secs = ms / 1000;
                    if secs > 60 {
                        write!(f, "(recovery in {}m)", secs / 60)
                    } else {
                        write!(f, "(recovery in {}s)", secs)
                    }
                } else {
                    write!(f, "(recovering soon)")
                }
            }
            CircuitState::HalfOpen => {
                write!(f, "(probing)")
            }
        }
    }
}

/// Mutex-wrapped breaker shared across request handlers.
///
/// The registry holds one per provider; state transitions are serialized
/// through the lock, which is never held across a provider call.
#[derive(Debug)]
pub struct SharedBreaker {
    provider: String,
    inner: Mutex<CircuitBreaker>,
}

impl SharedBreaker {
    /// Create a breaker for the named provider.
    pub fn new(provider: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            provider: provider.into(),
            inner: Mutex::new(CircuitBreaker::new(config)),
        }
    }

    /// Run `f` through the breaker.
    ///
    /// Rejects with [`ProviderError::CircuitOpen`] without invoking `f`
    /// when the circuit is open; otherwise records the outcome of `f`.
    pub async fn execute<T, F, Fut>(&self, f: F) -> ProviderResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        self.try_acquire().await?;

        match f().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(e) => {
                self.record_failure().await;
                Err(e)
            }
        }
    }

    /// Check admission without running anything.
    ///
    /// Used by the streaming path, which records the outcome itself once
    /// the stream finishes.
    pub async fn try_acquire(&self) -> ProviderResult<()> {
        let mut breaker = self.inner.lock().await;
        if breaker.can_execute() {
            Ok(())
        } else {
            Err(ProviderError::CircuitOpen {
                provider: self.provider.clone(),
                failure_count: breaker.failure_count(),
            })
        }
    }

    /// Record a successful call.
    pub async fn record_success(&self) {
        self.inner.lock().await.record_success();
    }

    /// Record a failed call.
    pub async fn record_failure(&self) {
        self.inner.lock().await.record_failure();
    }

    /// Current state.
    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state()
    }

    /// Snapshot for health reporting.
    pub async fn summary(&self) -> BreakerSummary {
        self.inner.lock().await.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            recovery_timeout_ms: 60_000,
            monitoring_period_ms: 120_000,
        }
    }

    #[test]
    fn test_initial_state_is_closed() {
        let cb = CircuitBreaker::new(test_config());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.is_closed());
        assert!(!cb.is_open());
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let mut cb = CircuitBreaker::new(test_config());

        // First two failures - still closed
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        // Third failure - opens
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.is_open());
    }

    #[test]
    fn test_success_clears_failure_window() {
        let mut cb = CircuitBreaker::new(test_config());

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.failure_count(), 2);

        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_can_execute_when_closed() {
        let mut cb = CircuitBreaker::new(test_config());
        assert!(cb.can_execute());
    }

    #[test]
    fn test_cannot_execute_when_open() {
        let mut cb = CircuitBreaker::new(test_config());
        cb.record_failure();
        cb.record_failure();
        cb.record_failure();

        assert!(!cb.can_execute());
    }

    #[test]
    fn test_recovery_timeout_allows_probe() {
        let mut cb = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            recovery_timeout_ms: 0,
            monitoring_period_ms: 120_000,
        });

        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_open());

        // Zero timeout: the next admission check transitions to half-open
        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_closes_after_one_success() {
        let mut cb = CircuitBreaker::new(test_config());

        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        // Simulate elapsed recovery timeout
        cb.state = CircuitState::HalfOpen;

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_reopens_on_failure() {
        let mut cb = CircuitBreaker::new(test_config());

        cb.record_failure();
        cb.record_failure();
        cb.record_failure();

        cb.state = CircuitState::HalfOpen;

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_expired_failures_do_not_count() {
        // Zero-length window: every failure ages out immediately
        let mut cb = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            recovery_timeout_ms: 60_000,
            monitoring_period_ms: 0,
        });

        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        cb.record_failure();

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.total_failures(), 4);
    }

    #[test]
    fn test_reset() {
        let mut cb = CircuitBreaker::new(test_config());
        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_open());

        cb.reset();
        assert!(cb.is_closed());
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_summary_display() {
        let cb = CircuitBreaker::new(test_config());
        let summary = cb.summary();
        let display = summary.to_string();
        assert!(display.contains("CLOSED"));
    }

    #[test]
    fn test_circuit_state_string_conversion() {
        assert_eq!(CircuitState::Closed.as_str(), "closed");
        assert_eq!(CircuitState::Open.as_str(), "open");
        assert_eq!(CircuitState::HalfOpen.as_str(), "half_open");

        assert_eq!(
            "closed".parse::<CircuitState>().unwrap(),
            CircuitState::Closed
        );
        assert_eq!("open".parse::<CircuitState>().unwrap(), CircuitState::Open);
        assert_eq!(
            "half_open".parse::<CircuitState>().unwrap(),
            CircuitState::HalfOpen
        );
    }

    #[tokio::test]
    async fn test_shared_breaker_execute_success() {
        let breaker = SharedBreaker::new("test", test_config());

        let result: ProviderResult<u32> = breaker.execute(|| async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_shared_breaker_rejects_when_open() {
        let breaker = SharedBreaker::new("test", test_config());

        for _ in 0..3 {
            let _: ProviderResult<u32> = breaker
                .execute(|| async {
                    Err(ProviderError::Api {
                        provider: "test".to_string(),
                        status: 500,
                        message: "boom".to_string(),
                    })
                })
                .await;
        }

        // Fails fast without invoking the closure
        let mut invoked = false;
        let result: ProviderResult<u32> = breaker
            .execute(|| {
                invoked = true;
                async { Ok(1) }
            })
            .await;

        assert!(!invoked);
        assert!(matches!(result, Err(ProviderError::CircuitOpen { .. })));
    }
}
