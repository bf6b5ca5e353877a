//! Circuit breakers to stop hammering a failing dependency.
//!
//! Each dependency has its own breaker so one slow service never blocks
//! calls to the others. Breakers are pure state machines: every transition
//! takes the current instant as an argument, so behavior is deterministic.
//!
//! There are two states. Once the cooldown has elapsed, the next
//! `should_allow` closes the circuit and resets the failure count; the
//! trial call that follows is an ordinary call.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use fleetwise_core::DependencyName;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed calls before opening the circuit
    pub failure_threshold: u32,

    /// How long the circuit stays open after the last failure
    #[serde(with = "crate::config::duration")]
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through
    Closed,

    /// Calls fail fast until the cooldown elapses
    Open,
}

#[derive(Debug)]
struct Breaker {
    config: CircuitBreakerConfig,
    consecutive_failures: u32,
    state: CircuitState,
    last_failure: Option<Instant>,
}

impl Breaker {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
            state: CircuitState::Closed,
            last_failure: None,
        }
    }

    fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        if self.state != CircuitState::Open {
            return None;
        }
        let elapsed = self
            .last_failure
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or(Duration::MAX);
        self.config.cooldown.checked_sub(elapsed).filter(|d| !d.is_zero())
    }
}

/// Read-only view of one breaker, for health output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub dependency: DependencyName,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_ms: Option<u64>,
}

/// One circuit breaker per dependency.
///
/// Each slot has its own lock, so concurrent calls on different
/// dependencies never contend.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    slots: [Mutex<Breaker>; 3],
}

impl CircuitBreakerRegistry {
    /// Same configuration for every dependency.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::from_fn(|_| config.clone())
    }

    /// Per-dependency configuration.
    pub fn from_fn(mut config_for: impl FnMut(DependencyName) -> CircuitBreakerConfig) -> Self {
        Self {
            slots: DependencyName::ALL.map(|d| Mutex::new(Breaker::new(config_for(d)))),
        }
    }

    fn slot(&self, dependency: DependencyName) -> &Mutex<Breaker> {
        let index = match dependency {
            DependencyName::Weather => 0,
            DependencyName::Traffic => 1,
            DependencyName::Fleet => 2,
        };
        &self.slots[index]
    }

    /// Whether a call to `dependency` may go out at `now`.
    ///
    /// An open circuit whose cooldown has elapsed is closed here, with its
    /// failure count reset.
    pub fn should_allow(&self, dependency: DependencyName, now: Instant) -> bool {
        let mut breaker = self.slot(dependency).lock();
        match breaker.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if breaker.cooldown_remaining(now).is_some() {
                    return false;
                }
                breaker.state = CircuitState::Closed;
                breaker.consecutive_failures = 0;
                tracing::info!(dependency = %dependency, "Circuit closed after cooldown, allowing trial call");
                true
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self, dependency: DependencyName) {
        let mut breaker = self.slot(dependency).lock();
        if breaker.state == CircuitState::Open {
            tracing::info!(dependency = %dependency, "Circuit closed after successful call");
        }
        breaker.consecutive_failures = 0;
        breaker.state = CircuitState::Closed;
    }

    /// Record a failed call (one per exhausted retry loop).
    pub fn record_failure(&self, dependency: DependencyName, now: Instant) {
        let mut breaker = self.slot(dependency).lock();
        breaker.consecutive_failures = breaker.consecutive_failures.saturating_add(1);
        breaker.last_failure = Some(now);

        if breaker.consecutive_failures >= breaker.config.failure_threshold {
            if breaker.state != CircuitState::Open {
                tracing::warn!(
                    dependency = %dependency,
                    failures = breaker.consecutive_failures,
                    cooldown = ?breaker.config.cooldown,
                    "Circuit opened after repeated failures"
                );
            }
            breaker.state = CircuitState::Open;
        }
    }

    /// Current state, without applying cooldown expiry.
    pub fn state(&self, dependency: DependencyName) -> CircuitState {
        self.slot(dependency).lock().state
    }

    pub fn consecutive_failures(&self, dependency: DependencyName) -> u32 {
        self.slot(dependency).lock().consecutive_failures
    }

    /// Effective view at `now`.
    ///
    /// An open circuit whose cooldown has elapsed is reported as it will be
    /// after the next `should_allow`: closed, with no failures. The stored
    /// state is left untouched.
    pub fn snapshot(&self, dependency: DependencyName, now: Instant) -> BreakerSnapshot {
        let breaker = self.slot(dependency).lock();
        let remaining = breaker.cooldown_remaining(now);
        let expired = breaker.state == CircuitState::Open && remaining.is_none();

        BreakerSnapshot {
            dependency,
            state: if expired { CircuitState::Closed } else { breaker.state },
            consecutive_failures: if expired { 0 } else { breaker.consecutive_failures },
            failure_threshold: breaker.config.failure_threshold,
            cooldown_remaining_ms: remaining.map(|d| d.as_millis() as u64),
        }
    }

    /// Snapshots for all dependencies in canonical order.
    pub fn snapshots(&self, now: Instant) -> Vec<BreakerSnapshot> {
        DependencyName::ALL
            .iter()
            .map(|d| self.snapshot(*d, now))
            .collect()
    }

    /// Close every circuit.
    pub fn reset(&self) {
        for slot in &self.slots {
            let mut breaker = slot.lock();
            breaker.consecutive_failures = 0;
            breaker.state = CircuitState::Closed;
            breaker.last_failure = None;
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
