//! Resilient upstream calls: breaker check, bounded retries, hard timeouts.
//!
//! The breaker absorbs sustained failure across calls, the retry loop
//! absorbs transient failure within one call. An exhausted retry loop
//! counts as exactly one failure toward the breaker.

use backon::{ConstantBuilder, ExponentialBuilder, Retryable};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fleetwise_core::{DependencyName, DependencyResult, JsonMap};

use super::{BackoffStrategy, CircuitBreakerRegistry, RetryPolicy};
use crate::upstream::{Upstream, UpstreamError, UpstreamRequest};

/// Wraps an [`Upstream`] with per-dependency breakers and retry policies.
pub struct ResilientCaller {
    upstream: Arc<dyn Upstream>,
    breakers: Arc<CircuitBreakerRegistry>,
    default_policy: RetryPolicy,
    policies: BTreeMap<DependencyName, RetryPolicy>,
}

impl ResilientCaller {
    /// Create a caller using `policy` for every dependency.
    pub fn new(
        upstream: Arc<dyn Upstream>,
        breakers: Arc<CircuitBreakerRegistry>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            upstream,
            breakers,
            default_policy: policy,
            policies: BTreeMap::new(),
        }
    }

    /// Override the retry policy for one dependency.
    pub fn with_policy(mut self, dependency: DependencyName, policy: RetryPolicy) -> Self {
        self.policies.insert(dependency, policy);
        self
    }

    pub fn policy(&self, dependency: DependencyName) -> &RetryPolicy {
        self.policies
            .get(&dependency)
            .unwrap_or(&self.default_policy)
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Call a dependency. Never fails: upstream problems become
    /// [`DependencyResult::Failure`].
    pub async fn call(&self, request: &UpstreamRequest, now: Instant) -> DependencyResult {
        let dependency = request.dependency;

        if !self.breakers.should_allow(dependency, now) {
            tracing::debug!(dependency = %dependency, "Circuit open, failing fast");
            return DependencyResult::circuit_open();
        }

        let policy = self.policy(dependency);
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let timeout = policy.attempt_timeout;
        let max_attempts = policy.attempts;

        let attempt = || async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let result = self.attempt(request, timeout).await;
            if let Err(e) = &result {
                tracing::warn!(
                    dependency = %dependency,
                    transport = self.upstream.name(),
                    attempt = n,
                    max_attempts,
                    error = %e,
                    "Upstream attempt failed"
                );
            }
            result
        };
        let notify = |_: &UpstreamError, delay: Duration| {
            tracing::debug!(dependency = %dependency, delay = ?delay, "Retrying after backoff");
        };

        let outcome = match &policy.backoff {
            BackoffStrategy::Fixed { delay } => {
                attempt
                    .retry(
                        ConstantBuilder::default()
                            .with_delay(*delay)
                            .with_max_times(policy.retries()),
                    )
                    .sleep(tokio::time::sleep)
                    .notify(notify)
                    .await
            }
            BackoffStrategy::Exponential { initial, max, factor } => {
                attempt
                    .retry(
                        ExponentialBuilder::default()
                            .with_min_delay(*initial)
                            .with_max_delay(*max)
                            .with_factor(*factor)
                            .with_max_times(policy.retries()),
                    )
                    .sleep(tokio::time::sleep)
                    .notify(notify)
                    .await
            }
        };

        match outcome {
            Ok(payload) => {
                self.breakers.record_success(dependency);
                DependencyResult::success(payload)
            }
            Err(e) => {
                tracing::warn!(
                    dependency = %dependency,
                    transport = self.upstream.name(),
                    attempts = counter.load(Ordering::SeqCst),
                    error = %e,
                    "Dependency unavailable after retries"
                );
                self.breakers.record_failure(dependency, now);
                DependencyResult::unavailable()
            }
        }
    }

    /// One attempt with a hard timeout, whatever the transport does.
    async fn attempt(
        &self,
        request: &UpstreamRequest,
        timeout: Duration,
    ) -> Result<JsonMap, UpstreamError> {
        match tokio::time::timeout(timeout, self.upstream.fetch(request, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(timeout)),
        }
    }
}
