//! Delivery orchestration.
//!
//! The orchestrator turns a raw `(city, capacity)` request into an
//! [`AggregatedResponse`]:
//! - Validation before any I/O
//! - Cache lookup keyed on the normalized request
//! - Parallel fan-out to weather, traffic and fleet via tokio::join!
//! - Deterministic fan-in through `fleetwise_core::aggregate`
//!
//! Upstream problems never surface as errors here. Only malformed input
//! ends a request early.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use fleetwise_core::{AggregatedResponse, DeliveryRequest, DependencyName, ValidationError};

use crate::cache::{CacheKey, ResponseCache};
use crate::config::{ConfigError, RuntimeConfig};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::resilience::{BreakerSnapshot, CircuitBreakerRegistry, ResilientCaller};
use crate::upstream::{HttpUpstream, Upstream, UpstreamError, UpstreamRequest};

/// Errors from building or using the orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Upstream transport error: {0}")]
    Upstream(#[from] UpstreamError),
}

impl OrchestratorError {
    /// Whether the caller, not the environment, is at fault.
    pub fn is_validation(&self) -> bool {
        matches!(self, OrchestratorError::Validation(_))
    }
}

/// Read-only view of the orchestrator's shared state.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub metrics: MetricsSnapshot,
    pub breakers: Vec<BreakerSnapshot>,
    pub cached_entries: u64,
    pub checked_at: DateTime<Utc>,
}

type InFlight = Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>;

/// Holds the per-key gate for one aggregation and unregisters it on drop.
struct Flight<'a> {
    in_flight: &'a InFlight,
    key: CacheKey,
    gate: Arc<AsyncMutex<()>>,
    _permit: OwnedMutexGuard<()>,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut map = self.in_flight.lock();
        // map entry + our handle + the permit: nobody else is waiting
        if Arc::strong_count(&self.gate) <= 3 {
            map.remove(&self.key);
        }
    }
}

/// Fans a delivery request out to the three dependencies and decides.
pub struct Orchestrator {
    config: RuntimeConfig,
    caller: ResilientCaller,
    breakers: Arc<CircuitBreakerRegistry>,
    cache: ResponseCache,
    metrics: Metrics,
    in_flight: InFlight,
}

impl Orchestrator {
    /// Create an orchestrator over a custom transport.
    pub fn new(upstream: Arc<dyn Upstream>, config: RuntimeConfig) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::from_fn(|d| config.breaker_config(d)));

        let mut caller = ResilientCaller::new(
            upstream,
            breakers.clone(),
            config.resilience.retry.clone(),
        );
        for dependency in DependencyName::ALL {
            caller = caller.with_policy(dependency, config.retry_policy(dependency));
        }

        let cache = ResponseCache::with_retention(config.cache.max_entries, config.cache.ttl);

        Self {
            config,
            caller,
            breakers,
            cache,
            metrics: Metrics::new(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Validate `config` and talk to the services it names over HTTP.
    pub fn from_config(config: RuntimeConfig) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let upstream = HttpUpstream::from_config(&config)?;
        Ok(Self::new(Arc::new(upstream), config))
    }

    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Optimize a delivery using the current time.
    pub async fn optimize_delivery(
        &self,
        city: Option<&str>,
        capacity: Option<&str>,
    ) -> Result<Arc<AggregatedResponse>, OrchestratorError> {
        self.optimize_delivery_at(city, capacity, Instant::now()).await
    }

    /// Optimize a delivery as of `now`.
    ///
    /// # Execution Flow
    /// 1. Count the request (validation failures included)
    /// 2. Validate input
    /// 3. Return a fresh cached response if there is one
    /// 4. Otherwise call all dependencies in parallel, decide and cache
    pub async fn optimize_delivery_at(
        &self,
        city: Option<&str>,
        capacity: Option<&str>,
        now: Instant,
    ) -> Result<Arc<AggregatedResponse>, OrchestratorError> {
        self.metrics.record_request();

        let request = DeliveryRequest::parse(city, capacity)?;
        Ok(self.optimize(request, now).await)
    }

    /// Optimize an already-validated request as of `now`.
    ///
    /// Does not count toward `total_requests`.
    pub async fn optimize(&self, request: DeliveryRequest, now: Instant) -> Arc<AggregatedResponse> {
        let key = CacheKey::from_request(&request);

        if let Some(hit) = self.cached(&key, now).await {
            return hit;
        }

        if !self.config.cache.single_flight {
            tracing::debug!(city = %request.city, capacity = request.capacity, "Cache miss");
            return self.execute(request, key, now).await;
        }

        let _flight = self.enter(&key).await;

        // Another task may have filled the entry while we waited
        if let Some(hit) = self.cached(&key, now).await {
            return hit;
        }

        tracing::debug!(city = %request.city, capacity = request.capacity, "Cache miss");
        self.execute(request, key, now).await
    }

    async fn cached(&self, key: &CacheKey, now: Instant) -> Option<Arc<AggregatedResponse>> {
        let hit = self.cache.get(key, now, self.config.cache.ttl).await?;
        self.metrics.record_cache_hit();
        tracing::debug!(city = %hit.input.city, capacity = hit.input.capacity, "Cache hit");
        Some(hit)
    }

    /// Wait for exclusive use of `key`.
    async fn enter(&self, key: &CacheKey) -> Flight<'_> {
        let gate = self
            .in_flight
            .lock()
            .entry(key.clone())
            .or_default()
            .clone();
        let permit = gate.clone().lock_owned().await;

        Flight {
            in_flight: &self.in_flight,
            key: key.clone(),
            gate,
            _permit: permit,
        }
    }

    async fn execute(
        &self,
        request: DeliveryRequest,
        key: CacheKey,
        now: Instant,
    ) -> Arc<AggregatedResponse> {
        self.metrics.record_agent_execution();
        let started = tokio::time::Instant::now();

        let [weather, traffic, fleet] =
            DependencyName::ALL.map(|d| UpstreamRequest::for_delivery(d, &request));

        // Fan-out: all three dependencies in parallel
        let (weather, traffic, fleet) = tokio::join!(
            self.caller.call(&weather, now),
            self.caller.call(&traffic, now),
            self.caller.call(&fleet, now),
        );

        // Fan-in: deterministic decision
        let response = Arc::new(fleetwise_core::aggregate(request, weather, traffic, fleet));

        tracing::info!(
            city = %response.input.city,
            capacity = response.input.capacity,
            recommendation = %response.decision.recommendation,
            "Delivery optimized"
        );

        // Freshness runs from when the response was stored, not requested
        let stored_at = now + started.elapsed();
        self.cache.put(key, response.clone(), stored_at).await;
        response
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn breaker_states(&self, now: Instant) -> Vec<BreakerSnapshot> {
        self.breakers.snapshots(now)
    }

    pub async fn health(&self, now: Instant) -> HealthReport {
        HealthReport {
            metrics: self.metrics(),
            breakers: self.breaker_states(now),
            cached_entries: self.cache.len().await,
            checked_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Close every circuit.
    pub fn reset_breakers(&self) {
        self.breakers.reset();
    }
}

/// Builder for Orchestrator.
pub struct OrchestratorBuilder {
    config: RuntimeConfig,
    upstream: Option<Arc<dyn Upstream>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            upstream: None,
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom transport instead of HTTP.
    pub fn upstream(mut self, upstream: Arc<dyn Upstream>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Validate the configuration and build the orchestrator.
    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        self.config.validate()?;
        let upstream = match self.upstream {
            Some(upstream) => upstream,
            None => Arc::new(HttpUpstream::from_config(&self.config)?),
        };
        Ok(Orchestrator::new(upstream, self.config))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
