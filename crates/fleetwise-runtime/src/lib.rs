//! # fleetwise-runtime
//!
//! Resilient orchestration for fleetwise delivery decisions.
//!
//! `fleetwise-core` decides; this crate gathers the inputs. Each request
//! fans out to the weather, traffic and fleet services in parallel, and
//! every call goes through:
//!
//! - a per-dependency circuit breaker that fails fast during outages
//! - a bounded retry loop with fixed or exponential backoff
//! - a hard per-attempt timeout
//!
//! Aggregated responses are cached per `(city, capacity)` for a short TTL.
//! A dependency that cannot be reached is reported in the response, never
//! raised as an error.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fleetwise_runtime::{Orchestrator, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_file("registry.yaml")?;
//! let orchestrator = Orchestrator::from_config(config)?;
//!
//! let response = orchestrator.optimize_delivery(Some("Colombo"), Some("500")).await?;
//! println!("{}", response.decision.recommendation);
//! ```

pub mod cache;
pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod resilience;
pub mod upstream;

pub use cache::{CacheKey, ResponseCache};
pub use config::{ConfigError, RuntimeConfig, ServiceConfig};
pub use metrics::{Metrics, MetricsSnapshot};
pub use orchestrator::{HealthReport, Orchestrator, OrchestratorBuilder, OrchestratorError};
pub use resilience::{
    BackoffStrategy, BreakerSnapshot, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
    ResilientCaller, RetryPolicy,
};
pub use upstream::{HttpUpstream, Upstream, UpstreamError, UpstreamRequest};
