//! Resilience patterns for fleetwise-runtime.
//!
//! This module provides:
//! - Per-dependency circuit breakers
//! - Retry policies with fixed or exponential backoff
//! - The resilient caller that combines both around an upstream

mod caller;
mod circuit_breaker;
mod retry;

pub use caller::ResilientCaller;
pub use circuit_breaker::{
    BreakerSnapshot, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
};
pub use retry::{BackoffStrategy, RetryPolicy};
