//! # fleetwise-core
//!
//! Deterministic delivery decision logic for fleetwise.
//!
//! This crate answers one question: given what the weather, traffic and
//! fleet services said (or failed to say), should a delivery proceed?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same dependency outcomes always produce the same decision
//! 2. **No I/O**: Calling upstreams, retrying and caching live in `fleetwise-runtime`
//! 3. **Failure-tolerant**: A failed dependency is explained, never fatal
//!
//! ## Example
//!
//! ```rust,ignore
//! use fleetwise_core::{aggregate, DeliveryRequest, DependencyResult};
//!
//! let request = DeliveryRequest::parse(Some("Colombo"), Some("500"))?;
//! let response = aggregate(request, weather, traffic, DependencyResult::unavailable());
//!
//! println!("{}: {:?}", response.decision.recommendation, response.decision.explanation);
//! ```

pub mod decision;
pub mod request;
pub mod types;

// Re-export main types at crate root
pub use decision::DecisionEngine;
pub use request::{DeliveryRequest, ValidationError};
pub use types::{
    AggregatedResponse, DecisionResult, DependencyName, DependencyResult, FailureReason, JsonMap,
    Recommendation,
};

use chrono::Utc;

/// Fuse three dependency outcomes into a decision.
pub fn decide(
    weather: &DependencyResult,
    traffic: &DependencyResult,
    fleet: &DependencyResult,
) -> DecisionResult {
    DecisionEngine::new().decide(weather, traffic, fleet)
}

/// Build the full response for a request, stamped with the current time.
pub fn aggregate(
    input: DeliveryRequest,
    weather: DependencyResult,
    traffic: DependencyResult,
    fleet: DependencyResult,
) -> AggregatedResponse {
    let decision = decide(&weather, &traffic, &fleet);

    AggregatedResponse {
        input,
        weather,
        traffic,
        fleet,
        decision,
        generated_at: Utc::now(),
    }
}
