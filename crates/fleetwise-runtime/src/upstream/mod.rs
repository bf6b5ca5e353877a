//! Upstream transport abstraction.
//!
//! The resilient caller talks to dependencies only through [`Upstream`], so
//! the HTTP implementation can be swapped for a scripted one in tests.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use fleetwise_core::{DeliveryRequest, DependencyName, JsonMap};

mod http;

pub use http::HttpUpstream;

/// Errors from a single upstream attempt.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Upstream returned status {status}")]
    Status { status: u16 },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response body: {0}")]
    InvalidBody(String),

    #[error("Upstream not configured: {0}")]
    NotConfigured(String),
}

/// One outbound call to a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub dependency: DependencyName,

    /// Query string parameters, in order
    pub query: Vec<(&'static str, String)>,
}

impl UpstreamRequest {
    pub fn new(dependency: DependencyName) -> Self {
        Self {
            dependency,
            query: Vec::new(),
        }
    }

    /// The call a delivery request makes to `dependency`.
    ///
    /// Weather takes no parameters, traffic takes the city and fleet takes
    /// the required capacity.
    pub fn for_delivery(dependency: DependencyName, request: &DeliveryRequest) -> Self {
        let query = match dependency {
            DependencyName::Weather => Vec::new(),
            DependencyName::Traffic => vec![("city", request.city.clone())],
            DependencyName::Fleet => vec![("capacity", request.capacity.to_string())],
        };
        Self { dependency, query }
    }
}

/// Transport to the upstream services.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Perform one attempt. The implementation must give up after `timeout`.
    async fn fetch(
        &self,
        request: &UpstreamRequest,
        timeout: Duration,
    ) -> Result<JsonMap, UpstreamError>;

    /// Transport name for logs.
    fn name(&self) -> &str;
}
