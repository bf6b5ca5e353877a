//! Domain types shared by the decision engine and the runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use crate::request::DeliveryRequest;

/// JSON object returned by an upstream service.
pub type JsonMap = serde_json::Map<String, JsonValue>;

/// The three upstream services a delivery decision depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyName {
    Weather,
    Traffic,
    Fleet,
}

impl DependencyName {
    /// All dependencies in canonical order.
    pub const ALL: [DependencyName; 3] = [
        DependencyName::Weather,
        DependencyName::Traffic,
        DependencyName::Fleet,
    ];

    /// Lower-case identifier, used in config keys and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyName::Weather => "weather",
            DependencyName::Traffic => "traffic",
            DependencyName::Fleet => "fleet",
        }
    }

    /// Capitalized name used in explanation text.
    pub fn label(&self) -> &'static str {
        match self {
            DependencyName::Weather => "Weather",
            DependencyName::Traffic => "Traffic",
            DependencyName::Fleet => "Fleet",
        }
    }
}

impl fmt::Display for DependencyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a dependency produced no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The breaker rejected the call without touching the network.
    #[serde(rename = "circuit open")]
    CircuitOpen,

    /// Every attempt failed (timeout, transport error, non-2xx, bad body).
    #[serde(rename = "service unavailable")]
    ServiceUnavailable,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::CircuitOpen => f.write_str("circuit open"),
            FailureReason::ServiceUnavailable => f.write_str("service unavailable"),
        }
    }
}

/// Outcome of calling one dependency.
///
/// Upstream problems are values, not errors: they never abort an
/// orchestration and are folded into the decision explanation instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DependencyResult {
    Success { payload: JsonMap },
    Failure { reason: FailureReason },
}

impl DependencyResult {
    pub fn success(payload: JsonMap) -> Self {
        Self::Success { payload }
    }

    pub fn circuit_open() -> Self {
        Self::Failure {
            reason: FailureReason::CircuitOpen,
        }
    }

    pub fn unavailable() -> Self {
        Self::Failure {
            reason: FailureReason::ServiceUnavailable,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(
            self,
            Self::Failure {
                reason: FailureReason::CircuitOpen
            }
        )
    }

    /// The payload, if the call succeeded.
    pub fn payload(&self) -> Option<&JsonMap> {
        match self {
            Self::Success { payload } => Some(payload),
            Self::Failure { .. } => None,
        }
    }

    /// A top-level payload field as a string.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.payload()?.get(field)?.as_str()
    }
}

/// Final delivery recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Proceed,
    Delay,
    Impossible,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Proceed => f.write_str("PROCEED"),
            Recommendation::Delay => f.write_str("DELAY"),
            Recommendation::Impossible => f.write_str("IMPOSSIBLE"),
        }
    }
}

/// Recommendation plus the reasons that led to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub recommendation: Recommendation,

    /// Reasons in rule evaluation order
    pub explanation: Vec<String>,

    /// One-line headline set by the last applicable rule
    pub summary: String,
}

/// Everything produced by one orchestration.
///
/// Immutable once built; the cache and the response path share it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResponse {
    pub input: DeliveryRequest,

    #[serde(rename = "weather_data")]
    pub weather: DependencyResult,

    #[serde(rename = "traffic_data")]
    pub traffic: DependencyResult,

    #[serde(rename = "fleet_data")]
    pub fleet: DependencyResult,

    pub decision: DecisionResult,

    pub generated_at: DateTime<Utc>,
}

impl AggregatedResponse {
    /// Result for a given dependency.
    pub fn dependency(&self, name: DependencyName) -> &DependencyResult {
        match name {
            DependencyName::Weather => &self.weather,
            DependencyName::Traffic => &self.traffic,
            DependencyName::Fleet => &self.fleet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dependency_result_serializes_tagged() {
        let mut payload = JsonMap::new();
        payload.insert("condition".to_string(), json!("Sunny"));

        let value = serde_json::to_value(DependencyResult::success(payload)).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["payload"]["condition"], "Sunny");

        let value = serde_json::to_value(DependencyResult::circuit_open()).unwrap();
        assert_eq!(value, json!({"status": "failure", "reason": "circuit open"}));
    }

    #[test]
    fn test_failure_reasons_are_distinguishable() {
        assert!(DependencyResult::circuit_open().is_circuit_open());
        assert!(!DependencyResult::unavailable().is_circuit_open());
        assert_eq!(FailureReason::ServiceUnavailable.to_string(), "service unavailable");
    }

    #[test]
    fn test_str_field_only_on_success() {
        let mut payload = JsonMap::new();
        payload.insert("congestion_level".to_string(), json!("High"));
        let ok = DependencyResult::success(payload);

        assert_eq!(ok.str_field("congestion_level"), Some("High"));
        assert_eq!(ok.str_field("missing"), None);
        assert_eq!(DependencyResult::unavailable().str_field("congestion_level"), None);
    }

    #[test]
    fn test_recommendation_wire_names() {
        assert_eq!(serde_json::to_value(Recommendation::Impossible).unwrap(), "IMPOSSIBLE");
        assert_eq!(Recommendation::Delay.to_string(), "DELAY");
    }
}
