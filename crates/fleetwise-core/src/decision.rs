//! Decision engine: fuses dependency outcomes into a recommendation.
//!
//! Rules run in a fixed order and every applicable rule appends to the
//! explanation:
//! 1. Each failed dependency → "<Dependency> service unavailable." (no
//!    effect on the recommendation)
//! 2. Traffic congestion High or Severe → DELAY
//! 3. Weather Stormy → DELAY
//! 4. Fleet reports no available vehicles → IMPOSSIBLE
//! 5. Nothing appended → PROCEED
//!
//! The recommendation is whatever the last applicable rule set. There is no
//! severity merge; IMPOSSIBLE wins over DELAY only because rule 4 runs last.

use serde_json::Value as JsonValue;

use crate::types::{DecisionResult, DependencyName, DependencyResult, Recommendation};

pub const HIGH_TRAFFIC: &str = "High traffic congestion detected.";
pub const SEVERE_WEATHER: &str = "Severe weather conditions.";
pub const NO_VEHICLES: &str = "No available vehicles with required capacity.";
pub const ALL_NORMAL: &str = "All systems operating normally.";

const CONGESTED_LEVELS: [&str; 2] = ["High", "Severe"];
const STORMY: &str = "Stormy";

/// The decision engine. Stateless and deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine;

impl DecisionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Apply the rule set to the three dependency outcomes.
    pub fn decide(
        &self,
        weather: &DependencyResult,
        traffic: &DependencyResult,
        fleet: &DependencyResult,
    ) -> DecisionResult {
        let mut recommendation = Recommendation::Proceed;
        let mut summary = "Proceed with delivery";
        let mut explanation = Vec::new();

        // Rule 1
        for (name, result) in [
            (DependencyName::Weather, weather),
            (DependencyName::Traffic, traffic),
            (DependencyName::Fleet, fleet),
        ] {
            if !result.is_success() {
                explanation.push(format!("{} service unavailable.", name.label()));
            }
        }

        // Rule 2
        if traffic
            .str_field("congestion_level")
            .is_some_and(|level| CONGESTED_LEVELS.contains(&level))
        {
            recommendation = Recommendation::Delay;
            summary = "Delay delivery due to traffic congestion";
            explanation.push(HIGH_TRAFFIC.to_string());
        }

        // Rule 3
        if weather.str_field("condition") == Some(STORMY) {
            recommendation = Recommendation::Delay;
            summary = "Delay delivery due to bad weather";
            explanation.push(SEVERE_WEATHER.to_string());
        }

        // Rule 4
        if fleet.payload().is_some_and(|p| no_vehicles(p.get("available_vehicles"))) {
            recommendation = Recommendation::Impossible;
            summary = "No available vehicles for required capacity";
            explanation.push(NO_VEHICLES.to_string());
        }

        // Rule 5
        if explanation.is_empty() {
            recommendation = Recommendation::Proceed;
            explanation.push(ALL_NORMAL.to_string());
        }

        DecisionResult {
            recommendation,
            explanation,
            summary: summary.to_string(),
        }
    }
}

/// Whether an `available_vehicles` field means "nothing available".
///
/// Missing, null, empty arrays and zero counts are all empty.
fn no_vehicles(field: Option<&JsonValue>) -> bool {
    match field {
        None | Some(JsonValue::Null) => true,
        Some(JsonValue::Array(vehicles)) => vehicles.is_empty(),
        Some(JsonValue::Number(count)) => count.as_f64() == Some(0.0),
        Some(JsonValue::Bool(flag)) => !flag,
        Some(JsonValue::String(s)) => s.is_empty(),
        Some(JsonValue::Object(o)) => o.is_empty(),
    }
}
