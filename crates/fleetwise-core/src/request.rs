//! Delivery request parsing and validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for malformed local input.
///
/// These are the only errors that end a request early.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Both city and capacity parameters are required (missing: {0})")]
    MissingField(&'static str),

    #[error("Invalid capacity '{0}': expected a non-negative integer")]
    InvalidCapacity(String),
}

/// A validated delivery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    /// City as given by the caller, trimmed
    pub city: String,

    /// Required vehicle capacity in kilograms
    #[serde(rename = "required_capacity")]
    pub capacity: u32,
}

impl DeliveryRequest {
    /// Build a request from an already-typed capacity.
    pub fn new(city: impl Into<String>, capacity: u32) -> Result<Self, ValidationError> {
        let city = city.into();
        let city = city.trim();
        if city.is_empty() {
            return Err(ValidationError::MissingField("city"));
        }

        Ok(Self {
            city: city.to_string(),
            capacity,
        })
    }

    /// Parse raw caller input, e.g. query parameters.
    pub fn parse(city: Option<&str>, capacity: Option<&str>) -> Result<Self, ValidationError> {
        let city = city
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(ValidationError::MissingField("city"))?;

        let raw_capacity = capacity
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(ValidationError::MissingField("capacity"))?;

        let capacity = raw_capacity
            .parse::<u32>()
            .map_err(|_| ValidationError::InvalidCapacity(raw_capacity.to_string()))?;

        Self::new(city, capacity)
    }

    /// City normalized for cache lookups.
    pub fn normalized_city(&self) -> String {
        self.city.to_lowercase()
    }
}
