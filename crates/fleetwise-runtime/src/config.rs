//! Runtime configuration.
//!
//! The document is the service registry (one entry per upstream with
//! `base_url` + `endpoint`) plus optional `resilience` and `cache` sections.
//! A registry with only the three service entries is a complete config.
//!
//! Durations are human-readable (`"30s"`, `"1500ms"`) or bare seconds.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use fleetwise_core::DependencyName;

use crate::resilience::{BackoffStrategy, CircuitBreakerConfig, RetryPolicy};

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Location of one upstream service, with optional per-service tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Scheme + host + port, e.g. "http://localhost:5001"
    pub base_url: String,

    /// Path appended to the base URL, e.g. "/weather"
    #[serde(default)]
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerOverride>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryOverride>,
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint: endpoint.into(),
            circuit_breaker: None,
            retry: None,
        }
    }

    /// Full request URL without query parameters.
    pub fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.endpoint.is_empty() || self.endpoint.starts_with('/') {
            format!("{}{}", base, self.endpoint)
        } else {
            format!("{}/{}", base, self.endpoint)
        }
    }
}

/// Per-service breaker settings; unset fields inherit the global ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,

    #[serde(default, with = "duration::option", skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<Duration>,
}

/// Per-service retry settings; unset fields inherit the global ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,

    #[serde(default, with = "duration::option", skip_serializing_if = "Option::is_none")]
    pub attempt_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffStrategy>,
}

/// Global resilience defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Longest accepted `cache.ttl`. It doubles as the cache retention period,
/// which moka caps at 1000 years.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum age of a cached response
    #[serde(with = "duration")]
    pub ttl: Duration,

    /// Upper bound on retained entries
    pub max_entries: u64,

    /// Coalesce concurrent identical misses into one aggregation
    pub single_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_entries: 10_000,
            single_flight: true,
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub weather_service: ServiceConfig,
    pub traffic_service: ServiceConfig,
    pub fleet_service: ServiceConfig,

    #[serde(default)]
    pub resilience: ResilienceConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for RuntimeConfig {
    /// The services on their usual local development ports.
    fn default() -> Self {
        Self {
            weather_service: ServiceConfig::new("http://localhost:5001", "/weather"),
            traffic_service: ServiceConfig::new("http://localhost:5002", "/traffic"),
            fleet_service: ServiceConfig::new("http://localhost:5003", "/fleet/available"),
            resilience: ResilienceConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load and validate a config file. `.json` files are parsed as JSON,
    /// everything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    /// Parse and validate YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn service(&self, dependency: DependencyName) -> &ServiceConfig {
        match dependency {
            DependencyName::Weather => &self.weather_service,
            DependencyName::Traffic => &self.traffic_service,
            DependencyName::Fleet => &self.fleet_service,
        }
    }

    pub fn service_mut(&mut self, dependency: DependencyName) -> &mut ServiceConfig {
        match dependency {
            DependencyName::Weather => &mut self.weather_service,
            DependencyName::Traffic => &mut self.traffic_service,
            DependencyName::Fleet => &mut self.fleet_service,
        }
    }

    /// Effective breaker settings for a dependency.
    pub fn breaker_config(&self, dependency: DependencyName) -> CircuitBreakerConfig {
        let global = &self.resilience.circuit_breaker;
        match &self.service(dependency).circuit_breaker {
            Some(o) => CircuitBreakerConfig {
                failure_threshold: o.failure_threshold.unwrap_or(global.failure_threshold),
                cooldown: o.cooldown.unwrap_or(global.cooldown),
            },
            None => global.clone(),
        }
    }

    /// Effective retry policy for a dependency.
    pub fn retry_policy(&self, dependency: DependencyName) -> RetryPolicy {
        let global = &self.resilience.retry;
        match &self.service(dependency).retry {
            Some(o) => RetryPolicy {
                attempts: o.attempts.unwrap_or(global.attempts),
                attempt_timeout: o.attempt_timeout.unwrap_or(global.attempt_timeout),
                backoff: o.backoff.clone().unwrap_or_else(|| global.backoff.clone()),
            },
            None => global.clone(),
        }
    }

    /// Check values that would otherwise fail at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for dependency in DependencyName::ALL {
            let service = self.service(dependency);
            if !service.base_url.starts_with("http://") && !service.base_url.starts_with("https://")
            {
                return Err(ConfigError::Invalid(format!(
                    "{}_service.base_url must start with http:// or https:// (got '{}')",
                    dependency, service.base_url
                )));
            }

            if self.breaker_config(dependency).failure_threshold == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} failure_threshold must be at least 1",
                    dependency
                )));
            }

            let retry = self.retry_policy(dependency);
            if retry.attempts == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} retry attempts must be at least 1",
                    dependency
                )));
            }
            if retry.attempt_timeout.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "{} attempt_timeout must be greater than zero",
                    dependency
                )));
            }
            retry
                .backoff
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("{} backoff: {}", dependency, e)))?;
        }

        if self.cache.ttl > MAX_CACHE_TTL {
            return Err(ConfigError::Invalid(format!(
                "cache.ttl must be at most {} (got {})",
                humantime::format_duration(MAX_CACHE_TTL),
                humantime::format_duration(self.cache.ttl)
            )));
        }

        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Serde helpers for human-readable durations.
pub(crate) mod duration {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    impl Raw {
        fn into_duration<E: de::Error>(self) -> Result<Duration, E> {
            match self {
                Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
                Raw::Text(text) => humantime::parse_duration(&text)
                    .map_err(|e| E::custom(format!("invalid duration '{}': {}", text, e))),
            }
        }
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Raw::deserialize(deserializer)?.into_duration()
    }

    pub mod option {
        use super::Raw;
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => serializer.collect_str(&humantime::format_duration(*d)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<Raw>::deserialize(deserializer)?
                .map(Raw::into_duration)
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY_JSON: &str = r#"{
        "weather_service": { "base_url": "http://localhost:5001", "endpoint": "/weather" },
        "traffic_service": { "base_url": "http://localhost:5002", "endpoint": "/traffic" },
        "fleet_service": { "base_url": "http://localhost:5003", "endpoint": "/fleet/available" }
    }"#;

    const REGISTRY_YAML: &str = r#"
weather_service: { base_url: "http://a", endpoint: "/w" }
traffic_service: { base_url: "http://b", endpoint: "/t" }
fleet_service: { base_url: "http://c", endpoint: "/f" }"#;

    #[test]
    fn test_plain_registry_gets_defaults() {
        let config = RuntimeConfig::from_json(REGISTRY_JSON).unwrap();

        assert_eq!(config.service(DependencyName::Traffic).url(), "http://localhost:5002/traffic");
        assert_eq!(config.cache.ttl, Duration::from_secs(60));

        let breaker = config.breaker_config(DependencyName::Weather);
        assert_eq!(breaker.failure_threshold, 3);
        assert_eq!(breaker.cooldown, Duration::from_secs(30));

        let retry = config.retry_policy(DependencyName::Fleet);
        assert_eq!(retry.attempts, 2);
        assert_eq!(retry.attempt_timeout, Duration::from_secs(3));
        assert_eq!(retry.backoff, BackoffStrategy::fixed(Duration::from_secs(1)));
    }

    #[test]
    fn test_yaml_with_overrides() {
        let yaml = r#"
weather_service:
  base_url: "http://weather.internal"
  endpoint: "/weather"
traffic_service:
  base_url: "http://traffic.internal/"
  endpoint: "traffic"
fleet_service:
  base_url: "https://fleet.internal"
  endpoint: "/fleet/available"
  circuit_breaker:
    failure_threshold: 5
  retry:
    attempts: 4
    attempt_timeout: 750ms
resilience:
  circuit_breaker:
    failure_threshold: 2
    cooldown: 1m
  retry:
    backoff:
      type: exponential
      initial: 100ms
      max: 2s
cache:
  ttl: 5
  max_entries: 100
  single_flight: false
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.service(DependencyName::Traffic).url(), "http://traffic.internal/traffic");
        assert_eq!(config.cache.ttl, Duration::from_secs(5));
        assert!(!config.cache.single_flight);

        let weather = config.breaker_config(DependencyName::Weather);
        assert_eq!(weather.failure_threshold, 2);
        assert_eq!(weather.cooldown, Duration::from_secs(60));

        let fleet = config.breaker_config(DependencyName::Fleet);
        assert_eq!(fleet.failure_threshold, 5);
        assert_eq!(fleet.cooldown, Duration::from_secs(60));

        let fleet_retry = config.retry_policy(DependencyName::Fleet);
        assert_eq!(fleet_retry.attempts, 4);
        assert_eq!(fleet_retry.attempt_timeout, Duration::from_millis(750));
        assert!(matches!(fleet_retry.backoff, BackoffStrategy::Exponential { .. }));

        assert_eq!(config.retry_policy(DependencyName::Weather).attempts, 2);
    }

    #[test]
    fn test_sample_registry_loads() {
        let config =
            RuntimeConfig::from_yaml(include_str!("../../../config/registry.yaml")).unwrap();

        assert_eq!(config.retry_policy(DependencyName::Fleet).attempts, 3);
        assert_eq!(config.retry_policy(DependencyName::Weather).attempts, 2);
        assert!(config.cache.single_flight);
    }

    #[test]
    fn test_rejects_bad_url() {
        let json = REGISTRY_JSON.replace("http://localhost:5002", "localhost:5002");
        let err = RuntimeConfig::from_json(&json).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("traffic_service")));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let mut config = RuntimeConfig::default();
        config.resilience.retry.attempts = 0;
        assert!(config.validate().is_err());

        let mut config = RuntimeConfig::default();
        config.service_mut(DependencyName::Weather).circuit_breaker = Some(CircuitBreakerOverride {
            failure_threshold: Some(0),
            cooldown: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_excessive_cache_ttl() {
        let yaml = format!("{}\ncache: {{ ttl: 2000years }}\n", REGISTRY_YAML);
        assert!(matches!(
            RuntimeConfig::from_yaml(&yaml),
            Err(ConfigError::Invalid(msg)) if msg.contains("cache.ttl")
        ));

        let mut config = RuntimeConfig::default();
        config.cache.ttl = MAX_CACHE_TTL;
        assert!(config.validate().is_ok());
        config.cache.ttl = MAX_CACHE_TTL + Duration::from_secs(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_duration() {
        let yaml = r#"
weather_service: { base_url: "http://a", endpoint: "/w" }
traffic_service: { base_url: "http://b", endpoint: "/t" }
fleet_service: { base_url: "http://c", endpoint: "/f" }
cache: { ttl: "soon", max_entries: 10, single_flight: true }
"#;
        assert!(matches!(
            RuntimeConfig::from_yaml(yaml),
            Err(ConfigError::YamlError(_))
        ));
    }

    #[test]
    fn test_serialized_config_reloads() {
        let config = RuntimeConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("30s"));
        assert_eq!(RuntimeConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("fleetwise-config-{}.json", std::process::id()));
        fs::write(&path, REGISTRY_JSON).unwrap();

        let config = RuntimeConfig::from_file(&path).unwrap();
        assert_eq!(config.fleet_service.endpoint, "/fleet/available");

        fs::remove_file(&path).unwrap();
        assert!(matches!(
            RuntimeConfig::from_file(&path),
            Err(ConfigError::IoError(_))
        ));
    }
}
