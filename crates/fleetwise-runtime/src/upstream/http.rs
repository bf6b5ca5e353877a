//! HTTP transport for the upstream services.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::time::Duration;

use fleetwise_core::{DependencyName, JsonMap};

use super::{Upstream, UpstreamError, UpstreamRequest};
use crate::config::RuntimeConfig;

/// Calls each dependency with `GET <base_url><endpoint>?<query>`.
///
/// One `reqwest::Client` is shared by all dependencies so connections are
/// pooled. The timeout is applied per request.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    endpoints: BTreeMap<DependencyName, String>,
}

impl HttpUpstream {
    /// Create a transport from explicit endpoint URLs.
    pub fn new(endpoints: BTreeMap<DependencyName, String>) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("fleetwise/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::HttpError(e.to_string()))?;

        Ok(Self { client, endpoints })
    }

    /// Create a transport for the services in a runtime config.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, UpstreamError> {
        let endpoints = DependencyName::ALL
            .iter()
            .map(|d| (*d, config.service(*d).url()))
            .collect();
        Self::new(endpoints)
    }

    /// URL used for a dependency.
    pub fn endpoint(&self, dependency: DependencyName) -> Option<&str> {
        self.endpoints.get(&dependency).map(String::as_str)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(
        &self,
        request: &UpstreamRequest,
        timeout: Duration,
    ) -> Result<JsonMap, UpstreamError> {
        let url = self.endpoint(request.dependency).ok_or_else(|| {
            UpstreamError::NotConfigured(format!("no endpoint for {}", request.dependency))
        })?;

        let response = self
            .client
            .get(url)
            .query(&request.query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout(timeout)
                } else {
                    UpstreamError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let body: JsonValue = response.json().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout(timeout)
            } else {
                UpstreamError::InvalidBody(e.to_string())
            }
        })?;

        match body {
            JsonValue::Object(map) => Ok(map),
            other => Err(UpstreamError::InvalidBody(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetwise_core::DeliveryRequest;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn upstream_for(server: &MockServer) -> HttpUpstream {
        let mut config = RuntimeConfig::default();
        for dependency in DependencyName::ALL {
            config.service_mut(dependency).base_url = server.uri();
        }
        HttpUpstream::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_passes_query_and_decodes_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/traffic"))
            .and(query_param("city", "Colombo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "city": "Colombo",
                "congestion_level": "Moderate"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let upstream = upstream_for(&server);
        let request = DeliveryRequest::new("Colombo", 500).unwrap();
        let payload = upstream
            .fetch(
                &UpstreamRequest::for_delivery(DependencyName::Traffic, &request),
                Duration::from_secs(2),
            )
            .await
            .unwrap();

        assert_eq!(payload["congestion_level"], "Moderate");
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(path("/fleet/available"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let upstream = upstream_for(&server);
        let err = upstream
            .fetch(&UpstreamRequest::new(DependencyName::Fleet), Duration::from_secs(2))
            .await
            .unwrap_err();

        assert!(matches!(err, UpstreamError::Status { status: 503 }));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(path("/weather"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"condition": "Sunny"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let upstream = upstream_for(&server);
        let err = upstream
            .fetch(&UpstreamRequest::new(DependencyName::Weather), Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, UpstreamError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_non_object_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["Sunny"])))
            .mount(&server)
            .await;
        Mock::given(path("/traffic"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let upstream = upstream_for(&server);
        let timeout = Duration::from_secs(2);

        let err = upstream
            .fetch(&UpstreamRequest::new(DependencyName::Weather), timeout)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidBody(ref msg) if msg.contains("an array")));

        let err = upstream
            .fetch(&UpstreamRequest::new(DependencyName::Traffic), timeout)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidBody(_)));
    }

    #[test]
    fn test_endpoints_from_config() {
        let upstream = HttpUpstream::from_config(&RuntimeConfig::default()).unwrap();
        assert_eq!(upstream.name(), "http");
        assert_eq!(
            upstream.endpoint(DependencyName::Fleet),
            Some("http://localhost:5003/fleet/available")
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_http_error() {
        let mut endpoints = BTreeMap::new();
        endpoints.insert(DependencyName::Weather, "http://127.0.0.1:9/weather".to_string());
        let upstream = HttpUpstream::new(endpoints).unwrap();

        let err = upstream
            .fetch(&UpstreamRequest::new(DependencyName::Weather), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::HttpError(_) | UpstreamError::Timeout(_)));

        let err = upstream
            .fetch(&UpstreamRequest::new(DependencyName::Fleet), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::NotConfigured(_)));
    }
}
