use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::{ServiceError, ServiceResult};
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// `{code, data, message}` wrapper used by the sibling services.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default)]
    pub message: String,
}

pub fn build_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?;
    Ok(client)
}

/// One downstream service: base URL, breaker and latency metrics.
///
/// Transport errors and 5xx responses count against the breaker; 4xx
/// responses are returned to the caller untouched.
pub struct ServiceClient {
    service: &'static str,
    base_url: String,
    http: reqwest::Client,
    breaker: CircuitBreaker,
    metrics: Arc<Metrics>,
}

impl ServiceClient {
    pub fn new(service: &'static str, base_url: &str, http: reqwest::Client, metrics: Arc<Metrics>) -> Self {
        Self {
            service,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            breaker: CircuitBreaker::new(service, CircuitBreakerConfig::default()),
            metrics,
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.http.get(self.url(path))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.http.post(self.url(path))
    }

    pub async fn send(&self, request: RequestBuilder) -> ServiceResult<Response> {
        let started = Instant::now();

        let result = self
            .breaker
            .call(async {
                let response = request.send().await.map_err(|e| e.to_string())?;
                if response.status().is_server_error() {
                    return Err(format!("responded {}", response.status()));
                }
                Ok(response)
            })
            .await;

        let succeeded = matches!(&result, Ok(response) if response.status().is_success());
        self.metrics
            .observe_outbound(self.service, succeeded, started.elapsed().as_secs_f64());
        self.metrics
            .set_circuit_state(self.service, self.breaker.state().await);

        result.map_err(|e| match e {
            CircuitBreakerError::CircuitOpen => ServiceError::unavailable(self.service, "circuit breaker open"),
            CircuitBreakerError::OperationFailed(message) => {
                tracing::warn!(service = self.service, error = %message, "Outbound call failed");
                ServiceError::unavailable(self.service, message)
            }
        })
    }

    /// Require `expected` and decode the envelope's `data`.
    pub async fn read_data<T: DeserializeOwned>(
        &self,
        response: Response,
        expected: StatusCode,
    ) -> ServiceResult<T> {
        let status = response.status();
        if status != expected {
            return Err(ServiceError::unavailable(
                self.service,
                format!("unexpected status {}", status),
            ));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ServiceError::unavailable(self.service, format!("malformed response: {}", e)))?;
        Ok(envelope.data)
    }

    /// Require `expected` and discard the body.
    pub fn require_status(&self, response: Response, expected: StatusCode) -> ServiceResult<()> {
        let status = response.status();
        if status != expected {
            return Err(ServiceError::unavailable(
                self.service,
                format!("unexpected status {}", status),
            ));
        }
        Ok(())
    }
}
