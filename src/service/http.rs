//! HTTP generation service adapter.
//!
//! POSTs `{prompt, context, config}` as JSON to a configured endpoint and
//! stores the response body in the artifact store. Context artifacts whose
//! bytes are held locally are sent hex-encoded alongside their reference.

use crate::artifact::ArtifactStore;
use crate::error::{ServiceError, ServiceErrorKind};
use crate::service::{GenerationConfig, GenerationRequest, GenerationService};
use crate::types::ArtifactRef;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const SERVICE_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP adapter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Generation endpoint URL
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token sent with every request
    #[serde(default)]
    pub api_key: Option<String>,

    /// Transport-level request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    180
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("endpoint must be an http(s) URL, got '{}'", endpoint));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct WireContext<'a> {
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_hex: Option<String>,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    prompt: &'a str,
    context: Vec<WireContext<'a>>,
    config: &'a GenerationConfig,
}

/// Map an HTTP status code to a service error kind.
pub fn classify_status(status: StatusCode) -> ServiceErrorKind {
    match status.as_u16() {
        429 => ServiceErrorKind::RateLimited,
        408 | 504 => ServiceErrorKind::Timeout,
        400 | 404 | 413 | 422 => ServiceErrorKind::InvalidRequest,
        401 | 403 => ServiceErrorKind::Denied,
        500..=599 => ServiceErrorKind::Unavailable,
        _ => ServiceErrorKind::Other,
    }
}

// Helper function to map transport errors to ServiceError
fn map_http_error(error: reqwest::Error) -> ServiceError {
    if let Some(status) = error.status() {
        ServiceError::new(
            classify_status(status),
            format!("Request failed with status {}: {}", status, error),
        )
    } else if error.is_timeout() {
        ServiceError::timeout(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ServiceError::new(
            ServiceErrorKind::Connection,
            format!("Connection error: {}", error),
        )
    } else {
        ServiceError::new(ServiceErrorKind::Other, format!("HTTP error: {}", error))
    }
}

/// Generation service reached over HTTP
pub struct HttpGenerationService {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    artifacts: Arc<ArtifactStore>,
}

impl HttpGenerationService {
    pub fn new(config: &ServiceConfig, artifacts: Arc<ArtifactStore>) -> Result<Self, ServiceError> {
        let endpoint = config.endpoint.clone().ok_or_else(|| {
            ServiceError::new(
                ServiceErrorKind::InvalidRequest,
                "No generation endpoint configured (set service.endpoint)",
            )
        })?;
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(SERVICE_HTTP_CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::new(
                    ServiceErrorKind::Other,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;
        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            artifacts,
        })
    }

    fn wire_context<'a>(&self, context: &'a [ArtifactRef]) -> Vec<WireContext<'a>> {
        context
            .iter()
            .map(|reference| WireContext {
                reference: reference.as_str(),
                data_hex: self
                    .artifacts
                    .get(reference)
                    .ok()
                    .flatten()
                    .map(hex::encode),
            })
            .collect()
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn generate(&self, request: GenerationRequest) -> Result<ArtifactRef, ServiceError> {
        let body = WireRequest {
            prompt: &request.prompt,
            context: self.wire_context(&request.context),
            config: &request.config,
        };

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = builder.send().await.map_err(map_http_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ServiceError::new(
                classify_status(status),
                format!("Request failed with status {}: {}", status, error_text),
            ));
        }

        let bytes = response.bytes().await.map_err(map_http_error)?;
        if bytes.is_empty() {
            return Err(ServiceError::new(
                ServiceErrorKind::Other,
                "Service returned an empty artifact",
            ));
        }

        let reference = self.artifacts.put(&bytes).map_err(|e| {
            ServiceError::new(
                ServiceErrorKind::Other,
                format!("Failed to store artifact: {}", e),
            )
        })?;
        debug!(
            artifact = %reference,
            size = bytes.len(),
            "Stored generated artifact"
        );
        Ok(reference)
    }

    fn service_name(&self) -> &str {
        "http"
    }
}
