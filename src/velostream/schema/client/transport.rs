//! Schema Registry Transport
//!
//! The registry client reaches the registry through [`RegistryTransport`], so the
//! caching and back-off policy stays independent of the HTTP stack. The provided
//! implementation speaks the Confluent-compatible REST API over reqwest.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;

use crate::velostream::schema::{SchemaError, SchemaResult};

const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Raw request/response access to a schema registry.
///
/// Implementations return the response body for HTTP 200 and an error for
/// everything else.
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    async fn get(&self, path: &str) -> SchemaResult<String>;

    async fn post(&self, path: &str, body: String) -> SchemaResult<String>;

    async fn delete(&self, path: &str) -> SchemaResult<String>;
}

/// Authentication configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthConfig {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
}

/// reqwest-backed transport
pub struct HttpRegistryTransport {
    base_url: String,
    auth: AuthConfig,
    http_client: Client,
    timeout: Duration,
}

impl HttpRegistryTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: AuthConfig::None,
            http_client: Client::new(),
            timeout,
        }
    }

    /// Set authentication configuration
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute_request(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> SchemaResult<String> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http_client
            .request(method, &url)
            .header("Content-Type", CONTENT_TYPE)
            .timeout(self.timeout);

        request = match &self.auth {
            AuthConfig::Basic { username, password } => request.basic_auth(username, Some(password)),
            AuthConfig::Bearer { token } => request.bearer_auth(token),
            AuthConfig::None => request,
        };

        if let Some(body_content) = body {
            request = request.body(body_content);
        }

        let response = request.send().await.map_err(|e| self.request_error(path, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            log::debug!("Schema registry returned {} for {}", status, url);
            return Err(SchemaError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| self.request_error(path, e))
    }

    fn request_error(&self, path: &str, error: reqwest::Error) -> SchemaError {
        if error.is_timeout() {
            SchemaError::Timeout {
                path: path.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            SchemaError::Transport {
                path: path.to_string(),
                message: error.to_string(),
                source: Some(error),
            }
        }
    }
}

#[async_trait]
impl RegistryTransport for HttpRegistryTransport {
    async fn get(&self, path: &str) -> SchemaResult<String> {
        self.execute_request(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: String) -> SchemaResult<String> {
        self.execute_request(Method::POST, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> SchemaResult<String> {
        self.execute_request(Method::DELETE, path, None).await
    }
}
