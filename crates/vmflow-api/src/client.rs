//! Authenticated HTTP client for the control-plane REST API
//!
//! Every request carries basic auth, GET requests default to `fields=most`,
//! and any non-2xx answer is turned into [`ApiError::Status`] with the
//! server's `err` message when the body carries one.

use crate::error::{ApiError, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_PREFIX: &str = "api/v4";
const DEFAULT_PORT: u16 = 443;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for one control plane
///
/// Immutable for the duration of a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConnection {
    /// Host name, or a full `http(s)://` base URL
    pub endpoint: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure: bool,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for a single HTTP request, independent of step deadlines
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

impl ClusterConnection {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            insecure: false,
            port: DEFAULT_PORT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Base URL of the API, e.g. `https://verge.example.com/api/v4`
    pub fn base_url(&self) -> String {
        let endpoint = self.endpoint.trim_end_matches('/');
        let root = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if self.port == DEFAULT_PORT || self.port == 0 {
            format!("https://{}", endpoint)
        } else {
            format!("https://{}:{}", endpoint, self.port)
        };
        format!("{}/{}", root, API_PREFIX)
    }

    pub fn request_timeout(&self) -> Duration {
        if self.request_timeout_secs == 0 {
            DEFAULT_REQUEST_TIMEOUT
        } else {
            Duration::from_secs(self.request_timeout_secs)
        }
    }
}

/// Query options understood by the API's GET endpoints
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub fields: Option<String>,
    pub filter: Option<String>,
}

impl QueryOptions {
    pub fn fields(fields: impl Into<String>) -> Self {
        Self {
            fields: Some(fields.into()),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![(
            "fields",
            self.fields.clone().unwrap_or_else(|| "most".to_string()),
        )];
        if let Some(filter) = &self.filter {
            pairs.push(("filter", filter.clone()));
        }
        pairs
    }
}

/// Thin REST client shared by the per-resource APIs
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl ApiClient {
    pub fn new(conn: &ClusterConnection) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(conn.insecure)
            .timeout(conn.request_timeout())
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            http,
            base_url: conn.base_url(),
            username: conn.username.clone(),
            password: conn.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .basic_auth(&self.username, Some(&self.password))
    }

    pub async fn get(&self, path: &str, opts: &QueryOptions) -> Result<Response> {
        tracing::debug!("GET {} {:?}", path, opts);
        let req = self.request(Method::GET, path).query(&opts.to_pairs());
        self.send(req, path).await
    }

    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response> {
        tracing::debug!("POST {}", path);
        self.send(self.request(Method::POST, path).json(body), path)
            .await
    }

    pub async fn put<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response> {
        tracing::debug!("PUT {}", path);
        self.send(self.request(Method::PUT, path).json(body), path)
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Response> {
        tracing::debug!("DELETE {}", path);
        self.send(self.request(Method::DELETE, path), path).await
    }

    async fn send(&self, req: RequestBuilder, path: &str) -> Result<Response> {
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!("{} answered {}: {}", path, status, body);
        Err(ApiError::Status {
            status: status.as_u16(),
            endpoint: path.to_string(),
            body: error_message(&body),
        })
    }
}

/// Require an exact success code for an operation
pub(crate) fn expect_status(response: &Response, expected: &[StatusCode], path: &str) -> Result<()> {
    if expected.contains(&response.status()) {
        Ok(())
    } else {
        Err(ApiError::UnexpectedStatus {
            status: response.status().as_u16(),
            endpoint: path.to_string(),
        })
    }
}

/// Decode a JSON body, reporting the endpoint on failure
pub(crate) async fn decode<T: serde::de::DeserializeOwned>(response: Response, path: &str) -> Result<T> {
    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| ApiError::invalid_response(path, format!("{} (body: {})", e, body)))
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    err: Option<String>,
}

/// Extract the `err` message of an error body, falling back to the raw text
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { err: Some(msg) }) if !msg.is_empty() => msg,
        _ => body.to_string(),
    }
}
