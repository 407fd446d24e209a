//! HTTP data source client
//!
//! Issues `GET {base_url}{endpoint}?<params>` against a JSON API. Only a
//! 200 response counts as data; any other status is reported as absent.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use url::Url;

use crate::domain::result::{Error, Result};
use crate::domain::QueryParams;
use crate::ports::DataSource;

/// Query parameter that carries the access credential
pub const API_KEY_PARAM: &str = "apikey";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Blocking HTTP client for a JSON API
pub struct HttpDataSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl fmt::Debug for HttpDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpDataSource")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpDataSource {
    /// Create a client with the default timeout
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self> {
        Self::with_timeout(base_url, api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        Url::parse(base_url)
            .map_err(|e| Error::config(format!("Invalid base URL '{}': {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            // An empty key is the same as no key
            api_key: api_key.filter(|k| !k.is_empty()).map(str::to_string),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Request URL: base URL and endpoint concatenated as-is
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Caller parameters with the credential merged in
    fn request_params(&self, params: &QueryParams) -> QueryParams {
        let mut merged = params.clone();
        if let Some(key) = &self.api_key {
            merged.insert(API_KEY_PARAM.to_string(), key.clone());
        }
        merged
    }

    /// Map a reqwest failure without leaking the request URL (it carries the key)
    fn map_request_error(&self, endpoint: &str, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::transport(format!(
                "Request to {} timed out after {} seconds",
                endpoint,
                self.timeout.as_secs()
            ))
        } else if error.is_connect() {
            Error::transport(format!("Unable to connect to {}", self.base_url))
        } else {
            Error::transport(format!(
                "Request to {} failed: {}",
                endpoint,
                error.without_url()
            ))
        }
    }
}

impl DataSource for HttpDataSource {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch(&self, endpoint: &str, params: &QueryParams) -> Result<Option<JsonValue>> {
        let url = self.url_for(endpoint);
        debug!(%url, params = params.len(), "Fetching from data source");

        let response = self
            .client
            .get(&url)
            .query(&self.request_params(params))
            .send()
            .map_err(|e| self.map_request_error(endpoint, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(status = status.as_u16(), endpoint, "Failed to fetch data");
            return Ok(None);
        }

        let body: JsonValue = response.json().map_err(|e| {
            Error::transport(format!(
                "Failed to decode response from {}: {}",
                endpoint,
                e.without_url()
            ))
        })?;

        Ok(Some(body))
    }
}
