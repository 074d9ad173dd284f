// Copyright (c) 2025 - Cowboy AI, Inc.
//! Shared HTTP plumbing for the REST collectors

use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::AdapterError;

fn default_timeout() -> u64 {
    30
}

/// Transport settings common to every source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Verify server certificates (appliances often use self-signed ones)
    #[serde(default)]
    pub verify_ssl: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            verify_ssl: false,
        }
    }
}

impl HttpSettings {
    /// Client with timeout, certificate policy, optional cookie jar and
    /// default headers
    pub fn client(&self, headers: HeaderMap, cookies: bool) -> Result<Client, AdapterError> {
        Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .danger_accept_invalid_certs(!self.verify_ssl)
            .cookie_store(cookies)
            .default_headers(headers)
            .build()
            .map_err(|e| AdapterError::Config(format!("Failed to create HTTP client: {}", e)))
    }
}

/// Join a base URL and a path with exactly one slash
pub fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Send a request and decode the JSON body
///
/// 401/403 are authentication failures; transport errors and other
/// non-success statuses are connectivity failures.
pub async fn send_json(request: RequestBuilder, what: &str) -> Result<Value, AdapterError> {
    let response = request
        .send()
        .await
        .map_err(|e| AdapterError::Connectivity(format!("{}: {}", what, e)))?;

    let status = response.status();
    debug!(request = %what, status = %status, "source response");

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(AdapterError::Auth(format!("{} returned {}", what, status)));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AdapterError::Connectivity(format!(
            "{} returned {}: {}",
            what, status, body
        )));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| AdapterError::Malformed(format!("{}: {}", what, e)))
}

/// `GET` a JSON document
pub async fn get_json(client: &Client, url: &str) -> Result<Value, AdapterError> {
    send_json(client.get(url), url).await
}
