// Copyright (c) 2025 - Cowboy AI, Inc.

//! NetBox Registry Adapter
//!
//! Implements the [`Registry`] seam against the NetBox REST API (Network
//! Source of Truth).
//!
//! ```text
//! list(kind, filter)      = GET   /api/{endpoint}/?{filter}
//! create(kind, fields)    = POST  /api/{endpoint}/
//! save(kind, id, changes) = PATCH /api/{endpoint}/{id}/
//! health_check()          = GET   /api/status/
//! ```
//!
//! Only changed fields are ever sent on `save`, so an unchanged entity
//! produces no request at all (the upsert engine skips the call).
//!
//! # Example
//!
//! ```rust,no_run
//! use cim_inventory_sync::registry::{NetBoxConfig, NetBoxRegistry, Registry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NetBoxConfig {
//!         base_url: "http://localhost:8080".to_string(),
//!         api_token: "your-token-here".to_string(),
//!         ..Default::default()
//!     };
//!
//!     let registry = NetBoxRegistry::new(config)?;
//!     registry.health_check().await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{Entity, Fields, Filter, Registry, RegistryError};
use crate::domain::{EntityId, EntityKind};

/// Upper bound of results fetched by one natural-key lookup
const LOOKUP_LIMIT: usize = 50;

/// Configuration for NetBox connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetBoxConfig {
    /// NetBox base URL (e.g., "http://localhost:8080")
    pub base_url: String,

    /// API token for authentication
    pub api_token: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Verify the server certificate
    #[serde(default)]
    pub verify_ssl: bool,
}

fn default_timeout() -> u64 {
    30
}

impl Default for NetBoxConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_token: String::new(),
            timeout_secs: default_timeout(),
            verify_ssl: false,
        }
    }
}

/// NetBox REST registry
pub struct NetBoxRegistry {
    config: NetBoxConfig,
    client: Client,
}

impl NetBoxRegistry {
    /// Create a new NetBox registry client
    pub fn new(config: NetBoxConfig) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    format!("Token {}", config.api_token)
                        .parse()
                        .map_err(|e| {
                            RegistryError::Unreachable(format!("Invalid API token: {}", e))
                        })?,
                );
                headers.insert(
                    reqwest::header::ACCEPT,
                    reqwest::header::HeaderValue::from_static("application/json"),
                );
                headers
            })
            .build()
            .map_err(|e| {
                RegistryError::Unreachable(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!(
            "{}/api/{}/",
            self.config.base_url.trim_end_matches('/'),
            kind.endpoint()
        )
    }

    fn entity_url(&self, kind: EntityKind, id: EntityId) -> String {
        format!("{}{}/", self.collection_url(kind), id)
    }

    fn query(filter: &Filter) -> String {
        let mut parts: Vec<String> = filter
            .pairs()
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        parts.push(format!("limit={}", LOOKUP_LIMIT));
        parts.join("&")
    }

    /// Map transport failures; authentication and availability problems are
    /// connectivity errors, everything else the registry answers is a rejection
    async fn read(response: Result<Response, reqwest::Error>) -> Result<Value, RegistryError> {
        let response =
            response.map_err(|e| RegistryError::Unreachable(format!("NetBox API error: {}", e)))?;
        let status = response.status();

        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|e| RegistryError::Malformed(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RegistryError::Unreachable(
                format!("NetBox rejected credentials ({}): {}", status, body),
            )),
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                Err(RegistryError::Unreachable(format!(
                    "NetBox returned {}: {}",
                    status, body
                )))
            }
            _ => Err(RegistryError::Rejected {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

#[async_trait]
impl Registry for NetBoxRegistry {
    async fn list(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<Entity>, RegistryError> {
        let url = format!("{}?{}", self.collection_url(kind), Self::query(filter));
        debug!("GET {}", url);

        let body = Self::read(self.client.get(&url).send().await).await?;
        let results = body
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| RegistryError::Malformed(format!("no 'results' in {} listing", kind)))?;

        results.iter().cloned().map(Entity::from_json).collect()
    }

    async fn create(&self, kind: EntityKind, fields: &Fields) -> Result<Entity, RegistryError> {
        let url = self.collection_url(kind);
        debug!("POST {}", url);

        let body = Self::read(self.client.post(&url).json(fields).send().await).await?;
        Entity::from_json(body)
    }

    async fn save(
        &self,
        kind: EntityKind,
        id: EntityId,
        changes: &Fields,
    ) -> Result<Entity, RegistryError> {
        let url = self.entity_url(kind, id);
        debug!("PATCH {}", url);

        let body = Self::read(self.client.patch(&url).json(changes).send().await).await?;
        Entity::from_json(body)
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        let url = format!("{}/api/status/", self.config.base_url.trim_end_matches('/'));
        Self::read(self.client.get(&url).send().await).await?;
        debug!("NetBox health check passed");
        Ok(())
    }

    fn name(&self) -> &str {
        "netbox"
    }
}
