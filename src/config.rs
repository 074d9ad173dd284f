// Copyright (c) 2025 - Cowboy AI, Inc.
//! Environment configuration
//!
//! Everything is read from environment variables:
//!
//! | Variable | Default |
//! |---|---|
//! | `NETBOX_URL` | `http://localhost:8080` |
//! | `NETBOX_TOKEN` | required unless dry-run |
//! | `NETBOX_TIMEOUT_SECS` | `30` |
//! | `VERIFY_SSL` | `false` (NetBox and every source) |
//! | `SYNC_SITE` | `homelab` |
//! | `<SOURCE>_SITE` | `SYNC_SITE` |
//! | `SYNC_CUSTOM_FIELDS` | `false` |
//! | `<SOURCE>_DEFAULT_PREFIX` | `16` for docker, `24` otherwise |
//! | `DOCKER_HOST`, `DOCKER_HOST_NAME` | `http://localhost:2375`, `truenas01` |
//! | `OMADA_URL`, `OMADA_USERNAME`, `OMADA_PASSWORD`, `OMADA_SITE_NAME` | site `Default` |
//! | `OPNSENSE_URL`, `OPNSENSE_API_KEY`, `OPNSENSE_API_SECRET`, `OPNSENSE_DEVICE_NAME` | device `opnsense` |
//! | `TRUENAS_URL`, `TRUENAS_API_KEY`, `TRUENAS_HOST` | host `truenas01` |
//! | `RUST_LOG` | `info` |
//!
//! Missing source credentials are not a configuration error here; the
//! collector rejects them when its run starts, which aborts that source
//! only.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::collector::{DockerConfig, HttpSettings, OmadaConfig, OpnsenseConfig, TrueNasConfig};
use crate::reconcile::{PrefixPolicy, ReconcileOptions};
use crate::registry::NetBoxConfig;

/// Configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("Invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Inventory sources the CLI can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Docker,
    Omada,
    Opnsense,
    Truenas,
}

impl Source {
    pub const ALL: [Source; 4] = [Source::Docker, Source::Omada, Source::Opnsense, Source::Truenas];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Docker => "docker",
            Source::Omada => "omada",
            Source::Opnsense => "opnsense",
            Source::Truenas => "truenas",
        }
    }

    /// Prefix length assumed for bare addresses from this source
    pub fn default_prefix(&self) -> u8 {
        match self {
            Source::Docker => 16,
            _ => 24,
        }
    }

    fn site_var(&self) -> &'static str {
        match self {
            Source::Docker => "DOCKER_SITE",
            Source::Omada => "OMADA_SITE",
            Source::Opnsense => "OPNSENSE_SITE",
            Source::Truenas => "TRUENAS_SITE",
        }
    }

    fn prefix_var(&self) -> &'static str {
        match self {
            Source::Docker => "DOCKER_DEFAULT_PREFIX",
            Source::Omada => "OMADA_DEFAULT_PREFIX",
            Source::Opnsense => "OPNSENSE_DEFAULT_PREFIX",
            Source::Truenas => "TRUENAS_DEFAULT_PREFIX",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|source| source.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::Invalid {
                var: "source",
                value: s.to_string(),
                reason: "expected docker, omada, opnsense or truenas".to_string(),
            })
    }
}

/// Per-source site and prefix settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSettings {
    pub site: String,
    pub default_prefix: u8,
}

/// Complete sync configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub netbox: NetBoxConfig,
    pub custom_fields: bool,
    pub docker: DockerConfig,
    pub omada: OmadaConfig,
    pub opnsense: OpnsenseConfig,
    pub truenas: TrueNasConfig,
    pub sources: Vec<(Source, SourceSettings)>,
}

impl SyncConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through `lookup` (variable name → value)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let verify_ssl = env.flag("VERIFY_SSL")?;
        let http = HttpSettings {
            verify_ssl,
            ..HttpSettings::default()
        };

        let netbox = NetBoxConfig {
            base_url: env.or("NETBOX_URL", "http://localhost:8080"),
            api_token: env.or("NETBOX_TOKEN", ""),
            timeout_secs: env.parsed("NETBOX_TIMEOUT_SECS", 30u64)?,
            verify_ssl,
        };

        let docker = DockerConfig {
            endpoint: env.or("DOCKER_HOST", "http://localhost:2375"),
            host_name: env.or("DOCKER_HOST_NAME", "truenas01"),
            http: http.clone(),
        };
        let omada = OmadaConfig {
            url: env.or("OMADA_URL", ""),
            username: env.or("OMADA_USERNAME", ""),
            password: env.or("OMADA_PASSWORD", ""),
            site_name: env.or("OMADA_SITE_NAME", "Default"),
            http: http.clone(),
        };
        let opnsense = OpnsenseConfig {
            url: env.or("OPNSENSE_URL", ""),
            api_key: env.or("OPNSENSE_API_KEY", ""),
            api_secret: env.or("OPNSENSE_API_SECRET", ""),
            device_name: env.or("OPNSENSE_DEVICE_NAME", "opnsense"),
            http: http.clone(),
        };
        let truenas = TrueNasConfig {
            url: env.or("TRUENAS_URL", ""),
            api_key: env.or("TRUENAS_API_KEY", ""),
            host_name: env.or("TRUENAS_HOST", "truenas01"),
            http,
        };

        let site = env.or("SYNC_SITE", "homelab");
        let mut sources = Vec::new();
        for source in Source::ALL {
            let default_prefix = env.parsed(source.prefix_var(), source.default_prefix())?;
            if default_prefix > 128 {
                return Err(ConfigError::Invalid {
                    var: source.prefix_var(),
                    value: default_prefix.to_string(),
                    reason: "prefix length above 128".to_string(),
                });
            }
            let settings = SourceSettings {
                site: env.or(source.site_var(), &site),
                default_prefix,
            };
            sources.push((source, settings));
        }

        Ok(Self {
            netbox,
            custom_fields: env.flag("SYNC_CUSTOM_FIELDS")?,
            docker,
            omada,
            opnsense,
            truenas,
            sources,
        })
    }

    /// NetBox settings, provided a token is configured
    pub fn require_netbox(&self) -> Result<&NetBoxConfig, ConfigError> {
        if self.netbox.api_token.trim().is_empty() {
            return Err(ConfigError::Missing("NETBOX_TOKEN"));
        }
        Ok(&self.netbox)
    }

    pub fn settings(&self, source: Source) -> SourceSettings {
        self.sources
            .iter()
            .find(|(s, _)| *s == source)
            .map(|(_, settings)| settings.clone())
            .unwrap_or_else(|| SourceSettings {
                site: "homelab".to_string(),
                default_prefix: source.default_prefix(),
            })
    }

    /// Reconciliation options for one source's run
    pub fn reconcile_options(&self, source: Source) -> ReconcileOptions {
        let settings = self.settings(source);
        ReconcileOptions {
            site: settings.site,
            prefix_policy: PrefixPolicy::new(settings.default_prefix),
            custom_fields: self.custom_fields,
        }
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn or(&self, var: &str, default: &str) -> String {
        self.get(var).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(var) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn flag(&self, var: &'static str) -> Result<bool, ConfigError> {
        match self.get(var).map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("0" | "false" | "no" | "off") => Ok(false),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some(other) => Err(ConfigError::Invalid {
                var,
                value: other.to_string(),
                reason: "expected true or false".to_string(),
            }),
        }
    }
}

/// Log filter from `RUST_LOG` directives, `info` when unset or unparsable
pub fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
