//! Configuration management

use std::{collections::HashMap, path::Path, path::PathBuf, time::Duration};

use connectivity_core::RoutePrefixes;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "CONNECTIVITY_VALIDATOR_";

/// Mesh destination path that implies a mesh-enabled cluster
pub const MESH_PUBLISH_PATH: &str = "/publish";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Tenant/group scoping applied to every request
    pub validation: ValidationConfig,
    /// Path prefixes recognized by the router
    pub routes: RoutesConfig,
    /// Backend hosts
    pub backends: BackendsConfig,
    /// Identity cache configuration
    pub cache: CacheConfig,
    /// Application directory
    pub directory: DirectoryConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Env files feed the environment provider below, so they load first
        let env_files: Vec<String> = figment
            .clone()
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract_inner("env_files")
            .unwrap_or_default();
        load_env_files(&env_files);

        // Merge environment variables (CONNECTIVITY_VALIDATOR_ prefix)
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject configurations the gateway cannot serve with
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first empty prefix or host.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("routes.event_service_v1_prefix", &self.routes.event_service_v1_prefix),
            ("routes.event_service_v2_prefix", &self.routes.event_service_v2_prefix),
            ("routes.event_mesh_prefix", &self.routes.event_mesh_prefix),
            ("routes.app_registry_prefix", &self.routes.app_registry_prefix),
            ("backends.event_service_host", &self.backends.event_service_host),
            ("backends.event_mesh_host", &self.backends.event_mesh_host),
            ("backends.app_registry_host", &self.backends.app_registry_host),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{name} must not be empty")));
            }
        }

        if !self.backends.event_mesh_destination_path.starts_with('/') {
            return Err(Error::Config(format!(
                "backends.event_mesh_destination_path must start with '/': {}",
                self.backends.event_mesh_destination_path
            )));
        }

        Ok(())
    }
}

/// Load environment files into the process environment.
/// Supports ~ expansion. Files that don't exist are silently skipped.
fn load_env_files(paths: &[String]) {
    for path_str in paths {
        let expanded = if path_str.starts_with('~') {
            if let Some(home) = dirs::home_dir() {
                path_str.replacen('~', &home.display().to_string(), 1)
            } else {
                path_str.clone()
            }
        } else {
            path_str.clone()
        };

        let path = Path::new(&expanded);
        if path.exists() {
            match dotenvy::from_path(path) {
                Ok(()) => {
                    tracing::info!("Loaded env file: {expanded}");
                }
                Err(e) => {
                    tracing::warn!("Failed to load env file {expanded}: {e}");
                }
            }
        } else {
            tracing::debug!("Env file not found (skipped): {expanded}");
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Tenant/group scoping.
///
/// When both are set, presented certificates must carry `O=<tenant>` and
/// `OU=<group>` in addition to an accepted common name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Expected `OU`
    pub group: String,
    /// Expected `O`
    pub tenant: String,
}

/// Path prefixes, matched in declaration order.
///
/// `{application}` is replaced with the application name of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Event service v1 prefix
    pub event_service_v1_prefix: String,
    /// Event service v2 prefix
    pub event_service_v2_prefix: String,
    /// Event mesh prefix
    pub event_mesh_prefix: String,
    /// Application registry prefix
    pub app_registry_prefix: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            event_service_v1_prefix: "/{application}/v1/events".to_string(),
            event_service_v2_prefix: "/{application}/v2/events".to_string(),
            event_mesh_prefix: "/{application}/events".to_string(),
            app_registry_prefix: "/{application}/v1/metadata".to_string(),
        }
    }
}

impl RoutesConfig {
    /// Prefixes in the shape the route table expects
    #[must_use]
    pub fn prefixes(&self) -> RoutePrefixes {
        RoutePrefixes {
            event_service_v1: self.event_service_v1_prefix.clone(),
            event_service_v2: self.event_service_v2_prefix.clone(),
            event_mesh: self.event_mesh_prefix.clone(),
            app_registry: self.app_registry_prefix.clone(),
        }
    }
}

/// Backend hosts (`host[:port]`) the gateway forwards to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Event service (v1 and non-mesh v2 events)
    pub event_service_host: String,
    /// Event mesh ingress
    pub event_mesh_host: String,
    /// Fixed path every mesh request is rewritten to
    pub event_mesh_destination_path: String,
    /// Application registry
    pub app_registry_host: String,
    /// Route v2 events to the mesh. When unset, derived from
    /// `event_mesh_destination_path == "/publish"`.
    pub mesh_enabled: Option<bool>,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            event_service_host: "events-api:8080".to_string(),
            event_mesh_host: "eventing-publisher-proxy.kyma-system".to_string(),
            event_mesh_destination_path: "/".to_string(),
            app_registry_host: "application-registry-external-api:8081".to_string(),
            mesh_enabled: None,
        }
    }
}

impl BackendsConfig {
    /// Effective mesh flag
    #[must_use]
    pub fn mesh_enabled(&self) -> bool {
        self.mesh_enabled
            .unwrap_or(self.event_mesh_destination_path == MESH_PUBLISH_PATH)
    }
}

/// Identity cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL of resolved identities
    #[serde(with = "humantime_serde")]
    pub expiration: Duration,
    /// Interval of the expired-entry sweep (`0s` disables it)
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiration: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(120),
        }
    }
}

/// Where application records come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectoryConfig {
    /// Kubernetes API server
    Kubernetes(KubernetesDirectoryConfig),
    /// Fixed records from configuration
    Static(StaticDirectoryConfig),
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self::Kubernetes(KubernetesDirectoryConfig::default())
    }
}

/// Kubernetes API server access
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesDirectoryConfig {
    /// API server base URL
    pub api_server: String,
    /// Bearer token file, re-read on every lookup
    pub token_file: Option<PathBuf>,
    /// CA bundle for the API server certificate
    pub ca_file: Option<PathBuf>,
    /// Lookup timeout (`0s` means transport defaults only)
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for KubernetesDirectoryConfig {
    fn default() -> Self {
        Self {
            api_server: "https://kubernetes.default.svc".to_string(),
            token_file: Some(PathBuf::from(
                "/var/run/secrets/kubernetes.io/serviceaccount/token",
            )),
            ca_file: Some(PathBuf::from(
                "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt",
            )),
            request_timeout: Duration::ZERO,
        }
    }
}

/// Fixed application records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticDirectoryConfig {
    /// Application name to client IDs; `null` means no Compass metadata
    pub applications: HashMap<String, Option<Vec<String>>>,
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s", "250ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else if let Some(hours) = s.strip_suffix('h') {
            hours
                .parse::<u64>()
                .map(|h| Duration::from_secs(h * 3600))
                .map_err(serde::de::Error::custom)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}
