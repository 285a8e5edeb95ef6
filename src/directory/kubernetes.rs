//! Kubernetes API server application directory
//!
//! Issues a plain `GET` for the cluster-scoped `Application` custom resource:
//!
//! ```text
//! GET {api_server}/apis/applicationconnector.kyma-project.io/v1alpha1/applications/{name}
//! Authorization: Bearer <service account token>
//! ```
//!
//! The service account token is re-read on every lookup so that projected,
//! rotating tokens keep working. Lookups only happen on identity cache
//! misses.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::{Certificate, Client, StatusCode, header};
use tracing::debug;
use url::Url;

use super::{Application, ApplicationDirectory, DirectoryError};
use crate::config::KubernetesDirectoryConfig;

/// API group of the `Application` resource
pub const APPLICATION_GROUP: &str = "applicationconnector.kyma-project.io";
/// API version of the `Application` resource
pub const APPLICATION_VERSION: &str = "v1alpha1";
/// Plural resource name
pub const APPLICATION_RESOURCE: &str = "applications";

/// Longest error body (in characters) kept in [`DirectoryError::Status`]
const MAX_ERROR_BODY: usize = 512;

/// Directory backed by the Kubernetes API server
#[derive(Debug, Clone)]
pub struct KubeDirectory {
    client: Client,
    base_url: Url,
    token_file: Option<PathBuf>,
}

impl KubeDirectory {
    /// Build a directory client from configuration
    pub fn new(config: &KubernetesDirectoryConfig) -> Result<Self, DirectoryError> {
        let base_url = Url::parse(&config.api_server).map_err(|e| {
            DirectoryError::Config(format!("invalid API server URL {}: {e}", config.api_server))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(DirectoryError::Config(format!(
                "API server URL {} cannot be a base URL",
                config.api_server
            )));
        }

        let mut builder = Client::builder();
        if !config.request_timeout.is_zero() {
            builder = builder.timeout(config.request_timeout);
        }
        if let Some(ca_file) = &config.ca_file {
            let pem = std::fs::read(ca_file).map_err(|e| {
                DirectoryError::Config(format!("failed to read CA file {}: {e}", ca_file.display()))
            })?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        }

        Ok(Self {
            client: builder.build()?,
            base_url,
            token_file: config.token_file.clone(),
        })
    }

    /// URL of the named application resource
    fn resource_url(&self, name: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "apis",
                APPLICATION_GROUP,
                APPLICATION_VERSION,
                APPLICATION_RESOURCE,
                name,
            ]);
        }
        url
    }

    async fn bearer_token(&self) -> Result<Option<String>, DirectoryError> {
        let Some(path) = &self.token_file else {
            return Ok(None);
        };
        let token = tokio::fs::read_to_string(path)
            .await
            .map_err(DirectoryError::Token)?;
        Ok(Some(token.trim().to_owned()))
    }
}

#[async_trait]
impl ApplicationDirectory for KubeDirectory {
    async fn get(&self, name: &str) -> Result<Application, DirectoryError> {
        let url = self.resource_url(name);
        debug!(application = %name, url = %url, "Fetching application resource");

        let mut request = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json");
        if let Some(token) = self.bearer_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(name.to_owned()));
        }
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY)
                .collect();
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
