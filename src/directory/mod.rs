//! Application directory: where application identities come from.
//!
//! The gateway only needs one thing from the control plane: the
//! `Application` record for a name, and from it the list of client IDs
//! allowed to call the application. An application without Compass
//! metadata is valid and simply has no explicit client IDs.
//!
//! # Implementations
//!
//! - [`KubeDirectory`] - reads `applications.applicationconnector.kyma-project.io`
//!   resources from the Kubernetes API server
//! - [`StaticDirectory`] - fixed records from the configuration file

mod kubernetes;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use kubernetes::KubeDirectory;
pub use memory::StaticDirectory;

/// Directory lookup failures
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No application with this name exists
    #[error("application {0} not found")]
    NotFound(String),

    /// The API server answered with a non-success status
    #[error("unexpected status {status} from API server: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Transport failure talking to the API server
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Service account token could not be read
    #[error("failed to read service account token: {0}")]
    Token(#[source] std::io::Error),

    /// Response body was not a valid application record
    #[error("failed to decode application: {0}")]
    Decode(#[from] serde_json::Error),

    /// Directory could not be set up
    #[error("directory configuration error: {0}")]
    Config(String),
}

/// Source of application records
#[async_trait]
pub trait ApplicationDirectory: Send + Sync {
    /// Fetch the application named `name`
    async fn get(&self, name: &str) -> Result<Application, DirectoryError>;
}

/// Application resource, reduced to the fields the gateway reads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Application spec
    #[serde(default)]
    pub spec: ApplicationSpec,
}

/// Kubernetes object metadata subset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Resource name
    #[serde(default)]
    pub name: String,
}

/// Application spec subset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    /// Compass metadata, present only for Compass-managed applications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compass_metadata: Option<CompassMetadata>,
}

/// Compass metadata block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompassMetadata {
    /// Authentication settings
    #[serde(default)]
    pub authentication: Authentication,
}

/// Compass authentication settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    /// Client IDs allowed to call the application
    #[serde(default)]
    pub client_ids: Vec<String>,
}

impl Application {
    /// Build a record; `None` client IDs means no Compass metadata
    #[must_use]
    pub fn new(name: impl Into<String>, client_ids: Option<Vec<String>>) -> Self {
        Self {
            metadata: ObjectMeta { name: name.into() },
            spec: ApplicationSpec {
                compass_metadata: client_ids.map(|client_ids| CompassMetadata {
                    authentication: Authentication { client_ids },
                }),
            },
        }
    }

    /// Authorized client IDs; empty when the application has no Compass metadata
    #[must_use]
    pub fn client_ids(&self) -> &[String] {
        match &self.spec.compass_metadata {
            Some(meta) => &meta.authentication.client_ids,
            None => &[],
        }
    }

    /// Consume the record, keeping only the client IDs
    #[must_use]
    pub fn into_client_ids(self) -> Vec<String> {
        self.spec
            .compass_metadata
            .map(|meta| meta.authentication.client_ids)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_compass_application() {
        let app: Application = serde_json::from_value(json!({
            "apiVersion": "applicationconnector.kyma-project.io/v1alpha1",
            "kind": "Application",
            "metadata": {"name": "app1", "uid": "123"},
            "spec": {
                "description": "test",
                "compassMetadata": {
                    "applicationId": "abc",
                    "authentication": {"clientIds": ["id1", "id2"]}
                }
            }
        }))
        .unwrap();

        assert_eq!(app.metadata.name, "app1");
        assert_eq!(app.client_ids(), ["id1", "id2"]);
    }

    #[test]
    fn application_without_metadata_has_no_client_ids() {
        let app: Application = serde_json::from_value(json!({
            "metadata": {"name": "legacy"},
            "spec": {"services": []}
        }))
        .unwrap();

        assert!(app.spec.compass_metadata.is_none());
        assert!(app.client_ids().is_empty());
        assert!(app.into_client_ids().is_empty());
    }

    #[test]
    fn compass_metadata_without_client_ids_is_empty() {
        let app: Application = serde_json::from_value(json!({
            "metadata": {"name": "app"},
            "spec": {"compassMetadata": {"authentication": {}}}
        }))
        .unwrap();
        assert!(app.client_ids().is_empty());
    }

    #[test]
    fn new_builds_equivalent_record() {
        let app = Application::new("app1", Some(vec!["id1".into()]));
        assert_eq!(app.client_ids(), ["id1"]);
        assert!(Application::new("app2", None).spec.compass_metadata.is_none());
    }
}
