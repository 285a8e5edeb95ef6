//! Configuration-backed application directory

use std::collections::HashMap;

use async_trait::async_trait;

use super::{Application, ApplicationDirectory, DirectoryError};

/// Directory serving a fixed set of applications.
///
/// Used for local runs and tests where no API server is available.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    applications: HashMap<String, Application>,
}

impl StaticDirectory {
    /// Build from `name -> client IDs`; `None` marks an application without Compass metadata
    #[must_use]
    pub fn new(applications: &HashMap<String, Option<Vec<String>>>) -> Self {
        Self {
            applications: applications
                .iter()
                .map(|(name, client_ids)| {
                    (name.clone(), Application::new(name.clone(), client_ids.clone()))
                })
                .collect(),
        }
    }

    /// Add or replace an application
    #[must_use]
    pub fn with_application(mut self, application: Application) -> Self {
        self.applications
            .insert(application.metadata.name.clone(), application);
        self
    }
}

#[async_trait]
impl ApplicationDirectory for StaticDirectory {
    async fn get(&self, name: &str) -> Result<Application, DirectoryError> {
        self.applications
            .get(name)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_configured_applications() {
        let mut apps = HashMap::new();
        apps.insert("app1".to_string(), Some(vec!["id1".to_string()]));
        apps.insert("legacy".to_string(), None);
        let directory = StaticDirectory::new(&apps);

        assert_eq!(directory.get("app1").await.unwrap().client_ids(), ["id1"]);
        assert!(directory.get("legacy").await.unwrap().client_ids().is_empty());
    }

    #[tokio::test]
    async fn unknown_application_is_not_found() {
        let directory = StaticDirectory::default();
        let err = directory.get("ghost").await.unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn with_application_overrides() {
        let directory = StaticDirectory::default()
            .with_application(Application::new("app1", None))
            .with_application(Application::new("app1", Some(vec!["x".into()])));
        assert_eq!(directory.get("app1").await.unwrap().client_ids(), ["x"]);
    }
}
