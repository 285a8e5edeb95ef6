//! Application identity resolution
//!
//! An identity is the list of client IDs allowed to call an application.
//! Lookups go through the [`Cache`] first and fall back to the
//! [`ApplicationDirectory`] on a miss.

use std::sync::Arc;

use tracing::debug;

use crate::cache::Cache;
use crate::directory::ApplicationDirectory;
use crate::{Error, Result};

/// Client IDs authorized for an application; empty means "match by application name"
pub type Identity = Vec<String>;

/// Cache-fronted identity lookup
#[derive(Clone)]
pub struct IdentityResolver {
    directory: Arc<dyn ApplicationDirectory>,
    cache: Arc<dyn Cache<Identity>>,
}

impl IdentityResolver {
    /// Create a resolver over a directory and a cache
    pub fn new(directory: Arc<dyn ApplicationDirectory>, cache: Arc<dyn Cache<Identity>>) -> Self {
        Self { directory, cache }
    }

    /// Resolve the identity of `application`.
    ///
    /// Directory failures are not cached, so the next request retries the lookup.
    pub async fn resolve(&self, application: &str) -> Result<Identity> {
        if let Some(identity) = self.cache.get(application) {
            debug!(application, "Identity cache hit");
            return Ok(identity);
        }

        let record = self
            .directory
            .get(application)
            .await
            .map_err(|source| Error::Identity {
                application: application.to_owned(),
                source,
            })?;

        let identity = record.into_client_ids();
        debug!(
            application,
            client_ids = identity.len(),
            "Resolved identity from directory"
        );
        self.cache.set(application, identity.clone());
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cache::TtlCache;
    use crate::directory::{Application, DirectoryError, StaticDirectory};

    /// Directory wrapper counting lookups
    struct CountingDirectory {
        inner: StaticDirectory,
        calls: AtomicUsize,
    }

    impl CountingDirectory {
        fn new(inner: StaticDirectory) -> Arc<Self> {
            Arc::new(Self {
                inner,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ApplicationDirectory for CountingDirectory {
        async fn get(&self, name: &str) -> std::result::Result<Application, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get(name).await
        }
    }

    fn resolver(directory: Arc<CountingDirectory>, ttl: Duration) -> IdentityResolver {
        IdentityResolver::new(directory, Arc::new(TtlCache::new(ttl)))
    }

    fn directory() -> StaticDirectory {
        StaticDirectory::default()
            .with_application(Application::new(
                "app1",
                Some(vec!["id1".into(), "id2".into()]),
            ))
            .with_application(Application::new("legacy", None))
    }

    #[tokio::test]
    async fn second_lookup_within_ttl_uses_cache() {
        let directory = CountingDirectory::new(directory());
        let resolver = resolver(Arc::clone(&directory), Duration::from_secs(60));

        assert_eq!(resolver.resolve("app1").await.unwrap(), ["id1", "id2"]);
        assert_eq!(resolver.resolve("app1").await.unwrap(), ["id1", "id2"]);
        assert_eq!(directory.calls(), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_looked_up_again() {
        let directory = CountingDirectory::new(directory());
        let resolver = resolver(Arc::clone(&directory), Duration::from_millis(10));

        resolver.resolve("app1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        resolver.resolve("app1").await.unwrap();
        assert_eq!(directory.calls(), 2);
    }

    #[tokio::test]
    async fn empty_identity_is_cached() {
        let directory = CountingDirectory::new(directory());
        let resolver = resolver(Arc::clone(&directory), Duration::from_secs(60));

        assert!(resolver.resolve("legacy").await.unwrap().is_empty());
        assert!(resolver.resolve("legacy").await.unwrap().is_empty());
        assert_eq!(directory.calls(), 1);
    }

    #[tokio::test]
    async fn directory_failure_is_wrapped_and_not_cached() {
        let directory = CountingDirectory::new(directory());
        let resolver = resolver(Arc::clone(&directory), Duration::from_secs(60));

        let err = resolver.resolve("ghost").await.unwrap_err();
        assert!(matches!(
            &err,
            Error::Identity { application, source: DirectoryError::NotFound(_) } if application == "ghost"
        ));
        assert!(
            err.to_string()
                .starts_with("failed to resolve identity for application ghost")
        );

        resolver.resolve("ghost").await.unwrap_err();
        assert_eq!(directory.calls(), 2);
    }
}
