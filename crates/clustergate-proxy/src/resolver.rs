//! Cluster resolution
//!
//! Looks up the cluster a request targets and enforces lock and tenant
//! ownership before any credential work happens.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use clustergate_common::Cluster;

use crate::error::{Error, Result};

/// Source of cluster records
///
/// Implementations return [`Error::NotFound`] when the cluster does not exist.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterDirectory: Send + Sync {
    /// Fetch a cluster by name
    async fn get(&self, name: &str) -> Result<Cluster>;
}

/// Resolves a cluster name to a [`Cluster`] the caller may act on
#[derive(Clone)]
pub struct ClusterResolver {
    directory: Arc<dyn ClusterDirectory>,
}

impl ClusterResolver {
    /// Create a resolver backed by `directory`
    pub fn new(directory: Arc<dyn ClusterDirectory>) -> Self {
        Self { directory }
    }

    /// Resolve `cluster_name` for a caller in `caller_tenant`
    ///
    /// Tenant ownership is checked before the lock flag so that a caller from
    /// another tenant sees the same `NotFound` whether the cluster exists,
    /// is locked, or is neither.
    pub async fn resolve(&self, cluster_name: &str, caller_tenant: &str) -> Result<Cluster> {
        if cluster_name.is_empty() {
            return Err(Error::BadRequest("clusterName is required".into()));
        }

        let cluster = self.directory.get(cluster_name).await?;

        if !caller_tenant.is_empty() && cluster.tenant_id != caller_tenant {
            debug!(
                cluster = %cluster_name,
                tenant = %caller_tenant,
                "Cluster belongs to another tenant"
            );
            return Err(Error::cluster_not_found(cluster_name));
        }

        if cluster.locked {
            return Err(Error::Locked(cluster.name));
        }

        debug!(cluster = %cluster_name, tenant = %caller_tenant, "Resolved cluster");
        Ok(cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clustergate_common::ClusterCredentials;

    fn cluster(name: &str, tenant: &str, locked: bool) -> Cluster {
        Cluster {
            name: name.to_string(),
            tenant_id: tenant.to_string(),
            locked,
            address: "10.0.0.1:6443".to_string(),
            credential: ClusterCredentials::default(),
        }
    }

    fn resolver_with(found: Option<Cluster>) -> ClusterResolver {
        let mut directory = MockClusterDirectory::new();
        directory.expect_get().returning(move |name| {
            found
                .clone()
                .filter(|c| c.name == name)
                .ok_or_else(|| Error::cluster_not_found(name))
        });
        ClusterResolver::new(Arc::new(directory))
    }

    #[tokio::test]
    async fn empty_name_is_bad_request_without_lookup() {
        let mut directory = MockClusterDirectory::new();
        directory.expect_get().times(0);
        let resolver = ClusterResolver::new(Arc::new(directory));

        let err = resolver.resolve("", "t1").await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn missing_cluster_is_not_found() {
        let resolver = resolver_with(None);
        let err = resolver.resolve("cls-1", "").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn locked_cluster_is_locked() {
        let resolver = resolver_with(Some(cluster("cls-1", "t1", true)));
        let err = resolver.resolve("cls-1", "t1").await.unwrap_err();
        assert!(matches!(err, Error::Locked(name) if name == "cls-1"));
    }

    #[tokio::test]
    async fn same_tenant_resolves() {
        let resolver = resolver_with(Some(cluster("cls-1", "t1", false)));
        let resolved = resolver.resolve("cls-1", "t1").await.unwrap();
        assert_eq!(resolved.name, "cls-1");
    }

    #[tokio::test]
    async fn untenanted_caller_resolves_any_cluster() {
        let resolver = resolver_with(Some(cluster("cls-1", "t1", false)));
        assert!(resolver.resolve("cls-1", "").await.is_ok());
    }

    #[tokio::test]
    async fn tenant_mismatch_is_indistinguishable_from_missing() {
        let existing = resolver_with(Some(cluster("cls-1", "t1", false)));
        let missing = resolver_with(None);

        let mismatch = existing.resolve("cls-1", "t2").await.unwrap_err();
        let absent = missing.resolve("cls-1", "t2").await.unwrap_err();

        assert!(matches!(mismatch, Error::NotFound { .. }));
        assert_eq!(mismatch.to_string(), absent.to_string());
        assert_eq!(mismatch.status_code(), absent.status_code());
    }

    #[tokio::test]
    async fn tenant_mismatch_hides_lock_state() {
        let resolver = resolver_with(Some(cluster("cls-1", "t1", true)));
        let err = resolver.resolve("cls-1", "t2").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn directory_errors_propagate() {
        let mut directory = MockClusterDirectory::new();
        directory
            .expect_get()
            .returning(|_| Err(Error::Internal("etcd unavailable".into())));
        let resolver = ClusterResolver::new(Arc::new(directory));

        let err = resolver.resolve("cls-1", "").await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
