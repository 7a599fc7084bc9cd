//! Access to a remote cluster's own control-plane store
//!
//! The credential cache and the cluster CA both live as ConfigMaps inside
//! the remote cluster. [`ControlPlaneStore`] is the narrow read/create
//! surface the credential issuer needs; [`StoreConnector`] opens one for a
//! cluster using its default credential.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::PostParams;
use kube::{Api, Client};

use clustergate_common::kube_utils::{is_already_exists, is_not_found};
use clustergate_common::Cluster;

use crate::error::Result;
use crate::transport::TransportBuilder;

/// Outcome classes of a store operation the issuer distinguishes
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Record does not exist
    #[error("{0} not found")]
    NotFound(String),
    /// Record was created concurrently
    #[error("{0} already exists")]
    AlreadyExists(String),
    /// Any other failure
    #[error("{0}")]
    Other(String),
}

/// Read/create access to ConfigMaps in a remote control plane
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlPlaneStore: Send + Sync {
    /// Fetch a ConfigMap
    async fn get(&self, namespace: &str, name: &str) -> std::result::Result<ConfigMap, StoreError>;

    /// Create a ConfigMap; fails with [`StoreError::AlreadyExists`] on conflict
    async fn create(
        &self,
        namespace: &str,
        record: ConfigMap,
    ) -> std::result::Result<ConfigMap, StoreError>;
}

/// Opens a [`ControlPlaneStore`] for a cluster
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Connect to `cluster` using its default credential
    async fn connect(&self, cluster: &Cluster) -> Result<Arc<dyn ControlPlaneStore>>;
}

/// [`ControlPlaneStore`] over a kube client
#[derive(Clone)]
pub struct KubeControlPlaneStore {
    client: Client,
}

impl KubeControlPlaneStore {
    /// Wrap a client for the remote cluster
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn classify(name: &str, err: kube::Error) -> StoreError {
    if is_not_found(&err) {
        StoreError::NotFound(name.to_string())
    } else if is_already_exists(&err) {
        StoreError::AlreadyExists(name.to_string())
    } else {
        StoreError::Other(err.to_string())
    }
}

#[async_trait]
impl ControlPlaneStore for KubeControlPlaneStore {
    async fn get(&self, namespace: &str, name: &str) -> std::result::Result<ConfigMap, StoreError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        api.get(name).await.map_err(|e| classify(name, e))
    }

    async fn create(
        &self,
        namespace: &str,
        record: ConfigMap,
    ) -> std::result::Result<ConfigMap, StoreError> {
        let name = record.metadata.name.clone().unwrap_or_default();
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), &record)
            .await
            .map_err(|e| classify(&name, e))
    }
}

/// [`StoreConnector`] that builds a kube client from the cluster's
/// default/admin credential
#[derive(Clone)]
pub struct KubeStoreConnector {
    transport: TransportBuilder,
}

impl KubeStoreConnector {
    /// Create a connector using `transport` for connection settings
    pub fn new(transport: TransportBuilder) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl StoreConnector for KubeStoreConnector {
    async fn connect(&self, cluster: &Cluster) -> Result<Arc<dyn ControlPlaneStore>> {
        let config = self.transport.build_config(cluster, None)?;
        let client = config.kube_client().await?;
        Ok(Arc::new(KubeControlPlaneStore::new(client)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn classifies_kube_errors() {
        assert!(matches!(
            classify("x", api_error(404, "NotFound")),
            StoreError::NotFound(n) if n == "x"
        ));
        assert!(matches!(
            classify("x", api_error(409, "AlreadyExists")),
            StoreError::AlreadyExists(_)
        ));
        assert!(matches!(
            classify("x", api_error(403, "Forbidden")),
            StoreError::Other(_)
        ));
    }
}
