//! Cluster directory backed by the central control plane
//!
//! Reads [`ManagedCluster`] and its [`ClusterCredential`] and assembles the
//! [`Cluster`] record the resolver works with.

use async_trait::async_trait;
use kube::{Api, Client};
use tracing::{debug, warn};

use clustergate_common::crd::{ClusterCredential, ManagedCluster};
use clustergate_common::kube_utils::is_not_found;
use clustergate_common::Cluster;

use crate::error::{Error, Result};
use crate::resolver::ClusterDirectory;

/// [`ClusterDirectory`] over the platform CRDs
#[derive(Clone)]
pub struct KubeClusterDirectory {
    client: Client,
}

impl KubeClusterDirectory {
    /// Create a directory using a client for the central control plane
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterDirectory for KubeClusterDirectory {
    async fn get(&self, name: &str) -> Result<Cluster> {
        let clusters: Api<ManagedCluster> = Api::all(self.client.clone());

        let managed = match clusters.get(name).await {
            Ok(c) => c,
            Err(e) if is_not_found(&e) => return Err(Error::cluster_not_found(name)),
            Err(e) => {
                warn!(cluster = %name, error = %e, "Failed to get cluster");
                return Err(e.into());
            }
        };

        let credential = match managed.credential_name() {
            Some(credential_name) => {
                let credentials: Api<ClusterCredential> = Api::all(self.client.clone());
                let credential = credentials.get_opt(&credential_name).await?;
                if credential.is_none() {
                    debug!(
                        cluster = %name,
                        credential = %credential_name,
                        "Cluster has no credential resource"
                    );
                }
                credential
            }
            None => None,
        };

        Ok(Cluster::from_resources(&managed, credential.as_ref())?)
    }
}
