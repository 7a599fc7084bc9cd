//! Per-request cluster access
//!
//! Chains the pipeline every proxied request goes through: resolve the
//! cluster for the caller's tenant, obtain the caller's client certificate
//! when it has a principal, and build the connection config.

use std::sync::Arc;

use tracing::{debug, info};

use clustergate_common::Cluster;

use crate::credentials::CredentialIssuer;
use crate::error::Result;
use crate::identity::Identity;
use crate::resolver::ClusterResolver;
use crate::transport::{ConnectionConfig, ProxyTarget, TransportBuilder};

/// Resolves clusters and builds identity-bound connections to them
pub struct ClusterAccess {
    resolver: ClusterResolver,
    credentials: Arc<CredentialIssuer>,
    transport: TransportBuilder,
}

impl ClusterAccess {
    /// Create the access pipeline
    pub fn new(
        resolver: ClusterResolver,
        credentials: Arc<CredentialIssuer>,
        transport: TransportBuilder,
    ) -> Self {
        Self {
            resolver,
            credentials,
            transport,
        }
    }

    /// Connection config for `identity` on `cluster_name`
    ///
    /// Callers with a principal connect with their own client certificate;
    /// callers without one use the cluster's default credential.
    pub async fn connection_config(
        &self,
        cluster_name: &str,
        identity: &Identity,
    ) -> Result<(Cluster, ConnectionConfig)> {
        let cluster = self.resolver.resolve(cluster_name, &identity.tenant_id).await?;

        let client_cert = match identity.principal() {
            Some(principal) => {
                debug!(cluster = %cluster.name, user = %principal, "Using per-identity client certificate");
                Some(
                    self.credentials
                        .get_or_issue_client_cert(&cluster, identity)
                        .await?,
                )
            }
            None => {
                info!(
                    cluster = %cluster.name,
                    username = %identity.username,
                    "Caller has no principal, using cluster default credential"
                );
                None
            }
        };

        let config = self.transport.build_config(&cluster, client_cert.as_ref())?;
        Ok((cluster, config))
    }

    /// Reverse proxy target for `cluster_name` using its default credential
    pub async fn proxy_target(&self, cluster_name: &str, identity: &Identity) -> Result<ProxyTarget> {
        let cluster = self.resolver.resolve(cluster_name, &identity.tenant_id).await?;
        self.transport.build_config(&cluster, None)?.proxy_target()
    }
}
