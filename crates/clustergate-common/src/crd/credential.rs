//! ClusterCredential Custom Resource Definition
//!
//! Holds the connection material for one ManagedCluster: the cluster CA and
//! the default (admin) credential used when no per-identity certificate
//! applies. PEM fields are stored as plain strings.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a ClusterCredential
#[derive(CustomResource, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "platform.clustergate.dev",
    version = "v1",
    kind = "ClusterCredential",
    plural = "clustercredentials",
    shortname = "cc"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCredentialSpec {
    /// Name of the ManagedCluster this credential belongs to
    pub cluster_name: String,

    /// PEM-encoded CA certificate of the remote control plane
    #[serde(default, rename = "caCert", skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,

    /// PEM-encoded CA private key of the remote control plane
    #[serde(default, rename = "caKey", skip_serializing_if = "Option::is_none")]
    pub ca_key: Option<String>,

    /// Default bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// PEM-encoded admin client certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<String>,

    /// PEM-encoded admin client private key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
}

impl std::fmt::Debug for ClusterCredentialSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCredentialSpec")
            .field("cluster_name", &self.cluster_name)
            .field("ca_cert", &self.ca_cert.is_some())
            .field("ca_key", &self.ca_key.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("client_cert", &self.client_cert.is_some())
            .field("client_key", &self.client_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
