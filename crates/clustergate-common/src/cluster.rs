//! The resolved cluster record
//!
//! A [`Cluster`] is the identity-independent view of a remote control plane
//! that the proxy works with: where it lives, who owns it, whether it is
//! locked, and which credential material reaches it. It is assembled from a
//! [`ManagedCluster`] and its [`ClusterCredential`].

use url::Url;

use crate::crd::{ClusterCredential, ManagedCluster};
use crate::{Error, Result};

/// Connection material for a remote control plane
#[derive(Clone, Default, PartialEq)]
pub struct ClusterCredentials {
    /// PEM-encoded CA certificate
    pub ca_cert: Option<Vec<u8>>,
    /// PEM-encoded CA private key
    pub ca_key: Option<Vec<u8>>,
    /// Default bearer token
    pub token: Option<String>,
    /// PEM-encoded admin client certificate
    pub client_cert: Option<Vec<u8>>,
    /// PEM-encoded admin client key
    pub client_key: Option<Vec<u8>>,
}

impl ClusterCredentials {
    /// The admin client certificate pair, when both halves are present
    pub fn admin_cert_pair(&self) -> Option<(&[u8], &[u8])> {
        match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => {
                Some((cert.as_slice(), key.as_slice()))
            }
            _ => None,
        }
    }

    /// The bearer token with surrounding whitespace trimmed, if non-empty
    pub fn bearer_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for ClusterCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCredentials")
            .field("ca_cert", &self.ca_cert.is_some())
            .field("ca_key", &self.ca_key.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("client_cert", &self.client_cert.is_some())
            .field("client_key", &self.client_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A remote cluster as seen by the proxy
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    /// Unique cluster name
    pub name: String,
    /// Owning tenant (empty when the cluster is not tenant-scoped)
    pub tenant_id: String,
    /// Administrative lock flag
    pub locked: bool,
    /// Control-plane address as configured (`host:port` or URL)
    pub address: String,
    /// Connection credential
    pub credential: ClusterCredentials,
}

impl Cluster {
    /// Assemble a cluster record from its platform resources
    ///
    /// A missing credential resource yields empty credentials; whether that is
    /// usable is decided when a connection is built.
    pub fn from_resources(
        cluster: &ManagedCluster,
        credential: Option<&ClusterCredential>,
    ) -> Result<Self> {
        let name = cluster
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::validation("cluster has no metadata.name"))?;

        if cluster.spec.address.trim().is_empty() {
            return Err(Error::validation_for_field(
                &name,
                "spec.address",
                "control-plane address is empty",
            ));
        }

        let credential = credential
            .map(|c| ClusterCredentials {
                ca_cert: c.spec.ca_cert.clone().map(String::into_bytes),
                ca_key: c.spec.ca_key.clone().map(String::into_bytes),
                token: c.spec.token.clone(),
                client_cert: c.spec.client_cert.clone().map(String::into_bytes),
                client_key: c.spec.client_key.clone().map(String::into_bytes),
            })
            .unwrap_or_default();

        Ok(Self {
            name,
            tenant_id: cluster.spec.tenant_id.clone(),
            locked: cluster.is_locked(),
            address: cluster.spec.address.trim().to_string(),
            credential,
        })
    }

    /// Base URL of the cluster's control plane
    ///
    /// Bare `host:port` addresses are treated as HTTPS.
    pub fn server_url(&self) -> Result<Url> {
        let raw = if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("https://{}", self.address)
        };

        let url = Url::parse(&raw).map_err(|e| {
            Error::validation_for_field(
                &self.name,
                "spec.address",
                format!("invalid control-plane address '{}': {}", self.address, e),
            )
        })?;

        if url.host_str().is_none() {
            return Err(Error::validation_for_field(
                &self.name,
                "spec.address",
                format!("control-plane address '{}' has no host", self.address),
            ));
        }

        Ok(url)
    }
}
