//! Connection configuration for remote control planes
//!
//! A [`ConnectionConfig`] is built per request from the resolved cluster and,
//! when the caller has a principal, that caller's client certificate. It is
//! never shared across identities.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use kube::config::{KubeConfigOptions, Kubeconfig};
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

use clustergate_common::kube_utils::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use clustergate_common::Cluster;

use crate::credentials::ClientCertPair;
use crate::error::{Error, Result};

/// Credential presented to the remote control plane
#[derive(Clone)]
pub enum ClientAuth {
    /// Per-identity client certificate
    Identity(ClientCertPair),
    /// The cluster's own default credential
    Default {
        /// Admin client certificate, if configured
        client_cert: Option<ClientCertPair>,
        /// Bearer token, if configured
        token: Option<Zeroizing<String>>,
    },
}

impl std::fmt::Debug for ClientAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientAuth::Identity(pair) => f.debug_tuple("Identity").field(pair).finish(),
            ClientAuth::Default { client_cert, token } => f
                .debug_struct("Default")
                .field("client_cert", client_cert)
                .field("token", &token.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// Everything needed to open a connection to one remote control plane as
/// one identity
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Cluster the config targets
    pub cluster_name: String,
    /// Control-plane base URL
    pub server_url: Url,
    /// PEM trust anchor for the control plane, if configured
    pub ca_cert: Option<Vec<u8>>,
    /// Credential presented
    pub auth: ClientAuth,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Read timeout; `None` for long-lived streams
    pub read_timeout: Option<Duration>,
}

/// Reverse proxy destination for a cluster
#[derive(Clone, Debug)]
pub struct ProxyTarget {
    /// Control-plane base URL
    pub location: Url,
    /// HTTP client configured with the cluster's trust anchor and client cert
    pub transport: reqwest::Client,
    /// Bearer token to present, trimmed
    pub token: Option<String>,
}

/// Builds [`ConnectionConfig`]s with shared timeout settings
#[derive(Clone, Copy, Debug)]
pub struct TransportBuilder {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }
}

impl TransportBuilder {
    /// Create a builder with the given timeouts
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }

    /// Build the connection config for `cluster`
    ///
    /// With a `client_cert` the config authenticates as that identity only;
    /// the cluster's default credential is not mixed in. Without one, the
    /// cluster's admin certificate and/or bearer token are used.
    pub fn build_config(
        &self,
        cluster: &Cluster,
        client_cert: Option<&ClientCertPair>,
    ) -> Result<ConnectionConfig> {
        let server_url = cluster.server_url()?;

        let ca_cert = match cluster.credential.ca_cert.as_deref() {
            Some(ca) if !ca.is_empty() => {
                validate_pem(ca, "CA certificate", &cluster.name)?;
                Some(ca.to_vec())
            }
            _ => None,
        };

        let auth = match client_cert {
            Some(pair) => {
                validate_pem(pair.cert_pem(), "client certificate", &cluster.name)?;
                validate_pem(pair.key_pem(), "client key", &cluster.name)?;
                ClientAuth::Identity(pair.clone())
            }
            None => {
                let admin = match cluster.credential.admin_cert_pair() {
                    Some((cert, key)) => {
                        validate_pem(cert, "admin certificate", &cluster.name)?;
                        validate_pem(key, "admin key", &cluster.name)?;
                        Some(ClientCertPair::new(cert.to_vec(), key.to_vec()))
                    }
                    None => None,
                };
                let token = cluster
                    .credential
                    .bearer_token()
                    .map(|t| Zeroizing::new(t.to_string()));

                if admin.is_none() && token.is_none() {
                    return Err(Error::Internal(format!(
                        "cluster {} has no default credential",
                        cluster.name
                    )));
                }
                ClientAuth::Default {
                    client_cert: admin,
                    token,
                }
            }
        };

        debug!(
            cluster = %cluster.name,
            server = %server_url,
            identity_bound = matches!(auth, ClientAuth::Identity(_)),
            "Built connection config"
        );

        Ok(ConnectionConfig {
            cluster_name: cluster.name.clone(),
            server_url,
            ca_cert,
            auth,
            connect_timeout: self.connect_timeout,
            read_timeout: Some(self.read_timeout),
        })
    }
}

fn validate_pem(data: &[u8], what: &str, cluster: &str) -> Result<()> {
    pem::parse_many(data)
        .ok()
        .filter(|blocks| !blocks.is_empty())
        .map(|_| ())
        .ok_or_else(|| Error::Internal(format!("cluster {} has a malformed {}", cluster, what)))
}

impl ConnectionConfig {
    fn client_cert(&self) -> Option<&ClientCertPair> {
        match &self.auth {
            ClientAuth::Identity(pair) => Some(pair),
            ClientAuth::Default { client_cert, .. } => client_cert.as_ref(),
        }
    }

    fn token(&self) -> Option<&str> {
        match &self.auth {
            ClientAuth::Identity(_) => None,
            ClientAuth::Default { token, .. } => token.as_ref().map(|t| t.as_str()),
        }
    }

    /// Drop the read timeout for watch and log-follow streams
    pub fn streaming(mut self) -> Self {
        self.read_timeout = None;
        self
    }

    /// Whether the config authenticates as a per-identity certificate
    pub fn is_identity_bound(&self) -> bool {
        matches!(self.auth, ClientAuth::Identity(_))
    }

    /// Render as a single-context kubeconfig
    pub fn to_kubeconfig(&self) -> Result<Kubeconfig> {
        let mut user = serde_json::Map::new();
        if let Some(pair) = self.client_cert() {
            user.insert(
                "client-certificate-data".into(),
                STANDARD.encode(pair.cert_pem()).into(),
            );
            user.insert(
                "client-key-data".into(),
                STANDARD.encode(pair.key_pem()).into(),
            );
        }
        if let Some(token) = self.token() {
            user.insert("token".into(), token.into());
        }

        let mut cluster = serde_json::Map::new();
        cluster.insert(
            "server".into(),
            self.server_url.as_str().trim_end_matches('/').into(),
        );
        if let Some(ca) = &self.ca_cert {
            cluster.insert(
                "certificate-authority-data".into(),
                STANDARD.encode(ca).into(),
            );
        }

        let name = &self.cluster_name;
        let value = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Config",
            "clusters": [{ "name": name, "cluster": cluster }],
            "users": [{ "name": name, "user": user }],
            "contexts": [{ "name": name, "context": { "cluster": name, "user": name } }],
            "current-context": name,
        });

        serde_json::from_value(value)
            .map_err(|e| Error::Internal(format!("failed to render kubeconfig for {}: {}", name, e)))
    }

    /// Build a kube client for this config
    pub async fn kube_client(&self) -> Result<kube::Client> {
        let kubeconfig = self.to_kubeconfig()?;
        let mut config =
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::Internal(format!(
                        "failed to build config for cluster {}: {}",
                        self.cluster_name, e
                    ))
                })?;
        config.connect_timeout = Some(self.connect_timeout);
        config.read_timeout = self.read_timeout;

        kube::Client::try_from(config).map_err(|e| {
            Error::Internal(format!(
                "failed to build client for cluster {}: {}",
                self.cluster_name, e
            ))
        })
    }

    /// Reverse proxy destination using this config's trust and credential
    pub fn proxy_target(&self) -> Result<ProxyTarget> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(self.connect_timeout);

        if let Some(ca) = &self.ca_cert {
            let cert = reqwest::Certificate::from_pem(ca).map_err(|e| {
                Error::Internal(format!(
                    "invalid CA certificate for cluster {}: {}",
                    self.cluster_name, e
                ))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        if let Some(pair) = self.client_cert() {
            let mut pem = Zeroizing::new(pair.cert_pem().to_vec());
            pem.push(b'\n');
            pem.extend_from_slice(pair.key_pem());
            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                Error::Internal(format!(
                    "invalid client certificate for cluster {}: {}",
                    self.cluster_name, e
                ))
            })?;
            builder = builder.identity(identity);
        }

        let transport = builder.build().map_err(|e| {
            Error::Internal(format!(
                "failed to build transport for cluster {}: {}",
                self.cluster_name, e
            ))
        })?;

        Ok(ProxyTarget {
            location: self.server_url.clone(),
            transport,
            token: self.token().map(String::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clustergate_common::ClusterCredentials;
    use clustergate_pki::CertificateAuthority;

    fn init_crypto() {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }

    fn cluster(credential: ClusterCredentials) -> Cluster {
        Cluster {
            name: "cls-1".into(),
            tenant_id: "t1".into(),
            locked: false,
            address: "10.0.0.1:6443".into(),
            credential,
        }
    }

    fn issued(ca: &CertificateAuthority, cn: &str) -> ClientCertPair {
        let (cert, key) = ca.issue_client_cert(cn, &[]).unwrap();
        ClientCertPair::new(cert.into_bytes(), key.into_bytes())
    }

    fn admin_credentials(ca: &CertificateAuthority) -> ClusterCredentials {
        let admin = issued(ca, "admin");
        ClusterCredentials {
            ca_cert: Some(ca.ca_cert_pem().as_bytes().to_vec()),
            ca_key: Some(ca.ca_key_pem().as_bytes().to_vec()),
            token: Some("  admin-token \n".into()),
            client_cert: Some(admin.cert_pem().to_vec()),
            client_key: Some(admin.key_pem().to_vec()),
        }
    }

    #[test]
    fn identity_cert_replaces_default_credential() {
        let ca = CertificateAuthority::new("cls-1-ca").unwrap();
        let pair = issued(&ca, "u1");
        let config = TransportBuilder::default()
            .build_config(&cluster(admin_credentials(&ca)), Some(&pair))
            .unwrap();

        assert!(config.is_identity_bound());
        assert_eq!(config.client_cert(), Some(&pair));
        assert_eq!(config.token(), None);
        assert_eq!(config.server_url.as_str(), "https://10.0.0.1:6443/");
    }

    #[test]
    fn default_credential_uses_admin_pair_and_trimmed_token() {
        let ca = CertificateAuthority::new("cls-1-ca").unwrap();
        let config = TransportBuilder::default()
            .build_config(&cluster(admin_credentials(&ca)), None)
            .unwrap();

        assert!(!config.is_identity_bound());
        assert!(config.client_cert().is_some());
        assert_eq!(config.token(), Some("admin-token"));
    }

    #[test]
    fn token_only_cluster_is_usable() {
        let config = TransportBuilder::default()
            .build_config(
                &cluster(ClusterCredentials {
                    token: Some("tok".into()),
                    ..Default::default()
                }),
                None,
            )
            .unwrap();
        assert_eq!(config.token(), Some("tok"));
        assert!(config.client_cert().is_none());
    }

    #[test]
    fn no_default_credential_is_internal() {
        let err = TransportBuilder::default()
            .build_config(&cluster(ClusterCredentials::default()), None)
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn malformed_ca_is_internal() {
        let err = TransportBuilder::default()
            .build_config(
                &cluster(ClusterCredentials {
                    ca_cert: Some(b"not a pem".to_vec()),
                    token: Some("tok".into()),
                    ..Default::default()
                }),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Internal(m) if m.contains("CA certificate")));
    }

    #[test]
    fn malformed_client_cert_is_internal() {
        let ca = CertificateAuthority::new("cls-1-ca").unwrap();
        let bad = ClientCertPair::new(b"junk".to_vec(), b"junk".to_vec());
        let err = TransportBuilder::default()
            .build_config(&cluster(admin_credentials(&ca)), Some(&bad))
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn kubeconfig_carries_server_ca_and_cert() {
        let ca = CertificateAuthority::new("cls-1-ca").unwrap();
        let pair = issued(&ca, "u1");
        let config = TransportBuilder::default()
            .build_config(&cluster(admin_credentials(&ca)), Some(&pair))
            .unwrap();

        let kubeconfig = config.to_kubeconfig().unwrap();
        assert_eq!(kubeconfig.current_context.as_deref(), Some("cls-1"));

        let named = &kubeconfig.clusters[0];
        let remote = named.cluster.as_ref().unwrap();
        assert_eq!(remote.server.as_deref(), Some("https://10.0.0.1:6443"));
        assert_eq!(
            remote.certificate_authority_data.as_deref(),
            Some(STANDARD.encode(ca.ca_cert_pem()).as_str())
        );

        let user = kubeconfig.auth_infos[0].auth_info.as_ref().unwrap();
        assert_eq!(
            user.client_certificate_data.as_deref(),
            Some(STANDARD.encode(pair.cert_pem()).as_str())
        );
        assert!(user.token.is_none());
    }

    #[tokio::test]
    async fn kube_client_builds_without_connecting() {
        init_crypto();
        let ca = CertificateAuthority::new("cls-1-ca").unwrap();
        let pair = issued(&ca, "u1");
        let config = TransportBuilder::default()
            .build_config(&cluster(admin_credentials(&ca)), Some(&pair))
            .unwrap();

        assert!(config.kube_client().await.is_ok());
    }

    #[test]
    fn proxy_target_uses_default_token() {
        init_crypto();
        let ca = CertificateAuthority::new("cls-1-ca").unwrap();
        let config = TransportBuilder::default()
            .build_config(&cluster(admin_credentials(&ca)), None)
            .unwrap();

        let target = config.proxy_target().unwrap();
        assert_eq!(target.location.as_str(), "https://10.0.0.1:6443/");
        assert_eq!(target.token.as_deref(), Some("admin-token"));
    }
}
