//! Per-identity client certificates
//!
//! Every caller with a principal gets its own client certificate for each
//! cluster, signed by that cluster's CA so the remote control plane's RBAC
//! sees the real caller. Certificates are issued once per identity key and
//! persisted as ConfigMaps inside the remote cluster; later requests (from
//! this replica or any other) reuse the stored pair.
//!
//! Lookup order:
//! 1. Process-local [`ClientCertCache`]
//! 2. Cache record in the remote cluster
//! 3. Issue from the remote cluster's CA and persist
//!
//! Steps 2 and 3 run under a per-(cluster, identity key) lock, so a replica
//! never issues the same identity twice concurrently. Across replicas the
//! create is the arbiter: the loser of an `AlreadyExists` race reads back
//! and returns the winner's pair.

mod cache;
mod record;


use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use clustergate_common::{Cluster, CA_CONFIGMAP_NAME, KUBE_SYSTEM_NAMESPACE};

pub use cache::{CacheKey, ClientCertCache, MemoryCertCache, NoopCertCache};
pub use record::record_name;

use crate::ca::CertificateIssuer;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::store::{ControlPlaneStore, StoreConnector, StoreError};

/// PEM-encoded client certificate and private key
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCertPair {
    cert_pem: Vec<u8>,
    key_pem: Zeroizing<Vec<u8>>,
}

impl ClientCertPair {
    /// Wrap PEM bytes
    pub fn new(cert_pem: Vec<u8>, key_pem: Vec<u8>) -> Self {
        Self {
            cert_pem,
            key_pem: Zeroizing::new(key_pem),
        }
    }

    /// Certificate PEM
    pub fn cert_pem(&self) -> &[u8] {
        &self.cert_pem
    }

    /// Private key PEM
    pub fn key_pem(&self) -> &[u8] {
        &self.key_pem
    }
}

impl fmt::Debug for ClientCertPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertPair")
            .field("cert_pem", &format_args!("{} bytes", self.cert_pem.len()))
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

/// Advisory locks keyed by string, removed once uncontended
#[derive(Default)]
struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

struct KeyedGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    async fn lock(&self, key: String) -> KeyedGuard<'_> {
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            locks: &self.locks,
            key,
            guard: Some(guard),
        }
    }
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, m| Arc::strong_count(m) == 1);
    }
}

/// Obtains client certificates for (cluster, identity) pairs
pub struct CredentialIssuer {
    connector: Arc<dyn StoreConnector>,
    ca: Arc<dyn CertificateIssuer>,
    cache: Arc<dyn ClientCertCache>,
    locks: KeyedLocks,
}

impl CredentialIssuer {
    /// Create an issuer
    pub fn new(
        connector: Arc<dyn StoreConnector>,
        ca: Arc<dyn CertificateIssuer>,
        cache: Arc<dyn ClientCertCache>,
    ) -> Self {
        Self {
            connector,
            ca,
            cache,
            locks: KeyedLocks::default(),
        }
    }

    /// Return the client certificate for `identity` on `cluster`, issuing and
    /// persisting one on first use
    ///
    /// The identity must carry a principal.
    pub async fn get_or_issue_client_cert(
        &self,
        cluster: &Cluster,
        identity: &Identity,
    ) -> Result<ClientCertPair> {
        let principal = identity.principal().ok_or_else(|| {
            Error::BadRequest("identity has no principal to issue a certificate for".into())
        })?;
        let identity_key = identity.identity_key();
        let cache_key = CacheKey::new(&cluster.name, &identity_key);

        if let Some(pair) = self.cache.get(&cache_key) {
            debug!(cluster = %cluster.name, principal = %principal, "Client certificate served from local cache");
            return Ok(pair);
        }

        let _guard = self.locks.lock(cache_key.to_string()).await;

        // A concurrent holder of the lock may have filled the cache
        if let Some(pair) = self.cache.get(&cache_key) {
            return Ok(pair);
        }

        let store = self.connector.connect(cluster).await?;
        let name = record_name(&identity_key);

        let pair = match store.get(KUBE_SYSTEM_NAMESPACE, &name).await {
            Ok(existing) => {
                debug!(
                    cluster = %cluster.name,
                    principal = %principal,
                    record = %name,
                    "Reusing persisted client certificate"
                );
                record::pair_from_record(&existing)?
            }
            Err(StoreError::NotFound(_)) => {
                self.issue_and_persist(store.as_ref(), cluster, principal, &identity_key, &name)
                    .await?
            }
            Err(e) => {
                error!(cluster = %cluster.name, record = %name, error = %e, "Failed to read client certificate record");
                return Err(Error::Internal(format!(
                    "failed to read client certificate record of cluster {}: {}",
                    cluster.name, e
                )));
            }
        };

        self.cache.insert(cache_key, pair.clone());
        Ok(pair)
    }

    async fn issue_and_persist(
        &self,
        store: &dyn ControlPlaneStore,
        cluster: &Cluster,
        principal: &str,
        identity_key: &str,
        name: &str,
    ) -> Result<ClientCertPair> {
        let ca_record = store
            .get(KUBE_SYSTEM_NAMESPACE, CA_CONFIGMAP_NAME)
            .await
            .map_err(|e| {
                error!(cluster = %cluster.name, error = %e, "Failed to fetch cluster CA");
                Error::Internal(format!("failed to get CA of cluster {}: {}", cluster.name, e))
            })?;
        let (ca_cert, ca_key) = record::ca_from_record(&ca_record).ok_or_else(|| {
            Error::Internal(format!(
                "CA of cluster {} is missing certificate or key",
                cluster.name
            ))
        })?;

        // Groups stay out of the certificate; RBAC binds on the principal
        let pair = self.ca.issue(principal, &[], &ca_cert, &ca_key)?;

        let record = record::cert_record(name, &cluster.name, principal, identity_key, &pair);
        match store.create(KUBE_SYSTEM_NAMESPACE, record).await {
            Ok(_) => {
                info!(
                    cluster = %cluster.name,
                    principal = %principal,
                    record = %name,
                    "Issued and persisted client certificate"
                );
                Ok(pair)
            }
            Err(StoreError::AlreadyExists(_)) => {
                warn!(
                    cluster = %cluster.name,
                    record = %name,
                    "Client certificate persisted concurrently, using stored record"
                );
                let existing = store.get(KUBE_SYSTEM_NAMESPACE, name).await.map_err(|e| {
                    Error::Internal(format!(
                        "failed to read client certificate record of cluster {}: {}",
                        cluster.name, e
                    ))
                })?;
                record::pair_from_record(&existing)
            }
            Err(e) => {
                error!(cluster = %cluster.name, record = %name, error = %e, "Failed to persist client certificate");
                Err(Error::Internal(format!(
                    "failed to persist client certificate for cluster {}: {}",
                    cluster.name, e
                )))
            }
        }
    }
}
