//! Common types for clustergate: platform CRDs, the resolved cluster record,
//! kube client helpers and the add-on image catalog

#![deny(missing_docs)]

pub mod cluster;
pub mod crd;
pub mod error;
pub mod images;
pub mod kube_utils;

pub use cluster::{Cluster, ClusterCredentials};
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace in every remote cluster that holds the CA and cached client certificates
pub const KUBE_SYSTEM_NAMESPACE: &str = "kube-system";

/// Well-known ConfigMap in [`KUBE_SYSTEM_NAMESPACE`] holding the cluster CA (`ca.crt`, `ca.key`)
pub const CA_CONFIGMAP_NAME: &str = "config";

/// Data key of the CA certificate inside [`CA_CONFIGMAP_NAME`]
pub const CA_CERT_KEY: &str = "ca.crt";

/// Data key of the CA private key inside [`CA_CONFIGMAP_NAME`]
pub const CA_KEY_KEY: &str = "ca.key";

/// Label key marking a ConfigMap as a cached per-identity client certificate
pub const CERT_CACHE_LABEL_KEY: &str = "rbac.cert";

/// Label value paired with [`CERT_CACHE_LABEL_KEY`]
pub const CERT_CACHE_LABEL_VALUE: &str = "cert";

/// API group of the platform CRDs
pub const PLATFORM_GROUP: &str = "platform.clustergate.dev";
