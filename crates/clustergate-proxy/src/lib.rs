//! Clustergate cluster access proxy
//!
//! Fronts many remote Kubernetes control planes. Each request is bound to
//! the caller's own identity on the target cluster: the proxy issues (once)
//! and reuses a client certificate per caller, signed by that cluster's CA.
//!
//! # Architecture
//!
//! ```text
//! caller ──► resolve ──► credential ──► connection ──► API router ──► remote API
//!            (tenant,    (per-identity  (mTLS / default   (group/version)
//!             lock)       client cert)   credential)
//! ```
//!
//! # Endpoints
//!
//! - `* /clusters/{name}/api/*` - Proxy to the cluster's core API
//! - `* /clusters/{name}/apis/*` - Proxy to the cluster's API groups
//! - `* /clusters/{name}/logconfigs[/{name}]` - Reverse proxy for log configs
//! - `GET /healthz` - Health check

#![deny(missing_docs)]

pub mod access;
pub mod api_router;
pub mod ca;
pub mod credentials;
pub mod directory;
pub mod error;
pub mod identity;
pub mod logconfig;
pub mod proxy;
pub mod resolver;
pub mod routing;
pub mod server;
pub mod store;
pub mod transport;

pub use access::ClusterAccess;
pub use api_router::{ApiRouter, ApiSurface};
pub use ca::{CertificateIssuer, PkiCertificateIssuer};
pub use credentials::{
    ClientCertCache, ClientCertPair, CredentialIssuer, MemoryCertCache, NoopCertCache,
};
pub use directory::KubeClusterDirectory;
pub use error::{Error, Result};
pub use identity::Identity;
pub use resolver::{ClusterDirectory, ClusterResolver};
pub use server::{build_router, start_server, AppState, ServerConfig};
pub use store::{ControlPlaneStore, KubeStoreConnector, StoreConnector};
pub use transport::{ConnectionConfig, ProxyTarget, TransportBuilder};
