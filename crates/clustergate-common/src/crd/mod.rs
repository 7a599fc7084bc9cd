//! Custom Resource Definitions for the central platform control plane
//!
//! The cluster directory reads these to assemble a [`crate::Cluster`].

mod cluster;
mod credential;

pub use cluster::{ManagedCluster, ManagedClusterSpec, ManagedClusterStatus};
pub use credential::{ClusterCredential, ClusterCredentialSpec};
