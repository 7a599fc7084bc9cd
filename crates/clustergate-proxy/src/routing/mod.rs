//! Path handling for proxied requests
//!
//! Strips the `/clusters/{name}` prefix from request paths and splits the
//! remaining Kubernetes API path into group, version and rest.

mod path;

pub use path::{strip_cluster_prefix, ApiPath};
