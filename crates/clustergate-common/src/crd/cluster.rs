//! ManagedCluster Custom Resource Definition
//!
//! A ManagedCluster is a remote, independently administered control plane
//! that the proxy can forward requests to. The proxy only reads it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a ManagedCluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "platform.clustergate.dev",
    version = "v1",
    kind = "ManagedCluster",
    plural = "managedclusters",
    shortname = "mcl",
    status = "ManagedClusterStatus",
    printcolumn = r#"{"name":"Tenant","type":"string","jsonPath":".spec.tenantID"}"#,
    printcolumn = r#"{"name":"Address","type":"string","jsonPath":".spec.address"}"#,
    printcolumn = r#"{"name":"Locked","type":"boolean","jsonPath":".status.locked"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSpec {
    /// Tenant that owns the cluster
    #[serde(default, rename = "tenantID")]
    pub tenant_id: String,

    /// Control-plane address, either `host:port` or a full `https://` URL
    pub address: String,

    /// Name of the ClusterCredential holding CA and admin material.
    /// Defaults to the cluster name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_ref: Option<String>,

    /// Human readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Status for a ManagedCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterStatus {
    /// Administrative lock; a locked cluster accepts no proxy operations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,

    /// Lifecycle phase as reported by the provisioning side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl ManagedCluster {
    /// Whether the cluster is administratively locked
    pub fn is_locked(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.locked)
            .unwrap_or(false)
    }

    /// Name of the ClusterCredential backing this cluster
    pub fn credential_name(&self) -> Option<String> {
        self.spec
            .credential_ref
            .clone()
            .filter(|r| !r.is_empty())
            .or_else(|| self.metadata.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn cluster(locked: Option<bool>, credential_ref: Option<&str>) -> ManagedCluster {
        ManagedCluster {
            metadata: ObjectMeta {
                name: Some("cls-1".to_string()),
                ..Default::default()
            },
            spec: ManagedClusterSpec {
                tenant_id: "t1".to_string(),
                address: "10.0.0.1:6443".to_string(),
                credential_ref: credential_ref.map(String::from),
                display_name: None,
            },
            status: Some(ManagedClusterStatus {
                locked,
                phase: None,
            }),
        }
    }

    #[test]
    fn lock_flag_defaults_to_unlocked() {
        assert!(!cluster(None, None).is_locked());
        assert!(!cluster(Some(false), None).is_locked());
        assert!(cluster(Some(true), None).is_locked());
    }

    #[test]
    fn missing_status_is_unlocked() {
        let mut c = cluster(None, None);
        c.status = None;
        assert!(!c.is_locked());
    }

    #[test]
    fn credential_name_falls_back_to_cluster_name() {
        assert_eq!(cluster(None, None).credential_name().as_deref(), Some("cls-1"));
        assert_eq!(
            cluster(None, Some("")).credential_name().as_deref(),
            Some("cls-1")
        );
        assert_eq!(
            cluster(None, Some("cc-abc")).credential_name().as_deref(),
            Some("cc-abc")
        );
    }

    #[test]
    fn crd_is_cluster_scoped_in_platform_group() {
        use kube::{CustomResourceExt, Resource};
        assert_eq!(ManagedCluster::group(&()), crate::PLATFORM_GROUP);
        assert_eq!(ManagedCluster::crd().spec.scope, "Cluster");
    }

    #[test]
    fn spec_uses_tenant_id_wire_name() {
        let json = serde_json::to_value(&cluster(None, None).spec).unwrap();
        assert_eq!(json["tenantID"], "t1");
        assert_eq!(json["address"], "10.0.0.1:6443");
    }
}
