//! ConfigMap layout of cached certificates and the cluster CA

use std::collections::BTreeMap;

use aws_lc_rs::digest::{digest, SHA256};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;

use clustergate_common::{
    CA_CERT_KEY, CA_KEY_KEY, CERT_CACHE_LABEL_KEY, CERT_CACHE_LABEL_VALUE, KUBE_SYSTEM_NAMESPACE,
};

use super::ClientCertPair;
use crate::error::{Error, Result};

const RECORD_PREFIX: &str = "clientcert-";

const IDENTITY_KEY_FIELD: &str = "identityKey";
const COMMON_NAME_FIELD: &str = "CommonName";
const UIN_FIELD: &str = "UIN";
const CLUSTER_NAME_FIELD: &str = "clusterName";
const CERT_DATA_FIELD: &str = "clientCertData";
const KEY_DATA_FIELD: &str = "clientKeyData";

/// Name of the cache record for `identity_key`
///
/// Identity keys contain characters that are not valid in object names, so
/// the record is named after their SHA-256.
pub fn record_name(identity_key: &str) -> String {
    let hash = digest(&SHA256, identity_key.as_bytes());
    let hex: String = hash.as_ref().iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", RECORD_PREFIX, hex)
}

/// Build the cache record persisted after issuing a certificate
pub fn cert_record(
    name: &str,
    cluster_name: &str,
    principal: &str,
    identity_key: &str,
    pair: &ClientCertPair,
) -> ConfigMap {
    let labels = BTreeMap::from([(
        CERT_CACHE_LABEL_KEY.to_string(),
        CERT_CACHE_LABEL_VALUE.to_string(),
    )]);
    let data = BTreeMap::from([
        (IDENTITY_KEY_FIELD.to_string(), identity_key.to_string()),
        (COMMON_NAME_FIELD.to_string(), principal.to_string()),
        (UIN_FIELD.to_string(), principal.to_string()),
        (CLUSTER_NAME_FIELD.to_string(), cluster_name.to_string()),
    ]);
    let binary_data = BTreeMap::from([
        (
            CERT_DATA_FIELD.to_string(),
            ByteString(pair.cert_pem().to_vec()),
        ),
        (KEY_DATA_FIELD.to_string(), ByteString(pair.key_pem().to_vec())),
    ]);

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(KUBE_SYSTEM_NAMESPACE.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(data),
        binary_data: Some(binary_data),
        ..Default::default()
    }
}

/// Read the certificate pair out of a cache record
pub fn pair_from_record(record: &ConfigMap) -> Result<ClientCertPair> {
    let name = record.metadata.name.as_deref().unwrap_or_default();
    let field = |key: &str| {
        record
            .binary_data
            .as_ref()
            .and_then(|d| d.get(key))
            .map(|b| b.0.clone())
            .filter(|b| !b.is_empty())
    };

    match (field(CERT_DATA_FIELD), field(KEY_DATA_FIELD)) {
        (Some(cert), Some(key)) => Ok(ClientCertPair::new(cert, key)),
        _ => Err(Error::Internal(format!(
            "client certificate record {} is incomplete",
            name
        ))),
    }
}

/// Read the CA certificate and key out of the cluster's CA ConfigMap
///
/// Accepts the material under either `data` or `binaryData`.
pub fn ca_from_record(record: &ConfigMap) -> Option<(Vec<u8>, Vec<u8>)> {
    let field = |key: &str| {
        record
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .map(|s| s.as_bytes().to_vec())
            .or_else(|| {
                record
                    .binary_data
                    .as_ref()
                    .and_then(|d| d.get(key))
                    .map(|b| b.0.clone())
            })
            .filter(|b| !b.is_empty())
    };

    Some((field(CA_CERT_KEY)?, field(CA_KEY_KEY)?))
}
