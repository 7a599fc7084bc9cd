//! Caller identity
//!
//! Authentication happens in front of the proxy. The authenticating layer
//! forwards the caller as request headers, and this module turns those into
//! an [`Identity`]. The identity drives per-identity certificate issuance and
//! is never persisted.

use axum::http::HeaderMap;

use crate::error::{Error, Result};

/// Authenticated username
pub const USER_HEADER: &str = "X-Remote-User";
/// Group membership; may repeat
pub const GROUP_HEADER: &str = "X-Remote-Group";
/// Tenant of the caller
pub const TENANT_HEADER: &str = "X-Remote-Extra-TenantID";
/// Opaque per-user principal used as the client certificate subject
pub const UIN_HEADER: &str = "X-Remote-Extra-Uin";
/// Optional namespace scope
pub const NAMESPACE_HEADER: &str = "X-Remote-Extra-Namespace";

/// Separator between principal and group list in an identity key
const IDENTITY_KEY_SEPARATOR: &str = "###";

/// Request-scoped caller identity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Username
    pub username: String,
    /// Tenant (empty when the caller is not tenant-scoped)
    pub tenant_id: String,
    /// Opaque principal identifier (empty when absent)
    pub uin: String,
    /// Group names, as received
    pub groups: Vec<String>,
    /// Namespace scope
    pub namespace: Option<String>,
}

impl Identity {
    /// Extract the identity from forwarded authentication headers
    ///
    /// A request carrying neither a username nor a principal is rejected.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        let username = header_string(headers, USER_HEADER).unwrap_or_default();
        let uin = header_string(headers, UIN_HEADER).unwrap_or_default();

        if username.is_empty() && uin.is_empty() {
            return Err(Error::Unauthorized(format!(
                "missing {} or {} header",
                USER_HEADER, UIN_HEADER
            )));
        }

        let groups = headers
            .get_all(GROUP_HEADER)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            username,
            tenant_id: header_string(headers, TENANT_HEADER).unwrap_or_default(),
            uin,
            groups,
            namespace: header_string(headers, NAMESPACE_HEADER),
        })
    }

    /// The principal a client certificate is issued for, if any
    pub fn principal(&self) -> Option<&str> {
        Some(self.uin.as_str()).filter(|p| !p.is_empty())
    }

    /// Groups with the synthesized `namespace:<ns>` entry, sorted
    pub fn effective_groups(&self) -> Vec<String> {
        let mut groups = self.groups.clone();
        if let Some(ns) = &self.namespace {
            groups.push(format!("namespace:{}", ns));
        }
        groups.sort();
        groups
    }

    /// Deterministic cache key: `<principal>###[<sorted groups space-separated>]`
    ///
    /// Input group order does not affect the key.
    pub fn identity_key(&self) -> String {
        format!(
            "{}{}[{}]",
            self.uin,
            IDENTITY_KEY_SEPARATOR,
            self.effective_groups().join(" ")
        )
    }
}

/// Extract a trimmed, non-empty header value
fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_static(value),
            );
        }
        map
    }

    fn identity(uin: &str, groups: &[&str], namespace: Option<&str>) -> Identity {
        Identity {
            username: "alice".to_string(),
            tenant_id: "t1".to_string(),
            uin: uin.to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            namespace: namespace.map(String::from),
        }
    }

    // =========================================================================
    // Header Extraction Tests
    // =========================================================================

    #[test]
    fn extracts_all_fields() {
        let id = Identity::from_headers(&headers(&[
            (USER_HEADER, "alice"),
            (TENANT_HEADER, "t1"),
            (UIN_HEADER, "100001"),
            (GROUP_HEADER, "dev"),
            (GROUP_HEADER, "ops"),
            (NAMESPACE_HEADER, "web"),
        ]))
        .unwrap();

        assert_eq!(id.username, "alice");
        assert_eq!(id.tenant_id, "t1");
        assert_eq!(id.uin, "100001");
        assert_eq!(id.groups, vec!["dev", "ops"]);
        assert_eq!(id.namespace.as_deref(), Some("web"));
    }

    #[test]
    fn comma_separated_groups_are_split() {
        let id = Identity::from_headers(&headers(&[
            (USER_HEADER, "alice"),
            (GROUP_HEADER, "dev, ops,,qa"),
        ]))
        .unwrap();
        assert_eq!(id.groups, vec!["dev", "ops", "qa"]);
    }

    #[test]
    fn principal_only_is_accepted() {
        let id = Identity::from_headers(&headers(&[(UIN_HEADER, "100001")])).unwrap();
        assert_eq!(id.principal(), Some("100001"));
        assert!(id.username.is_empty());
    }

    #[test]
    fn missing_identity_is_unauthorized() {
        let err = Identity::from_headers(&headers(&[(TENANT_HEADER, "t1")])).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn blank_headers_are_absent() {
        let id = Identity::from_headers(&headers(&[
            (USER_HEADER, "alice"),
            (UIN_HEADER, "   "),
            (NAMESPACE_HEADER, ""),
        ]))
        .unwrap();
        assert_eq!(id.principal(), None);
        assert_eq!(id.namespace, None);
    }

    // =========================================================================
    // Identity Key Tests
    // =========================================================================

    #[test]
    fn key_without_groups() {
        assert_eq!(identity("u1", &[], None).identity_key(), "u1###[]");
    }

    #[test]
    fn key_sorts_groups() {
        assert_eq!(
            identity("u1", &["ops", "dev"], None).identity_key(),
            "u1###[dev ops]"
        );
    }

    #[test]
    fn key_ignores_group_order() {
        let a = identity("u1", &["b", "a", "c"], Some("ns"));
        let b = identity("u1", &["c", "b", "a"], Some("ns"));
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn key_includes_namespace_scope() {
        assert_eq!(
            identity("u1", &["dev"], Some("web")).identity_key(),
            "u1###[dev namespace:web]"
        );
    }

    #[test]
    fn key_is_deterministic() {
        let id = identity("u1", &["dev"], Some("web"));
        assert_eq!(id.identity_key(), id.clone().identity_key());
    }

    #[test]
    fn key_distinguishes_principals_and_groups() {
        assert_ne!(
            identity("u1", &["dev"], None).identity_key(),
            identity("u2", &["dev"], None).identity_key()
        );
        assert_ne!(
            identity("u1", &["dev"], None).identity_key(),
            identity("u1", &["ops"], None).identity_key()
        );
    }
}
