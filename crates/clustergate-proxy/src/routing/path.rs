//! Path utilities for the cluster proxy

/// Strip the `/clusters/{cluster_name}` prefix to get the Kubernetes API path
///
/// # Examples
///
/// ```
/// use clustergate_proxy::routing::strip_cluster_prefix;
///
/// assert_eq!(
///     strip_cluster_prefix("/clusters/cls-1/api/v1/pods", "cls-1"),
///     "/api/v1/pods"
/// );
/// ```
pub fn strip_cluster_prefix<'a>(full_path: &'a str, cluster_name: &str) -> &'a str {
    let prefix = format!("/clusters/{}", cluster_name);
    full_path.strip_prefix(&prefix).unwrap_or(full_path)
}

/// A Kubernetes API path split into its routing parts
///
/// `/api/{version}/...` is the core group (empty group name);
/// `/apis/{group}/{version}/...` is a named group. Anything else (discovery
/// roots, `/version`, `/openapi/...`) has an empty group and version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiPath {
    /// API group; empty for the core group
    pub group: String,
    /// API version; empty when the path names none
    pub version: String,
    /// Remainder after the group/version prefix, starting with `/` or empty
    pub rest: String,
    /// The full API path as received
    pub raw: String,
}

impl ApiPath {
    /// Parse an API path
    pub fn parse(path: &str) -> Self {
        let raw = if path.is_empty() { "/" } else { path };
        let mut segments = raw.trim_start_matches('/').splitn(2, '/');
        let root = segments.next().unwrap_or_default();
        let tail = segments.next().unwrap_or_default();

        let (group, version, rest) = match root {
            "api" => {
                let (version, rest) = split_segment(tail);
                (String::new(), version, rest)
            }
            "apis" => {
                let (group, after_group) = split_segment(tail);
                let (version, rest) = split_segment(after_group.trim_start_matches('/'));
                (group, version, rest)
            }
            _ => (String::new(), String::new(), String::new()),
        };

        Self {
            group,
            version,
            rest,
            raw: raw.to_string(),
        }
    }
}

/// Split `seg/rest...` into `("seg", "/rest...")`
fn split_segment(path: &str) -> (String, String) {
    match path.find('/') {
        Some(idx) => (path[..idx].to_string(), path[idx..].to_string()),
        None => (path.to_string(), String::new()),
    }
}
