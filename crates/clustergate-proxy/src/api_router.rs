//! Versioned API routing
//!
//! Maps a request's API group/version to the sub-client that serves it. The
//! table is static: built once and never mutated. Group/versions the table
//! does not know are served by a generic client over the same connection,
//! so routing never fails.

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{Request, Response};
use tracing::trace;

use crate::error::{Error, Result};
use crate::routing::ApiPath;

macro_rules! api_surfaces {
    ($($variant:ident => ($group:literal, $version:literal),)+) => {
        /// A known API group/version with a typed sub-client
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum ApiSurface {
            $(
                #[allow(missing_docs)]
                $variant,
            )+
        }

        impl ApiSurface {
            /// Every known surface
            pub const ALL: &'static [ApiSurface] = &[$(ApiSurface::$variant,)+];

            /// API group (empty for core) and version
            pub fn group_version(self) -> (&'static str, &'static str) {
                match self {
                    $(ApiSurface::$variant => ($group, $version),)+
                }
            }
        }
    };
}

api_surfaces! {
    CoreV1 => ("", "v1"),
    AppsV1 => ("apps", "v1"),
    AppsV1beta1 => ("apps", "v1beta1"),
    AppsV1beta2 => ("apps", "v1beta2"),
    AdmissionregistrationV1beta1 => ("admissionregistration.k8s.io", "v1beta1"),
    AutoscalingV1 => ("autoscaling", "v1"),
    AutoscalingV2beta1 => ("autoscaling", "v2beta1"),
    BatchV1 => ("batch", "v1"),
    BatchV1beta1 => ("batch", "v1beta1"),
    BatchV2alpha1 => ("batch", "v2alpha1"),
    CertificatesV1beta1 => ("certificates.k8s.io", "v1beta1"),
    EventsV1beta1 => ("events.k8s.io", "v1beta1"),
    ExtensionsV1beta1 => ("extensions", "v1beta1"),
    NetworkingV1 => ("networking.k8s.io", "v1"),
    NetworkingV1beta1 => ("networking.k8s.io", "v1beta1"),
    CoordinationV1 => ("coordination.k8s.io", "v1"),
    CoordinationV1beta1 => ("coordination.k8s.io", "v1beta1"),
    PolicyV1beta1 => ("policy", "v1beta1"),
    RbacV1alpha1 => ("rbac.authorization.k8s.io", "v1alpha1"),
    RbacV1 => ("rbac.authorization.k8s.io", "v1"),
    RbacV1beta1 => ("rbac.authorization.k8s.io", "v1beta1"),
    SchedulingV1alpha1 => ("scheduling.k8s.io", "v1alpha1"),
    SchedulingV1beta1 => ("scheduling.k8s.io", "v1beta1"),
    SchedulingV1 => ("scheduling.k8s.io", "v1"),
    NodeV1alpha1 => ("node.k8s.io", "v1alpha1"),
    NodeV1beta1 => ("node.k8s.io", "v1beta1"),
    SettingsV1alpha1 => ("settings.k8s.io", "v1alpha1"),
    StorageV1alpha1 => ("storage.k8s.io", "v1alpha1"),
    StorageV1 => ("storage.k8s.io", "v1"),
    StorageV1beta1 => ("storage.k8s.io", "v1beta1"),
}

impl ApiSurface {
    /// Routing key of this surface
    pub fn key(self) -> String {
        let (group, version) = self.group_version();
        normalize(group, version)
    }

    /// API base path: `/api/<version>` for core, `/apis/<group>/<version>` otherwise
    pub fn base_path(self) -> String {
        match self.group_version() {
            ("", version) => format!("/api/{}", version),
            (group, version) => format!("/apis/{}/{}", group, version),
        }
    }
}

/// Lowercase `"<group>/<version>"`; the core group yields `"/<version>"`
pub fn normalize(group: &str, version: &str) -> String {
    format!("{}/{}", group, version).to_lowercase()
}

/// Static group/version routing table
#[derive(Debug)]
pub struct ApiRouter {
    table: HashMap<String, ApiSurface>,
}

impl Default for ApiRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiRouter {
    /// Build the table of known surfaces
    pub fn new() -> Self {
        let table = ApiSurface::ALL.iter().map(|s| (s.key(), *s)).collect();
        Self { table }
    }

    /// Known surface for a group/version, if any
    pub fn route(&self, group: &str, version: &str) -> Option<ApiSurface> {
        self.table.get(&normalize(group, version)).copied()
    }

    /// Sub-client for a group/version over `client`'s connection
    pub fn sub_client_for(&self, client: &kube::Client, group: &str, version: &str) -> ApiClient {
        let surface = self.route(group, version);
        trace!(group = %group, version = %version, surface = ?surface, "Routed API request");
        ApiClient {
            client: client.clone(),
            surface,
        }
    }

    /// Number of known surfaces
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// A typed or generic accessor over one connection
///
/// Every surface shares the same `kube::Client`; the only per-surface
/// behavior is the base path from [`ApiSurface::base_path`] that
/// [`ApiClient::request_uri`] rebuilds requests on.
#[derive(Clone)]
pub struct ApiClient {
    client: kube::Client,
    surface: Option<ApiSurface>,
}

impl ApiClient {
    /// The typed surface, or `None` for the generic client
    pub fn surface(&self) -> Option<ApiSurface> {
        self.surface
    }

    /// Whether this is the generic fallback client
    pub fn is_generic(&self) -> bool {
        self.surface.is_none()
    }

    /// Request path and query this client sends for `path`
    ///
    /// Typed clients rebuild the path from their base path; the generic
    /// client forwards the inbound path verbatim.
    pub fn request_uri(&self, path: &ApiPath, query: Option<&str>) -> String {
        let mut uri = match self.surface {
            Some(surface) => format!("{}{}", surface.base_path(), path.rest),
            None => path.raw.clone(),
        };
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            uri.push('?');
            uri.push_str(q);
        }
        uri
    }

    /// Send a request over the connection
    pub async fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Body>> {
        let response = self
            .client
            .send(request.map(kube::client::Body::from))
            .await
            .map_err(|e| Error::Proxy(e.to_string()))?;
        Ok(response.map(Body::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn init_crypto() {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }

    fn client() -> kube::Client {
        init_crypto();
        let ca = clustergate_pki::CertificateAuthority::new("test-ca").unwrap();
        let mut config = kube::Config::new("https://10.0.0.1:6443".parse().unwrap());
        config.root_cert = Some(vec![clustergate_pki::parse_pem(ca.ca_cert_pem()).unwrap()]);
        kube::Client::try_from(config).unwrap()
    }

    #[test]
    fn table_has_every_surface() {
        let router = ApiRouter::new();
        assert_eq!(router.len(), 30);
        assert_eq!(router.len(), ApiSurface::ALL.len());
    }

    #[rstest]
    #[case("", "v1", ApiSurface::CoreV1)]
    #[case("apps", "v1", ApiSurface::AppsV1)]
    #[case("Apps", "V1", ApiSurface::AppsV1)]
    #[case("batch", "v2alpha1", ApiSurface::BatchV2alpha1)]
    #[case("rbac.authorization.k8s.io", "v1", ApiSurface::RbacV1)]
    #[case("storage.k8s.io", "v1beta1", ApiSurface::StorageV1beta1)]
    fn known_pairs_route_to_typed_surface(
        #[case] group: &str,
        #[case] version: &str,
        #[case] expected: ApiSurface,
    ) {
        assert_eq!(ApiRouter::new().route(group, version), Some(expected));
    }

    #[rstest]
    #[case("cls.cloud.tencent.com", "v1")]
    #[case("apps", "v2")]
    #[case("", "")]
    fn unknown_pairs_have_no_surface(#[case] group: &str, #[case] version: &str) {
        assert_eq!(ApiRouter::new().route(group, version), None);
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize("", "v1"), "/v1");
        assert_eq!(normalize("Apps", "V1"), "apps/v1");
    }

    #[test]
    fn base_paths() {
        assert_eq!(ApiSurface::CoreV1.base_path(), "/api/v1");
        assert_eq!(ApiSurface::AppsV1.base_path(), "/apis/apps/v1");
    }

    #[tokio::test]
    async fn sub_client_is_always_usable() {
        let router = ApiRouter::new();
        let client = client();

        let typed = router.sub_client_for(&client, "apps", "v1");
        assert_eq!(typed.surface(), Some(ApiSurface::AppsV1));

        let generic = router.sub_client_for(&client, "example.com", "v9");
        assert!(generic.is_generic());
    }

    #[tokio::test]
    async fn typed_uri_uses_base_path_and_generic_uses_raw() {
        let router = ApiRouter::new();
        let client = client();

        let path = ApiPath::parse("/apis/Apps/v1/namespaces/default/deployments");
        let typed = router.sub_client_for(&client, &path.group, &path.version);
        assert_eq!(
            typed.request_uri(&path, Some("watch=true")),
            "/apis/apps/v1/namespaces/default/deployments?watch=true"
        );

        let path = ApiPath::parse("/apis/cls.cloud.tencent.com/v1/logconfigs");
        let generic = router.sub_client_for(&client, &path.group, &path.version);
        assert_eq!(
            generic.request_uri(&path, None),
            "/apis/cls.cloud.tencent.com/v1/logconfigs"
        );
    }
}
