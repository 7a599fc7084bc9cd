//! Proxy handlers
//!
//! `/clusters/{cluster}/api[s]/...` goes through the versioned API router on
//! a connection bound to the caller's identity. `/clusters/{cluster}/logconfigs`
//! goes through the log config reverse proxy.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, COOKIE, HOST};
use axum::http::request::Parts;
use axum::http::{HeaderName, Request};
use axum::response::Response;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::logconfig::{self, is_hop_by_hop, LogConfigProxy};
use crate::routing::{strip_cluster_prefix, ApiPath};
use crate::server::AppState;

/// Largest request body forwarded through the API router
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Path parameters for API proxy routes
#[derive(Debug, Deserialize)]
pub struct ProxyPath {
    /// Target cluster name
    pub cluster_name: String,
    /// Remainder of the path
    #[serde(default)]
    pub path: String,
}

/// Path parameters for log config routes
#[derive(Debug, Deserialize)]
pub struct LogConfigPath {
    /// Target cluster name
    pub cluster_name: String,
    /// Log config name; absent for the collection
    #[serde(default)]
    pub name: Option<String>,
}

/// Handle `/clusters/{cluster_name}/api/*` and `/clusters/{cluster_name}/apis/*`
///
/// Flow:
/// 1. Extract the forwarded identity
/// 2. Resolve the cluster and obtain the caller's credential
/// 3. Route by group/version and forward
pub async fn proxy_handler(
    State(state): State<AppState>,
    Path(params): Path<ProxyPath>,
    request: Request<Body>,
) -> Result<Response<Body>> {
    let cluster_name = &params.cluster_name;
    let identity = Identity::from_headers(request.headers())?;
    let (parts, body) = request.into_parts();

    let api_path = ApiPath::parse(strip_cluster_prefix(parts.uri.path(), cluster_name));
    debug!(
        cluster = %cluster_name,
        method = %parts.method,
        path = %api_path.raw,
        user = %identity.uin,
        "Proxy request received"
    );

    let (_, mut config) = state
        .access
        .connection_config(cluster_name, &identity)
        .await?;
    if is_streaming(parts.uri.query()) {
        config = config.streaming();
    }

    let client = config.kube_client().await?;
    let api = state
        .router
        .sub_client_for(&client, &api_path.group, &api_path.version);

    let body = read_body(body, MAX_BODY_SIZE).await?;
    let uri = api.request_uri(&api_path, parts.uri.query());
    let outbound = outbound_request(&parts, uri, body)?;
    api.send(outbound).await
}

/// Handle `/clusters/{cluster_name}/logconfigs[/{name}]`
pub async fn logconfig_handler(
    State(state): State<AppState>,
    Path(params): Path<LogConfigPath>,
    request: Request<Body>,
) -> Result<Response<Body>> {
    let identity = Identity::from_headers(request.headers())?;
    if let Some(name) = &params.name {
        logconfig::validate_name(name)?;
    }
    let target = state
        .access
        .proxy_target(&params.cluster_name, &identity)
        .await?;

    info!(
        cluster = %params.cluster_name,
        name = ?params.name,
        method = %request.method(),
        "Proxying log config request"
    );

    Ok(LogConfigProxy::new(target, params.name).serve(request).await)
}

/// Collect a request body of at most `limit` bytes
///
/// The API client only takes buffered bodies.
async fn read_body(body: Body, limit: usize) -> Result<Vec<u8>> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| Error::BadRequest(format!("failed to read request body: {}", e)))?;
        if buf.len() + chunk.len() > limit {
            return Err(Error::PayloadTooLarge(format!(
                "request body exceeds {} bytes",
                limit
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Whether the query asks for a long-lived stream
fn is_streaming(query: Option<&str>) -> bool {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes()).any(|(key, value)| {
                (key == "watch" || key == "follow") && (value == "true" || value == "1")
            })
        })
        .unwrap_or(false)
}

/// Headers that must not reach the remote control plane
///
/// The connection carries the caller's own credential, so inbound
/// credentials and impersonation requests are dropped.
fn is_stripped(name: &HeaderName) -> bool {
    let name_str = name.as_str();
    *name == AUTHORIZATION
        || *name == HOST
        || *name == COOKIE
        || *name == CONTENT_LENGTH
        || name_str.starts_with("impersonate-")
        || name_str.starts_with("x-remote-")
        || is_hop_by_hop(name)
}

fn outbound_request(parts: &Parts, uri: String, body: Vec<u8>) -> Result<Request<Vec<u8>>> {
    let mut builder = Request::builder().method(parts.method.clone()).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in &parts.headers {
            if !is_stripped(name) {
                headers.append(name.clone(), value.clone());
            }
        }
    }
    builder
        .body(body)
        .map_err(|e| Error::BadRequest(format!("invalid request: {}", e)))
}
