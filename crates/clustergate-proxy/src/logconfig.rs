//! Reverse proxy for the log collection sub-resource
//!
//! Log collection configs are a custom resource on the remote control plane.
//! Requests under `/clusters/{cluster}/logconfigs[/{name}]` are forwarded as
//! a plain reverse proxy with the cluster's default credential, instead of
//! going through the typed API router.

use std::time::Duration;

use axum::body::{Body, Bytes, HttpBody};
use axum::http::header::{AUTHORIZATION, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Response};
use axum::response::IntoResponse;
use tokio_stream::StreamExt;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::transport::ProxyTarget;

/// Upstream collection path of log configs
pub const LOGCONFIG_PATH: &str = "/apis/cls.cloud.tencent.com/v1/logconfigs";

/// Longest a response chunk is held before being written to the caller
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Chunks coalesced into one write at most
const FLUSH_MAX_CHUNKS: usize = 64;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub(crate) fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Check that `name` addresses a single log config below the collection
///
/// The name arrives percent-decoded; separators and dot segments are refused.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(Error::BadRequest(format!(
            "invalid log config name {:?}",
            name
        )));
    }
    Ok(())
}

/// One proxied log config request
pub struct LogConfigProxy {
    target: ProxyTarget,
    name: Option<String>,
}

impl LogConfigProxy {
    /// Proxy to `target`, optionally addressing the log config `name`
    pub fn new(target: ProxyTarget, name: Option<String>) -> Self {
        Self {
            target,
            name: name.filter(|n| !n.is_empty()),
        }
    }

    /// Upstream URL: collection or item path with the inbound query verbatim
    ///
    /// The name is appended as one percent-encoded segment.
    pub fn target_url(&self, query: Option<&str>) -> Result<Url> {
        let mut url = self.target.location.clone();
        url.set_path(LOGCONFIG_PATH);
        if let Some(name) = &self.name {
            validate_name(name)?;
            url.path_segments_mut()
                .map_err(|_| {
                    Error::Internal(format!(
                        "cluster location {} cannot carry a path",
                        self.target.location
                    ))
                })?
                .push(name);
        }
        url.set_query(query);
        Ok(url)
    }

    /// Outbound headers: inbound minus hop-by-hop and `Host`, with the
    /// configured bearer token overriding any inbound `Authorization`
    pub fn outbound_headers(&self, inbound: &HeaderMap) -> Result<HeaderMap> {
        let mut headers = inbound.clone();
        headers.remove(HOST);
        for name in HOP_BY_HOP {
            headers.remove(*name);
        }

        if let Some(token) = self.target.token.as_deref().map(str::trim) {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| Error::Internal("bearer token is not a valid header value".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Forward `request` and stream the upstream response back
    ///
    /// Both bodies are streamed. The outbound call runs on its own task, so it
    /// completes even if the caller goes away.
    pub async fn serve(self, request: Request<Body>) -> Response<Body> {
        match self.forward(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Log config proxy failed");
                e.into_response()
            }
        }
    }

    async fn forward(self, request: Request<Body>) -> Result<Response<Body>> {
        let (parts, body) = request.into_parts();
        let url = self.target_url(parts.uri.query())?;
        let headers = self.outbound_headers(&parts.headers)?;

        debug!(method = %parts.method, url = %url, "Forwarding log config request");

        let mut outbound = self
            .target
            .transport
            .request(parts.method, url)
            .headers(headers);
        if body.size_hint().exact() != Some(0) {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }
        let outbound = outbound
            .build()
            .map_err(|e| Error::Internal(format!("failed to build upstream request: {}", e)))?;

        let transport = self.target.transport.clone();
        let upstream = tokio::spawn(async move { transport.execute(outbound).await })
            .await
            .map_err(|e| Error::Internal(format!("upstream task failed: {}", e)))?
            .map_err(|e| Error::Proxy(e.to_string()))?;

        relay(upstream)
    }
}

fn relay(upstream: reqwest::Response) -> Result<Response<Body>> {
    let mut builder = Response::builder().status(upstream.status());
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in upstream.headers() {
            if !is_hop_by_hop(name) {
                headers.append(name.clone(), value.clone());
            }
        }
    }

    let stream = upstream
        .bytes_stream()
        .chunks_timeout(FLUSH_MAX_CHUNKS, FLUSH_INTERVAL)
        .map(coalesce);

    builder
        .body(Body::from_stream(stream))
        .map_err(|e| Error::Internal(format!("failed to build response: {}", e)))
}

/// Merge one flush window of chunks into a single write
fn coalesce(batch: Vec<reqwest::Result<Bytes>>) -> std::io::Result<Bytes> {
    let mut chunks = batch
        .into_iter()
        .collect::<reqwest::Result<Vec<Bytes>>>()
        .map_err(std::io::Error::other)?;

    if chunks.len() == 1 {
        return Ok(chunks.pop().unwrap_or_default());
    }
    Ok(Bytes::from(chunks.concat()))
}
