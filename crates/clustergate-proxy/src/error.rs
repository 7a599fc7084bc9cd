//! Error types for the cluster access proxy

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type for proxy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for proxy operations
///
/// Every component returns the most specific kind it can; nothing here is
/// retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Required request context is missing or malformed
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Request body is larger than the proxy forwards
    #[error("request entity too large: {0}")]
    PayloadTooLarge(String),

    /// No authenticated identity on the request
    #[error("authentication failed: {0}")]
    Unauthorized(String),

    /// Resource not found. Tenant mismatches are reported the same way.
    #[error("{kind} \"{name}\" not found")]
    NotFound {
        /// Resource kind (e.g., "clusters")
        kind: String,
        /// Resource name
        name: String,
    },

    /// Cluster is administratively locked against proxy operations
    #[error("cluster {0} has been locked")]
    Locked(String),

    /// Upstream control plane could not be reached or failed mid-request
    #[error("proxy error: {0}")]
    Proxy(String),

    /// CA/cache I/O, certificate generation or transport construction failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// NotFound for a cluster name
    pub fn cluster_not_found(name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "clusters".to_string(),
            name: name.into(),
        }
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Locked(_) => StatusCode::CONFLICT,
            Error::Proxy(_) => StatusCode::BAD_GATEWAY,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Kubernetes `Status.reason` for this error
    fn reason(&self) -> &'static str {
        match self {
            Error::BadRequest(_) => "BadRequest",
            Error::PayloadTooLarge(_) => "RequestEntityTooLarge",
            Error::Unauthorized(_) => "Unauthorized",
            Error::NotFound { .. } => "NotFound",
            Error::Locked(_) => "Conflict",
            Error::Proxy(_) => "ServiceUnavailable",
            Error::Internal(_) => "InternalError",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Return K8s-style Status response
        let body = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": self.to_string(),
            "reason": self.reason(),
            "code": status.as_u16()
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Error::Internal(e.to_string())
    }
}

impl From<clustergate_pki::PkiError> for Error {
    fn from(e: clustergate_pki::PkiError) -> Self {
        Error::Internal(e.to_string())
    }
}

impl From<clustergate_common::Error> for Error {
    fn from(e: clustergate_common::Error) -> Self {
        match e {
            clustergate_common::Error::Kube { source } => source.into(),
            other => Error::Internal(other.to_string()),
        }
    }
}
