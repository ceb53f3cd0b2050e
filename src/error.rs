//! Error types for the webhook.
//!
//! Errors are classified by where they arise so the request handler can pick
//! an HTTP status: protocol errors become 400, everything else 500.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Failure to construct the Kubernetes client.
///
/// Cloneable so the single construction result can be handed to every caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// In-cluster service account credentials could not be loaded
    #[error("failed to get in-cluster config: {0}")]
    InClusterConfig(String),

    /// The API client could not be built from the loaded config
    #[error("failed to create Kubernetes client: {0}")]
    Build(String),
}

/// Error type for admission handling and server lifecycle
#[derive(Error, Debug)]
pub enum Error {
    /// Request Content-Type is not application/json
    #[error("Content-Type: {0:?} should be \"application/json\"")]
    InvalidContentType(String),

    /// Request body was empty
    #[error("admission request body is empty")]
    EmptyBody,

    /// Body is not a usable AdmissionReview
    #[error("could not parse admission review request: {0}")]
    InvalidReview(String),

    /// The webhook was invoked for a kind other than ServiceAccount
    #[error("object in the request is a {0:?}, not a ServiceAccount")]
    UnexpectedKind(String),

    /// DELETE request without the object being deleted
    #[error("admission request has no oldObject")]
    MissingOldObject,

    /// oldObject does not have the shape of a ServiceAccount
    #[error("failed to decode ServiceAccount: {0}")]
    Decode(#[from] serde_json::Error),

    /// Required field missing from the decoded object
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Kubernetes client could not be constructed
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Listing pods failed
    #[error("failed to list pods in namespace {namespace}: {source}")]
    List {
        namespace: String,
        #[source]
        source: kube::Error,
    },

    /// Listing pods did not finish within the check budget
    #[error("timed out after {after:?} listing pods in namespace {namespace}")]
    Timeout { namespace: String, after: Duration },

    /// TLS material could not be loaded
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// The listener terminated unexpectedly
    #[error("webhook server error: {0}")]
    Server(String),
}

impl Error {
    /// Whether the caller sent something this webhook cannot act on
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidContentType(_)
                | Error::EmptyBody
                | Error::InvalidReview(_)
                | Error::UnexpectedKind(_)
        )
    }

    /// HTTP status returned to the API server for this error
    pub fn status_code(&self) -> StatusCode {
        if self.is_protocol_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Result type alias for webhook operations
pub type Result<T> = std::result::Result<T, Error>;
