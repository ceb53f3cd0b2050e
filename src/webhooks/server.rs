//! Admission webhook server.
//!
//! Serves `POST /validate` over TLS. The API server sends an AdmissionReview
//! for every ServiceAccount DELETE; the response carries the decision and
//! echoes the request uid.
//!
//! To enable the webhook:
//! 1. Provision a TLS certificate/key pair (e.g. with cert-manager)
//! 2. Mount it into the pod and point `--cert-file`/`--key-file` at it
//! 3. Create a ValidatingWebhookConfiguration for DELETE on serviceaccounts

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use tracing::{error, info, warn};

use crate::cluster::PodLister;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::health::{Decision, HealthState};
use crate::usage::UsageChecker;
use crate::webhooks::validator::{ReviewRequest, Validator};

/// Path the ValidatingWebhookConfiguration points at
pub const VALIDATE_PATH: &str = "/validate";

const JSON_CONTENT_TYPE: &str = "application/json";

/// Lifecycle phases of the webhook listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    Starting,
    Serving,
    ShuttingDown,
    Failed,
    Stopped,
}

/// Shared state for webhook handlers
pub struct WebhookState {
    lister: Arc<dyn PodLister>,
    check_timeout: Duration,
    pub health: Arc<HealthState>,
}

impl WebhookState {
    pub fn new(
        lister: Arc<dyn PodLister>,
        check_timeout: Duration,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            lister,
            check_timeout,
            health,
        }
    }

    /// Validator for a single request, sharing the process-wide lister
    fn validator(&self) -> Validator {
        Validator::new(UsageChecker::new(self.lister.clone(), self.check_timeout))
    }
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(VALIDATE_PATH, post(validate_service_account))
        .with_state(state)
}

/// Check transport preconditions and decode the AdmissionReview envelope
pub fn parse_review(headers: &HeaderMap, body: &[u8]) -> Result<ReviewRequest> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default();
    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case(JSON_CONTENT_TYPE) {
        return Err(Error::InvalidContentType(content_type));
    }

    if body.is_empty() {
        return Err(Error::EmptyBody);
    }

    let review = serde_json::from_slice(body).map_err(|e| Error::InvalidReview(e.to_string()))?;
    ReviewRequest::from_value(review)
}

/// Validate a ServiceAccount deletion
async fn validate_service_account(
    State(state): State<Arc<WebhookState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    info!(method = %method, path = %uri.path(), "Received admission request");

    let review = match parse_review(&headers, &body) {
        Ok(review) => review,
        Err(e) => {
            error!(
                method = %method,
                path = %uri.path(),
                error = %e,
                "Failed to parse admission review"
            );
            state.health.metrics.record_decision(Decision::Rejected);
            return (e.status_code(), e.to_string()).into_response();
        }
    };

    let request = &review.request;
    let started = Instant::now();
    let result = state.validator().decide(&review).await;
    state
        .health
        .metrics
        .observe_decision_duration(started.elapsed().as_secs_f64());

    match result {
        Ok(response) => {
            let decision = if response.allowed {
                Decision::Allowed
            } else {
                Decision::Denied
            };
            info!(
                method = %method,
                path = %uri.path(),
                uid = %request.uid,
                decision = %decision,
                "Admission response sent"
            );
            state.health.metrics.record_decision(decision);
            (StatusCode::OK, Json(response.into_review())).into_response()
        }
        Err(e) => {
            let decision = if e.is_protocol_error() {
                Decision::Rejected
            } else {
                Decision::Error
            };
            error!(
                method = %method,
                path = %uri.path(),
                uid = %request.uid,
                namespace = ?request.namespace,
                service_account = %request.name,
                operation = ?request.operation,
                error = %e,
                "Validation error"
            );
            state.health.metrics.record_decision(decision);
            (e.status_code(), e.to_string()).into_response()
        }
    }
}

/// Run the webhook server with TLS until `shutdown` resolves.
///
/// TLS material is loaded before anything is bound; a load failure aborts
/// startup. Once serving, the listener runs on its own task while this
/// function waits for either the shutdown signal or the listener exiting.
/// Shutdown drains in-flight requests for at most `drain_timeout`.
pub async fn run_webhook_server<F>(
    config: &ServerConfig,
    state: Arc<WebhookState>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    info!(
        phase = ?ServerPhase::Starting,
        cert = %config.cert_path.display(),
        "Loading TLS certificate"
    );
    let tls = RustlsConfig::from_pem_file(&config.cert_path, &config.key_path)
        .await
        .map_err(|e| {
            error!(phase = ?ServerPhase::Failed, error = %e, "Failed to load TLS cert/key");
            Error::TlsConfig(e.to_string())
        })?;

    let health = state.health.clone();
    let app = create_webhook_router(state);
    let handle = Handle::new();

    let mut listener = tokio::spawn(
        axum_server::bind_rustls(config.addr, tls)
            .handle(handle.clone())
            .serve(app.into_make_service()),
    );

    let readiness = {
        let handle = handle.clone();
        let health = health.clone();
        tokio::spawn(async move {
            if let Some(addr) = handle.listening().await {
                info!(
                    phase = ?ServerPhase::Serving,
                    addr = %addr,
                    "Webhook server listening with TLS"
                );
                health.set_ready(true).await;
            }
        })
    };

    tokio::pin!(shutdown);
    let outcome = tokio::select! {
        _ = &mut shutdown => {
            info!(
                phase = ?ServerPhase::ShuttingDown,
                drain_timeout = ?config.drain_timeout,
                "Shutdown signal received, draining webhook server"
            );
            readiness.abort();
            health.set_ready(false).await;
            handle.graceful_shutdown(Some(config.drain_timeout));
            listener_outcome(listener.await)
        }
        result = &mut listener => {
            readiness.abort();
            listener_outcome(result)
        }
    };
    health.set_ready(false).await;

    match &outcome {
        Ok(()) => info!(phase = ?ServerPhase::Stopped, "Webhook server stopped"),
        Err(e) => error!(phase = ?ServerPhase::Failed, error = %e, "Webhook server failed"),
    }
    outcome
}

/// A listener that returned cleanly was closed on purpose
fn listener_outcome(
    result: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::Server(e.to_string())),
        Err(e) => {
            warn!(error = %e, "Webhook listener task did not complete");
            Err(Error::Server(e.to_string()))
        }
    }
}
