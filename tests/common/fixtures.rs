//! Test fixtures and builder patterns for admission reviews and pods.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use sa_delete_webhook::{Error, HealthState, PodLister, Result, WebhookState};
use serde_json::{Value, json};

/// Builder for AdmissionReview request bodies.
///
/// # Example
/// ```
/// let review = AdmissionReviewBuilder::new("build-bot")
///     .namespace("ns1")
///     .uid("abc")
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct AdmissionReviewBuilder {
    name: String,
    namespace: String,
    uid: String,
    kind: String,
    operation: String,
    include_old_object: bool,
}

impl AdmissionReviewBuilder {
    /// Create a new builder for deleting ServiceAccount `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: "ns1".to_string(),
            uid: "705ab4f5-6393-11e8-b7cc-42010a800002".to_string(),
            kind: "ServiceAccount".to_string(),
            operation: "DELETE".to_string(),
            include_old_object: true,
        }
    }

    /// Set the namespace of the request and the old object.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the request uid.
    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    /// Set `request.kind.kind`.
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Drop `request.oldObject`.
    pub fn without_old_object(mut self) -> Self {
        self.include_old_object = false;
        self
    }

    /// Build the AdmissionReview as JSON.
    pub fn build(self) -> Value {
        let mut request = json!({
            "uid": self.uid,
            "kind": {"group": "", "version": "v1", "kind": self.kind},
            "resource": {"group": "", "version": "v1", "resource": "serviceaccounts"},
            "name": self.name,
            "namespace": self.namespace,
            "operation": self.operation,
            "userInfo": {"username": "kubernetes-admin", "groups": ["system:masters"]},
            "dryRun": false
        });
        if self.include_old_object {
            request["oldObject"] = json!({
                "apiVersion": "v1",
                "kind": self.kind,
                "metadata": {"name": self.name, "namespace": self.namespace}
            });
        }
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": request
        })
    }

    /// Build the AdmissionReview as a request body.
    pub fn build_bytes(self) -> Vec<u8> {
        serde_json::to_vec(&self.build()).unwrap_or_default()
    }
}

/// Create a pod running as `service_account`.
pub fn pod(name: &str, service_account: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("ns1".to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            service_account_name: Some(service_account.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Lister returning a fixed set of pods and counting calls.
#[derive(Default)]
pub struct StaticPods {
    pods: Vec<Pod>,
    calls: AtomicUsize,
}

impl StaticPods {
    pub fn new(pods: Vec<Pod>) -> Self {
        Self {
            pods,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PodLister for StaticPods {
    async fn list_pods(&self, _namespace: &str) -> Result<Vec<Pod>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pods.clone())
    }
}

/// Lister whose API calls are refused with 403 Forbidden.
pub struct ForbiddenLister;

#[async_trait]
impl PodLister for ForbiddenLister {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        Err(Error::List {
            namespace: namespace.to_string(),
            source: kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: format!(
                    "pods is forbidden: User \"system:serviceaccount:webhook:sa-delete-webhook\" \
                     cannot list resource \"pods\" in API group \"\" in the namespace \"{namespace}\""
                ),
                reason: "Forbidden".to_string(),
                code: 403,
            }),
        })
    }
}

/// Lister that answers after `delay`.
pub struct SlowLister {
    pub delay: Duration,
}

#[async_trait]
impl PodLister for SlowLister {
    async fn list_pods(&self, _namespace: &str) -> Result<Vec<Pod>> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![])
    }
}

/// Webhook state backed by `lister` with the default check budget.
pub fn webhook_state(lister: Arc<dyn PodLister>) -> Arc<WebhookState> {
    webhook_state_with_timeout(lister, Duration::from_secs(10))
}

pub fn webhook_state_with_timeout(
    lister: Arc<dyn PodLister>,
    timeout: Duration,
) -> Arc<WebhookState> {
    Arc::new(WebhookState::new(
        lister,
        timeout,
        Arc::new(HealthState::new()),
    ))
}

/// Self-signed certificate and key written to a temporary directory.
pub struct TlsFiles {
    pub dir: tempfile::TempDir,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Generate a self-signed certificate for `localhost`.
#[allow(clippy::unwrap_used)]
pub fn self_signed_tls() -> TlsFiles {
    let key_pair = rcgen::KeyPair::generate().unwrap();
    let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
        .unwrap()
        .self_signed(&key_pair)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("tls.crt");
    let key_path = dir.path().join("tls.key");
    std::fs::write(&cert_path, cert.pem()).unwrap();
    std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();

    TlsFiles {
        dir,
        cert_path,
        key_path,
    }
}

/// Install the process-wide rustls crypto provider (idempotent).
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}
