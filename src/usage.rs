//! ServiceAccount usage check.
//!
//! Lists every pod in the ServiceAccount's namespace and matches
//! `spec.serviceAccountName` client-side. The list call runs under a time
//! budget; running out of time is an error, never a "not in use" answer.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, error, info};

use crate::cluster::PodLister;
use crate::error::{Error, Result};

/// Default time budget for a single usage check
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Pods found referencing a ServiceAccount
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    /// Names of pods declaring the ServiceAccount, in listing order.
    ///
    /// A pod without `metadata.name` is listed under its `generateName`, or
    /// as an empty string, so that every match is counted.
    pub pods: Vec<String>,
}

impl Usage {
    /// Whether at least one pod uses the ServiceAccount
    pub fn in_use(&self) -> bool {
        !self.pods.is_empty()
    }
}

/// Checks whether a ServiceAccount is referenced by any pod
#[derive(Clone)]
pub struct UsageChecker {
    lister: Arc<dyn PodLister>,
    timeout: Duration,
}

impl UsageChecker {
    pub fn new(lister: Arc<dyn PodLister>, timeout: Duration) -> Self {
        Self { lister, timeout }
    }

    /// Find the pods in `namespace` that run as ServiceAccount `name`
    pub async fn check(&self, namespace: &str, name: &str) -> Result<Usage> {
        debug!(
            namespace,
            service_account = name,
            "Checking for pods using ServiceAccount"
        );

        let pods = tokio::time::timeout(self.timeout, self.lister.list_pods(namespace))
            .await
            .map_err(|_| {
                error!(
                    namespace,
                    service_account = name,
                    timeout = ?self.timeout,
                    "Timed out listing pods"
                );
                Error::Timeout {
                    namespace: namespace.to_string(),
                    after: self.timeout,
                }
            })?
            .inspect_err(|e| {
                error!(
                    namespace,
                    service_account = name,
                    error = %e,
                    "Failed to list pods"
                )
            })?;

        let usage = Usage {
            pods: pods
                .iter()
                .filter(|pod| service_account_of(pod) == Some(name))
                .map(|pod| pod.name_any())
                .collect(),
        };

        if usage.in_use() {
            info!(
                namespace,
                service_account = name,
                pods = ?usage.pods,
                "ServiceAccount is used by pods"
            );
        } else {
            debug!(
                namespace,
                service_account = name,
                "No pods are using ServiceAccount"
            );
        }
        Ok(usage)
    }

    /// Boolean form of [`UsageChecker::check`]
    pub async fn is_in_use(&self, namespace: &str, name: &str) -> Result<bool> {
        Ok(self.check(namespace, name).await?.in_use())
    }
}

fn service_account_of(pod: &Pod) -> Option<&str> {
    pod.spec.as_ref()?.service_account_name.as_deref()
}
