//! Admission decision for ServiceAccount deletion.
//!
//! A deletion is allowed only when the pod listing for the ServiceAccount's
//! namespace completed and no pod declares the ServiceAccount. Any failure
//! along the way is returned as an error so the handler can fail the request.

use std::fmt;

use k8s_openapi::api::core::v1::ServiceAccount;
use kube::core::DynamicObject;
use kube::core::admission::{
    AdmissionRequest, AdmissionResponse, AdmissionReview, ConvertAdmissionReviewError,
};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::usage::{Usage, UsageChecker};

/// The only kind this webhook is registered for
pub const SERVICE_ACCOUNT_KIND: &str = "ServiceAccount";

/// Admission request whose object payloads are left undecoded.
///
/// `object` and `oldObject` are lifted out of the envelope before it is
/// decoded, so a stored object of the wrong shape surfaces as
/// [`Error::Decode`] from [`ServiceAccountRef::from_request`] rather than as
/// a malformed envelope. `request.old_object` is therefore always `None`.
#[derive(Debug)]
pub struct ReviewRequest {
    pub request: AdmissionRequest<DynamicObject>,
    pub old_object: Option<Value>,
}

impl ReviewRequest {
    /// Split a raw AdmissionReview into its envelope and `oldObject`
    pub fn from_value(mut review: Value) -> Result<Self> {
        let old_object = review
            .get_mut("request")
            .and_then(Value::as_object_mut)
            .and_then(|request| {
                request.remove("object");
                request.remove("oldObject")
            })
            .filter(|old| !old.is_null());

        let review: AdmissionReview<DynamicObject> =
            serde_json::from_value(review).map_err(|e| Error::InvalidReview(e.to_string()))?;
        let request = review
            .try_into()
            .map_err(|e: ConvertAdmissionReviewError| Error::InvalidReview(e.to_string()))?;

        Ok(Self {
            request,
            old_object,
        })
    }
}

/// Name and namespace of the ServiceAccount being deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccountRef {
    pub name: String,
    pub namespace: String,
}

impl fmt::Display for ServiceAccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl ServiceAccountRef {
    /// Decode the ServiceAccount carried in `oldObject`.
    ///
    /// The namespace falls back to the request's namespace when the stored
    /// object omits it.
    pub fn from_request(review: &ReviewRequest) -> Result<Self> {
        let old = review.old_object.as_ref().ok_or(Error::MissingOldObject)?;
        let sa: ServiceAccount = serde_json::from_value(old.clone())?;

        let name = sa
            .metadata
            .name
            .filter(|n| !n.is_empty())
            .ok_or(Error::MissingField("metadata.name"))?;
        let namespace = sa
            .metadata
            .namespace
            .or_else(|| review.request.namespace.clone())
            .filter(|ns| !ns.is_empty())
            .ok_or(Error::MissingField("metadata.namespace"))?;

        Ok(Self { name, namespace })
    }
}

/// Message shown to the user whose deletion was denied
pub fn denial_message(name: &str, usage: &Usage) -> String {
    format!(
        "ServiceAccount {} is in use and cannot be deleted (pods: {})",
        name,
        usage.pods.join(", ")
    )
}

/// Renders one admission decision
pub struct Validator {
    checker: UsageChecker,
}

impl Validator {
    pub fn new(checker: UsageChecker) -> Self {
        Self { checker }
    }

    /// Decide whether the ServiceAccount in `request` may be deleted
    pub async fn decide(&self, review: &ReviewRequest) -> Result<AdmissionResponse> {
        let request = &review.request;
        if request.kind.kind != SERVICE_ACCOUNT_KIND {
            error!(
                uid = %request.uid,
                kind = %request.kind.kind,
                "Admission request is not for a ServiceAccount"
            );
            return Err(Error::UnexpectedKind(request.kind.kind.clone()));
        }

        let sa = ServiceAccountRef::from_request(review).inspect_err(|e| {
            error!(uid = %request.uid, error = %e, "Failed to decode ServiceAccount");
        })?;
        info!(
            uid = %request.uid,
            operation = ?request.operation,
            namespace = %sa.namespace,
            service_account = %sa.name,
            "Validating ServiceAccount deletion"
        );

        let usage = self.checker.check(&sa.namespace, &sa.name).await?;

        if usage.in_use() {
            warn!(
                uid = %request.uid,
                service_account = %sa,
                pods = ?usage.pods,
                "ServiceAccount is in use, denying deletion"
            );
            Ok(AdmissionResponse::from(request).deny(denial_message(&sa.name, &usage)))
        } else {
            info!(
                uid = %request.uid,
                service_account = %sa,
                "ServiceAccount is not in use, allowing deletion"
            );
            Ok(AdmissionResponse::from(request))
        }
    }
}
