// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for sa-delete-webhook.
//!
//! Uses proptest to generate random inputs and verify invariants.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use kube::core::DynamicObject;
use kube::core::admission::{AdmissionResponse, AdmissionReview};
use proptest::prelude::*;

use sa_delete_webhook::usage::{DEFAULT_CHECK_TIMEOUT, UsageChecker};
use sa_delete_webhook::webhooks::{ReviewRequest, Validator};

use common::fixtures::{AdmissionReviewBuilder, StaticPods, pod};

/// Strategy for DNS-1123 style names.
fn k8s_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,20}[a-z0-9]"
}

/// Strategy for request uids.
fn uid() -> impl Strategy<Value = String> {
    "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
}

fn request(review: serde_json::Value) -> ReviewRequest {
    ReviewRequest::from_value(review).unwrap()
}

fn decide(
    pods: Vec<(String, String)>,
    request: &ReviewRequest,
) -> AdmissionResponse {
    let pods = pods.iter().map(|(name, sa)| pod(name, sa)).collect();
    let validator = Validator::new(UsageChecker::new(
        Arc::new(StaticPods::new(pods)),
        DEFAULT_CHECK_TIMEOUT,
    ));
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(validator.decide(request))
        .unwrap()
}

proptest! {
    /// The response is always correlated with the request and is denied
    /// exactly when some pod runs as the ServiceAccount.
    #[test]
    fn decision_matches_pod_usage(
        uid in uid(),
        sa in k8s_name(),
        pods in prop::collection::vec((k8s_name(), k8s_name()), 0..8),
    ) {
        let req = request(AdmissionReviewBuilder::new(sa.clone()).uid(uid.clone()).build());
        let response = decide(pods.clone(), &req);

        prop_assert_eq!(&response.uid, &uid);
        let in_use = pods.iter().any(|(_, pod_sa)| pod_sa == &sa);
        prop_assert_eq!(response.allowed, !in_use);
        prop_assert_eq!(response.result.message.is_empty(), response.allowed);
        if in_use {
            prop_assert!(response.result.message.contains(&sa));
        }
    }

    /// Encoding then decoding the response envelope keeps allowed/message.
    #[test]
    fn response_envelope_survives_encoding(
        uid in uid(),
        sa in k8s_name(),
        deny in any::<bool>(),
    ) {
        let req = request(AdmissionReviewBuilder::new(sa.clone()).uid(uid).build());
        let response = if deny {
            AdmissionResponse::from(&req.request).deny(format!("ServiceAccount {sa} is in use"))
        } else {
            AdmissionResponse::from(&req.request)
        };

        let (allowed, message, uid) = (
            response.allowed,
            response.result.message.clone(),
            response.uid.clone(),
        );

        let encoded = serde_json::to_string(&response.into_review()).unwrap();
        let decoded: AdmissionReview<DynamicObject> = serde_json::from_str(&encoded).unwrap();
        let decoded = decoded.response.unwrap();

        prop_assert_eq!(decoded.allowed, allowed);
        prop_assert_eq!(decoded.result.message, message);
        prop_assert_eq!(decoded.uid, uid);
    }
}
