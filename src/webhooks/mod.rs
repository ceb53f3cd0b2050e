//! Webhook module for validating ServiceAccount deletion.
//!
//! - `server`: TLS listener, request handler and shutdown coordination
//! - `validator`: the allow/deny decision for one admission request

mod server;
pub mod validator;

pub use server::{
    ServerPhase, VALIDATE_PATH, WebhookState, create_webhook_router, parse_review,
    run_webhook_server,
};
pub use validator::{
    ReviewRequest, SERVICE_ACCOUNT_KIND, ServiceAccountRef, Validator, denial_message,
};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
