//! sa-delete-webhook library crate
//!
//! A validating admission webhook that refuses to delete a ServiceAccount
//! while any pod in its namespace still runs as it.

pub mod cluster;
pub mod config;
pub mod error;
pub mod health;
pub mod usage;
pub mod webhooks;

pub use cluster::{ClusterClient, PodLister};
pub use config::{Cli, ServerConfig};
pub use error::{ClientError, Error, Result};
pub use health::{HealthState, run_health_server};
pub use usage::{DEFAULT_CHECK_TIMEOUT, Usage, UsageChecker};
pub use webhooks::{WebhookState, create_webhook_router, run_webhook_server};
