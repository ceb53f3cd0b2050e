//! Command-line and environment configuration.
//!
//! Every flag can also be set through an `SDW_`-prefixed environment
//! variable; an explicit flag wins over the environment.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Default webhook server port
pub const DEFAULT_PORT: u16 = 8443;
/// Default health/metrics server port
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Validating webhook that blocks deletion of ServiceAccounts still used by pods
#[derive(Parser, Debug, Clone)]
#[command(name = "sa-delete-webhook", version, about, long_about = None)]
pub struct Cli {
    /// TLS certificate file for the server (PEM)
    #[arg(long, env = "SDW_CERT_FILE", default_value = "cert.pem")]
    pub cert_file: PathBuf,

    /// TLS private key file for the server (PEM)
    #[arg(long, env = "SDW_KEY_FILE", default_value = "key.key")]
    pub key_file: PathBuf,

    /// Port for the webhook server
    #[arg(long, env = "SDW_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Time budget in seconds for listing pods during one admission check
    #[arg(long, env = "SDW_CHECK_TIMEOUT_SECS", default_value_t = 10)]
    pub check_timeout_secs: u64,

    /// Upper bound in seconds on draining in-flight requests at shutdown
    #[arg(long, env = "SDW_DRAIN_TIMEOUT_SECS", default_value_t = 10)]
    pub drain_timeout_secs: u64,

    /// Port for the health and metrics server
    #[arg(long, env = "SDW_HEALTH_PORT", default_value_t = DEFAULT_HEALTH_PORT)]
    pub health_port: u16,
}

/// Resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the TLS listener binds
    pub addr: SocketAddr,
    /// Path to the TLS certificate (PEM)
    pub cert_path: PathBuf,
    /// Path to the TLS private key (PEM)
    pub key_path: PathBuf,
    /// Budget for a single usage check
    pub check_timeout: Duration,
    /// Upper bound on the graceful drain
    pub drain_timeout: Duration,
    /// Address the health server binds
    pub health_addr: SocketAddr,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, cli.port)),
            cert_path: cli.cert_file,
            key_path: cli.key_file,
            check_timeout: Duration::from_secs(cli.check_timeout_secs),
            drain_timeout: Duration::from_secs(cli.drain_timeout_secs),
            health_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, cli.health_port)),
        }
    }
}
